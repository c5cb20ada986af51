/*!
 * Error handling for BPA export and validation operations
 *
 * Provides detailed error types with context, suggestions, and recovery guidance.
 * Conformance findings produced while validating a submission file are not
 * errors in this sense; they accumulate in a `ValidationReport` instead.
 */

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use serde::{Serialize, Deserialize};

/// BPA library result type
pub type Result<T> = std::result::Result<T, BpaError>;

/// Error types with context and suggestions
#[derive(Error, Debug)]
pub enum BpaError {
    /// File I/O errors with context
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
        context: ErrorContext,
    },

    /// CSV parsing errors with location information
    #[error("CSV parsing error at line {line:?}: {message}")]
    CsvParse {
        message: String,
        line: Option<usize>,
        column: Option<String>,
        context: ErrorContext,
    },

    /// File not found with suggestions
    #[error("File not found: {path}")]
    FileNotFound {
        path: PathBuf,
        suggestion: String,
    },

    /// Invalid competence (reporting year-month)
    #[error("Invalid competence '{value}': {reason}")]
    InvalidCompetence {
        value: String,
        reason: String,
        suggestion: String,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        suggestion: Option<String>,
    },

    /// Mapping table errors (loading or parsing external lookup tables)
    #[error("Mapping table error: {message}")]
    MappingTable {
        message: String,
        path: Option<PathBuf>,
        suggestion: Option<String>,
    },

    /// Export errors
    #[error("Export error: {message}")]
    Export {
        message: String,
        format: ExportFormat,
        suggestion: Option<String>,
    },

    /// Generic errors with custom message
    #[error("{message}")]
    Custom {
        message: String,
        suggestion: Option<String>,
    },
}

/// Error context providing additional information
#[derive(Debug, Default, Clone)]
pub struct ErrorContext {
    pub file_path: Option<PathBuf>,
    pub line_number: Option<usize>,
    pub column_name: Option<String>,
    pub source_row: Option<String>,
}

/// Output format for error context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExportFormat {
    /// Fixed-width BPA-I submission file
    #[default]
    Bpa,
    Json,
    Csv,
    Html,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Bpa => write!(f, "BPA-I"),
            ExportFormat::Json => write!(f, "JSON"),
            ExportFormat::Csv => write!(f, "CSV"),
            ExportFormat::Html => write!(f, "HTML"),
        }
    }
}

impl BpaError {
    /// Create a file not found error with helpful suggestion
    pub fn file_not_found_with_suggestion(path: PathBuf) -> Self {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_uppercase())
            .unwrap_or_default();

        let suggestion = if crate::constants::MONTH_EXTENSIONS.contains(&extension.as_str()) {
            format!(
                "Check if the submission file exists at '{}'. BPA-I files are named after the \
                competence month, e.g. 'PAAPAE.MAR' for March.",
                path.display()
            )
        } else if extension == "TOML" {
            format!(
                "Check if the file exists at '{}'. Run without the option to fall back to the \
                built-in defaults.",
                path.display()
            )
        } else {
            format!(
                "Check if the file exists at '{}'. Make sure the path is correct and you have read permissions.",
                path.display()
            )
        };

        Self::FileNotFound { path, suggestion }
    }

    /// Create an invalid competence error with format guidance
    pub fn invalid_competence(value: &str, reason: impl Into<String>) -> Self {
        Self::InvalidCompetence {
            value: value.to_string(),
            reason: reason.into(),
            suggestion: "Use the AAAAMM format, e.g. 202403 for March 2024".to_string(),
        }
    }

    /// Create an I/O error that remembers the file it happened on
    pub fn io_at(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self::Io {
            message: format!("{} ({})", source, path.display()),
            source,
            context: ErrorContext {
                file_path: Some(path),
                ..Default::default()
            },
        }
    }

    /// True for errors that mean the input file could not be read at all
    pub fn is_fatal_io(&self) -> bool {
        matches!(self, Self::FileNotFound { .. } | Self::Io { .. })
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            Self::FileNotFound { suggestion, .. } => {
                format!("{}\n\nSuggestion: {}", self, suggestion)
            }
            Self::InvalidCompetence { suggestion, .. } => {
                format!("{}\n\nSuggestion: {}", self, suggestion)
            }
            Self::Configuration { suggestion: Some(sug), .. }
            | Self::MappingTable { suggestion: Some(sug), .. }
            | Self::Export { suggestion: Some(sug), .. }
            | Self::Custom { suggestion: Some(sug), .. } => {
                format!("{}\n\nSuggestion: {}", self, sug)
            }
            _ => self.to_string(),
        }
    }
}

// Convenience conversions
impl From<std::io::Error> for BpaError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: err,
            context: ErrorContext::default(),
        }
    }
}

impl From<csv::Error> for BpaError {
    fn from(err: csv::Error) -> Self {
        let (line, message) = match err.position() {
            Some(pos) => (Some(pos.line() as usize), err.to_string()),
            None => (None, err.to_string()),
        };

        Self::CsvParse {
            message,
            line,
            column: None,
            context: ErrorContext::default(),
        }
    }
}

impl From<serde_json::Error> for BpaError {
    fn from(err: serde_json::Error) -> Self {
        BpaError::Export {
            message: err.to_string(),
            format: ExportFormat::Json,
            suggestion: Some("Check if the data is serializable to JSON.".to_string()),
        }
    }
}

impl From<toml::de::Error> for BpaError {
    fn from(err: toml::de::Error) -> Self {
        BpaError::Configuration {
            message: format!("Failed to parse TOML: {}", err),
            suggestion: Some("Check that the file is valid TOML format".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_file_suggestion() {
        let err = BpaError::file_not_found_with_suggestion(PathBuf::from("out/PAAPAE.MAR"));
        let message = err.user_message();
        assert!(message.contains("competence month"));
        assert!(err.is_fatal_io());
    }

    #[test]
    fn test_invalid_competence_message() {
        let err = BpaError::invalid_competence("2024", "expected 6 digits");
        assert!(err.to_string().contains("2024"));
        assert!(err.user_message().contains("AAAAMM"));
        assert!(!err.is_fatal_io());
    }
}
