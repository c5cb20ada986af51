/*!
 * Configuration for BPA-I export
 *
 * An `ExportConfig` is an immutable value handed to the pipeline by
 * reference; nothing in the library reads configuration from global state.
 */

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{BpaError, Result};
use crate::assembler::DiagnosisPolicy;
use crate::constants::{DEFAULT_CARE_TYPE, DEFAULT_MUNICIPALITY, DEFAULT_NATIONALITY};
use crate::data_types::DestinationIndicator;
use crate::dedup::DedupPolicy;

/// Settings for one export run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Facility registry code (CNES), 7 digits
    #[serde(default = "default_facility_code")]
    pub facility_code: String,

    /// Name of the entity responsible for the batch
    #[serde(default = "default_responsible_name")]
    pub responsible_name: String,

    #[serde(default = "default_responsible_acronym")]
    pub responsible_acronym: String,

    /// Tax id (CNPJ/CPF) of the responsible entity, up to 14 digits
    #[serde(default = "default_responsible_tax_id")]
    pub responsible_tax_id: String,

    #[serde(default = "default_destination_name")]
    pub destination_name: String,

    #[serde(default)]
    pub destination_indicator: DestinationIndicator,

    /// Version tag written to the header
    #[serde(default = "default_version_tag")]
    pub version_tag: String,

    /// IBGE municipality code used when a row carries none
    #[serde(default = "default_municipality")]
    pub default_municipality: String,

    #[serde(default = "default_nationality")]
    pub nationality: String,

    /// Care type used when a row carries none
    #[serde(default = "default_care_type")]
    pub default_care_type: String,

    #[serde(default)]
    pub dedup_policy: DedupPolicy,

    /// Where to write the missing procedure mappings log, when any code misses
    #[serde(default)]
    pub missing_mappings_log: Option<PathBuf>,

    /// External TOML mapping table overlaid on the built-in tables
    #[serde(default)]
    pub mapping_table: Option<PathBuf>,

    /// Whether to show progress bars during long operations
    #[serde(default = "default_enable_progress_bar")]
    pub enable_progress_bar: bool,

    /// Diagnosis fallback codes
    #[serde(default)]
    pub diagnosis: DiagnosisPolicy,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            facility_code: default_facility_code(),
            responsible_name: default_responsible_name(),
            responsible_acronym: default_responsible_acronym(),
            responsible_tax_id: default_responsible_tax_id(),
            destination_name: default_destination_name(),
            destination_indicator: DestinationIndicator::Municipal,
            version_tag: default_version_tag(),
            default_municipality: default_municipality(),
            nationality: default_nationality(),
            default_care_type: default_care_type(),
            dedup_policy: DedupPolicy::None,
            missing_mappings_log: None,
            mapping_table: None,
            enable_progress_bar: default_enable_progress_bar(),
            diagnosis: DiagnosisPolicy::default(),
        }
    }
}

// Default value functions for serde
fn default_facility_code() -> String {
    "0000000".to_string()
}

fn default_responsible_name() -> String {
    "NOME DA CLINICA".to_string()
}

fn default_responsible_acronym() -> String {
    "SIGLA".to_string()
}

fn default_responsible_tax_id() -> String {
    "00000000000000".to_string()
}

fn default_destination_name() -> String {
    "SECRETARIA MUNICIPAL DE SAUDE".to_string()
}

fn default_version_tag() -> String {
    "v1.0.0".to_string()
}

fn default_municipality() -> String {
    DEFAULT_MUNICIPALITY.to_string()
}

fn default_nationality() -> String {
    DEFAULT_NATIONALITY.to_string()
}

fn default_care_type() -> String {
    DEFAULT_CARE_TYPE.to_string()
}

fn default_enable_progress_bar() -> bool {
    true
}

fn env_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}

impl ExportConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    ///
    /// Supported environment variables:
    /// - `BPA_FACILITY_CODE`: CNES code
    /// - `BPA_RESPONSIBLE_NAME`, `BPA_RESPONSIBLE_ACRONYM`, `BPA_RESPONSIBLE_TAX_ID`
    /// - `BPA_DESTINATION_NAME`, `BPA_DESTINATION_INDICATOR` (`M` or `E`)
    /// - `BPA_VERSION_TAG`
    /// - `BPA_DEFAULT_MUNICIPALITY`, `BPA_NATIONALITY`, `BPA_DEFAULT_CARE_TYPE`
    /// - `BPA_DEDUP_POLICY`: e.g. `AGGREGATE_FULL`
    /// - `BPA_MISSING_MAPPINGS_LOG`, `BPA_MAPPING_TABLE`: file paths
    /// - `BPA_PROGRESS_BAR`: "true" or "false"
    ///
    /// Unreadable values are ignored and leave the default in place.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        if let Some(val) = var("BPA_FACILITY_CODE") {
            config.facility_code = val;
        }
        if let Some(val) = var("BPA_RESPONSIBLE_NAME") {
            config.responsible_name = val;
        }
        if let Some(val) = var("BPA_RESPONSIBLE_ACRONYM") {
            config.responsible_acronym = val;
        }
        if let Some(val) = var("BPA_RESPONSIBLE_TAX_ID") {
            config.responsible_tax_id = val;
        }
        if let Some(val) = var("BPA_DESTINATION_NAME") {
            config.destination_name = val;
        }
        if let Some(indicator) = var("BPA_DESTINATION_INDICATOR").and_then(|v| DestinationIndicator::from_code(&v).ok()) {
            config.destination_indicator = indicator;
        }
        if let Some(val) = var("BPA_VERSION_TAG") {
            config.version_tag = val;
        }
        if let Some(val) = var("BPA_DEFAULT_MUNICIPALITY") {
            config.default_municipality = val;
        }
        if let Some(val) = var("BPA_NATIONALITY") {
            config.nationality = val;
        }
        if let Some(val) = var("BPA_DEFAULT_CARE_TYPE") {
            config.default_care_type = val;
        }
        if let Some(policy) = var("BPA_DEDUP_POLICY").and_then(|v| v.parse().ok()) {
            config.dedup_policy = policy;
        }
        if let Some(val) = var("BPA_MISSING_MAPPINGS_LOG") {
            config.missing_mappings_log = Some(PathBuf::from(val));
        }
        if let Some(val) = var("BPA_MAPPING_TABLE") {
            config.mapping_table = Some(PathBuf::from(val));
        }
        if let Some(val) = var("BPA_PROGRESS_BAR") {
            config.enable_progress_bar = env_flag(&val);
        }

        config
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(BpaError::file_not_found_with_suggestion(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path).map_err(|e| BpaError::io_at(e, path))?;
        let config: Self = toml::from_str(&contents).map_err(|e| BpaError::Configuration {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
            suggestion: Some("Check that the file is valid TOML format".to_string()),
        })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self).map_err(|e| BpaError::Configuration {
            message: format!("Failed to serialize config: {}", e),
            suggestion: None,
        })?;
        std::fs::write(path.as_ref(), contents).map_err(|e| BpaError::io_at(e, path.as_ref()))?;
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/bpa/config.toml` on Unix-like systems
    /// or `%APPDATA%\bpa\config.toml` on Windows
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "bpa").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load configuration from the default location, environment, or defaults
    ///
    /// Priority order:
    /// 1. Default config file (if exists)
    /// 2. Environment variables
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Some(config_path) = Self::default_config_path() {
            if config_path.exists() {
                if let Ok(config) = Self::from_file(&config_path) {
                    return config;
                }
            }
        }

        Self::from_env()
    }

    /// Check values that would otherwise produce a non-conformant header or detail line
    pub fn validate(&self) -> Result<()> {
        let digits = |value: &str, max: usize| {
            !value.is_empty() && value.len() <= max && value.chars().all(|c| c.is_ascii_digit())
        };

        let checks: [(&str, &str, usize); 5] = [
            ("facility_code", self.facility_code.as_str(), 7),
            ("responsible_tax_id", self.responsible_tax_id.as_str(), 14),
            ("default_municipality", self.default_municipality.as_str(), 6),
            ("nationality", self.nationality.as_str(), 3),
            ("default_care_type", self.default_care_type.as_str(), 2),
        ];
        for (name, value, max) in checks {
            if !digits(value, max) {
                return Err(BpaError::Configuration {
                    message: format!("{} must be 1 to {} digits, got '{}'", name, max, value),
                    suggestion: Some(format!("Set {} in the config file or BPA_{}", name, name.to_uppercase())),
                });
            }
        }

        if self.responsible_name.trim().is_empty() || self.destination_name.trim().is_empty() {
            return Err(BpaError::Configuration {
                message: "responsible_name and destination_name must not be empty".to_string(),
                suggestion: None,
            });
        }
        Ok(())
    }
}

/// Builder for customizing configuration
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: ExportConfig,
}

impl ConfigBuilder {
    /// Start building from the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Start building from an existing configuration
    pub fn from_config(config: ExportConfig) -> Self {
        Self { config }
    }

    pub fn facility_code(mut self, code: impl Into<String>) -> Self {
        self.config.facility_code = code.into();
        self
    }

    /// Set the responsible entity identity
    pub fn responsible(mut self, name: impl Into<String>, acronym: impl Into<String>, tax_id: impl Into<String>) -> Self {
        self.config.responsible_name = name.into();
        self.config.responsible_acronym = acronym.into();
        self.config.responsible_tax_id = tax_id.into();
        self
    }

    /// Set the destination entity and its indicator
    pub fn destination(mut self, name: impl Into<String>, indicator: DestinationIndicator) -> Self {
        self.config.destination_name = name.into();
        self.config.destination_indicator = indicator;
        self
    }

    pub fn version_tag(mut self, tag: impl Into<String>) -> Self {
        self.config.version_tag = tag.into();
        self
    }

    pub fn default_municipality(mut self, code: impl Into<String>) -> Self {
        self.config.default_municipality = code.into();
        self
    }

    pub fn dedup_policy(mut self, policy: DedupPolicy) -> Self {
        self.config.dedup_policy = policy;
        self
    }

    pub fn diagnosis_policy(mut self, policy: DiagnosisPolicy) -> Self {
        self.config.diagnosis = policy;
        self
    }

    /// Set the missing procedure mappings log path
    pub fn missing_mappings_log<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.missing_mappings_log = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the external mapping table path
    pub fn mapping_table<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.mapping_table = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set progress bar enabled
    pub fn progress_bar(mut self, enabled: bool) -> Self {
        self.config.enable_progress_bar = enabled;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ExportConfig {
        self.config
    }
}
