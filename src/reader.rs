/*!
 * CSV reader for raw encounter rows
 *
 * Reads a headed CSV export of encounter rows into [`RawEncounterRow`]
 * values. Columns are matched by name; unknown columns are ignored and
 * missing ones leave the attribute absent.
 */

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Instant;

use csv::{ReaderBuilder, Trim};
use encoding_rs::WINDOWS_1252;
use tracing::{info, warn};

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};

use crate::{BpaError, ErrorContext, Result};
use crate::data_types::RawEncounterRow;

/// Column names understood by the reader
pub const ENCOUNTER_COLUMNS: &[&str] = &[
    "row_id",
    "encounter_id",
    "patient_id",
    "patient_cns",
    "patient_name",
    "provider_cns",
    "provider_function",
    "procedure_code",
    "ledger_cid",
    "procedure_cid",
    "encounter_diagnosis",
    "quantity",
    "authorized_quantity",
    "requested_quantity",
    "service_date",
    "birth_date",
    "sex",
    "race_code",
    "ethnicity_code",
    "municipality_code",
    "care_type",
    "authorization_number",
    "postal_code",
    "address_type",
    "street",
    "complement",
    "address_number",
    "neighborhood",
    "phone",
    "email",
    "patient_tax_id",
    "homeless",
];

/// Reader for encounter row CSV files
pub struct EncounterReader {
    /// Whether to check the header row against [`ENCOUNTER_COLUMNS`]
    validate_headers: bool,
    /// Whether to skip invalid records (true) or fail on first error (false)
    skip_invalid_records: bool,
    delimiter: u8,
    /// Decode the file as Latin-1 instead of UTF-8
    latin1_input: bool,
    /// Whether to show progress bar
    #[cfg(feature = "progress")]
    show_progress_bar: bool,
}

impl Default for EncounterReader {
    fn default() -> Self {
        Self::new()
    }
}

impl EncounterReader {
    /// Create a new reader with default settings
    pub fn new() -> Self {
        Self {
            validate_headers: true,
            skip_invalid_records: false,
            delimiter: b',',
            latin1_input: false,
            #[cfg(feature = "progress")]
            show_progress_bar: false,
        }
    }

    /// Enable or disable header validation
    pub fn with_header_validation(mut self, validate: bool) -> Self {
        self.validate_headers = validate;
        self
    }

    /// Enable or disable skipping invalid records
    pub fn with_skip_invalid_records(mut self, skip: bool) -> Self {
        self.skip_invalid_records = skip;
        self
    }

    /// Set the field delimiter
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Read the file as Latin-1 text
    pub fn with_latin1_input(mut self, latin1: bool) -> Self {
        self.latin1_input = latin1;
        self
    }

    #[cfg(feature = "progress")]
    /// Enable or disable the progress bar
    pub fn with_progress_bar(mut self, show: bool) -> Self {
        self.show_progress_bar = show;
        self
    }

    /// Load all rows from a CSV file
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Vec<RawEncounterRow>> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(BpaError::file_not_found_with_suggestion(path.to_path_buf()));
        }

        let mut bytes = Vec::new();
        File::open(path)
            .and_then(|mut file| file.read_to_end(&mut bytes))
            .map_err(|e| BpaError::io_at(e, path))?;

        let text = if self.latin1_input {
            WINDOWS_1252.decode_without_bom_handling(&bytes).0.into_owned()
        } else {
            String::from_utf8(bytes).map_err(|e| BpaError::CsvParse {
                message: format!("file is not valid UTF-8 ({}); try Latin-1 input", e.utf8_error()),
                line: None,
                column: None,
                context: ErrorContext {
                    file_path: Some(path.to_path_buf()),
                    ..Default::default()
                },
            })?
        };

        let rows = self.parse(&text, Some(path))?;
        Ok(rows)
    }

    /// Parse rows from CSV text
    pub fn parse(&self, text: &str, source: Option<&Path>) -> Result<Vec<RawEncounterRow>> {
        let start_time = Instant::now();
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(self.delimiter)
            .trim(Trim::All)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers = reader.headers()?.clone();
        if self.validate_headers {
            let names: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
            validate_headers(&names)?;
        }

        #[cfg(feature = "progress")]
        let progress_bar = if self.show_progress_bar {
            let pb = ProgressBar::new(text.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            Some(pb)
        } else {
            None
        };

        let mut rows = Vec::new();
        let mut invalid_count = 0usize;

        let mut record = csv::StringRecord::new();
        // Header is line 1
        let mut line_number = 1usize;

        loop {
            line_number += 1;
            let result = match reader.read_record(&mut record) {
                Ok(false) => break,
                Ok(true) => record.deserialize::<RawEncounterRow>(Some(&headers)),
                Err(e) => Err(e),
            };

            match result {
                Ok(row) => rows.push(row),
                Err(e) => {
                    let error = BpaError::CsvParse {
                        message: format!("CSV error: {}", e),
                        line: Some(line_number),
                        column: None,
                        context: ErrorContext {
                            file_path: source.map(Path::to_path_buf),
                            line_number: Some(line_number),
                            ..Default::default()
                        },
                    };

                    invalid_count += 1;
                    if !self.skip_invalid_records {
                        return Err(error);
                    }
                    if invalid_count <= 10 {
                        warn!("Skipping invalid row: {}", error);
                    }
                }
            }

            #[cfg(feature = "progress")]
            if let Some(ref pb) = progress_bar {
                pb.set_position(reader.position().byte());
            }
        }

        #[cfg(feature = "progress")]
        if let Some(pb) = progress_bar {
            pb.finish_with_message("Loading complete");
        }

        info!(
            rows = rows.len(),
            skipped = invalid_count,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "loaded encounter rows"
        );
        Ok(rows)
    }
}

/// Check a header row: at least one known column must be present
///
/// Unknown columns are tolerated and logged.
pub fn validate_headers(headers: &[String]) -> Result<()> {
    let known: Vec<&String> = headers
        .iter()
        .filter(|h| ENCOUNTER_COLUMNS.contains(&h.as_str()))
        .collect();

    if known.is_empty() {
        return Err(BpaError::CsvParse {
            message: format!("none of the {} header columns is a known encounter column", headers.len()),
            line: Some(1),
            column: headers.first().cloned(),
            context: ErrorContext::default(),
        });
    }

    let unknown: Vec<&str> = headers
        .iter()
        .map(String::as_str)
        .filter(|h| !ENCOUNTER_COLUMNS.contains(h))
        .collect();
    if !unknown.is_empty() {
        warn!(columns = ?unknown, "ignoring unknown columns");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Write;

    const SAMPLE: &str = "row_id,provider_cns,procedure_code,quantity,service_date,birth_date,sex,extra\n\
                          L1,700000000000001,1,2,2024-03-05,15/06/1990,3,x\n\
                          L2,,,,,,,\n";

    #[test]
    fn test_parse_rows() {
        let rows = EncounterReader::new().parse(SAMPLE, None).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row_id.as_deref(), Some("L1"));
        assert_eq!(rows[0].quantity.as_deref(), Some("2"));
        assert_eq!(rows[0].service_date, NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(rows[0].birth_date, NaiveDate::from_ymd_opt(1990, 6, 15));
        assert_eq!(rows[1].service_date, None);
        assert_eq!(rows[1].patient_name, None);
    }

    #[test]
    fn test_semicolon_delimiter() {
        let text = "row_id;procedure_code\nL9;0301010013\n";
        let rows = EncounterReader::new().with_delimiter(b';').parse(text, None).unwrap();
        assert_eq!(rows[0].procedure_code.as_deref(), Some("0301010013"));
    }

    #[test]
    fn test_unknown_headers_rejected() {
        let result = EncounterReader::new().parse("a,b\n1,2\n", None);
        assert!(result.is_err());
        let rows = EncounterReader::new()
            .with_header_validation(false)
            .parse("a,b\n1,2\n", None)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], RawEncounterRow::default());
    }

    #[test]
    fn test_latin1_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"row_id,patient_name\nL1,JO\xC3O\n").unwrap();

        let rows = EncounterReader::new().with_latin1_input(true).load(file.path()).unwrap();
        assert_eq!(rows[0].patient_name.as_deref(), Some("JOÃO"));

        assert!(EncounterReader::new().load(file.path()).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = EncounterReader::new().load("/nonexistent/rows.csv").unwrap_err();
        assert!(err.is_fatal_io());
    }
}
