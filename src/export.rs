/*!
 * Convenience exporters for the canonical record list
 *
 * These write the already-built records as JSON or CSV for inspection and
 * spreadsheet use. The submission file itself is produced by
 * [`crate::encoder`].
 */

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::info;

use crate::{BpaError, ExportFormat, Result};
use crate::data_types::CanonicalRecord;

/// Trait for exporters of canonical records
pub trait CanonicalExporter {
    /// Export the records to `path`
    fn export(&self, records: &[CanonicalRecord], path: &Path) -> Result<()>;

    /// Get the export format
    fn format(&self) -> ExportFormat;
}

/// JSON exporter
pub struct JsonExporter {
    /// Whether to pretty-print the JSON
    pub pretty_print: bool,
    /// Whether to export as JSON Lines (one record per line)
    pub json_lines: bool,
}

impl Default for JsonExporter {
    fn default() -> Self {
        Self {
            pretty_print: true,
            json_lines: false,
        }
    }
}

impl JsonExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set pretty printing
    pub fn with_pretty_print(mut self, pretty: bool) -> Self {
        self.pretty_print = pretty;
        self
    }

    /// Set JSON Lines format
    pub fn as_json_lines(mut self) -> Self {
        self.json_lines = true;
        self.pretty_print = false;
        self
    }
}

impl CanonicalExporter for JsonExporter {
    fn export(&self, records: &[CanonicalRecord], path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| BpaError::io_at(e, path))?;
        let mut writer = BufWriter::new(file);

        if self.json_lines {
            for record in records {
                let json = serde_json::to_string(record)?;
                writeln!(writer, "{}", json)?;
            }
        } else if self.pretty_print {
            serde_json::to_writer_pretty(&mut writer, records)?;
        } else {
            serde_json::to_writer(&mut writer, records)?;
        }
        writer.flush()?;

        info!(path = %path.display(), records = records.len(), "exported JSON");
        Ok(())
    }

    fn format(&self) -> ExportFormat {
        ExportFormat::Json
    }
}

/// CSV exporter, one row per record with the record's field names as headers
pub struct CsvExporter {
    /// Field delimiter
    pub delimiter: u8,
}

impl Default for CsvExporter {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

impl CsvExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the field delimiter
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

impl CanonicalExporter for CsvExporter {
    fn export(&self, records: &[CanonicalRecord], path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| BpaError::io_at(e, path))?;
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_writer(BufWriter::new(file));

        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;

        info!(path = %path.display(), records = records.len(), "exported CSV");
        Ok(())
    }

    fn format(&self) -> ExportFormat {
        ExportFormat::Csv
    }
}

/// Pick an exporter by format
pub fn exporter_for(format: ExportFormat) -> Result<Box<dyn CanonicalExporter>> {
    match format {
        ExportFormat::Json => Ok(Box::new(JsonExporter::new())),
        ExportFormat::Csv => Ok(Box::new(CsvExporter::new())),
        other => Err(BpaError::Export {
            message: format!("{} is not a canonical record export format", other),
            format: other,
            suggestion: Some("Use JSON or CSV".to_string()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_record;

    #[test]
    fn test_json_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        JsonExporter::new().export(&[sample_record()], &path).unwrap();

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value[0]["procedure_code"], "0302050027");
        assert_eq!(value[0]["sex"], "F");
        assert!(value[0].get("source_row_id").is_none());
    }

    #[test]
    fn test_json_lines_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jsonl");
        JsonExporter::new()
            .as_json_lines()
            .export(&[sample_record(), sample_record()], &path)
            .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);
    }

    #[test]
    fn test_csv_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.csv");
        CsvExporter::new().with_delimiter(b';').export(&[sample_record()], &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("facility_code;competence;provider_cns"));
        assert!(lines.next().unwrap().starts_with("1234567;202403;700000000000001"));
    }

    #[test]
    fn test_exporter_for_rejects_bpa() {
        assert!(exporter_for(ExportFormat::Bpa).is_err());
        assert_eq!(exporter_for(ExportFormat::Csv).unwrap().format(), ExportFormat::Csv);
    }
}
