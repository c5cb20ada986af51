/*!
 * # BPA-I outpatient production exporter
 *
 * Builds the fixed-width BPA-I submission file from per-encounter rows and
 * validates files that claim to follow the layout.
 *
 * ## Features
 *
 * - **Lookup tables**: procedure, occupation and race mappings behind a
 *   [`lookup::MappingProvider`], with built-in defaults and TOML overrides
 * - **Record assembly**: one canonical record per source row, with field
 *   level defaults recorded instead of failing the batch
 * - **Deduplication policies**: pass-through, aggregation by full or narrow
 *   key, first-per-day and first-per-row
 * - **Pagination and checksum**: 99 records per page per professional, and
 *   the header control value
 * - **Encoding**: positionally exact Latin-1 lines with CRLF terminators
 * - **Conformance validation**: field-by-field re-parse with an HTML or JSON
 *   report
 *
 * ## Quick Start
 *
 * ```no_run
 * use bpa::prelude::*;
 *
 * # fn main() -> Result<()> {
 * let config = ConfigBuilder::new()
 *     .facility_code("2345678")
 *     .dedup_policy(DedupPolicy::AggregateFull)
 *     .build();
 * let tables = MappingTables::builtin();
 * let context = PipelineContext::new(&config, Competence::parse("202403")?, &tables)?;
 *
 * let rows = EncounterReader::new().load("encounters.csv")?;
 * let outcome = run_export(&context, &rows, "PAAPAE")?;
 *
 * let report = ConformanceValidator::new().validate_file(&outcome.output_path)?;
 * assert!(report.is_conformant());
 * # Ok(())
 * # }
 * ```
 *
 * ## Validating a file
 *
 * ```no_run
 * # use bpa::prelude::*;
 * # use std::path::Path;
 * # fn main() -> Result<()> {
 * let report = ConformanceValidator::new().validate_file(Path::new("PAAPAE.MAR"))?;
 * for issue in &report.issues {
 *     println!("{}", issue);
 * }
 * bpa::report::write_html(&report, Path::new("PAAPAE_validation.html"))?;
 * # Ok(())
 * # }
 * ```
 */

// Re-export error types from root
pub use error::{BpaError, Result, ErrorContext, ExportFormat};

// Public modules
pub mod error;
pub mod data_types;
pub mod schema;
pub mod lookup;
pub mod assembler;
pub mod dedup;
pub mod paginator;
pub mod header;
pub mod encoder;
pub mod validator;
pub mod report;
pub mod pipeline;
pub mod reader;
pub mod export;
pub mod config;
pub mod logging;

#[cfg(test)]
mod test_support;

/// Prelude module for convenient imports
///
/// ```
/// use bpa::prelude::*;
/// ```
pub mod prelude {
    pub use crate::data_types::*;
    pub use crate::schema::{FieldKind, FieldRule, FieldShape, FieldSpec, RecordLayout, DETAIL_LAYOUT, HEADER_LAYOUT};
    pub use crate::lookup::{LookupResolver, MappingProvider, MappingTables, ProcedureEntry};
    pub use crate::assembler::{DiagnosisPolicy, RecordAssembler};
    pub use crate::dedup::{deduplicate, DedupPolicy};
    pub use crate::paginator::paginate;
    pub use crate::header::{build_header, checksum, page_count};
    pub use crate::encoder::{encode_batch, render_batch, submission_path, FixedWidthRecord};
    pub use crate::validator::{ConformanceValidator, IssueKind, ValidationIssue, ValidationReport, ValidationStats};
    pub use crate::pipeline::{build_batch, load_mapping_tables, run_export, Batch, PipelineContext, PipelineOutcome};
    pub use crate::reader::EncounterReader;
    pub use crate::export::{CanonicalExporter, CsvExporter, JsonExporter};
    pub use crate::config::{ConfigBuilder, ExportConfig};
    pub use crate::error::{BpaError, Result};
    pub use crate::ExportFormat;
}

/// BPA-I format constants and assembly defaults
pub mod constants {
    /// Header line marker (positions 1-2)
    pub const HEADER_MARKER: &str = "01";
    /// Detail line marker (positions 1-2)
    pub const DETAIL_MARKER: &str = "03";
    /// Batch marker in the header (positions 3-7)
    pub const BATCH_MARKER: &str = "#BPA#";
    /// Origin marker in the detail line (positions 110-112)
    pub const ORIGIN_MARKER: &str = "BPA";

    pub const HEADER_LINE_WIDTH: usize = 130;
    pub const DETAIL_LINE_WIDTH: usize = 350;
    pub const LINE_TERMINATOR: &str = "\r\n";

    /// Detail records per page, per professional
    pub const RECORDS_PER_PAGE: u32 = 99;

    pub const CHECKSUM_MODULUS: u64 = 1111;

    /// Submission file extensions by competence month
    pub const MONTH_EXTENSIONS: [&str; 12] = [
        "JAN", "FEV", "MAR", "ABR", "MAI", "JUN", "JUL", "AGO", "SET", "OUT", "NOV", "DEZ",
    ];

    /// Competence years accepted beyond the current one
    pub const COMPETENCE_YEARS_AHEAD: i32 = 5;

    // Procedure fallback when a code is missing or unmapped
    pub const DEFAULT_PROCEDURE_CODE: &str = "0301010013";
    pub const DEFAULT_SERVICE_CODE: &str = "135";
    pub const DEFAULT_CLASSIFICATION: &str = "000";
    pub const DEFAULT_PROCEDURE_REQUIRES_DIAGNOSIS: bool = true;

    pub const DEFAULT_OCCUPATION_CODE: &str = "000000";

    pub const UNKNOWN_RACE_CODE: &str = "99";
    pub const INDIGENOUS_RACE_CODE: &str = "05";
    pub const NO_ETHNICITY_CODE: &str = "0000";

    pub const DEFAULT_PATIENT_NAME: &str = "PACIENTE";
    /// Homelessness flag when the source does not say
    pub const DEFAULT_HOMELESS_FLAG: &str = "N";

    /// Diagnosis when the procedure requires one and no source provides it
    pub const DIAGNOSIS_FALLBACK_REQUIRED: &str = "Z000";
    /// Diagnosis when the procedure does not require one
    pub const DIAGNOSIS_FALLBACK_OPTIONAL: &str = "0000";

    pub const MAX_AGE: u32 = 130;

    /// Largest quantity the 6-digit quantity field holds
    pub const MAX_QUANTITY: u32 = 999_999;

    /// Value of numeric fields that default to all zeros; the encoder pads it
    pub const ZERO_FILL: &str = "0";

    /// IBGE code of the clinic's municipality
    pub const DEFAULT_MUNICIPALITY: &str = "170550";
    pub const DEFAULT_NATIONALITY: &str = "010";
    pub const DEFAULT_CARE_TYPE: &str = "01";
}
