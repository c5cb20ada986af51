/*!
 * End-to-end export pipeline
 *
 * Runs the stages in their fixed order: assemble, deduplicate, sort and
 * paginate, derive the header, encode. Each stage needs the complete output
 * of the previous one, so nothing is written until the whole batch is built.
 *
 * ```no_run
 * # use bpa::prelude::*;
 * # fn main() -> Result<()> {
 * let config = ExportConfig::load();
 * let tables = load_mapping_tables(&config)?;
 * let context = PipelineContext::new(&config, Competence::parse("202403")?, &tables)?;
 *
 * let rows = EncounterReader::new().load("encounters.csv")?;
 * let outcome = run_export(&context, &rows, "out/PAAPAE")?;
 * println!("wrote {}", outcome.output_path.display());
 * # Ok(())
 * # }
 * ```
 */

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info};

use crate::{BpaError, Result};
use crate::assembler::RecordAssembler;
use crate::config::ExportConfig;
use crate::data_types::{BatchHeader, CanonicalRecord, Competence, FieldDefault, MissingMapping, RawEncounterRow};
use crate::dedup::deduplicate;
use crate::encoder::{encode_batch, submission_path, write_atomic};
use crate::header::build_header;
use crate::lookup::{LookupResolver, MappingProvider, MappingTables};
use crate::paginator::paginate;

/// Everything the stages read, passed explicitly to each of them
pub struct PipelineContext<'a> {
    pub config: &'a ExportConfig,
    pub competence: Competence,
    provider: &'a dyn MappingProvider,
}

impl<'a> PipelineContext<'a> {
    /// Create a context; fails when the configuration is unusable
    pub fn new(config: &'a ExportConfig, competence: Competence, provider: &'a dyn MappingProvider) -> Result<Self> {
        config.validate()?;
        debug!(
            competence = %competence,
            mapping_version = provider.version(),
            dedup = %config.dedup_policy,
            "pipeline context ready"
        );
        Ok(Self {
            config,
            competence,
            provider,
        })
    }

    pub fn resolver(&self) -> LookupResolver<'a> {
        LookupResolver::new(self.provider)
    }
}

/// A fully built batch, ready to encode
#[derive(Debug, Clone)]
pub struct Batch {
    pub header: BatchHeader,
    pub records: Vec<CanonicalRecord>,
    pub missing_mappings: Vec<MissingMapping>,
    pub field_defaults: Vec<FieldDefault>,
}

impl Batch {
    /// Encoded submission file contents
    pub fn encode(&self) -> Vec<u8> {
        encode_batch(&self.header, &self.records)
    }
}

/// Result of a completed export
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub batch: Batch,
    /// Path of the submission file
    pub output_path: PathBuf,
    /// Path of the missing-mappings log, when one was written
    pub missing_log_path: Option<PathBuf>,
}

/// Build the batch in memory
///
/// Every input row yields one assembled record; deduplication may then merge
/// or drop records according to the configured policy.
pub fn build_batch(context: &PipelineContext<'_>, rows: &[RawEncounterRow]) -> Batch {
    let start_time = Instant::now();

    let assembler = RecordAssembler::new(context.config, context.competence, context.resolver());
    let assembled = assembler.assemble_all(rows);

    let mut records = deduplicate(assembled.records, context.config.dedup_policy);
    paginate(&mut records);
    let header = build_header(context.config, context.competence, &records);

    info!(
        rows = rows.len(),
        records = header.line_count,
        pages = header.page_count,
        checksum = header.checksum,
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "built batch"
    );

    Batch {
        header,
        records,
        missing_mappings: assembled.missing_mappings,
        field_defaults: assembled.field_defaults,
    }
}

/// Build, encode and write a batch
///
/// The submission file is written next to `output_base` with the competence
/// month as its extension. The missing-mappings log is written when the
/// configuration names a path and at least one code was unmapped.
pub fn run_export<P: AsRef<Path>>(
    context: &PipelineContext<'_>,
    rows: &[RawEncounterRow],
    output_base: P,
) -> Result<PipelineOutcome> {
    let batch = build_batch(context, rows);

    let output_path = submission_path(output_base.as_ref(), context.competence);
    write_atomic(&output_path, &batch.encode())?;

    let missing_log_path = match &context.config.missing_mappings_log {
        Some(path) if !batch.missing_mappings.is_empty() => {
            write_missing_mappings_log(path, &batch.missing_mappings)?;
            Some(path.clone())
        }
        _ => None,
    };

    info!(
        path = %output_path.display(),
        missing_mappings = batch.missing_mappings.len(),
        "export complete"
    );

    Ok(PipelineOutcome {
        batch,
        output_path,
        missing_log_path,
    })
}

/// Mapping tables for a configuration: built-in tables overlaid with the
/// configured mapping file, if any
pub fn load_mapping_tables(config: &ExportConfig) -> Result<MappingTables> {
    let tables = MappingTables::builtin();
    match &config.mapping_table {
        Some(path) => Ok(tables.overlay(MappingTables::from_file(path)?)),
        None => Ok(tables),
    }
}

/// Write unmapped procedure codes as tab-separated `code<TAB>row` lines
pub fn write_missing_mappings_log(path: &Path, misses: &[MissingMapping]) -> Result<()> {
    let file = File::create(path).map_err(|e| BpaError::io_at(e, path))?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "procedure_code\tsource_row")?;
    for miss in misses {
        writeln!(writer, "{}", miss)?;
    }
    writer.flush()?;

    info!(path = %path.display(), count = misses.len(), "wrote missing mappings log");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use crate::dedup::DedupPolicy;

    fn row(id: &str, provider: &str, procedure: &str, date: &str) -> RawEncounterRow {
        RawEncounterRow {
            row_id: Some(id.to_string()),
            provider_cns: Some(provider.to_string()),
            procedure_code: Some(procedure.to_string()),
            service_date: crate::data_types::parse_source_date(date),
            patient_cns: Some("898000000000002".to_string()),
            patient_id: Some("P1".to_string()),
            ..Default::default()
        }
    }

    fn config() -> ExportConfig {
        ConfigBuilder::new().facility_code("1234567").build()
    }

    #[test]
    fn test_build_batch_counts_and_pages() {
        let config = config();
        let tables = MappingTables::builtin();
        let context = PipelineContext::new(&config, Competence::parse("202403").unwrap(), &tables).unwrap();

        let rows: Vec<_> = (0..3)
            .map(|i| row(&format!("L{}", i), "700000000000001", "UNMAPPED", "2024-03-05"))
            .collect();
        let batch = build_batch(&context, &rows);

        assert_eq!(batch.header.line_count, 3);
        assert_eq!(batch.header.page_count, 1);
        assert_eq!(batch.missing_mappings.len(), 3);
        assert_eq!(
            batch.records.iter().map(|r| r.sequence).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_aggregation_applies_before_paging() {
        let config = ConfigBuilder::from_config(config())
            .dedup_policy(DedupPolicy::AggregateFull)
            .build();
        let tables = MappingTables::builtin();
        let context = PipelineContext::new(&config, Competence::parse("202403").unwrap(), &tables).unwrap();

        let rows = vec![
            row("L1", "700000000000001", "X", "2024-03-05"),
            row("L2", "700000000000001", "X", "2024-03-05"),
        ];
        let batch = build_batch(&context, &rows);
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].quantity, 2);
        assert_eq!(batch.header.line_count, 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ConfigBuilder::new().facility_code("12345AB").build();
        let tables = MappingTables::builtin();
        assert!(PipelineContext::new(&config, Competence::parse("202403").unwrap(), &tables).is_err());
    }

    #[test]
    fn test_run_export_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("missing.txt");
        let config = ConfigBuilder::from_config(config())
            .missing_mappings_log(&log_path)
            .build();
        let tables = MappingTables::builtin();
        let context = PipelineContext::new(&config, Competence::parse("202403").unwrap(), &tables).unwrap();

        let rows = vec![row("L1", "700000000000001", "NOPE", "2024-03-05")];
        let outcome = run_export(&context, &rows, dir.path().join("PAAPAE")).unwrap();

        assert_eq!(outcome.output_path, dir.path().join("PAAPAE.MAR"));
        assert!(outcome.output_path.exists());
        assert_eq!(outcome.missing_log_path.as_deref(), Some(log_path.as_path()));

        let log = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(log, "procedure_code\tsource_row\nNOPE\tL1\n");
    }

    #[test]
    fn test_missing_mapping_table_is_fatal() {
        let config = ConfigBuilder::new().mapping_table("/nonexistent/mappings.toml").build();
        assert!(load_mapping_tables(&config).unwrap_err().is_fatal_io());
    }
}
