/*!
 * Batch header computation
 *
 * The header summarizes the finished record set: detail line count, page
 * count, and a checksum over procedure codes and quantities.
 */

use tracing::debug;

use crate::config::ExportConfig;
use crate::constants::{CHECKSUM_MODULUS, RECORDS_PER_PAGE};
use crate::data_types::{BatchHeader, CanonicalRecord, Competence};

/// Control checksum: `(Σ procedure + quantity) mod 1111 + 1111`
///
/// The procedure code contributes the integer value of its digits; a code
/// without digits contributes 0. The result always lies in 1111..=2221.
pub fn checksum(records: &[CanonicalRecord]) -> u32 {
    let total: u64 = records
        .iter()
        .map(|record| procedure_value(&record.procedure_code) + u64::from(record.quantity))
        .fold(0u64, |acc, value| (acc + value) % CHECKSUM_MODULUS);

    (total + CHECKSUM_MODULUS) as u32
}

fn procedure_value(code: &str) -> u64 {
    code.chars()
        .filter_map(|c| c.to_digit(10))
        .fold(0u64, |acc, digit| acc.saturating_mul(10).saturating_add(u64::from(digit)))
}

/// Pages needed for `line_count` detail lines, never fewer than one
pub fn page_count(line_count: usize) -> usize {
    let per_page = RECORDS_PER_PAGE as usize;
    line_count.div_ceil(per_page).max(1)
}

/// Build the batch header for a paginated record set
pub fn build_header(config: &ExportConfig, competence: Competence, records: &[CanonicalRecord]) -> BatchHeader {
    let header = BatchHeader {
        competence: competence.as_code(),
        line_count: records.len(),
        page_count: page_count(records.len()),
        checksum: checksum(records),
        responsible_name: config.responsible_name.clone(),
        responsible_acronym: config.responsible_acronym.clone(),
        responsible_tax_id: config.responsible_tax_id.clone(),
        destination_name: config.destination_name.clone(),
        destination_indicator: config.destination_indicator,
        version_tag: config.version_tag.clone(),
    };

    debug!(
        lines = header.line_count,
        pages = header.page_count,
        checksum = header.checksum,
        "built batch header"
    );
    header
}
