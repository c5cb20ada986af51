/*!
 * Ordering and page/sequence numbering of detail lines
 *
 * Records are sorted by provider, service date, patient name and procedure
 * code. Numbering restarts on every provider change; within a provider a page
 * holds at most 99 lines.
 */

use tracing::debug;

use crate::constants::RECORDS_PER_PAGE;
use crate::data_types::CanonicalRecord;

/// Stable sort into submission order
pub fn sort_records(records: &mut [CanonicalRecord]) {
    records.sort_by(|a, b| {
        a.provider_cns
            .cmp(&b.provider_cns)
            .then_with(|| a.service_date.cmp(&b.service_date))
            .then_with(|| a.patient_name.cmp(&b.patient_name))
            .then_with(|| a.procedure_code.cmp(&b.procedure_code))
    });
}

/// Assign `page` and `sequence` in the current order
///
/// Expects records already grouped by provider (see [`sort_records`]).
pub fn assign_pages(records: &mut [CanonicalRecord]) {
    let mut current_provider: Option<String> = None;
    let mut page: u32 = 1;
    let mut sequence: u32 = 0;
    let mut providers = 0usize;

    for record in records.iter_mut() {
        if current_provider.as_deref() != Some(record.provider_cns.as_str()) {
            current_provider = Some(record.provider_cns.clone());
            page = 1;
            sequence = 1;
            providers += 1;
        } else {
            sequence += 1;
            if sequence > RECORDS_PER_PAGE {
                page += 1;
                sequence = 1;
            }
        }
        record.page = page;
        record.sequence = sequence;
    }

    debug!(records = records.len(), providers, "assigned page numbers");
}

/// Sort then number, the full paginator step
pub fn paginate(records: &mut [CanonicalRecord]) {
    sort_records(records);
    assign_pages(records);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::record;

    #[test]
    fn test_sort_order() {
        let mut records = vec![
            record("B", "20240301", "ANA", "10"),
            record("A", "20240302", "ANA", "10"),
            record("A", "20240301", "BIA", "10"),
            record("A", "20240301", "ANA", "20"),
            record("A", "20240301", "ANA", "10"),
        ];
        sort_records(&mut records);
        let keys: Vec<String> = records
            .iter()
            .map(|r| format!("{}{}{}{}", r.provider_cns, r.service_date, r.patient_name, r.procedure_code))
            .collect();
        assert_eq!(
            keys,
            vec![
                "A20240301ANA10",
                "A20240301ANA20",
                "A20240301BIA10",
                "A20240302ANA10",
                "B20240301ANA10",
            ]
        );
    }

    #[test]
    fn test_sequence_rolls_over_after_99() {
        let mut records: Vec<CanonicalRecord> =
            (0..100).map(|i| record("A", "20240301", &format!("P{:03}", i), "10")).collect();
        paginate(&mut records);

        assert_eq!((records[0].page, records[0].sequence), (1, 1));
        assert_eq!((records[98].page, records[98].sequence), (1, 99));
        assert_eq!((records[99].page, records[99].sequence), (2, 1));
    }

    #[test]
    fn test_provider_change_resets_numbering() {
        let mut records = vec![
            record("A", "20240301", "ANA", "10"),
            record("A", "20240301", "BIA", "10"),
            record("B", "20240301", "CAIO", "10"),
        ];
        paginate(&mut records);
        let numbering: Vec<(u32, u32)> = records.iter().map(|r| (r.page, r.sequence)).collect();
        assert_eq!(numbering, vec![(1, 1), (1, 2), (1, 1)]);
    }

    #[test]
    fn test_empty_input() {
        let mut records: Vec<CanonicalRecord> = Vec::new();
        paginate(&mut records);
        assert!(records.is_empty());
    }
}
