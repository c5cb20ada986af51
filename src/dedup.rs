/*!
 * Deduplication of assembled records
 *
 * Every policy is stable: a kept record stays at the position of its
 * group's first occurrence and grouping never reorders the list.
 */

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::BpaError;
use crate::assembler::clamp_quantity;
use crate::data_types::CanonicalRecord;

/// Deduplication policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DedupPolicy {
    /// Pass-through
    #[default]
    None,
    /// Group by facility, competence, provider, occupation, date, procedure,
    /// patient health card and diagnosis; sum quantities
    AggregateFull,
    /// Group by patient, procedure and date; sum quantities
    AggregateNarrow,
    /// Group by facility, competence, occupation, date and patient health
    /// card; keep the first record
    FirstPerPatientProviderDay,
    /// Group by source row; keep the first record
    FirstPerSourceRow,
}

impl DedupPolicy {
    pub const ALL: [DedupPolicy; 5] = [
        DedupPolicy::None,
        DedupPolicy::AggregateFull,
        DedupPolicy::AggregateNarrow,
        DedupPolicy::FirstPerPatientProviderDay,
        DedupPolicy::FirstPerSourceRow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DedupPolicy::None => "NONE",
            DedupPolicy::AggregateFull => "AGGREGATE_FULL",
            DedupPolicy::AggregateNarrow => "AGGREGATE_NARROW",
            DedupPolicy::FirstPerPatientProviderDay => "FIRST_PER_PATIENT_PROVIDER_DAY",
            DedupPolicy::FirstPerSourceRow => "FIRST_PER_SOURCE_ROW",
        }
    }

    fn sums_quantity(&self) -> bool {
        matches!(self, DedupPolicy::AggregateFull | DedupPolicy::AggregateNarrow)
    }

    /// Grouping key of a record, or `None` when the record never merges
    fn group_key(&self, record: &CanonicalRecord) -> Option<String> {
        let parts: Vec<&str> = match self {
            DedupPolicy::None => return None,
            DedupPolicy::AggregateFull => vec![
                &record.facility_code,
                &record.competence,
                &record.provider_cns,
                &record.occupation_code,
                &record.service_date,
                &record.procedure_code,
                &record.patient_cns,
                &record.diagnosis_code,
            ],
            DedupPolicy::AggregateNarrow => {
                // Without any patient identity there is nothing to group on
                let patient = record.patient_id.as_deref().unwrap_or(&record.patient_cns);
                if patient.trim().is_empty() {
                    return None;
                }
                vec![patient, &record.procedure_code, &record.service_date]
            }
            DedupPolicy::FirstPerPatientProviderDay => vec![
                &record.facility_code,
                &record.competence,
                &record.occupation_code,
                &record.service_date,
                &record.patient_cns,
            ],
            DedupPolicy::FirstPerSourceRow => vec![&record.source_row_id],
        };
        Some(parts.join("|"))
    }
}

impl fmt::Display for DedupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DedupPolicy {
    type Err = BpaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|policy| policy.as_str() == normalized)
            .ok_or_else(|| BpaError::Configuration {
                message: format!("Unknown deduplication policy '{}'", s),
                suggestion: Some(format!(
                    "Use one of: {}",
                    Self::ALL.map(|p| p.as_str()).join(", ")
                )),
            })
    }
}

/// Collapse records under a policy
pub fn deduplicate(records: Vec<CanonicalRecord>, policy: DedupPolicy) -> Vec<CanonicalRecord> {
    if policy == DedupPolicy::None {
        return records;
    }

    let input_len = records.len();
    let mut kept: Vec<CanonicalRecord> = Vec::with_capacity(input_len);
    let mut groups: HashMap<String, usize> = HashMap::new();

    for record in records {
        let Some(key) = policy.group_key(&record) else {
            kept.push(record);
            continue;
        };

        match groups.get(&key) {
            Some(&position) => {
                if policy.sums_quantity() {
                    let first = &mut kept[position];
                    first.quantity = clamp_quantity(first.quantity.saturating_add(record.quantity));
                }
            }
            None => {
                groups.insert(key, kept.len());
                kept.push(record);
            }
        }
    }

    info!(
        policy = %policy,
        before = input_len,
        after = kept.len(),
        "deduplicated records"
    );
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_record;

    fn record(provider: &str, date: &str, procedure: &str, patient: &str, quantity: u32) -> CanonicalRecord {
        CanonicalRecord {
            provider_cns: provider.to_string(),
            service_date: date.to_string(),
            procedure_code: procedure.to_string(),
            patient_cns: patient.to_string(),
            quantity,
            source_row_id: format!("{}-{}-{}", provider, date, patient),
            patient_id: None,
            ..sample_record()
        }
    }

    #[test]
    fn test_none_is_pass_through() {
        let records = vec![record("1", "20240301", "10", "9", 1), record("1", "20240301", "10", "9", 1)];
        assert_eq!(deduplicate(records.clone(), DedupPolicy::None), records);
    }

    #[test]
    fn test_aggregate_full_sums_and_keeps_first_position() {
        let records = vec![
            record("1", "20240301", "10", "A", 1),
            record("2", "20240301", "10", "B", 5),
            record("1", "20240301", "10", "A", 2),
            record("1", "20240302", "10", "A", 1),
        ];
        let result = deduplicate(records, DedupPolicy::AggregateFull);
        assert_eq!(result.len(), 3);
        assert_eq!(result[0].patient_cns, "A");
        assert_eq!(result[0].quantity, 3);
        assert_eq!(result[1].patient_cns, "B");
        assert_eq!(result[2].service_date, "20240302");
    }

    #[test]
    fn test_aggregate_full_is_idempotent() {
        let records = vec![
            record("1", "20240301", "10", "A", 1),
            record("1", "20240301", "10", "A", 4),
            record("2", "20240301", "20", "A", 2),
            record("2", "20240301", "20", "A", 2),
        ];
        let once = deduplicate(records, DedupPolicy::AggregateFull);
        let twice = deduplicate(once.clone(), DedupPolicy::AggregateFull);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_aggregate_full_sum_is_clamped() {
        let records = vec![
            record("1", "20240301", "10", "A", 600_000),
            record("1", "20240301", "10", "A", 600_000),
        ];
        let result = deduplicate(records, DedupPolicy::AggregateFull);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].quantity, crate::constants::MAX_QUANTITY);
    }

    #[test]
    fn test_aggregate_narrow_uses_patient_id() {
        let mut first = record("1", "20240301", "10", "A", 1);
        first.patient_id = Some("P1".to_string());
        let mut second = record("2", "20240301", "10", "B", 2);
        second.patient_id = Some("P1".to_string());
        let mut anonymous = record("3", "20240301", "10", "", 1);
        anonymous.patient_id = None;
        let anonymous_again = anonymous.clone();

        let result = deduplicate(vec![first, second, anonymous, anonymous_again], DedupPolicy::AggregateNarrow);
        assert_eq!(result.len(), 3);
        assert_eq!(result[0].quantity, 3);
        assert_eq!(result[0].provider_cns, "1");
    }

    #[test]
    fn test_first_per_patient_provider_day_keeps_first() {
        let records = vec![
            record("1", "20240301", "10", "A", 1),
            record("1", "20240301", "20", "A", 7),
            record("1", "20240301", "10", "B", 1),
        ];
        let result = deduplicate(records, DedupPolicy::FirstPerPatientProviderDay);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].procedure_code, "10");
        assert_eq!(result[0].quantity, 1);
    }

    #[test]
    fn test_first_per_source_row() {
        let mut a = record("1", "20240301", "10", "A", 1);
        a.source_row_id = "L1".to_string();
        let mut b = record("1", "20240301", "20", "A", 1);
        b.source_row_id = "L1".to_string();
        let mut c = record("1", "20240301", "30", "A", 1);
        c.source_row_id = "L2".to_string();
        let result = deduplicate(vec![a, b, c], DedupPolicy::FirstPerSourceRow);
        let procedures: Vec<&str> = result.iter().map(|r| r.procedure_code.as_str()).collect();
        assert_eq!(procedures, vec!["10", "30"]);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("aggregate-full".parse::<DedupPolicy>().unwrap(), DedupPolicy::AggregateFull);
        assert_eq!("NONE".parse::<DedupPolicy>().unwrap(), DedupPolicy::None);
        assert!("sometimes".parse::<DedupPolicy>().is_err());
    }
}
