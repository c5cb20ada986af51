/*!
 * Record assembly from raw encounter rows
 *
 * Every field of a canonical record is derived independently. When an
 * optional attribute is missing or unreadable only that field falls back to
 * its documented default, and the fallback is noted; assembly itself never
 * fails, so every input row yields exactly one record.
 */

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::config::ExportConfig;
use crate::constants::*;
use crate::data_types::*;
use crate::lookup::LookupResolver;

/// Where a record's diagnosis code came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosisSource {
    Ledger,
    ProcedureForm,
    Encounter,
    Suggestion,
    Fallback,
}

/// Diagnosis priority resolver
///
/// Candidates are tried in order: ledger entry, procedure form, encounter,
/// the procedure table's suggestion. When none is present the fallback
/// depends on whether the procedure requires a diagnosis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosisPolicy {
    /// Fallback for procedures that require a diagnosis
    #[serde(default = "default_required_fallback")]
    pub required_fallback: String,
    /// Fallback for procedures that do not
    #[serde(default = "default_optional_fallback")]
    pub optional_fallback: String,
}

fn default_required_fallback() -> String {
    DIAGNOSIS_FALLBACK_REQUIRED.to_string()
}

fn default_optional_fallback() -> String {
    DIAGNOSIS_FALLBACK_OPTIONAL.to_string()
}

impl Default for DiagnosisPolicy {
    fn default() -> Self {
        Self {
            required_fallback: default_required_fallback(),
            optional_fallback: default_optional_fallback(),
        }
    }
}

impl DiagnosisPolicy {
    /// Pick the diagnosis for one row
    pub fn resolve(
        &self,
        row: &RawEncounterRow,
        suggestion: Option<&str>,
        diagnosis_required: bool,
    ) -> (String, DiagnosisSource) {
        let candidates = [
            (row.ledger_cid.as_deref(), DiagnosisSource::Ledger),
            (row.procedure_cid.as_deref(), DiagnosisSource::ProcedureForm),
            (row.encounter_diagnosis.as_deref(), DiagnosisSource::Encounter),
            (suggestion, DiagnosisSource::Suggestion),
        ];

        for (candidate, source) in candidates {
            if let Some(code) = candidate.map(normalize_diagnosis).filter(|c| !c.is_empty()) {
                return (code, source);
            }
        }

        let fallback = if diagnosis_required {
            &self.required_fallback
        } else {
            &self.optional_fallback
        };
        (fallback.clone(), DiagnosisSource::Fallback)
    }
}

/// Uppercase, drop separators and keep at most 4 characters ("f84.0" becomes "F840")
pub fn normalize_diagnosis(code: &str) -> String {
    code.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .take(4)
        .collect()
}

/// Whole years between birth and service, birthday-adjusted and clamped to [0, 130]
pub fn age_at(birth: NaiveDate, service: NaiveDate) -> u32 {
    let mut years = service.year() - birth.year();
    if (service.month(), service.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    years.clamp(0, MAX_AGE as i32) as u32
}

/// Parse a source quantity; non-numeric values count as zero
///
/// Values above [`MAX_QUANTITY`] are clamped so the rendered field and the
/// header checksum see the same number.
pub fn parse_quantity(value: &str) -> u32 {
    let value = value.trim();
    let quantity = match value.parse::<u32>() {
        Ok(quantity) => quantity,
        // Decimal columns arrive as "2.0"
        Err(_) => match value.parse::<f64>() {
            Ok(q) if q.is_finite() && q >= 0.0 => q.trunc().min(u32::MAX as f64) as u32,
            _ => 0,
        },
    };
    clamp_quantity(quantity)
}

/// Limit a quantity to what the quantity field can carry
pub fn clamp_quantity(quantity: u32) -> u32 {
    if quantity > MAX_QUANTITY {
        warn!(quantity, max = MAX_QUANTITY, "quantity exceeds field width, clamped");
        MAX_QUANTITY
    } else {
        quantity
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn digits_only(value: &Option<String>) -> String {
    non_empty(value)
        .map(|v| v.chars().filter(char::is_ascii_digit).collect())
        .unwrap_or_default()
}

fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y%m%d").to_string()).unwrap_or_default()
}

/// Result of assembling one row
#[derive(Debug, Clone)]
pub struct AssembledRow {
    pub record: CanonicalRecord,
    pub miss: Option<MissingMapping>,
    pub defaults: Vec<FieldDefault>,
}

/// Result of assembling a batch, in input order
#[derive(Debug, Clone, Default)]
pub struct AssemblyOutput {
    pub records: Vec<CanonicalRecord>,
    pub missing_mappings: Vec<MissingMapping>,
    pub field_defaults: Vec<FieldDefault>,
}

/// Builds canonical records from raw rows
pub struct RecordAssembler<'a> {
    config: &'a ExportConfig,
    competence: Competence,
    resolver: LookupResolver<'a>,
}

impl<'a> RecordAssembler<'a> {
    pub fn new(config: &'a ExportConfig, competence: Competence, resolver: LookupResolver<'a>) -> Self {
        Self {
            config,
            competence,
            resolver,
        }
    }

    /// Assemble every row, preserving input order
    pub fn assemble_all(&self, rows: &[RawEncounterRow]) -> AssemblyOutput {
        #[cfg(feature = "parallel")]
        let assembled: Vec<AssembledRow> = {
            use rayon::prelude::*;
            rows.par_iter()
                .enumerate()
                .map(|(index, row)| self.assemble(row, index))
                .collect()
        };

        #[cfg(not(feature = "parallel"))]
        let assembled: Vec<AssembledRow> = rows
            .iter()
            .enumerate()
            .map(|(index, row)| self.assemble(row, index))
            .collect();

        let mut output = AssemblyOutput {
            records: Vec::with_capacity(assembled.len()),
            ..Default::default()
        };
        for row in assembled {
            output.records.push(row.record);
            output.missing_mappings.extend(row.miss);
            output.field_defaults.extend(row.defaults);
        }

        info!(
            records = output.records.len(),
            missing_mappings = output.missing_mappings.len(),
            defaulted_fields = output.field_defaults.len(),
            "assembled records"
        );
        output
    }

    /// Assemble one row; `index` is its 0-based position in the batch
    pub fn assemble(&self, row: &RawEncounterRow, index: usize) -> AssembledRow {
        let source_row_id = non_empty(&row.row_id)
            .or_else(|| non_empty(&row.encounter_id))
            .map(str::to_string)
            .unwrap_or_else(|| format!("row-{}", index + 1));

        let mut defaults = Vec::new();
        let mut note = |field: &'static str, value: &str| {
            defaults.push(FieldDefault {
                source_row_id: source_row_id.clone(),
                field,
                default_value: value.to_string(),
            });
        };

        let procedure = self
            .resolver
            .resolve_procedure(row.procedure_code.as_deref(), &source_row_id);
        if non_empty(&row.procedure_code).is_none() {
            note("procedure_code", &procedure.procedure_code);
        }

        let occupation_code = self.resolver.resolve_occupation(row.provider_function.as_deref());
        if occupation_code == DEFAULT_OCCUPATION_CODE {
            note("occupation_code", &occupation_code);
        }

        let (diagnosis_code, diagnosis_source) = self.config.diagnosis.resolve(
            row,
            procedure.suggested_diagnosis.as_deref(),
            procedure.diagnosis_required,
        );
        if diagnosis_source == DiagnosisSource::Fallback {
            note("diagnosis_code", &diagnosis_code);
        }

        let age = match (row.birth_date, row.service_date) {
            (Some(birth), Some(service)) => age_at(birth, service),
            _ => {
                note("age", "0");
                0
            }
        };

        let quantity = match [&row.quantity, &row.authorized_quantity, &row.requested_quantity]
            .into_iter()
            .find_map(non_empty)
        {
            Some(raw) => {
                let quantity = parse_quantity(raw);
                if quantity == 0 {
                    note("quantity", "0");
                }
                quantity
            }
            None => {
                note("quantity", "1");
                1
            }
        };

        let municipality_code = match non_empty(&row.municipality_code) {
            Some(code) => code.to_string(),
            None => {
                note("municipality_code", &self.config.default_municipality);
                self.config.default_municipality.clone()
            }
        };

        let care_type = non_empty(&row.care_type)
            .unwrap_or(self.config.default_care_type.as_str())
            .to_string();

        let patient_name = match non_empty(&row.patient_name) {
            Some(name) => name.to_string(),
            None => {
                note("patient_name", DEFAULT_PATIENT_NAME);
                DEFAULT_PATIENT_NAME.to_string()
            }
        };

        let race_code = self.resolver.resolve_race(row.race_code.as_deref());
        if race_code == UNKNOWN_RACE_CODE {
            note("race_code", UNKNOWN_RACE_CODE);
        }

        // Ethnicity is only meaningful for indigenous patients
        let ethnicity_code = match non_empty(&row.ethnicity_code) {
            Some(code) if race_code == INDIGENOUS_RACE_CODE => code.to_string(),
            _ => NO_ETHNICITY_CODE.to_string(),
        };

        let diagnosis_required = procedure.diagnosis_required;
        let patient_id = non_empty(&row.patient_id).map(str::to_string);

        trace!(row = %source_row_id, ?diagnosis_source, diagnosis = %diagnosis_code, "derived diagnosis");
        if !defaults.is_empty() {
            debug!(row = %source_row_id, defaulted = defaults.len(), "fields defaulted");
        }

        let record = CanonicalRecord {
            facility_code: self.config.facility_code.clone(),
            competence: self.competence.as_code(),
            provider_cns: digits_only(&row.provider_cns),
            occupation_code,
            service_date: format_date(row.service_date),
            page: 0,
            sequence: 0,
            procedure_code: procedure.procedure_code,
            patient_cns: digits_only(&row.patient_cns),
            sex: Sex::from_source(row.sex.as_deref()),
            municipality_code,
            diagnosis_code,
            age,
            quantity,
            care_type,
            authorization_number: digits_only(&row.authorization_number),
            patient_name,
            birth_date: format_date(row.birth_date),
            race_code,
            ethnicity_code,
            nationality: self.config.nationality.clone(),
            service_code: procedure.service_code,
            classification_code: procedure.classification_code,
            team_sequence: ZERO_FILL.to_string(),
            team_area: ZERO_FILL.to_string(),
            employer_tax_id: ZERO_FILL.to_string(),
            postal_code: zero_if_empty(digits_only(&row.postal_code)),
            address_type: zero_if_empty(digits_only(&row.address_type)),
            street: non_empty(&row.street).unwrap_or_default().to_string(),
            complement: non_empty(&row.complement).unwrap_or_default().to_string(),
            address_number: non_empty(&row.address_number).unwrap_or_default().to_string(),
            neighborhood: non_empty(&row.neighborhood).unwrap_or_default().to_string(),
            phone: digits_only(&row.phone),
            email: non_empty(&row.email).unwrap_or_default().to_string(),
            team_national_id: ZERO_FILL.to_string(),
            patient_tax_id: zero_if_empty(digits_only(&row.patient_tax_id)),
            homeless_flag: non_empty(&row.homeless).unwrap_or(DEFAULT_HOMELESS_FLAG).to_string(),
            source_row_id,
            patient_id,
            diagnosis_required,
        };

        AssembledRow {
            record,
            miss: procedure.miss,
            defaults,
        }
    }
}

fn zero_if_empty(value: String) -> String {
    if value.is_empty() { ZERO_FILL.to_string() } else { value }
}
