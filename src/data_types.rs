/*!
 * Data type definitions for BPA-I production records
 *
 * This module contains the typed source row handed over by the data access
 * layer, the canonical fixed-position record built from it, and the batch
 * header derived from a finished record set.
 */

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{BpaError, Result};
use crate::constants::MONTH_EXTENSIONS;

/// Competence: the year-month period a batch reports for (AAAAMM)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Competence {
    year: i32,
    month: u32,
}

impl Competence {
    /// Create a competence from its parts, validating the month
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(BpaError::invalid_competence(
                &format!("{:04}{:02}", year, month),
                format!("month {} is outside 01-12", month),
            ));
        }
        if !(1900..=9999).contains(&year) {
            return Err(BpaError::invalid_competence(
                &format!("{:04}{:02}", year, month),
                format!("year {} is outside 1900-9999", year),
            ));
        }
        Ok(Self { year, month })
    }

    /// Parse an `AAAAMM` string
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.len() != 6 || !value.chars().all(|c| c.is_ascii_digit()) {
            return Err(BpaError::invalid_competence(value, "expected exactly 6 digits"));
        }
        let year: i32 = value[..4]
            .parse()
            .map_err(|_| BpaError::invalid_competence(value, "unreadable year"))?;
        let month: u32 = value[4..]
            .parse()
            .map_err(|_| BpaError::invalid_competence(value, "unreadable month"))?;
        Self::new(year, month)
    }

    /// Competence of the current local month
    pub fn current() -> Self {
        let today = chrono::Local::now().date_naive();
        Self {
            year: today.year(),
            month: today.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// `AAAAMM` form used in the submission file
    pub fn as_code(&self) -> String {
        format!("{:04}{:02}", self.year, self.month)
    }

    /// Three-letter Portuguese month used as the submission file extension
    pub fn month_extension(&self) -> &'static str {
        MONTH_EXTENSIONS[(self.month - 1) as usize]
    }
}

impl fmt::Display for Competence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}", self.year, self.month)
    }
}

impl FromStr for Competence {
    type Err = BpaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Competence {
    type Error = BpaError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Competence> for String {
    fn from(value: Competence) -> Self {
        value.as_code()
    }
}

/// Patient sex as emitted in the detail line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Sex {
    #[default]
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "I")]
    Ignored,
}

impl Sex {
    /// Map the source system's sex code: "1" is male, "3" is female, anything else male
    pub fn from_source(code: Option<&str>) -> Self {
        match code.map(str::trim) {
            Some("3") => Sex::Female,
            _ => Sex::Male,
        }
    }

    pub fn as_code(&self) -> &'static str {
        match self {
            Sex::Male => "M",
            Sex::Female => "F",
            Sex::Ignored => "I",
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_code())
    }
}

/// Destination entity indicator (municipal or state health department)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DestinationIndicator {
    #[default]
    #[serde(rename = "M")]
    Municipal,
    #[serde(rename = "E")]
    State,
}

impl DestinationIndicator {
    pub fn from_code(code: &str) -> Result<Self> {
        match code.trim().to_uppercase().as_str() {
            "M" => Ok(DestinationIndicator::Municipal),
            "E" => Ok(DestinationIndicator::State),
            other => Err(BpaError::Configuration {
                message: format!("Invalid destination indicator '{}'", other),
                suggestion: Some("Use 'M' (municipal) or 'E' (state)".to_string()),
            }),
        }
    }

    pub fn as_code(&self) -> &'static str {
        match self {
            DestinationIndicator::Municipal => "M",
            DestinationIndicator::State => "E",
        }
    }
}

/// One raw encounter row as supplied by the data access layer
///
/// Every attribute is optional: a missing or unreadable value only
/// downgrades the field derived from it to its documented default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawEncounterRow {
    /// Opaque source row identifier (ledger entry or encounter id)
    pub row_id: Option<String>,
    pub encounter_id: Option<String>,
    pub patient_id: Option<String>,
    pub patient_cns: Option<String>,
    pub patient_name: Option<String>,
    pub provider_cns: Option<String>,
    /// Internal job-function code of the professional
    pub provider_function: Option<String>,
    /// Internal procedure code (ledger id or short code)
    pub procedure_code: Option<String>,
    /// Diagnosis recorded on the ledger entry
    pub ledger_cid: Option<String>,
    /// Diagnosis recorded on the procedure form
    pub procedure_cid: Option<String>,
    /// Diagnosis recorded on the encounter
    pub encounter_diagnosis: Option<String>,
    pub quantity: Option<String>,
    pub authorized_quantity: Option<String>,
    pub requested_quantity: Option<String>,
    #[serde(deserialize_with = "deserialize_lenient_date")]
    pub service_date: Option<NaiveDate>,
    #[serde(deserialize_with = "deserialize_lenient_date")]
    pub birth_date: Option<NaiveDate>,
    pub sex: Option<String>,
    pub race_code: Option<String>,
    pub ethnicity_code: Option<String>,
    pub municipality_code: Option<String>,
    pub care_type: Option<String>,
    pub authorization_number: Option<String>,
    pub postal_code: Option<String>,
    pub address_type: Option<String>,
    pub street: Option<String>,
    pub complement: Option<String>,
    pub address_number: Option<String>,
    pub neighborhood: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub patient_tax_id: Option<String>,
    pub homeless: Option<String>,
}

/// Parse a source date in any of the formats the data layer is known to produce
pub fn parse_source_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    for format in ["%Y-%m-%d", "%Y%m%d", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date);
        }
    }

    // Timestamps such as "2024-03-05 14:30:00" or "2024-03-05T14:30:00"
    value
        .get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

fn deserialize_lenient_date<'de, D>(deserializer: D) -> std::result::Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_source_date))
}

/// One line-item of service production in the submission format
///
/// Text fields hold unpadded values; the encoder applies width and padding.
/// `source_row_id`, `patient_id` and `diagnosis_required` are transient and
/// never written to the submission file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRecord {
    pub facility_code: String,
    pub competence: String,
    pub provider_cns: String,
    pub occupation_code: String,
    /// Service date as `AAAAMMDD`, empty when unknown
    pub service_date: String,
    pub page: u32,
    pub sequence: u32,
    pub procedure_code: String,
    pub patient_cns: String,
    pub sex: Sex,
    pub municipality_code: String,
    pub diagnosis_code: String,
    pub age: u32,
    pub quantity: u32,
    pub care_type: String,
    pub authorization_number: String,
    pub patient_name: String,
    /// Birth date as `AAAAMMDD`, empty when unknown
    pub birth_date: String,
    pub race_code: String,
    pub ethnicity_code: String,
    pub nationality: String,
    pub service_code: String,
    pub classification_code: String,
    pub team_sequence: String,
    pub team_area: String,
    pub employer_tax_id: String,
    pub postal_code: String,
    pub address_type: String,
    pub street: String,
    pub complement: String,
    pub address_number: String,
    pub neighborhood: String,
    pub phone: String,
    pub email: String,
    pub team_national_id: String,
    pub patient_tax_id: String,
    pub homeless_flag: String,

    #[serde(skip)]
    pub source_row_id: String,
    #[serde(skip)]
    pub patient_id: Option<String>,
    #[serde(skip)]
    pub diagnosis_required: bool,
}

/// Batch header derived from the final record set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchHeader {
    pub competence: String,
    pub line_count: usize,
    pub page_count: usize,
    pub checksum: u32,
    pub responsible_name: String,
    pub responsible_acronym: String,
    pub responsible_tax_id: String,
    pub destination_name: String,
    pub destination_indicator: DestinationIndicator,
    pub version_tag: String,
}

/// A procedure code the lookup tables could not resolve
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MissingMapping {
    pub short_code: String,
    pub source_row_id: String,
}

impl fmt::Display for MissingMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}", self.short_code, self.source_row_id)
    }
}

/// A single field that fell back to its documented default during assembly
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDefault {
    pub source_row_id: String,
    pub field: &'static str,
    pub default_value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_competence_parsing() {
        let competence = Competence::parse("202403").unwrap();
        assert_eq!(competence.year(), 2024);
        assert_eq!(competence.month(), 3);
        assert_eq!(competence.as_code(), "202403");
        assert_eq!(competence.month_extension(), "MAR");
        assert_eq!(Competence::parse("202412").unwrap().month_extension(), "DEZ");

        assert!(Competence::parse("202413").is_err());
        assert!(Competence::parse("2024").is_err());
        assert!(Competence::parse("20240A").is_err());
        assert!(Competence::parse("202400").is_err());
    }

    #[test]
    fn test_sex_mapping() {
        assert_eq!(Sex::from_source(Some("1")), Sex::Male);
        assert_eq!(Sex::from_source(Some("3")), Sex::Female);
        assert_eq!(Sex::from_source(Some(" 3 ")), Sex::Female);
        assert_eq!(Sex::from_source(Some("2")), Sex::Male);
        assert_eq!(Sex::from_source(None), Sex::Male);
    }

    #[test]
    fn test_destination_indicator() {
        assert_eq!(DestinationIndicator::from_code("m").unwrap(), DestinationIndicator::Municipal);
        assert_eq!(DestinationIndicator::from_code("E").unwrap().as_code(), "E");
        assert!(DestinationIndicator::from_code("X").is_err());
    }

    #[test]
    fn test_source_dates() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5);
        assert_eq!(parse_source_date("2024-03-05"), expected);
        assert_eq!(parse_source_date("20240305"), expected);
        assert_eq!(parse_source_date("05/03/2024"), expected);
        assert_eq!(parse_source_date("2024-03-05 14:30:00"), expected);
        assert_eq!(parse_source_date("not a date"), None);
        assert_eq!(parse_source_date("  "), None);
    }
}
