/*!
 * Lookup resolution from internal codes to regulatory codes
 *
 * Procedure, occupation and race mappings live in versioned data tables
 * behind the [`MappingProvider`] trait. The built-in tables reproduce the
 * clinic's current mapping; a TOML file can override or extend them.
 *
 * ```no_run
 * # use bpa::prelude::*;
 * # fn main() -> Result<()> {
 * let tables = MappingTables::builtin().overlay(MappingTables::from_file("mappings.toml")?);
 * let resolver = LookupResolver::new(&tables);
 * assert_eq!(resolver.resolve_race(Some("33")), "02");
 * # Ok(())
 * # }
 * ```
 */

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{BpaError, Result};
use crate::constants::*;
use crate::data_types::MissingMapping;

/// Canonical data for one short procedure code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureEntry {
    /// 10-digit SIGTAP procedure code
    pub canonical_code: String,
    /// 3-digit specialized service code
    #[serde(default = "default_service_code")]
    pub service_code: String,
    /// Service classification, either the rehabilitation type ("03") or the
    /// 3-digit classification ("003")
    #[serde(default)]
    pub classification: String,
    /// Diagnosis suggested when the encounter carries none
    #[serde(default)]
    pub suggested_diagnosis: Option<String>,
    /// Whether the procedure demands a diagnosis; drives the fallback code
    #[serde(default)]
    pub diagnosis_required: bool,
}

fn default_service_code() -> String {
    DEFAULT_SERVICE_CODE.to_string()
}

impl ProcedureEntry {
    /// Classification as emitted in the detail line
    pub fn classification_code(&self) -> &'static str {
        classification_code(&self.classification)
    }
}

/// Map a rehabilitation type to its 3-digit service classification
///
/// Visual (01), intellectual (02), physical (03) and auditory (05)
/// rehabilitation have dedicated classifications; anything else is `000`.
pub fn classification_code(rehabilitation_type: &str) -> &'static str {
    match rehabilitation_type.trim() {
        "01" | "001" => "001",
        "02" | "002" => "002",
        "03" | "003" => "003",
        "05" | "005" => "005",
        _ => DEFAULT_CLASSIFICATION,
    }
}

/// Source of mapping data
pub trait MappingProvider: Send + Sync {
    /// Canonical entry for a short procedure code
    fn procedure(&self, short_code: &str) -> Option<&ProcedureEntry>;

    /// Rewrite an internal ledger procedure id to a short procedure code
    fn procedure_alias(&self, _internal_code: &str) -> Option<&str> {
        None
    }

    /// 6-character occupation code for an internal job-function code
    fn occupation(&self, function_code: &str) -> Option<&str>;

    /// 2-digit race/color code for a source race code
    fn race(&self, source_code: &str) -> Option<&str>;

    /// Version tag of the mapping data
    fn version(&self) -> &str;
}

/// In-memory mapping tables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingTables {
    pub version: String,
    pub procedures: HashMap<String, ProcedureEntry>,
    pub procedure_aliases: HashMap<String, String>,
    pub occupations: HashMap<String, String>,
    pub races: HashMap<String, String>,
}

impl MappingTables {
    /// Built-in mapping tables
    pub fn builtin() -> Self {
        let procedures = BUILTIN_PROCEDURES
            .iter()
            .map(|&(short, canonical, classification, suggestion, diagnosis_required)| {
                let entry = ProcedureEntry {
                    canonical_code: canonical.to_string(),
                    service_code: DEFAULT_SERVICE_CODE.to_string(),
                    classification: classification.to_string(),
                    suggested_diagnosis: (!suggestion.is_empty()).then(|| suggestion.to_string()),
                    diagnosis_required,
                };
                (short.to_string(), entry)
            })
            .collect();

        let occupations = BUILTIN_OCCUPATIONS
            .iter()
            .map(|&(function, cbo)| (function.to_string(), cbo.to_string()))
            .collect();

        let races = BUILTIN_RACES
            .iter()
            .map(|&(source, code)| (source.to_string(), code.to_string()))
            .collect();

        Self {
            version: BUILTIN_MAPPING_VERSION.to_string(),
            procedures,
            procedure_aliases: HashMap::new(),
            occupations,
            races,
        }
    }

    /// Parse tables from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| BpaError::MappingTable {
            message: format!("Failed to parse mapping tables: {}", e),
            path: None,
            suggestion: Some("Check the [procedures], [occupations] and [races] tables".to_string()),
        })
    }

    /// Load tables from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(BpaError::file_not_found_with_suggestion(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path).map_err(|e| BpaError::io_at(e, path))?;
        let tables = Self::from_toml_str(&contents).map_err(|e| match e {
            BpaError::MappingTable { message, suggestion, .. } => BpaError::MappingTable {
                message,
                path: Some(path.to_path_buf()),
                suggestion,
            },
            other => other,
        })?;
        debug!(
            path = %path.display(),
            procedures = tables.procedures.len(),
            occupations = tables.occupations.len(),
            races = tables.races.len(),
            "loaded mapping tables"
        );
        Ok(tables)
    }

    /// Save tables to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self).map_err(|e| BpaError::MappingTable {
            message: format!("Failed to serialize mapping tables: {}", e),
            path: Some(path.as_ref().to_path_buf()),
            suggestion: None,
        })?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Entries of `other` replace or extend entries of `self`
    pub fn overlay(mut self, other: MappingTables) -> Self {
        self.procedures.extend(other.procedures);
        self.procedure_aliases.extend(other.procedure_aliases);
        self.occupations.extend(other.occupations);
        self.races.extend(other.races);
        if !other.version.is_empty() {
            self.version = other.version;
        }
        self
    }
}

impl MappingProvider for MappingTables {
    fn procedure(&self, short_code: &str) -> Option<&ProcedureEntry> {
        self.procedures.get(short_code)
    }

    fn procedure_alias(&self, internal_code: &str) -> Option<&str> {
        self.procedure_aliases.get(internal_code).map(String::as_str)
    }

    fn occupation(&self, function_code: &str) -> Option<&str> {
        self.occupations.get(function_code).map(String::as_str)
    }

    fn race(&self, source_code: &str) -> Option<&str> {
        self.races.get(source_code).map(String::as_str)
    }

    fn version(&self) -> &str {
        &self.version
    }
}

/// Resolved procedure data for one row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProcedure {
    pub procedure_code: String,
    pub service_code: String,
    pub classification_code: String,
    pub suggested_diagnosis: Option<String>,
    pub diagnosis_required: bool,
    /// Set when a non-empty code was not found in the tables
    pub miss: Option<MissingMapping>,
}

impl ResolvedProcedure {
    fn fallback(miss: Option<MissingMapping>) -> Self {
        Self {
            procedure_code: DEFAULT_PROCEDURE_CODE.to_string(),
            service_code: DEFAULT_SERVICE_CODE.to_string(),
            classification_code: DEFAULT_CLASSIFICATION.to_string(),
            suggested_diagnosis: None,
            diagnosis_required: DEFAULT_PROCEDURE_REQUIRES_DIAGNOSIS,
            miss,
        }
    }
}

/// Total lookup functions over a mapping provider
#[derive(Clone, Copy)]
pub struct LookupResolver<'a> {
    provider: &'a dyn MappingProvider,
}

impl<'a> LookupResolver<'a> {
    pub fn new(provider: &'a dyn MappingProvider) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &'a dyn MappingProvider {
        self.provider
    }

    /// Resolve an internal procedure code, falling back to the default procedure
    pub fn resolve_procedure(&self, code: Option<&str>, source_row_id: &str) -> ResolvedProcedure {
        let Some(code) = code.map(str::trim).filter(|c| !c.is_empty()) else {
            return ResolvedProcedure::fallback(None);
        };

        let short_code = self.provider.procedure_alias(code).unwrap_or(code);

        match self.provider.procedure(short_code) {
            Some(entry) => ResolvedProcedure {
                procedure_code: entry.canonical_code.clone(),
                service_code: entry.service_code.clone(),
                classification_code: entry.classification_code().to_string(),
                suggested_diagnosis: entry
                    .suggested_diagnosis
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
                diagnosis_required: entry.diagnosis_required,
                miss: None,
            },
            None => {
                warn!(code = short_code, row = source_row_id, "procedure code has no mapping");
                ResolvedProcedure::fallback(Some(MissingMapping {
                    short_code: short_code.to_string(),
                    source_row_id: source_row_id.to_string(),
                }))
            }
        }
    }

    /// Resolve an internal job-function code to an occupation code
    ///
    /// The occupation field takes 6 uppercase alphanumerics; any other table
    /// entry resolves to the default.
    pub fn resolve_occupation(&self, function_code: Option<&str>) -> String {
        let Some(key) = function_code.map(normalize_numeric_key) else {
            return DEFAULT_OCCUPATION_CODE.to_string();
        };
        match self.provider.occupation(&key) {
            Some(code) if is_occupation_code(code) => code.to_string(),
            Some(code) => {
                warn!(function = %key, code, "occupation code is not 6 alphanumeric characters");
                DEFAULT_OCCUPATION_CODE.to_string()
            }
            None => DEFAULT_OCCUPATION_CODE.to_string(),
        }
    }

    /// Resolve a source race code to {01..05, 99}; never blank
    pub fn resolve_race(&self, source_code: Option<&str>) -> String {
        let Some(code) = source_code.map(str::trim).filter(|c| !c.is_empty()) else {
            return UNKNOWN_RACE_CODE.to_string();
        };

        self.provider
            .race(code)
            .or_else(|| self.provider.race(&normalize_numeric_key(code)))
            .unwrap_or(UNKNOWN_RACE_CODE)
            .to_string()
    }
}

fn is_occupation_code(code: &str) -> bool {
    code.len() == 6 && code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

/// Numeric keys are compared without leading zeros ("06" and "6" are the same function)
fn normalize_numeric_key(code: &str) -> String {
    let code = code.trim();
    if !code.is_empty() && code.chars().all(|c| c.is_ascii_digit()) {
        let stripped = code.trim_start_matches('0');
        if stripped.is_empty() { "0".to_string() } else { stripped.to_string() }
    } else {
        code.to_string()
    }
}

const BUILTIN_MAPPING_VERSION: &str = "builtin-2025.05";

/// (short code, SIGTAP code, rehabilitation type, suggested diagnosis, diagnosis required)
///
/// Group 03 (clinical) procedures are marked as requiring a diagnosis; a
/// mapping file can set `diagnosis_required` per procedure.
const BUILTIN_PROCEDURES: &[(&str, &str, &str, &str, bool)] = &[
    // Physical rehabilitation
    ("105", "0301070105", "03", "M638", true),
    ("121", "0301070121", "03", "M638", true),
    ("237", "0301070237", "03", "", true),
    ("63", "0301100063", "03", "", true),
    ("210", "0301070210", "03", "", true),
    ("229", "0301070229", "03", "", true),
    ("19", "0302050019", "03", "M968", true),
    ("27", "0302050027", "03", "M998", true),
    ("14", "0302060014", "03", "G968", true),
    ("30", "0302060030", "03", "G839", true),
    ("57", "0302060057", "03", "Q878", true),
    ("49", "0302060049", "03", "F83", true),
    ("530", "0309050530", "03", "", true),
    ("23", "0211030023", "03", "", false),
    ("31", "0211030031", "03", "", false),
    // Intellectual rehabilitation
    ("24", "0301070024", "02", "F83", true),
    ("40", "0301070040", "02", "F84", true),
    ("59", "0301070059", "02", "F84", true),
    ("75", "0301070075", "02", "F84", true),
    ("261", "0301070261", "02", "", true),
    ("13", "0211100013", "02", "", false),
    // Visual rehabilitation
    ("38", "0211060038", "01", "", false),
    ("20", "0211060020", "01", "", false),
    ("54", "0211060054", "01", "", false),
    ("100", "0211060100", "01", "", false),
    ("1127", "0211061127", "01", "", false),
    ("224", "0211060224", "01", "", false),
    ("259", "0211060259", "01", "", false),
    ("232", "0211060232", "01", "", false),
    ("151", "0211060151", "01", "", false),
    ("148", "0301070148", "01", "", true),
    ("156", "0301070156", "01", "H542", true),
    ("164", "0301070164", "01", "H542", true),
    ("245", "0301070245", "01", "", true),
    ("18", "0302030018", "01", "H542", true),
    ("26", "0302030026", "01", "H519", true),
    // Auditory rehabilitation
    ("1113", "0211051113", "05", "", false),
    ("25", "0211070025", "05", "", false),
    ("33", "0211070033", "05", "", false),
    ("41", "0211070041", "05", "", false),
    ("50", "0211070050", "05", "", false),
    ("106", "0211070106", "05", "H919", false),
    ("149", "0211070149", "05", "", false),
    ("157", "0211070157", "05", "", false),
    ("203", "0211070203", "05", "", false),
    ("211", "0211070211", "05", "", false),
    ("246", "0211070246", "05", "", false),
    ("262", "0211070262", "05", "", false),
    ("270", "0211070270", "05", "", false),
    ("300", "0211070300", "05", "H919", false),
    ("319", "0211070319", "05", "H919", false),
    ("327", "0211070327", "05", "", false),
    ("335", "0211070335", "05", "", false),
    ("343", "0211070343", "05", "", false),
    ("351", "0211070351", "05", "", false),
    ("424", "0211070424", "05", "", false),
    ("432", "0211070432", "05", "", false),
    ("32", "0301070032", "05", "H919", true),
    ("253", "0301070253", "05", "", true),
];

/// (job-function code, CBO occupation code)
const BUILTIN_OCCUPATIONS: &[(&str, &str)] = &[
    ("1", "422105"),  // receptionist
    ("2", "351305"),  // administrative technician
    ("5", "410105"),  // administrative coordinator
    ("6", "223208"),  // dentist
    ("7", "413115"),  // billing clerk
    ("10", "251605"), // social worker
    ("12", "411005"), // administrative
    ("13", "223710"), // nutritionist
    ("14", "521140"), // attendant
    ("15", "414105"), // stock clerk
    ("16", "514320"), // cleaning
    ("17", "514320"), // general assistant
    ("18", "142105"), // consulting
    ("19", "225320"), // radiologist
    ("20", "317210"), // IT technician
    ("21", "317210"), // implementer
    ("22", "225170"), // physician
    ("23", "223805"), // speech therapist
    ("24", "223605"), // physiotherapist
    ("25", "223905"), // occupational therapist
    ("26", "251510"), // psychologist
    ("27", "225150"), // infectologist
    ("28", "225160"), // psychiatrist
    ("29", "223910"), // music therapist
    ("30", "225145"), // otorhinolaryngologist
    ("31", "223505"), // nurse
    ("32", "225135"), // neurologist
    ("33", "225140"), // ophthalmologist
    ("34", "225130"), // orthopedist
    ("35", "224110"), // physical education professional
    ("36", "239215"), // pedagogue
    ("37", "225125"), // physiatrist
    ("38", "322205"), // nursing technician
];

/// (source race code, race/color code)
const BUILTIN_RACES: &[(&str, &str)] = &[
    ("1", "01"), ("01", "01"), ("31", "01"),
    ("2", "02"), ("02", "02"), ("33", "02"),
    ("3", "03"), ("03", "03"), ("35", "03"),
    ("4", "04"), ("04", "04"), ("37", "04"),
    ("5", "05"), ("05", "05"), ("39", "05"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_race_resolution() {
        let tables = MappingTables::builtin();
        let resolver = LookupResolver::new(&tables);
        assert_eq!(resolver.resolve_race(Some("33")), "02");
        assert_eq!(resolver.resolve_race(Some("999")), "99");
        assert_eq!(resolver.resolve_race(Some("5")), "05");
        assert_eq!(resolver.resolve_race(Some("")), "99");
        assert_eq!(resolver.resolve_race(None), "99");
    }

    #[test]
    fn test_occupation_resolution() {
        let tables = MappingTables::builtin();
        let resolver = LookupResolver::new(&tables);
        assert_eq!(resolver.resolve_occupation(Some("24")), "223605");
        assert_eq!(resolver.resolve_occupation(Some("024")), "223605");
        assert_eq!(resolver.resolve_occupation(Some("999")), "000000");
        assert_eq!(resolver.resolve_occupation(None), "000000");
        assert_eq!(resolver.resolve_occupation(Some("6")), "223208");
    }

    #[test]
    fn test_malformed_occupation_falls_back() {
        let extra = MappingTables::from_toml_str(
            r#"
            [occupations]
            "6" = "2232"
            "40" = "22360a"
            "#,
        )
        .unwrap();
        let tables = MappingTables::builtin().overlay(extra);
        let resolver = LookupResolver::new(&tables);
        assert_eq!(resolver.resolve_occupation(Some("6")), "000000");
        assert_eq!(resolver.resolve_occupation(Some("40")), "000000");
        assert_eq!(resolver.resolve_occupation(Some("24")), "223605");
    }

    #[test]
    fn test_procedure_resolution() {
        let tables = MappingTables::builtin();
        let resolver = LookupResolver::new(&tables);

        let found = resolver.resolve_procedure(Some("300"), "row-1");
        assert_eq!(found.procedure_code, "0211070300");
        assert_eq!(found.classification_code, "005");
        assert_eq!(found.service_code, "135");
        assert_eq!(found.suggested_diagnosis.as_deref(), Some("H919"));
        assert!(found.miss.is_none());

        let missing = resolver.resolve_procedure(Some("77777"), "row-2");
        assert_eq!(missing.procedure_code, "0301010013");
        assert_eq!(missing.classification_code, "000");
        assert_eq!(
            missing.miss,
            Some(MissingMapping { short_code: "77777".to_string(), source_row_id: "row-2".to_string() })
        );

        // Empty input takes the default without being reported
        let empty = resolver.resolve_procedure(Some("  "), "row-3");
        assert_eq!(empty.procedure_code, "0301010013");
        assert!(empty.miss.is_none());
    }

    #[test]
    fn test_alias_and_overlay() {
        let extra = MappingTables::from_toml_str(
            r#"
            version = "clinic-2"

            [procedure_aliases]
            "9001" = "105"

            [procedures."777"]
            canonical_code = "0301010072"
            classification = "003"
            diagnosis_required = true

            [races]
            "99" = "99"
            "#,
        )
        .unwrap();

        let tables = MappingTables::builtin().overlay(extra);
        assert_eq!(tables.version(), "clinic-2");

        let resolver = LookupResolver::new(&tables);
        assert_eq!(resolver.resolve_procedure(Some("9001"), "r").procedure_code, "0301070105");

        let custom = resolver.resolve_procedure(Some("777"), "r");
        assert_eq!(custom.procedure_code, "0301010072");
        assert_eq!(custom.classification_code, "003");
        assert_eq!(custom.service_code, "135");
        assert!(custom.diagnosis_required);
    }

    #[test]
    fn test_classification_map() {
        assert_eq!(classification_code("01"), "001");
        assert_eq!(classification_code("05"), "005");
        assert_eq!(classification_code("04"), "000");
        assert_eq!(classification_code(""), "000");
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            MappingTables::from_toml_str("procedures = 3"),
            Err(BpaError::MappingTable { .. })
        ));
    }
}
