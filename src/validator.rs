/*!
 * Conformance validation of BPA-I submission files
 *
 * The validator re-parses an encoded file against the same layouts the
 * encoder uses. Line 1 is always the header; every following line is
 * classified by its two-character marker. Content problems never stop the
 * scan: they accumulate into one [`ValidationReport`]. Only a file that
 * cannot be read at all is an error.
 *
 * # Example
 *
 * ```rust
 * use bpa::validator::ConformanceValidator;
 *
 * let report = ConformanceValidator::new().validate_str("");
 * assert!(!report.is_conformant());
 * ```
 */

use std::fmt;
use std::path::Path;

use chrono::{Datelike, NaiveDate};
use encoding_rs::WINDOWS_1252;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{BpaError, Result};
use crate::constants::COMPETENCE_YEARS_AHEAD;
use crate::header::page_count;
use crate::schema::{FieldKind, FieldRule, FieldShape, FieldSpec, RecordLayout, DETAIL_LAYOUT, HEADER_LAYOUT};

/// Class of a validation finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Line-level problem: unknown marker, wrong length, empty file
    Structural,
    /// A field violates its layout rule
    FieldConformance,
    /// Header totals disagree with the file content
    BatchConsistency,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueKind::Structural => write!(f, "structural"),
            IssueKind::FieldConformance => write!(f, "field"),
            IssueKind::BatchConsistency => write!(f, "consistency"),
        }
    }
}

/// One validation finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    /// 1-based line number, absent for file-level findings
    pub line: Option<usize>,
    pub field: Option<&'static str>,
    pub message: String,
}

impl ValidationIssue {
    fn structural(line: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            kind: IssueKind::Structural,
            line,
            field: None,
            message: message.into(),
        }
    }

    fn field(line: usize, field: &FieldSpec, message: impl Into<String>) -> Self {
        Self {
            kind: IssueKind::FieldConformance,
            line: Some(line),
            field: Some(field.name),
            message: message.into(),
        }
    }

    fn consistency(message: impl Into<String>) -> Self {
        Self {
            kind: IssueKind::BatchConsistency,
            line: None,
            field: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.field) {
            (Some(line), Some(field)) => write!(f, "Line {}, field {}: {}", line, field, self.message),
            (Some(line), None) => write!(f, "Line {}: {}", line, self.message),
            _ => write!(f, "{}", self.message),
        }
    }
}

/// Counters collected during a scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationStats {
    pub lines_read: usize,
    pub blank_lines: usize,
    pub detail_records: usize,
    pub valid_details: usize,
    pub invalid_details: usize,
    /// Competence declared in the header
    pub competence: Option<String>,
    pub declared_lines: Option<usize>,
    pub declared_pages: Option<usize>,
}

/// Outcome of validating one file
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    /// Name of the validated file, when validated from disk
    pub source: Option<String>,
    pub stats: ValidationStats,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Conformant iff no issue of any kind was found
    pub fn is_conformant(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.issues.len()
    }

    pub fn issues_of(&self, kind: IssueKind) -> impl Iterator<Item = &ValidationIssue> + '_ {
        self.issues.iter().filter(move |issue| issue.kind == kind)
    }

    pub fn count_of(&self, kind: IssueKind) -> usize {
        self.issues_of(kind).count()
    }

    /// Print a human-readable summary to stdout
    pub fn print_summary(&self) {
        let na = || "N/A".to_string();
        println!("=== BPA-I Validation Summary ===");
        if let Some(source) = &self.source {
            println!("File: {}", source);
        }
        println!("Competence (header): {}", self.stats.competence.clone().unwrap_or_else(na));
        println!("Declared lines (header): {}", self.stats.declared_lines.map_or_else(na, |n| n.to_string()));
        println!("Declared pages (header): {}", self.stats.declared_pages.map_or_else(na, |n| n.to_string()));
        println!("Lines read: {}", self.stats.lines_read);
        println!("Detail records: {}", self.stats.detail_records);
        println!("  Valid: {}", self.stats.valid_details);
        println!("  Invalid: {}", self.stats.invalid_details);
        println!(
            "Errors: {} ({} structural, {} field, {} consistency)",
            self.error_count(),
            self.count_of(IssueKind::Structural),
            self.count_of(IssueKind::FieldConformance),
            self.count_of(IssueKind::BatchConsistency)
        );
        if self.is_conformant() {
            println!("SUCCESS: the file conforms to the BPA-I layout.");
        } else {
            println!("FAILURE: the file contains errors.");
        }
    }
}

/// Positional validator for BPA-I files
#[derive(Debug, Clone)]
pub struct ConformanceValidator {
    header_layout: &'static RecordLayout,
    detail_layout: &'static RecordLayout,
    /// Latest competence year accepted is this year plus [`COMPETENCE_YEARS_AHEAD`]
    reference_year: i32,
}

impl Default for ConformanceValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConformanceValidator {
    pub fn new() -> Self {
        Self {
            header_layout: &HEADER_LAYOUT,
            detail_layout: &DETAIL_LAYOUT,
            reference_year: chrono::Local::now().year(),
        }
    }

    /// Pin the year competence plausibility is measured from
    pub fn with_reference_year(mut self, year: i32) -> Self {
        self.reference_year = year;
        self
    }

    /// Read, decode and validate a file from disk
    ///
    /// Fails only when the file is missing or unreadable.
    pub fn validate_file(&self, path: &Path) -> Result<ValidationReport> {
        if !path.exists() {
            return Err(BpaError::file_not_found_with_suggestion(path.to_path_buf()));
        }
        let bytes = std::fs::read(path).map_err(|e| BpaError::io_at(e, path))?;
        let (text, _) = WINDOWS_1252.decode_without_bom_handling(&bytes);

        info!(path = %path.display(), bytes = bytes.len(), "validating submission file");
        let mut report = self.validate_str(&text);
        report.source = Some(path.display().to_string());
        Ok(report)
    }

    /// Validate already-decoded file content
    pub fn validate_str(&self, text: &str) -> ValidationReport {
        let mut report = ValidationReport::default();

        for (index, line) in text.lines().enumerate() {
            let line_number = index + 1;
            report.stats.lines_read += 1;

            if line_number == 1 {
                self.scan_header(line, &mut report);
                continue;
            }

            if line.trim().is_empty() {
                debug!(line = line_number, "skipping blank line");
                report.stats.blank_lines += 1;
                continue;
            }

            if line.starts_with(self.detail_layout.marker) {
                report.stats.detail_records += 1;
                let issues = self.check_line(line, line_number, self.detail_layout);
                if issues.is_empty() {
                    report.stats.valid_details += 1;
                } else {
                    report.stats.invalid_details += 1;
                    debug!(line = line_number, errors = issues.len(), "invalid detail record");
                    report.issues.extend(issues);
                }
                continue;
            }

            let preview: String = line.chars().take(60).collect();
            warn!(line = line_number, "unknown record marker");
            report.issues.push(ValidationIssue::structural(
                Some(line_number),
                format!(
                    "unknown record type (expected marker '{}'), content '{}'",
                    self.detail_layout.marker, preview
                ),
            ));
        }

        if report.stats.lines_read == 0 {
            warn!("empty submission file");
            report
                .issues
                .push(ValidationIssue::structural(None, "file is empty: no header and no records"));
            return report;
        }

        self.check_batch_totals(&mut report);

        info!(
            lines = report.stats.lines_read,
            details = report.stats.detail_records,
            errors = report.error_count(),
            conformant = report.is_conformant(),
            "validation finished"
        );
        report
    }

    fn scan_header(&self, line: &str, report: &mut ValidationReport) {
        if line.trim().is_empty() {
            warn!("header line is empty");
            report
                .issues
                .push(ValidationIssue::structural(Some(1), "critical: the file starts with an empty header line"));
            return;
        }

        report.issues.extend(self.check_line(line, 1, self.header_layout));

        let chars: Vec<char> = line.chars().collect();
        let extract = |name: &str| {
            self.header_layout
                .field(name)
                .and_then(|field| chars.get(field.range()))
                .map(|slice| slice.iter().collect::<String>())
        };

        report.stats.competence = extract("cbc_mvm");
        // An unreadable declared total counts as zero
        report.stats.declared_lines = Some(extract("cbc_lin").and_then(|v| v.parse().ok()).unwrap_or(0));
        report.stats.declared_pages = Some(extract("cbc_flh").and_then(|v| v.parse().ok()).unwrap_or(0));
    }

    fn check_batch_totals(&self, report: &mut ValidationReport) {
        let found = report.stats.detail_records;
        let declared_lines = report.stats.declared_lines.unwrap_or(0);
        let declared_pages = report.stats.declared_pages.unwrap_or(0);

        if found != declared_lines {
            warn!(found, declared = declared_lines, "detail count differs from header");
            report.issues.push(ValidationIssue::consistency(format!(
                "found {} detail records but the header declares {}",
                found, declared_lines
            )));
        }

        let expected_pages = page_count(found);
        if expected_pages != declared_pages {
            warn!(expected = expected_pages, declared = declared_pages, "page count differs from header");
            report.issues.push(ValidationIssue::consistency(format!(
                "computed page count {} (from {} records at 99 per page) differs from the declared {}",
                expected_pages, found, declared_pages
            )));
        }
    }

    /// Validate every field of one line against a layout
    fn check_line(&self, line: &str, line_number: usize, layout: &RecordLayout) -> Vec<ValidationIssue> {
        let chars: Vec<char> = line.chars().collect();
        let mut issues = Vec::new();

        if chars.len() < layout.line_width {
            issues.push(ValidationIssue::structural(
                Some(line_number),
                format!(
                    "{} line has {} characters, expected {}; trailing fields are missing",
                    layout.name,
                    chars.len(),
                    layout.line_width
                ),
            ));
        } else if chars.len() > layout.line_width {
            issues.push(ValidationIssue::structural(
                Some(line_number),
                format!(
                    "{} line has {} characters, expected {}",
                    layout.name,
                    chars.len(),
                    layout.line_width
                ),
            ));
        }

        for field in &layout.fields {
            let Some(slice) = chars.get(field.range()) else {
                issues.push(ValidationIssue::field(
                    line_number,
                    field,
                    format!(
                        "missing, the line ends at position {} but the field spans {}-{}",
                        chars.len(),
                        field.start,
                        field.end
                    ),
                ));
                continue;
            };
            let raw: String = slice.iter().collect();
            if let Some(message) = self.check_field(&raw, field) {
                issues.push(ValidationIssue::field(line_number, field, message));
            }
        }
        issues
    }

    /// First rule violation of one field value, if any
    fn check_field(&self, raw: &str, field: &FieldSpec) -> Option<String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return field.required.then(|| "required field is empty".to_string());
        }

        let processed = match field.kind {
            FieldKind::Alphanumeric => raw.trim_end(),
            FieldKind::Numeric => raw,
        };

        match &field.rule {
            FieldRule::Exact(expected) if raw != *expected => {
                return Some(format!("value '{}' does not match the expected '{}'", raw, expected));
            }
            FieldRule::OneOf(allowed) if !allowed.iter().any(|value| *value == trimmed) => {
                return Some(format!("value '{}' is not one of {:?}", trimmed, allowed));
            }
            FieldRule::Pattern(pattern) if !pattern.is_match(processed) => {
                return Some(format!(
                    "value '{}' does not match the pattern '{}'",
                    processed,
                    pattern.as_str()
                ));
            }
            _ => {}
        }

        if field.kind == FieldKind::Alphanumeric && processed.chars().count() > field.width() {
            return Some(format!(
                "content '{}' exceeds the {} character limit",
                processed,
                field.width()
            ));
        }

        if !trimmed.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        match field.shape {
            FieldShape::Plain => None,
            FieldShape::Date => parse_date(trimmed)
                .is_none()
                .then(|| format!("date '{}' is not a valid AAAAMMDD calendar date", trimmed)),
            FieldShape::Competence => (!self.is_plausible_competence(trimmed))
                .then(|| format!("competence '{}' is not a valid AAAAMM period", trimmed)),
        }
    }

    fn is_plausible_competence(&self, value: &str) -> bool {
        if value.len() != 6 {
            return false;
        }
        let (Ok(year), Ok(month)) = (value[..4].parse::<i32>(), value[4..].parse::<u32>()) else {
            return false;
        };
        (1900..=self.reference_year + COMPETENCE_YEARS_AHEAD).contains(&year) && (1..=12).contains(&month)
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    if value.len() != 8 {
        return None;
    }
    let year = value[..4].parse().ok()?;
    let month = value[4..6].parse().ok()?;
    let day = value[6..].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::{BatchHeader, DestinationIndicator};
    use crate::encoder::{render_batch, render_line};
    use crate::test_support::sample_record;

    fn header(lines: usize, pages: usize) -> BatchHeader {
        BatchHeader {
            competence: "202403".to_string(),
            line_count: lines,
            page_count: pages,
            checksum: 1234,
            responsible_name: "CLINICA EXEMPLO".to_string(),
            responsible_acronym: "CLIN".to_string(),
            responsible_tax_id: "12345678000199".to_string(),
            destination_name: "SECRETARIA MUNICIPAL DE SAUDE".to_string(),
            destination_indicator: DestinationIndicator::Municipal,
            version_tag: "v1.0.0".to_string(),
        }
    }

    fn validator() -> ConformanceValidator {
        ConformanceValidator::new().with_reference_year(2025)
    }

    #[test]
    fn test_encoded_batch_is_conformant() {
        let text = render_batch(&header(2, 1), &[sample_record(), sample_record()]);
        let report = validator().validate_str(&text);
        assert!(report.is_conformant(), "{:?}", report.issues);
        assert_eq!(report.stats.detail_records, 2);
        assert_eq!(report.stats.valid_details, 2);
        assert_eq!(report.stats.competence.as_deref(), Some("202403"));
    }

    #[test]
    fn test_empty_file() {
        let report = validator().validate_str("");
        assert_eq!(report.count_of(IssueKind::Structural), 1);
        assert_eq!(report.stats.lines_read, 0);
    }

    #[test]
    fn test_empty_header_line_is_critical() {
        let report = validator().validate_str("\r\n");
        assert!(report.issues[0].message.contains("empty header"));
    }

    #[test]
    fn test_truncated_line_flags_only_fields_past_the_end() {
        let line: String = render_line(&sample_record()).chars().take(340).collect();
        let text = format!("{}\r\n{}\r\n", render_line(&header(1, 1)), line);
        let report = validator().validate_str(&text);

        let fields: Vec<&str> = report
            .issues_of(IssueKind::FieldConformance)
            .filter_map(|issue| issue.field)
            .collect();
        assert_eq!(fields, vec!["prd_cpf_pcnte", "prd_situacao_rua"]);
        assert_eq!(report.count_of(IssueKind::Structural), 1);
        assert_eq!(report.count_of(IssueKind::BatchConsistency), 0);
        assert_eq!(report.stats.invalid_details, 1);
    }

    #[test]
    fn test_blank_and_unknown_lines() {
        let text = format!(
            "{}\r\n\r\n{}\r\n99 something else\r\n",
            render_line(&header(1, 1)),
            render_line(&sample_record())
        );
        let report = validator().validate_str(&text);
        assert_eq!(report.stats.blank_lines, 1);
        assert_eq!(report.stats.lines_read, 4);
        assert_eq!(report.count_of(IssueKind::Structural), 1);
        assert_eq!(report.issues[0].line, Some(4));
    }

    #[test]
    fn test_batch_totals_mismatch() {
        let text = render_batch(&header(3, 2), &[sample_record()]);
        let report = validator().validate_str(&text);
        assert_eq!(report.count_of(IssueKind::BatchConsistency), 2);
        assert_eq!(report.stats.declared_lines, Some(3));
    }

    #[test]
    fn test_field_rule_order() {
        let v = validator();
        let sex = DETAIL_LAYOUT.field("prd_sexo").unwrap();
        assert!(v.check_field("X", sex).unwrap().contains("not one of"));
        assert!(v.check_field(" ", sex).unwrap().contains("required"));

        let patient = DETAIL_LAYOUT.field("prd_cnspac").unwrap();
        assert!(v.check_field(&" ".repeat(15), patient).is_none());
        assert!(v.check_field("12345678901234A", patient).unwrap().contains("pattern"));

        let origin = DETAIL_LAYOUT.field("prd_org").unwrap();
        assert!(v.check_field("BPX", origin).unwrap().contains("expected"));

        let diagnosis = DETAIL_LAYOUT.field("prd_cid").unwrap();
        assert!(v.check_field("Z00 ", diagnosis).is_none());
        assert!(v.check_field("z00 ", diagnosis).is_some());
    }

    #[test]
    fn test_date_and_competence_shapes() {
        let v = validator();
        let service_date = DETAIL_LAYOUT.field("prd_dtaten").unwrap();
        assert!(v.check_field("20240229", service_date).is_none());
        assert!(v.check_field("20230229", service_date).unwrap().contains("calendar date"));

        let competence = DETAIL_LAYOUT.field("prd_cmp").unwrap();
        assert!(v.check_field("203012", competence).is_none());
        assert!(v.check_field("203101", competence).is_some());
        assert!(v.check_field("189912", competence).is_some());
        assert!(v.check_field("202413", competence).is_some());
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let err = validator()
            .validate_file(Path::new("/nonexistent/PAAPAE.MAR"))
            .unwrap_err();
        assert!(err.is_fatal_io());
    }
}
