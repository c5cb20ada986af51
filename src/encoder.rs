/*!
 * Fixed-width encoder for BPA-I submission files
 *
 * Renders the batch header and detail records into positional text lines
 * using the layouts in [`crate::schema`], then encodes the result as a
 * single-byte Latin-1 file terminated with CRLF.
 *
 * # Example
 *
 * ```rust
 * use bpa::encoder::format_field;
 * use bpa::schema::DETAIL_LAYOUT;
 *
 * let quantity = DETAIL_LAYOUT.field("prd_qt").unwrap();
 * assert_eq!(format_field("3", quantity), "000003");
 *
 * let name = DETAIL_LAYOUT.field("prd_nmpac").unwrap();
 * assert_eq!(format_field("ANA", name).len(), 30);
 * ```
 */

use std::borrow::Cow;
use std::io::Write;
use std::path::{Path, PathBuf};

use encoding_rs::WINDOWS_1252;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::{BpaError, Result};
use crate::constants::LINE_TERMINATOR;
use crate::data_types::{BatchHeader, CanonicalRecord, Competence};
use crate::schema::{FieldKind, FieldRule, FieldSpec, RecordLayout, DETAIL_LAYOUT, HEADER_LAYOUT};

/// A value that renders as one fixed-width line
pub trait FixedWidthRecord {
    /// Layout describing the line
    fn layout(&self) -> &'static RecordLayout;

    /// Unpadded value of a layout field
    ///
    /// Fields with an exact-value rule take their constant from the layout
    /// and are never asked for.
    fn field_value(&self, field: &str) -> Cow<'_, str>;
}

impl FixedWidthRecord for BatchHeader {
    fn layout(&self) -> &'static RecordLayout {
        &HEADER_LAYOUT
    }

    fn field_value(&self, field: &str) -> Cow<'_, str> {
        match field {
            "cbc_mvm" => Cow::Borrowed(&self.competence),
            "cbc_lin" => Cow::Owned(self.line_count.to_string()),
            "cbc_flh" => Cow::Owned(self.page_count.to_string()),
            "cbc_smt_vrf" => Cow::Owned(self.checksum.to_string()),
            "cbc_rsp" => Cow::Borrowed(&self.responsible_name),
            "cbc_sgl" => Cow::Borrowed(&self.responsible_acronym),
            "cbc_cgccpf" => Cow::Borrowed(&self.responsible_tax_id),
            "cbc_dst" => Cow::Borrowed(&self.destination_name),
            "cbc_dst_in" => Cow::Borrowed(self.destination_indicator.as_code()),
            "cbc_versao" => Cow::Borrowed(&self.version_tag),
            _ => Cow::Borrowed(""),
        }
    }
}

impl FixedWidthRecord for CanonicalRecord {
    fn layout(&self) -> &'static RecordLayout {
        &DETAIL_LAYOUT
    }

    fn field_value(&self, field: &str) -> Cow<'_, str> {
        let value: &str = match field {
            "prd_cnes" => &self.facility_code,
            "prd_cmp" => &self.competence,
            "prd_cnsmed" => &self.provider_cns,
            "prd_cbo" => &self.occupation_code,
            "prd_dtaten" => &self.service_date,
            "prd_flh" => return Cow::Owned(self.page.to_string()),
            "prd_seq" => return Cow::Owned(self.sequence.to_string()),
            "prd_pa" => &self.procedure_code,
            "prd_cnspac" => &self.patient_cns,
            "prd_sexo" => self.sex.as_code(),
            "prd_ibge" => &self.municipality_code,
            "prd_cid" => &self.diagnosis_code,
            "prd_ldade" => return Cow::Owned(self.age.to_string()),
            "prd_qt" => return Cow::Owned(self.quantity.to_string()),
            "prd_caten" => &self.care_type,
            "prd_naut" => &self.authorization_number,
            "prd_nmpac" => &self.patient_name,
            "prd_dtnasc" => &self.birth_date,
            "prd_raca" => &self.race_code,
            "prd_etnia" => &self.ethnicity_code,
            "prd_nac" => &self.nationality,
            "prd_srv" => &self.service_code,
            "prd_clf" => &self.classification_code,
            "prd_equipe_seq" => &self.team_sequence,
            "prd_equipe_area" => &self.team_area,
            "prd_cnpj" => &self.employer_tax_id,
            "prd_cep_pcnte" => &self.postal_code,
            "prd_lograd_pcnte" => &self.address_type,
            "prd_end_pcnte" => &self.street,
            "prd_compl_pcnte" => &self.complement,
            "prd_num_pcnte" => &self.address_number,
            "prd_bairro_pcnte" => &self.neighborhood,
            "prd_ddtel_pcnte" => &self.phone,
            "prd_email_pcnte" => &self.email,
            "prd_ine" => &self.team_national_id,
            "prd_cpf_pcnte" => &self.patient_tax_id,
            "prd_situacao_rua" => &self.homeless_flag,
            _ => "",
        };
        Cow::Borrowed(value)
    }
}

fn is_latin1_printable(c: char) -> bool {
    matches!(c as u32, 0x20..=0x7E | 0xA0..=0xFF)
}

fn replace_unprintable(c: char) -> char {
    if is_latin1_printable(c) {
        c
    } else if c.is_control() {
        ' '
    } else {
        '?'
    }
}

/// Replace characters Latin-1 cannot carry
///
/// Control characters become spaces so a value can never break a line.
pub fn sanitize_latin1(value: &str) -> Cow<'_, str> {
    if value.chars().all(is_latin1_printable) {
        return Cow::Borrowed(value);
    }
    Cow::Owned(value.chars().map(replace_unprintable).collect())
}

/// Pad or truncate one value to its field width
///
/// An empty value renders as spaces for both kinds. Numeric values longer
/// than the field keep their leftmost characters.
pub fn format_field(value: &str, field: &FieldSpec) -> String {
    let width = field.width();
    let sanitized = sanitize_latin1(value);
    let value = sanitized.trim();
    if value.is_empty() {
        return " ".repeat(width);
    }

    let truncated: String = value.chars().take(width).collect();
    match field.kind {
        FieldKind::Numeric => format!("{:0>width$}", truncated, width = width),
        FieldKind::Alphanumeric => format!("{:<width$}", truncated, width = width),
    }
}

/// Render one line without its terminator, padded to the layout width
pub fn render_line<R: FixedWidthRecord + ?Sized>(record: &R) -> String {
    let layout = record.layout();
    let mut line = String::with_capacity(layout.line_width);

    for field in &layout.fields {
        let rendered = match field.rule {
            FieldRule::Exact(constant) => format_field(constant, field),
            _ => format_field(&record.field_value(field.name), field),
        };
        line.push_str(&rendered);
    }

    let rendered_width = line.chars().count();
    if rendered_width < layout.line_width {
        line.extend(std::iter::repeat(' ').take(layout.line_width - rendered_width));
    }
    line
}

/// Render the whole batch as text, one CRLF-terminated line per record
pub fn render_batch(header: &BatchHeader, records: &[CanonicalRecord]) -> String {
    let mut text = String::with_capacity((records.len() + 1) * (DETAIL_LAYOUT.line_width + 2));
    text.push_str(&render_line(header));
    text.push_str(LINE_TERMINATOR);
    for record in records {
        text.push_str(&render_line(record));
        text.push_str(LINE_TERMINATOR);
    }
    text
}

/// Encode text as single-byte Latin-1, keeping line breaks
pub fn to_latin1(text: &str) -> Vec<u8> {
    let text: String = text
        .chars()
        .map(|c| if c == '\r' || c == '\n' { c } else { replace_unprintable(c) })
        .collect();
    let (bytes, _, had_errors) = WINDOWS_1252.encode(&text);
    if had_errors {
        debug!("unmappable characters replaced while encoding");
    }
    bytes.into_owned()
}

/// Encode a batch into the bytes of a submission file
pub fn encode_batch(header: &BatchHeader, records: &[CanonicalRecord]) -> Vec<u8> {
    to_latin1(&render_batch(header, records))
}

/// Submission file path for a competence: the base name with the month extension
///
/// `out/PAAPAE` and `out/PAAPAE.txt` both become `out/PAAPAE.MAR` for March.
pub fn submission_path(base: &Path, competence: Competence) -> PathBuf {
    base.with_extension(competence.month_extension())
}

/// Write bytes to `path` through a temporary file in the same directory
///
/// Either the complete content lands at `path` or nothing does.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut temp = NamedTempFile::new_in(&directory).map_err(|e| BpaError::io_at(e, &directory))?;
    temp.write_all(bytes).map_err(|e| BpaError::io_at(e, temp.path()))?;
    temp.as_file().sync_all().map_err(|e| BpaError::io_at(e, temp.path()))?;
    temp.persist(path).map_err(|e| BpaError::io_at(e.error, path))?;

    info!(path = %path.display(), bytes = bytes.len(), "wrote submission file");
    Ok(())
}
