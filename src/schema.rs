/*!
 * Layout definitions for BPA-I submission files
 *
 * This module contains the exact positional field definitions for the
 * header line and the individualized production (detail) line. The same
 * descriptors drive the encoder and the conformance validator.
 */

use std::ops::Range;

use lazy_static::lazy_static;
use regex::Regex;

use crate::constants::{
    BATCH_MARKER, DETAIL_LINE_WIDTH, DETAIL_MARKER, HEADER_LINE_WIDTH, HEADER_MARKER, ORIGIN_MARKER,
};

/// Field content kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Digits, zero-padded on the left
    Numeric,
    /// Free text, space-padded on the right and truncated at the declared width
    Alphanumeric,
}

/// Value rule checked by the validator
#[derive(Debug, Clone)]
pub enum FieldRule {
    /// No content rule beyond width
    Any,
    /// The raw field must equal this value
    Exact(&'static str),
    /// The trimmed field must be one of these values
    OneOf(&'static [&'static str]),
    /// The field (right-trimmed for alphanumeric) must fully match
    Pattern(Regex),
}

/// Semantic shape checked after the value rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldShape {
    Plain,
    /// `AAAAMMDD` calendar date
    Date,
    /// `AAAAMM` competence
    Competence,
}

/// A single positional field
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    /// 1-based inclusive start position
    pub start: usize,
    /// 1-based inclusive end position
    pub end: usize,
    pub kind: FieldKind,
    pub rule: FieldRule,
    pub shape: FieldShape,
    pub required: bool,
}

impl FieldSpec {
    fn new(name: &'static str, start: usize, end: usize, kind: FieldKind, required: bool) -> Self {
        Self {
            name,
            start,
            end,
            kind,
            rule: FieldRule::Any,
            shape: FieldShape::Plain,
            required,
        }
    }

    fn numeric(name: &'static str, start: usize, end: usize, required: bool) -> Self {
        let width = end - start + 1;
        Self::new(name, start, end, FieldKind::Numeric, required)
            .with_pattern(&format!(r"^\d{{{}}}$", width))
    }

    fn alpha(name: &'static str, start: usize, end: usize, required: bool) -> Self {
        Self::new(name, start, end, FieldKind::Alphanumeric, required)
    }

    fn exact(mut self, value: &'static str) -> Self {
        self.rule = FieldRule::Exact(value);
        self
    }

    fn one_of(mut self, values: &'static [&'static str]) -> Self {
        self.rule = FieldRule::OneOf(values);
        self
    }

    fn with_pattern(mut self, pattern: &str) -> Self {
        self.rule = FieldRule::Pattern(Regex::new(pattern).expect("invalid layout pattern"));
        self
    }

    fn shaped(mut self, shape: FieldShape) -> Self {
        self.shape = shape;
        self
    }

    /// Declared width in characters
    pub fn width(&self) -> usize {
        self.end - self.start + 1
    }

    /// 0-based half-open character range of this field within a line
    pub fn range(&self) -> Range<usize> {
        (self.start - 1)..self.end
    }
}

/// A complete line layout
#[derive(Debug, Clone)]
pub struct RecordLayout {
    pub name: &'static str,
    /// Two-character line marker found at positions 1-2
    pub marker: &'static str,
    pub line_width: usize,
    pub fields: Vec<FieldSpec>,
}

impl RecordLayout {
    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Field names in positional order
    pub fn column_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.name).collect()
    }

    /// Check that fields tile the line exactly, with no gaps or overlaps
    pub fn is_contiguous(&self) -> bool {
        let mut next = 1;
        for field in &self.fields {
            if field.start != next || field.end < field.start {
                return false;
            }
            next = field.end + 1;
        }
        next == self.line_width + 1
    }
}

lazy_static! {
    /// Header line layout, 130 positions
    pub static ref HEADER_LAYOUT: RecordLayout = RecordLayout {
        name: "header",
        marker: HEADER_MARKER,
        line_width: HEADER_LINE_WIDTH,
        fields: vec![
            FieldSpec::numeric("cbc_hdr_1", 1, 2, true).exact(HEADER_MARKER),
            FieldSpec::alpha("cbc_hdr_2", 3, 7, true).exact(BATCH_MARKER),
            FieldSpec::numeric("cbc_mvm", 8, 13, true).shaped(FieldShape::Competence),
            FieldSpec::numeric("cbc_lin", 14, 19, true),
            FieldSpec::numeric("cbc_flh", 20, 25, true),
            FieldSpec::numeric("cbc_smt_vrf", 26, 29, true),
            FieldSpec::alpha("cbc_rsp", 30, 59, true),
            FieldSpec::alpha("cbc_sgl", 60, 65, true),
            FieldSpec::numeric("cbc_cgccpf", 66, 79, true),
            FieldSpec::alpha("cbc_dst", 80, 119, true),
            FieldSpec::alpha("cbc_dst_in", 120, 120, true).one_of(&["M", "E"]),
            FieldSpec::alpha("cbc_versao", 121, 130, true),
        ],
    };

    /// Individualized production line layout, 350 positions
    pub static ref DETAIL_LAYOUT: RecordLayout = RecordLayout {
        name: "detail",
        marker: DETAIL_MARKER,
        line_width: DETAIL_LINE_WIDTH,
        fields: vec![
            FieldSpec::numeric("prd_ident", 1, 2, true).exact(DETAIL_MARKER),
            FieldSpec::numeric("prd_cnes", 3, 9, true),
            FieldSpec::numeric("prd_cmp", 10, 15, true).shaped(FieldShape::Competence),
            FieldSpec::numeric("prd_cnsmed", 16, 30, true),
            FieldSpec::alpha("prd_cbo", 31, 36, true).with_pattern(r"^[A-Z0-9]{6}$"),
            FieldSpec::numeric("prd_dtaten", 37, 44, true).shaped(FieldShape::Date),
            FieldSpec::numeric("prd_flh", 45, 47, true),
            FieldSpec::numeric("prd_seq", 48, 49, true),
            FieldSpec::numeric("prd_pa", 50, 59, true),
            FieldSpec::numeric("prd_cnspac", 60, 74, false),
            FieldSpec::alpha("prd_sexo", 75, 75, true).one_of(&["M", "F", "I"]),
            FieldSpec::numeric("prd_ibge", 76, 81, true),
            FieldSpec::alpha("prd_cid", 82, 85, true).with_pattern(r"^[A-Z0-9]{3,4}$"),
            FieldSpec::numeric("prd_ldade", 86, 88, true),
            FieldSpec::numeric("prd_qt", 89, 94, true),
            FieldSpec::numeric("prd_caten", 95, 96, false),
            FieldSpec::numeric("prd_naut", 97, 109, false),
            FieldSpec::alpha("prd_org", 110, 112, true).exact(ORIGIN_MARKER),
            FieldSpec::alpha("prd_nmpac", 113, 142, true),
            FieldSpec::numeric("prd_dtnasc", 143, 150, true).shaped(FieldShape::Date),
            FieldSpec::numeric("prd_raca", 151, 152, true),
            FieldSpec::numeric("prd_etnia", 153, 156, false),
            FieldSpec::numeric("prd_nac", 157, 159, false),
            FieldSpec::numeric("prd_srv", 160, 162, false),
            FieldSpec::numeric("prd_clf", 163, 165, false),
            FieldSpec::numeric("prd_equipe_seq", 166, 173, false),
            FieldSpec::numeric("prd_equipe_area", 174, 177, false),
            FieldSpec::numeric("prd_cnpj", 178, 191, false),
            FieldSpec::numeric("prd_cep_pcnte", 192, 199, false),
            FieldSpec::numeric("prd_lograd_pcnte", 200, 202, false),
            FieldSpec::alpha("prd_end_pcnte", 203, 232, false),
            FieldSpec::alpha("prd_compl_pcnte", 233, 242, false),
            FieldSpec::alpha("prd_num_pcnte", 243, 247, false),
            FieldSpec::alpha("prd_bairro_pcnte", 248, 277, false),
            // Phone numbers carry 10 or 11 digits
            FieldSpec::numeric("prd_ddtel_pcnte", 278, 288, false).with_pattern(r"^\d{10,11}$"),
            FieldSpec::alpha("prd_email_pcnte", 289, 328, false),
            FieldSpec::numeric("prd_ine", 329, 338, true),
            FieldSpec::numeric("prd_cpf_pcnte", 339, 349, false),
            FieldSpec::alpha("prd_situacao_rua", 350, 350, false),
        ],
    };
}
