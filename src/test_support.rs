//! Fixtures shared by unit tests

use crate::data_types::{CanonicalRecord, Sex};

/// A fully populated record that encodes and validates cleanly
pub fn sample_record() -> CanonicalRecord {
    CanonicalRecord {
        facility_code: "1234567".to_string(),
        competence: "202403".to_string(),
        provider_cns: "700000000000001".to_string(),
        occupation_code: "223605".to_string(),
        service_date: "20240305".to_string(),
        page: 1,
        sequence: 1,
        procedure_code: "0302050027".to_string(),
        patient_cns: "898000000000002".to_string(),
        sex: Sex::Female,
        municipality_code: "170550".to_string(),
        diagnosis_code: "M638".to_string(),
        age: 33,
        quantity: 1,
        care_type: "01".to_string(),
        authorization_number: String::new(),
        patient_name: "MARIA DA SILVA".to_string(),
        birth_date: "19900615".to_string(),
        race_code: "01".to_string(),
        ethnicity_code: "0000".to_string(),
        nationality: "010".to_string(),
        service_code: "135".to_string(),
        classification_code: "003".to_string(),
        team_sequence: "0".to_string(),
        team_area: "0".to_string(),
        employer_tax_id: "0".to_string(),
        postal_code: "77000000".to_string(),
        address_type: "081".to_string(),
        street: "RUA DAS FLORES".to_string(),
        complement: String::new(),
        address_number: "12".to_string(),
        neighborhood: "CENTRO".to_string(),
        phone: "63999990000".to_string(),
        email: String::new(),
        team_national_id: "0".to_string(),
        patient_tax_id: "0".to_string(),
        homeless_flag: "N".to_string(),
        source_row_id: "L1".to_string(),
        patient_id: Some("P1".to_string()),
        diagnosis_required: true,
    }
}

/// Variation of [`sample_record`] keyed on the sort attributes
pub fn record(provider: &str, date: &str, name: &str, procedure: &str) -> CanonicalRecord {
    CanonicalRecord {
        provider_cns: provider.to_string(),
        service_date: date.to_string(),
        patient_name: name.to_string(),
        procedure_code: procedure.to_string(),
        source_row_id: format!("{}-{}-{}-{}", provider, date, name, procedure),
        ..sample_record()
    }
}
