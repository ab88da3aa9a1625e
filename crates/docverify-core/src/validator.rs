//! Plausibility validator.
//!
//! Scores extracted fields against shared and type-specific rules. Each
//! check contributes independently; the total is clamped to 100.
//!
//! | Check | Applies to | Points | Reason code when failed |
//! |-------|------------|--------|-------------------------|
//! | name present | all | 15 | `MISSING_NAME` |
//! | DOB format | all | 15 | `DOB_FORMAT_SUSPECT` |
//! | address present | all | 10 | `MISSING_ADDRESS` |
//! | PAN format | PAN | 40 | `PAN_FORMAT_SUSPECT` |
//! | father's name present | PAN | 5 | none |
//! | Aadhaar format | Aadhaar | 40 | `AADHAAR_FORMAT_SUSPECT` |
//! | gender present | Aadhaar | 5 | none |
//! | name and DOB both valid | UNKNOWN | 15 | `DOC_TYPE_UNKNOWN` (always) |
//!
//! This is not legal authentication.

use std::collections::BTreeMap;

use crate::classifier::clamp_score;
use crate::fields::{FieldName, FieldSet};
use crate::formats::{is_valid_aadhaar, is_valid_dob, is_valid_pan};
use crate::types::{
    DocumentType, ReasonCode, ValidationResult, Verdict, DISCLAIMER, MAX_REASON_CODES,
};

/// Fields whose absence is always reported, regardless of score.
pub const REQUIRED_FIELDS: [FieldName; 2] = [FieldName::Name, FieldName::DateOfBirth];

/// Check names as they appear in `ValidationResult::checks`.
pub mod checks {
    pub const NAME_PRESENT: &str = "name_present";
    pub const DOB_FORMAT_OK: &str = "dob_format_ok";
    pub const ADDRESS_PRESENT: &str = "address_present";
    pub const PAN_FORMAT_OK: &str = "pan_format_ok";
    pub const FATHER_NAME_PRESENT: &str = "father_name_present";
    pub const AADHAAR_FORMAT_OK: &str = "aadhaar_format_ok";
    pub const GENDER_PRESENT: &str = "gender_present";
}

/// Accumulates check outcomes for one validation run.
struct Scorecard {
    score: u32,
    reason_codes: Vec<ReasonCode>,
    checks: BTreeMap<String, bool>,
}

impl Scorecard {
    fn new() -> Self {
        Self {
            score: 0,
            reason_codes: Vec::new(),
            checks: BTreeMap::new(),
        }
    }

    /// Record a check. `reason` is appended only when the check fails.
    fn check(&mut self, name: &str, passed: bool, points: u32, reason: Option<ReasonCode>) {
        self.checks.insert(name.to_string(), passed);
        if passed {
            self.score += points;
        } else if let Some(code) = reason {
            self.reason_codes.push(code);
        }
    }
}

/// Validate extracted fields for the given document type.
///
/// Deterministic and total: absent fields simply fail their checks.
pub fn validate(document_type: DocumentType, fields: &FieldSet) -> ValidationResult {
    let mut card = Scorecard::new();

    let name_present = fields.has(FieldName::Name);
    let dob_ok = is_valid_dob(fields.get(FieldName::DateOfBirth));

    card.check(checks::NAME_PRESENT, name_present, 15, Some(ReasonCode::MissingName));
    card.check(checks::DOB_FORMAT_OK, dob_ok, 15, Some(ReasonCode::DobFormatSuspect));
    card.check(
        checks::ADDRESS_PRESENT,
        fields.has(FieldName::Address),
        10,
        Some(ReasonCode::MissingAddress),
    );

    match document_type {
        DocumentType::PanLikely => {
            let pan = fields
                .get(FieldName::PanNumber)
                .or_else(|| fields.get(FieldName::IdNumber));
            card.check(
                checks::PAN_FORMAT_OK,
                is_valid_pan(pan),
                40,
                Some(ReasonCode::PanFormatSuspect),
            );
            card.check(
                checks::FATHER_NAME_PRESENT,
                fields.has(FieldName::FatherName),
                5,
                None,
            );
        }
        DocumentType::AadhaarLikely => {
            let aadhaar = fields
                .get(FieldName::AadhaarNumber)
                .or_else(|| fields.get(FieldName::IdNumber));
            card.check(
                checks::AADHAAR_FORMAT_OK,
                is_valid_aadhaar(aadhaar),
                40,
                Some(ReasonCode::AadhaarFormatSuspect),
            );
            card.check(
                checks::GENDER_PRESENT,
                fields.has(FieldName::Gender),
                5,
                None,
            );
        }
        DocumentType::Unknown => {
            // Unknown documents need a stronger baseline.
            if name_present && dob_ok {
                card.score += 15;
            }
            card.reason_codes.push(ReasonCode::DocTypeUnknown);
        }
    }

    let verdict = Verdict::from_score(card.score);
    let missing_required_fields = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|f| !fields.has(*f))
        .collect();

    card.reason_codes.truncate(MAX_REASON_CODES);

    tracing::debug!(
        document_type = %document_type,
        score = card.score,
        verdict = %verdict,
        "Plausibility validated"
    );

    ValidationResult {
        verdict,
        score: clamp_score(card.score),
        reason_codes: card.reason_codes,
        missing_required_fields,
        checks: card.checks,
        disclaimer: DISCLAIMER.to_string(),
    }
}
