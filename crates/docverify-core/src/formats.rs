//! Format predicates for identity-document fields.
//!
//! These patterns are shared by the classifier (searching raw OCR text) and
//! the validator (checking individual extracted fields). Every predicate is
//! total: empty or absent input is simply "not valid".

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // =========================================================================
    // DOCUMENT NUMBER PATTERNS
    // =========================================================================

    /// Tax-ID (PAN) shape: five letters, four digits, one letter (ABCDE1234F).
    /// Matched against upper-cased input.
    pub static ref PAN_PATTERN: Regex = Regex::new(
        r"\b[A-Z]{5}\d{4}[A-Z]\b"
    ).unwrap();

    /// Full national-ID (Aadhaar) number grouped 4-4-4 (1234 5678 9012).
    pub static ref AADHAAR_FULL_PATTERN: Regex = Regex::new(
        r"\b\d{4}\s?\d{4}\s?\d{4}\b"
    ).unwrap();

    /// Masked national-ID number (XXXX XXXX 1234), mask letter in any case.
    pub static ref AADHAAR_MASKED_PATTERN: Regex = Regex::new(
        r"(?i)\bX{4}\s?X{4}\s?\d{4}\b"
    ).unwrap();

    /// Anything that is not a decimal digit, in the same Unicode sense as `\d`.
    static ref NON_DIGIT: Regex = Regex::new(r"\D").unwrap();

    // =========================================================================
    // DATE PATTERNS
    // =========================================================================

    /// DD/MM/YYYY or DD-MM-YYYY (01/01/1998).
    static ref DOB_FOUR_DIGIT_YEAR: Regex = Regex::new(
        r"\b\d{2}[-/]\d{2}[-/]\d{4}\b"
    ).unwrap();

    /// DD/MM/YY or DD-MM-YY (01/01/98).
    static ref DOB_TWO_DIGIT_YEAR: Regex = Regex::new(
        r"\b\d{2}[-/]\d{2}[-/]\d{2}\b"
    ).unwrap();
}

/// Number of digits in a full national-ID number.
const AADHAAR_DIGITS: usize = 12;

/// Check whether a date-of-birth value has a plausible DD/MM/YYYY shape.
///
/// Only the shape is checked; "31/13/1998" passes.
pub fn is_valid_dob(value: Option<&str>) -> bool {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return false;
    };
    DOB_FOUR_DIGIT_YEAR.is_match(value) || DOB_TWO_DIGIT_YEAR.is_match(value)
}

/// Check whether a value contains a tax-ID number, ignoring case.
pub fn is_valid_pan(value: Option<&str>) -> bool {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return false;
    };
    contains_pan(value)
}

/// Check whether a value carries a national-ID number.
///
/// Accepts the masked form, the grouped 12-digit form, or any value that
/// is exactly 12 digits once separators and noise are stripped.
pub fn is_valid_aadhaar(value: Option<&str>) -> bool {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return false;
    };
    if contains_aadhaar_number(value) {
        return true;
    }
    NON_DIGIT.replace_all(value, "").chars().count() == AADHAAR_DIGITS
}

/// Check if text contains a tax-ID pattern anywhere (case-insensitive).
pub fn contains_pan(text: &str) -> bool {
    PAN_PATTERN.is_match(&text.to_uppercase())
}

/// Check if text contains a full or masked national-ID number anywhere.
pub fn contains_aadhaar_number(text: &str) -> bool {
    AADHAAR_MASKED_PATTERN.is_match(text) || AADHAAR_FULL_PATTERN.is_match(text)
}
