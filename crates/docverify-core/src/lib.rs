//! # docverify-core
//!
//! Deterministic classification and plausibility scoring for identity
//! document images that have already been through OCR and field extraction.
//!
//! This crate answers two questions:
//! - Which kind of document is this (Aadhaar-like, PAN-like, or unknown)?
//! - Are the extracted fields internally plausible for that kind?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same input always produces same output
//! 2. **No I/O**: No OCR, no LLM calls, no storage
//! 3. **Explainable**: Every score carries signals or reason codes
//! 4. **Parallel-safe**: Stateless functions, safe to call concurrently
//!
//! Plausibility is not authenticity. Nothing here proves a document is
//! genuine.
//!
//! ## Example
//!
//! ```rust
//! use docverify_core::{assess, DocumentType, FieldName, FieldSet, Verdict};
//!
//! let text = "INCOME TAX DEPARTMENT\nPermanent Account Number\nABCDE1234F";
//! let fields = FieldSet::empty()
//!     .with(FieldName::Name, "A")
//!     .with(FieldName::DateOfBirth, "01/01/1990")
//!     .with(FieldName::Address, "X")
//!     .with(FieldName::PanNumber, "ABCDE1234F");
//!
//! let assessment = assess(text, false, &fields);
//! assert_eq!(assessment.classification.document_type, DocumentType::PanLikely);
//! assert_eq!(assessment.validation.verdict, Verdict::PassPlausibility);
//! ```

pub mod classifier;
pub mod fields;
pub mod formats;
pub mod types;
pub mod validator;

// Re-export main types at crate root
pub use classifier::classify;
pub use fields::{FieldName, FieldSet, FieldSetError};
pub use types::{
    ClassificationResult, DocumentType, ReasonCode, Signal, ValidationResult, Verdict,
    DISCLAIMER,
};
pub use validator::validate;

use serde::{Deserialize, Serialize};

/// Classification and validation of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    pub classification: ClassificationResult,
    pub validation: ValidationResult,
}

/// Classify raw text, then validate fields against the winning type.
///
/// The two steps never call each other; this only wires the classifier's
/// document type into the validator.
pub fn assess(raw_text: &str, qr_present: bool, fields: &FieldSet) -> Assessment {
    let classification = classify(raw_text, qr_present);
    let validation = validate(classification.document_type, fields);
    Assessment {
        classification,
        validation,
    }
}
