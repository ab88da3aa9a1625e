//! Result types shared by the classifier, the validator, and the runtime.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::fields::FieldName;

/// Advisory attached to every validation result.
pub const DISCLAIMER: &str =
    "Plausibility checks only. Legal authenticity requires issuer/registry verification.";

/// Maximum number of signals reported by the classifier.
pub const MAX_SIGNALS: usize = 10;

/// Maximum number of reason codes reported by the validator.
pub const MAX_REASON_CODES: usize = 10;

/// Classified document type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    /// National-ID-like (Aadhaar)
    AadhaarLikely,

    /// Tax-ID-like (PAN)
    PanLikely,

    /// Neither candidate reached a decision
    Unknown,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::AadhaarLikely => "AADHAAR_LIKELY",
            DocumentType::PanLikely => "PAN_LIKELY",
            DocumentType::Unknown => "UNKNOWN",
        }
    }

    /// Whether this is one of the two positive outcomes.
    pub fn is_known(&self) -> bool {
        !matches!(self, DocumentType::Unknown)
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AADHAAR_LIKELY" | "AADHAAR" => Ok(DocumentType::AadhaarLikely),
            "PAN_LIKELY" | "PAN" => Ok(DocumentType::PanLikely),
            "UNKNOWN" => Ok(DocumentType::Unknown),
            other => Err(format!(
                "unknown document type '{}' (expected AADHAAR_LIKELY, PAN_LIKELY or UNKNOWN)",
                other
            )),
        }
    }
}

/// A tag naming one factor that contributed to a classification score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    QrPresent,
    AadhaarNumberPattern,
    AadhaarKeywords,
    PanAlphanumPattern,
    PanKeywords,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::QrPresent => "QR_PRESENT",
            Signal::AadhaarNumberPattern => "AADHAAR_NUMBER_PATTERN",
            Signal::AadhaarKeywords => "AADHAAR_KEYWORDS",
            Signal::PanAlphanumPattern => "PAN_ALPHANUM_PATTERN",
            Signal::PanKeywords => "PAN_KEYWORDS",
        }
    }
}

// Signals are reported in tag-name order.
impl Ord for Signal {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl PartialOrd for Signal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of classifying raw document text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Winning document type, or UNKNOWN
    pub document_type: DocumentType,

    /// Confidence 0-100. For UNKNOWN this is the best raw score, shown for
    /// display only.
    pub confidence_score: u8,

    /// Contributing factors, deduplicated and sorted
    pub signals: Vec<Signal>,

    /// Raw national-ID candidate score
    pub aadhaar_score: u32,

    /// Raw tax-ID candidate score
    pub pan_score: u32,

    /// Human-readable explanation
    pub explanation: String,
}

/// Plausibility verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    PassPlausibility,
    NeedsReview,
    FailPlausibility,
}

impl Verdict {
    /// Map a score onto the verdict thresholds.
    pub fn from_score(score: u32) -> Self {
        if score >= 75 {
            Verdict::PassPlausibility
        } else if score >= 45 {
            Verdict::NeedsReview
        } else {
            Verdict::FailPlausibility
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::PassPlausibility => "PASS_PLAUSIBILITY",
            Verdict::NeedsReview => "NEEDS_REVIEW",
            Verdict::FailPlausibility => "FAIL_PLAUSIBILITY",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a plausibility check did not contribute to the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    MissingName,
    DobFormatSuspect,
    MissingAddress,
    PanFormatSuspect,
    AadhaarFormatSuspect,
    DocTypeUnknown,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::MissingName => "MISSING_NAME",
            ReasonCode::DobFormatSuspect => "DOB_FORMAT_SUSPECT",
            ReasonCode::MissingAddress => "MISSING_ADDRESS",
            ReasonCode::PanFormatSuspect => "PAN_FORMAT_SUSPECT",
            ReasonCode::AadhaarFormatSuspect => "AADHAAR_FORMAT_SUSPECT",
            ReasonCode::DocTypeUnknown => "DOC_TYPE_UNKNOWN",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of plausibility validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub verdict: Verdict,

    /// Sum of check contributions, clamped to 100
    pub score: u8,

    /// In the order the checks ran
    pub reason_codes: Vec<ReasonCode>,

    /// Subset of {name, date_of_birth} that is absent
    pub missing_required_fields: Vec<FieldName>,

    /// Check name -> passed
    pub checks: BTreeMap<String, bool>,

    pub disclaimer: String,
}

impl ValidationResult {
    /// Number of checks that passed.
    pub fn checks_passed(&self) -> usize {
        self.checks.values().filter(|passed| **passed).count()
    }
}
