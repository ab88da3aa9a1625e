//! Document classifier.
//!
//! Scores raw OCR text and a QR-presence flag against the two candidate
//! document types and picks a winner or declares UNKNOWN.
//!
//! ## Scoring
//!
//! | Candidate | Evidence | Points |
//! |-----------|----------|--------|
//! | Aadhaar | QR present | 25 |
//! | Aadhaar | 12-digit or masked number in text | 45 |
//! | Aadhaar | 10 per keyword hit | max 30 |
//! | PAN | ABCDE1234F pattern in upper-cased text | 70 |
//! | PAN | 10 per keyword hit | max 30 |
//!
//! A candidate needs at least 60 points to win. On a tie Aadhaar wins.

use crate::formats::{contains_aadhaar_number, contains_pan};
use crate::types::{ClassificationResult, DocumentType, Signal, MAX_SIGNALS};

/// Keywords suggesting a national-ID (Aadhaar) card. English only.
pub const AADHAAR_KEYWORDS: &[&str] = &[
    "uidai",
    "unique identification",
    "government of india",
    "republic of india",
    "aadhaar",
];

/// Keywords suggesting a tax-ID (PAN) card. English only.
pub const PAN_KEYWORDS: &[&str] = &[
    "income tax department",
    "permanent account number",
    "govt of india",
    "government of india",
    "pan",
];

const QR_POINTS: u32 = 25;
const AADHAAR_NUMBER_POINTS: u32 = 45;
const PAN_PATTERN_POINTS: u32 = 70;
const POINTS_PER_KEYWORD: u32 = 10;
const KEYWORD_CAP: u32 = 30;
const DECISION_THRESHOLD: u32 = 60;

const AADHAAR_EXPLANATION: &str =
    "Classified as Aadhaar-like using QR presence, 12-digit/masked pattern, and keywords.";
const PAN_EXPLANATION: &str = "Classified as PAN-like using PAN regex pattern and keywords.";
const UNKNOWN_EXPLANATION: &str =
    "Insufficient signals to classify confidently as Aadhaar or PAN.";

/// Classify raw document text.
///
/// Deterministic and total: empty text yields UNKNOWN with every score at 0.
pub fn classify(raw_text: &str, qr_present: bool) -> ClassificationResult {
    let normalized = raw_text.to_lowercase();
    let mut signals = Vec::new();

    // National-ID candidate
    let mut aadhaar_score = 0;
    if qr_present {
        aadhaar_score += QR_POINTS;
        signals.push(Signal::QrPresent);
    }
    if contains_aadhaar_number(raw_text) {
        aadhaar_score += AADHAAR_NUMBER_POINTS;
        signals.push(Signal::AadhaarNumberPattern);
    }
    let aadhaar_hits = keyword_hits(AADHAAR_KEYWORDS, &normalized);
    aadhaar_score += keyword_points(aadhaar_hits);
    if aadhaar_hits > 0 {
        signals.push(Signal::AadhaarKeywords);
    }

    // Tax-ID candidate
    let mut pan_score = 0;
    if contains_pan(raw_text) {
        pan_score += PAN_PATTERN_POINTS;
        signals.push(Signal::PanAlphanumPattern);
    }
    let pan_hits = keyword_hits(PAN_KEYWORDS, &normalized);
    pan_score += keyword_points(pan_hits);
    if pan_hits > 0 {
        signals.push(Signal::PanKeywords);
    }

    // Order matters: the Aadhaar branch is checked first so ties go to it.
    let (document_type, confidence, explanation) =
        if aadhaar_score >= DECISION_THRESHOLD && aadhaar_score >= pan_score {
            (DocumentType::AadhaarLikely, aadhaar_score, AADHAAR_EXPLANATION)
        } else if pan_score >= DECISION_THRESHOLD && pan_score > aadhaar_score {
            (DocumentType::PanLikely, pan_score, PAN_EXPLANATION)
        } else {
            (
                DocumentType::Unknown,
                aadhaar_score.max(pan_score),
                UNKNOWN_EXPLANATION,
            )
        };

    signals.sort();
    signals.dedup();
    signals.truncate(MAX_SIGNALS);

    tracing::debug!(
        document_type = %document_type,
        aadhaar_score,
        pan_score,
        "Document classified"
    );

    ClassificationResult {
        document_type,
        confidence_score: clamp_score(confidence),
        signals,
        aadhaar_score,
        pan_score,
        explanation: explanation.to_string(),
    }
}

/// Count distinct keywords found in lower-cased text.
fn keyword_hits(keywords: &[&str], normalized: &str) -> u32 {
    keywords.iter().filter(|k| normalized.contains(*k)).count() as u32
}

fn keyword_points(hits: u32) -> u32 {
    (hits * POINTS_PER_KEYWORD).min(KEYWORD_CAP)
}

pub(crate) fn clamp_score(score: u32) -> u8 {
    score.min(100) as u8
}
