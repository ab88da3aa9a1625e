//! Prompts for structured field extraction.

use docverify_core::FieldName;

/// System message for every extraction request.
pub const EXTRACTION_SYSTEM_PROMPT: &str =
    "You are a document extraction assistant. Return valid JSON only, no extra text.";

/// Rules appended after the field list.
const EXTRACTION_RULES: &str = r#"Rules:
- If a field is not present, use null.
- Aadhaar number may be masked like XXXX XXXX 1234; return it as seen.
- PAN format is ABCDE1234F."#;

/// Build the user message asking for the eight known fields.
pub fn build_extraction_prompt(ocr_text: &str) -> String {
    let fields = FieldName::ALL
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Extract fields from this Indian identity document text. Return ONLY valid JSON.\n\n\
         Fields:\n{fields}\n\n\
         {EXTRACTION_RULES}\n\n\
         Text:\n{ocr_text}\n\n\
         JSON:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_lists_every_field() {
        let prompt = build_extraction_prompt("INCOME TAX DEPARTMENT");
        for field in FieldName::ALL {
            assert!(prompt.contains(field.as_str()), "missing {}", field);
        }
        assert!(prompt.contains("INCOME TAX DEPARTMENT"));
        assert!(prompt.trim_end().ends_with("JSON:"));
    }

    #[test]
    fn test_prompt_mentions_masking_rule() {
        let prompt = build_extraction_prompt("x");
        assert!(prompt.contains("XXXX XXXX 1234"));
        assert!(prompt.contains("use null"));
    }
}
