//! Structured field extraction through an LLM provider.

use std::sync::Arc;

use async_trait::async_trait;

use docverify_core::FieldSet;

use super::FieldExtractor;
use crate::prompts::{build_extraction_prompt, EXTRACTION_SYSTEM_PROMPT};
use crate::providers::{ChatMessage, CompletionConfig, LlmProvider};

/// Asks an LLM for the eight known fields and validates its reply.
///
/// Every failure path returns [`FieldSet::empty`]. Without a provider
/// (for example, no API key configured) no call is made at all.
pub struct LlmFieldExtractor {
    provider: Option<Arc<dyn LlmProvider>>,
    completion: CompletionConfig,
}

impl LlmFieldExtractor {
    pub fn new(provider: Arc<dyn LlmProvider>, completion: CompletionConfig) -> Self {
        Self {
            provider: Some(provider),
            completion,
        }
    }

    /// An extractor with no backend. Always returns an empty record.
    pub fn unavailable() -> Self {
        Self {
            provider: None,
            completion: CompletionConfig::default(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.provider.is_some()
    }
}

impl std::fmt::Debug for LlmFieldExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmFieldExtractor")
            .field("provider", &self.provider.as_ref().map(|p| p.name().to_string()))
            .field("model", &self.completion.model)
            .finish()
    }
}

/// Strip a Markdown code fence some models wrap around JSON.
fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[async_trait]
impl FieldExtractor for LlmFieldExtractor {
    async fn extract_fields(&self, text: &str) -> FieldSet {
        let Some(provider) = &self.provider else {
            tracing::warn!("No LLM provider configured, returning empty fields");
            return FieldSet::empty();
        };

        if text.trim().is_empty() {
            tracing::warn!("Empty OCR text, returning empty fields");
            return FieldSet::empty();
        }

        let messages = vec![
            ChatMessage::system(EXTRACTION_SYSTEM_PROMPT),
            ChatMessage::user(build_extraction_prompt(text)),
        ];

        let response = match provider.complete(messages, &self.completion).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(provider = provider.name(), error = %e, "LLM extraction failed");
                return FieldSet::empty();
            }
        };

        let reply = strip_code_fence(&response.content);
        if reply.is_empty() {
            tracing::warn!(provider = provider.name(), "Empty LLM response");
            return FieldSet::empty();
        }

        match FieldSet::from_json_str(reply) {
            Ok(fields) => {
                tracing::debug!(
                    provider = provider.name(),
                    present = fields.present_count(),
                    tokens = response.usage.total(),
                    "Fields extracted"
                );
                fields
            }
            Err(e) => {
                tracing::error!(provider = provider.name(), error = %e, "LLM reply rejected");
                FieldSet::empty()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{CompletionResponse, ProviderError, TokenUsage};
    use docverify_core::FieldName;
    use parking_lot::Mutex;

    struct ScriptedProvider {
        reply: Result<String, ()>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedProvider {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn complete(
            &self,
            messages: Vec<ChatMessage>,
            _config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            self.seen.lock().push(messages);
            match &self.reply {
                Ok(content) => Ok(CompletionResponse {
                    content: content.clone(),
                    usage: TokenUsage::default(),
                    model: "scripted".to_string(),
                    stop_reason: Some("stop".to_string()),
                }),
                Err(()) => Err(ProviderError::ApiError {
                    status: 401,
                    message: "Invalid API Key".to_string(),
                }),
            }
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn test_valid_reply_is_normalized() {
        let provider = ScriptedProvider::replying(
            r#"{"name": "  Ravi Kumar ", "pan_number": "ABCDE1234F", "gender": "", "extra": 1}"#,
        );
        let extractor = LlmFieldExtractor::new(provider.clone(), CompletionConfig::default());

        let fields = extractor.extract_fields("INCOME TAX DEPARTMENT").await;
        assert_eq!(fields.get(FieldName::Name), Some("Ravi Kumar"));
        assert_eq!(fields.get(FieldName::PanNumber), Some("ABCDE1234F"));
        assert!(!fields.has(FieldName::Gender));

        let seen = provider.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0][0].content, EXTRACTION_SYSTEM_PROMPT);
        assert!(seen[0][1].content.contains("INCOME TAX DEPARTMENT"));
    }

    #[tokio::test]
    async fn test_fenced_reply_is_accepted() {
        let provider = ScriptedProvider::replying("```json\n{\"name\": \"Asha\"}\n```");
        let extractor = LlmFieldExtractor::new(provider, CompletionConfig::default());

        let fields = extractor.extract_fields("text").await;
        assert_eq!(fields.get(FieldName::Name), Some("Asha"));
    }

    #[tokio::test]
    async fn test_invalid_reply_yields_empty() {
        for reply in ["not json", "[1, 2]", r#"{"name": {"first": "A"}}"#, "   "] {
            let extractor =
                LlmFieldExtractor::new(ScriptedProvider::replying(reply), CompletionConfig::default());
            assert!(extractor.extract_fields("text").await.is_empty(), "{}", reply);
        }
    }

    #[tokio::test]
    async fn test_provider_error_yields_empty() {
        let extractor =
            LlmFieldExtractor::new(ScriptedProvider::failing(), CompletionConfig::default());
        assert!(extractor.extract_fields("text").await.is_empty());
    }

    #[tokio::test]
    async fn test_blank_text_skips_provider() {
        let provider = ScriptedProvider::replying(r#"{"name": "A"}"#);
        let extractor = LlmFieldExtractor::new(provider.clone(), CompletionConfig::default());

        assert!(extractor.extract_fields("  \n ").await.is_empty());
        assert!(provider.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_extractor() {
        let extractor = LlmFieldExtractor::unavailable();
        assert!(!extractor.is_available());
        assert!(extractor.extract_fields("text").await.is_empty());
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("{}"), "{}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence(" ```json{\"a\":1}``` "), "{\"a\":1}");
    }
}
