//! Provider for OpenAI-compatible chat completion endpoints.
//!
//! Groq is the default deployment. The same wire format serves OpenAI and
//! any self-hosted server that speaks `/chat/completions`.
//!
//! Network calls need the `openai-compatible` feature (enabled by `groq`).
//! Without it the provider still builds, and every completion fails with
//! [`ProviderError::NotConfigured`].

use super::{
    factory::ProviderFactory,
    secrets::{ApiCredential, CredentialSource},
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, TokenUsage,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Client for one OpenAI-compatible endpoint.
///
/// The HTTP client is built on first use and shared by every request
/// through this instance.
pub struct OpenAiCompatibleProvider {
    name: &'static str,
    credential: ApiCredential,
    base_url: String,
    #[cfg(feature = "openai-compatible")]
    client: tokio::sync::OnceCell<reqwest::Client>,
}

impl std::fmt::Debug for OpenAiCompatibleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleProvider")
            .field("name", &self.name)
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiCompatibleProvider {
    /// Groq provider with an explicit key.
    pub fn groq(api_key: impl Into<String>) -> Self {
        Self::with_credential(
            "groq",
            ApiCredential::new(api_key, CredentialSource::Programmatic, "Groq API key"),
            GROQ_BASE_URL,
        )
    }

    pub fn with_credential(
        name: &'static str,
        credential: ApiCredential,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            name,
            credential,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            #[cfg(feature = "openai-compatible")]
            client: tokio::sync::OnceCell::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[cfg(feature = "openai-compatible")]
    async fn client(&self) -> Result<&reqwest::Client, ProviderError> {
        self.client
            .get_or_try_init(|| async {
                reqwest::Client::builder()
                    .build()
                    .map_err(|e| ProviderError::HttpError(e.to_string()))
            })
            .await
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    model: String,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

fn build_request<'a>(messages: &'a [ChatMessage], config: &'a CompletionConfig) -> ChatRequest<'a> {
    ChatRequest {
        model: &config.model,
        messages,
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        response_format: config.json_mode.then_some(ResponseFormat {
            kind: "json_object",
        }),
    }
}

fn parse_response(body: &str) -> Result<CompletionResponse, ProviderError> {
    let body: ChatResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::ParseError(e.to_string()))?;

    let choice = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::ParseError("response has no choices".to_string()))?;

    let usage = body
        .usage
        .map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        })
        .unwrap_or_default();

    Ok(CompletionResponse {
        content: choice.message.content.unwrap_or_default(),
        usage,
        model: body.model,
        stop_reason: choice.finish_reason,
    })
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.chars().take(200).collect())
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    #[cfg(feature = "openai-compatible")]
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        use std::time::Duration;

        let client = self.client().await?;
        let request = build_request(&messages, config);

        // Only expose the credential here, at the point of use
        let response = client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.credential.expose())
            .timeout(config.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(config.timeout)
                } else {
                    ProviderError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ProviderError::RateLimited { retry_after });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::HttpError(e.to_string()))?;

        if !status.is_success() {
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        parse_response(&body)
    }

    #[cfg(not(feature = "openai-compatible"))]
    async fn complete(
        &self,
        _messages: Vec<ChatMessage>,
        _config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        Err(ProviderError::NotConfigured(format!(
            "{} provider requires the 'openai-compatible' feature",
            self.name
        )))
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Factory for one named OpenAI-compatible endpoint.
///
/// ## Configuration Format
/// ```json
/// {
///   "api_key": "gsk_...",          // Optional, falls back to the env variable
///   "base_url": "https://..."      // Optional, defaults per endpoint
/// }
/// ```
pub struct OpenAiCompatibleProviderFactory {
    provider_type: &'static str,
    default_base_url: &'static str,
    env_var: &'static str,
    credential_name: &'static str,
}

impl OpenAiCompatibleProviderFactory {
    pub fn groq() -> Self {
        Self {
            provider_type: "groq",
            default_base_url: GROQ_BASE_URL,
            env_var: crate::config::API_KEY_ENV,
            credential_name: "Groq API key",
        }
    }

    pub fn openai() -> Self {
        Self {
            provider_type: "openai",
            default_base_url: OPENAI_BASE_URL,
            env_var: "OPENAI_API_KEY",
            credential_name: "OpenAI API key",
        }
    }

    /// Endpoint from `config["base_url"]`, or this provider's default.
    pub fn resolve_base_url<'a>(&self, config: &'a JsonValue) -> &'a str {
        config["base_url"].as_str().unwrap_or(self.default_base_url)
    }
}

impl ProviderFactory for OpenAiCompatibleProviderFactory {
    fn provider_type(&self) -> &'static str {
        self.provider_type
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let credential = ApiCredential::from_config_or_env(
            config,
            "api_key",
            self.env_var,
            self.credential_name,
        )?;
        let base_url = self.resolve_base_url(config);

        Ok(Arc::new(OpenAiCompatibleProvider::with_credential(
            self.provider_type,
            credential,
            base_url,
        )))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if !ApiCredential::is_available(config, "api_key", self.env_var) {
            return Err(ProviderError::NotConfigured(format!(
                "{} required: set 'api_key' in config or {} env",
                self.credential_name, self.env_var
            )));
        }

        if let Some(url) = config["base_url"].as_str() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ProviderError::NotConfigured(
                    "base_url must start with http:// or https://".to_string(),
                ));
            }
        }

        Ok(())
    }

    fn description(&self) -> &'static str {
        "OpenAI-compatible chat completions endpoint"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let messages = vec![ChatMessage::system("sys"), ChatMessage::user("text")];
        let config = CompletionConfig::default();

        let json = serde_json::to_value(build_request(&messages, &config)).unwrap();
        assert_eq!(json["model"], "llama-3.3-70b-versatile");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "text");
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["max_tokens"], 800);
    }

    #[test]
    fn test_request_without_json_mode() {
        let messages = vec![ChatMessage::user("text")];
        let config = CompletionConfig {
            json_mode: false,
            ..Default::default()
        };

        let json = serde_json::to_value(build_request(&messages, &config)).unwrap();
        assert!(json.get("response_format").is_none());
    }

    #[test]
    fn test_parse_response() {
        let body = r#"{
            "model": "llama-3.3-70b-versatile",
            "choices": [{"message": {"role": "assistant", "content": "{\"name\": \"A\"}"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 120, "completion_tokens": 30, "total_tokens": 150}
        }"#;

        let response = parse_response(body).unwrap();
        assert_eq!(response.content, r#"{"name": "A"}"#);
        assert_eq!(response.usage.total(), 150);
        assert_eq!(response.stop_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_parse_response_without_choices() {
        let result = parse_response(r#"{"choices": []}"#);
        assert!(matches!(result, Err(ProviderError::ParseError(_))));
    }

    #[test]
    fn test_error_message_falls_back_to_body() {
        assert_eq!(
            error_message(r#"{"error": {"message": "Invalid API Key"}}"#),
            "Invalid API Key"
        );
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn test_factory_create_with_api_key() {
        let factory = OpenAiCompatibleProviderFactory::groq();
        let config = serde_json::json!({
            "api_key": "gsk_test",
            "base_url": "https://proxy.internal/v1/"
        });

        let provider = factory.create(&config).unwrap();
        assert_eq!(provider.name(), "groq");
    }

    #[test]
    fn test_openai_config_resolves_openai_endpoint() {
        let config = crate::config::RuntimeConfig::from_yaml("llm:\n  provider: openai\n").unwrap();
        let provider_json = config.llm.provider_json();

        let factory = OpenAiCompatibleProviderFactory::openai();
        assert_eq!(factory.resolve_base_url(&provider_json), OPENAI_BASE_URL);

        let default_config = crate::config::RuntimeConfig::default();
        let groq = OpenAiCompatibleProviderFactory::groq();
        assert_eq!(groq.resolve_base_url(&default_config.llm.provider_json()), GROQ_BASE_URL);
    }

    #[test]
    fn test_factory_validate_invalid_base_url() {
        let factory = OpenAiCompatibleProviderFactory::groq();
        let config = serde_json::json!({
            "api_key": "gsk_test",
            "base_url": "invalid-url"
        });
        assert!(factory.validate_config(&config).is_err());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let provider = OpenAiCompatibleProvider::with_credential(
            "groq",
            ApiCredential::new("k", CredentialSource::Programmatic, "Groq API key"),
            "https://api.groq.com/openai/v1/",
        );
        assert_eq!(provider.base_url(), GROQ_BASE_URL);
    }

    #[test]
    fn test_api_key_not_in_debug_output() {
        let secret_key = "gsk_super_secret_key_12345";
        let provider = OpenAiCompatibleProvider::groq(secret_key);

        let debug_output = format!("{:?}", provider);
        assert!(!debug_output.contains(secret_key));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn test_health_check_requires_key() {
        assert!(OpenAiCompatibleProvider::groq("gsk_key").health_check().await);
        assert!(!OpenAiCompatibleProvider::groq("").health_check().await);
    }
}
