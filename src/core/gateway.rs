//! Contract with the external text-completion service, plus the Gemini client.

use crate::config::AppConfig;
use async_trait::async_trait;
use di::{Ref, injectable};
use log::{debug, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Phrases the model uses when it drops out of character. Removed wherever they appear.
///
/// This is a heuristic clean-up pass, it does not guarantee the persona holds.
pub const BREAK_OF_CHARACTER_PHRASES: [&str; 2] = ["I understand", "I'll try"];

/// Header carrying the API key. Request URLs show up in reqwest error text, the key must not.
const API_KEY_HEADER: &str = "x-goog-api-key";

pub const PERSONA_TEMPERATURE: f32 = 0.8;
pub const PERSONA_MAX_OUTPUT_TOKENS: u32 = 250;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("completion service is not configured: {0}")]
    NotConfigured(&'static str),

    #[error("completion request failed: {0}")]
    Transport(String),

    #[error("completion service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("completion service returned no text")]
    EmptyResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmCategory {
    HarmCategoryHarassment,
    HarmCategoryHateSpeech,
    HarmCategorySexuallyExplicit,
    HarmCategoryDangerousContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockThreshold {
    BlockNone,
    BlockOnlyHigh,
    BlockMediumAndAbove,
    BlockLowAndAbove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SafetyOverride {
    pub category: HarmCategory,
    pub threshold: BlockThreshold,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub safety_overrides: Vec<SafetyOverride>,
}

impl GenerationRequest {
    /// Settings used for in-character replies: a bit of creativity, short answers and
    /// no content blocking.
    pub fn persona(prompt: String) -> Self {
        let safety_overrides = [
            HarmCategory::HarmCategoryHarassment,
            HarmCategory::HarmCategoryHateSpeech,
            HarmCategory::HarmCategorySexuallyExplicit,
            HarmCategory::HarmCategoryDangerousContent,
        ]
        .into_iter()
        .map(|category| SafetyOverride {
            category,
            threshold: BlockThreshold::BlockNone,
        })
        .collect();

        GenerationRequest {
            prompt,
            temperature: PERSONA_TEMPERATURE,
            max_output_tokens: PERSONA_MAX_OUTPUT_TOKENS,
            safety_overrides,
        }
    }
}

#[async_trait]
pub trait GenerationGateway: Send + Sync {
    /// One raw completion call. No retries.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;

    /// Completion with the reply cleaned up and ready to store.
    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let raw = self.generate(request).await?;
        let text = scrub_reply(&raw);

        if text.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }

        Ok(text)
    }
}

/// Deletes every [`BREAK_OF_CHARACTER_PHRASES`] occurrence and trims the result.
pub fn scrub_reply(raw: &str) -> String {
    let mut text = raw.trim().to_owned();
    for phrase in BREAK_OF_CHARACTER_PHRASES {
        text = text.replace(phrase, "");
    }
    text.trim().to_owned()
}

/// Google Gemini `generateContent` client.
pub struct GeminiGateway {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[injectable(GenerationGateway)]
impl GeminiGateway {
    #[inject]
    pub fn create(config: Ref<AppConfig>) -> GeminiGateway {
        let client = Client::builder()
            .timeout(config.gemini_timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("failed to build HTTP client with timeout ({e}), using defaults");
                Client::new()
            });

        GeminiGateway {
            client,
            api_key: config.gemini_api_key.clone(),
            model: config.gemini_model.clone(),
            base_url: config.gemini_base_url.clone(),
        }
    }
}

#[async_trait]
impl GenerationGateway for GeminiGateway {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        if self.api_key.is_empty() {
            return Err(GenerationError::NotConfigured("GEMINI_API_KEY is not set"));
        }

        let url = format!("{}/{}:generateContent", self.base_url, self.model);
        debug!("requesting completion from {url}");

        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&GenerateContentRequest::from(request))
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_owned());
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Transport(format!("bad response body: {}", e.without_url())))?;

        parsed.into_text()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
    safety_settings: &'a [SafetyOverride],
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

impl<'a> From<&'a GenerationRequest> for GenerateContentRequest<'a> {
    fn from(request: &'a GenerationRequest) -> Self {
        GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart {
                    text: &request.prompt,
                }],
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
            },
            safety_settings: &request.safety_overrides,
        }
    }
}

#[derive(Deserialize, Default)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    fn into_text(self) -> Result<String, GenerationError> {
        let text: String = self
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            Err(GenerationError::EmptyResponse)
        } else {
            Ok(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ChatError;

    struct Echo(&'static str);

    #[async_trait]
    impl GenerationGateway for Echo {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
            Ok(self.0.to_owned())
        }
    }

    #[test]
    fn test_scrub_removes_every_occurrence() {
        let text = scrub_reply("  I understand. The tide turns. I'll try, I understand.  ");
        assert!(!text.contains("I understand"));
        assert!(!text.contains("I'll try"));
        assert_eq!(text, ". The tide turns. , .");
    }

    #[test]
    fn test_scrub_leaves_clean_text_alone() {
        assert_eq!(scrub_reply("\n*bows* Welcome back.\n"), "*bows* Welcome back.");
    }

    #[tokio::test]
    async fn test_complete_applies_scrubbing() {
        let gateway = Echo("I understand. The archive is open.");
        let reply = gateway
            .complete(&GenerationRequest::persona("p".to_owned()))
            .await
            .unwrap();
        assert_eq!(reply, ". The archive is open.");
    }

    #[tokio::test]
    async fn test_complete_rejects_reply_that_scrubs_to_nothing() {
        let gateway = Echo("  I understand  ");
        let result = gateway
            .complete(&GenerationRequest::persona("p".to_owned()))
            .await;
        assert!(matches!(result, Err(GenerationError::EmptyResponse)));
    }

    #[test]
    fn test_request_wire_format() {
        let request = GenerationRequest::persona("You are Eldrin.".to_owned());
        let json = serde_json::to_value(GenerateContentRequest::from(&request)).unwrap();

        assert_eq!(json["contents"][0]["parts"][0]["text"], "You are Eldrin.");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 250);
        assert_eq!(json["safetySettings"].as_array().unwrap().len(), 4);
        assert_eq!(
            json["safetySettings"][0]["category"],
            "HARM_CATEGORY_HARASSMENT"
        );
        assert_eq!(json["safetySettings"][0]["threshold"], "BLOCK_NONE");
    }

    #[test]
    fn test_response_text_parts_are_joined() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hello, "},{"text":"traveller."}]}}]}"#,
        )
        .unwrap();
        assert_eq!(response.into_text().unwrap(), "Hello, traveller.");
    }

    #[test]
    fn test_blocked_response_is_an_error() {
        let response: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"OTHER"}}"#).unwrap();
        assert!(matches!(
            response.into_text(),
            Err(GenerationError::EmptyResponse)
        ));
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_fast() {
        let gateway = GeminiGateway {
            client: Client::new(),
            api_key: String::new(),
            model: "gemini-2.0-flash".to_owned(),
            base_url: "http://127.0.0.1:9".to_owned(),
        };
        let result = gateway
            .generate(&GenerationRequest::persona("p".to_owned()))
            .await;
        assert!(matches!(result, Err(GenerationError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_transport_error_does_not_reveal_api_key() {
        let gateway = GeminiGateway {
            client: Client::new(),
            api_key: "SECRET".to_owned(),
            model: "gemini-2.0-flash".to_owned(),
            base_url: "http://127.0.0.1:9".to_owned(),
        };
        let err = gateway
            .generate(&GenerationRequest::persona("p".to_owned()))
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::Transport(_)));
        assert!(!err.to_string().contains("SECRET"));
        assert!(!ChatError::from(err).to_string().contains("SECRET"));
    }
}
