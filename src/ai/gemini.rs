//! Google Gemini 后端（generateContent REST 接口）
//!
//! system 与用户 prompt 拼成单段文本发送；回复取第一个候选的第一段文本。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ai::provider::{AiProvider, CompletionRequest, OperationTimeouts};
use crate::config::ProviderSection;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-pro";

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    #[serde(rename = "topP")]
    top_p: f32,
    #[serde(rename = "topK")]
    top_k: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Content,
}

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
    timeouts: OperationTimeouts,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>, section: &ProviderSection, timeouts: OperationTimeouts) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: section
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: section
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            temperature: section.temperature,
            max_tokens: section.max_tokens,
            timeouts,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    fn request_body(request: &CompletionRequest) -> GenerateRequest {
        GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: format!("{}\n\nUser Request: {}", request.system, request.prompt),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
                top_p: 0.8,
                top_k: 10,
            },
        }
    }
}

#[async_trait]
impl AiProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    fn sampling(&self) -> (f32, u32) {
        (self.temperature, self.max_tokens)
    }

    fn timeouts(&self) -> OperationTimeouts {
        self.timeouts
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, String> {
        let resp = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::request_body(request))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(format!("Gemini API error: {} - {}", status.as_u16(), text));
        }

        let body: GenerateResponse = resp.json().await.map_err(|e| e.to_string())?;
        body.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| "Gemini API returned no candidates".to_string())
    }
}
