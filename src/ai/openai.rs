//! OpenAI 兼容后端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；system / user 两条消息，取首条 content。

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::ai::provider::{AiProvider, CompletionRequest, OperationTimeouts};
use crate::config::ProviderSection;

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeouts: OperationTimeouts,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>, section: &ProviderSection, timeouts: OperationTimeouts) -> Self {
        let api_key = api_key.into();
        let config = if let Some(url) = section.base_url.as_deref() {
            OpenAIConfig::new()
                .with_api_base(url)
                .with_api_key(api_key.clone())
        } else {
            OpenAIConfig::new().with_api_key(api_key.clone())
        };

        Self {
            client: Client::with_config(config),
            api_key,
            model: section
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature: section.temperature,
            max_tokens: section.max_tokens,
            timeouts,
        }
    }

    fn to_openai_messages(
        request: &CompletionRequest,
    ) -> Result<Vec<ChatCompletionRequestMessage>, String> {
        let system = ChatCompletionRequestSystemMessageArgs::default()
            .content(request.system.clone())
            .build()
            .map_err(|e| e.to_string())?;
        let user = ChatCompletionRequestUserMessageArgs::default()
            .content(request.prompt.clone())
            .build()
            .map_err(|e| e.to_string())?;
        Ok(vec![
            ChatCompletionRequestMessage::System(system),
            ChatCompletionRequestMessage::User(user),
        ])
    }
}

#[async_trait]
impl AiProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
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
        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(Self::to_openai_messages(request)?)
            .temperature(request.temperature)
            .max_completion_tokens(request.max_tokens)
            .build()
            .map_err(|e| e.to_string())?;

        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(|e| e.to_string())?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(content)
    }
}
