//! Mock 后端（用于测试与离线演示，无需 API）
//!
//! 返回预设文本或预设错误，并记录收到的请求。

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::ai::provider::{AiProvider, CompletionRequest, OperationTimeouts};

pub struct MockProvider {
    name: String,
    reply: Result<String, String>,
    latency: Option<Duration>,
    timeouts: OperationTimeouts,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockProvider {
    /// 固定回复 content
    pub fn replying(content: impl Into<String>) -> Self {
        Self {
            name: "mock".to_string(),
            reply: Ok(content.into()),
            latency: None,
            timeouts: OperationTimeouts::default(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// 固定返回错误
    pub fn failing(error: impl Into<String>) -> Self {
        Self {
            reply: Err(error.into()),
            ..Self::replying("")
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// 每次请求前等待，用于超时测试
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_timeouts(mut self, timeouts: OperationTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// 已收到的请求
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AiProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    fn is_configured(&self) -> bool {
        true
    }

    fn timeouts(&self) -> OperationTimeouts {
        self.timeouts
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.reply.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, ActionKind};
    use crate::ai::provider::GENERATION_PROMPT;

    #[tokio::test]
    async fn test_generate_parses_reply() {
        let provider = MockProvider::replying(
            r#"{"actions": [{"type": "TYPE", "text": "hi<enter>", "delay": 0.1}]}"#,
        );
        let response = provider.generate_actions("say hi").await;

        assert!(response.success);
        assert_eq!(response.provider(), Some("mock"));
        assert_eq!(response.metadata.get("model").map(String::as_str), Some("mock-model"));
        let actions = response.actions.unwrap();
        assert_eq!(
            actions[0].kind,
            ActionKind::Type {
                text: "hi<enter>".into()
            }
        );

        let requests = provider.requests();
        assert_eq!(requests[0].system, GENERATION_PROMPT);
        assert_eq!(requests[0].prompt, "say hi");
    }

    #[tokio::test]
    async fn test_explain_and_optimize_use_numbered_list() {
        let provider = MockProvider::replying("It types a greeting.");
        let actions = vec![Action::type_text("hello"), Action::wait(1.0)];

        let explained = provider.explain_actions(&actions).await;
        assert!(explained.success);
        assert_eq!(explained.content, "It types a greeting.");
        assert!(explained.actions.is_none());

        let optimized = provider.optimize_sequence(&actions).await;
        assert!(optimized.success);

        let requests = provider.requests();
        assert!(requests[0]
            .prompt
            .contains("1. Type 'hello' (delay: 0s)\n2. Wait for 1s"));
        assert_eq!(requests[0].max_tokens, 500);
        assert_eq!(requests[1].temperature, 0.4);
        assert!(requests[1].prompt.contains("redundant actions"));
    }

    #[tokio::test]
    async fn test_failure_becomes_failed_response() {
        let provider = MockProvider::failing("quota exceeded");
        let response = provider.generate_actions("anything").await;
        assert!(!response.success);
        assert_eq!(
            response.error.as_deref(),
            Some("Failed to generate actions with mock: quota exceeded")
        );
        assert!(response.actions.is_none());
    }

    #[tokio::test]
    async fn test_timeout_becomes_failed_response() {
        let provider = MockProvider::replying("late")
            .with_latency(Duration::from_secs(5))
            .with_timeouts(OperationTimeouts {
                generate: Duration::from_secs(1),
                explain: Duration::from_millis(20),
                optimize: Duration::from_secs(1),
            });
        let response = provider.explain_actions(&[Action::wait(1.0)]).await;
        assert!(!response.success);
        assert!(response.error.unwrap().contains("timed out"));
    }
}
