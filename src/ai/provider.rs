//! 生成式后端抽象
//!
//! 每个后端只需实现 complete（一次请求 → 文本）；generate / explain / optimize 由默认方法统一完成：
//! 拼 prompt、套超时、解析动作、把失败折叠成 AiResponse。单次尝试，不重试。

use std::time::Duration;

use async_trait::async_trait;

use crate::action::Action;
use crate::ai::parser::parse_actions;
use crate::ai::response::AiResponse;
use crate::config::AiTimeoutsSection;

/// 动作生成的 system prompt
pub const GENERATION_PROMPT: &str = r#"You are an automation assistant that converts natural language requests into specific automation actions.

Available action types:
1. TYPE: Type text (supports special keys like <enter>, <tab>, etc.)
2. CLICK: Click at specific coordinates with left/right/middle button
3. DELAY: Wait for specified time in seconds
4. HOTKEY: Press key combinations (e.g., ctrl+c, alt+tab)
5. SPECIAL_KEY: Press individual keys (enter, escape, backspace, etc.)

Response format (JSON):
{
  "actions": [
    {"type": "TYPE", "text": "Hello World<enter>", "delay": 0.5},
    {"type": "CLICK", "x": 100, "y": 200, "button": "left", "delay": 0.2},
    {"type": "DELAY", "wait_time": 2.0},
    {"type": "HOTKEY", "keys": ["ctrl", "v"], "delay": 0.1},
    {"type": "SPECIAL_KEY", "key": "enter", "delay": 0.0}
  ],
  "explanation": "Brief explanation of what this automation does"
}

Guidelines:
- Use realistic coordinates (typical screen: 1920x1080)
- Add appropriate delays between actions (0.1-2.0 seconds)
- Use special keys in text with angle brackets: <enter>, <tab>, <backspace>
- For hotkeys, list the keys separately: ["ctrl", "c"]
- Be specific and accurate
- Consider user workflow and timing

Generate automation actions for the following request:"#;

const EXPLAIN_SYSTEM: &str =
    "You are an automation expert. Explain automation sequences in clear, simple terms.";

const OPTIMIZE_SYSTEM: &str =
    "You are an automation optimization expert. Analyze sequences and suggest improvements.";

/// 一次补全请求
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// 各操作的超时
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationTimeouts {
    pub generate: Duration,
    pub explain: Duration,
    pub optimize: Duration,
}

impl Default for OperationTimeouts {
    fn default() -> Self {
        Self::from(AiTimeoutsSection::default())
    }
}

impl From<AiTimeoutsSection> for OperationTimeouts {
    fn from(section: AiTimeoutsSection) -> Self {
        Self {
            generate: Duration::from_secs(section.generate),
            explain: Duration::from_secs(section.explain),
            optimize: Duration::from_secs(section.optimize),
        }
    }
}

/// 编号列表：`1. <Display>`，每行一个动作
pub fn actions_to_text(actions: &[Action]) -> String {
    actions
        .iter()
        .enumerate()
        .map(|(i, action)| format!("{}. {}", i + 1, action))
        .collect::<Vec<_>>()
        .join("\n")
}

/// 生成式后端
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// 注册名（gemini / openai / mock）
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    /// 是否具备发请求的条件（如 API key 非空）
    fn is_configured(&self) -> bool;

    /// 生成请求的采样参数
    fn sampling(&self) -> (f32, u32) {
        (0.3, 1000)
    }

    fn timeouts(&self) -> OperationTimeouts {
        OperationTimeouts::default()
    }

    /// 发一次请求，返回模型文本
    async fn complete(&self, request: &CompletionRequest) -> Result<String, String>;

    /// 自然语言 → 动作
    async fn generate_actions(&self, prompt: &str) -> AiResponse {
        let (temperature, max_tokens) = self.sampling();
        let request = CompletionRequest {
            system: GENERATION_PROMPT.to_string(),
            prompt: prompt.to_string(),
            temperature,
            max_tokens,
        };
        match self
            .timed_complete(&request, self.timeouts().generate, "generate actions")
            .await
        {
            Ok(content) => {
                let actions = parse_actions(&content);
                tracing::info!(
                    provider = self.name(),
                    actions = actions.len(),
                    "Generated actions"
                );
                AiResponse::ok(content, self.name(), self.model()).with_actions(actions)
            }
            Err(error) => AiResponse::failure(error),
        }
    }

    /// 解释一组动作会做什么
    async fn explain_actions(&self, actions: &[Action]) -> AiResponse {
        let request = CompletionRequest {
            system: EXPLAIN_SYSTEM.to_string(),
            prompt: format!(
                "Please explain what this automation sequence will do in simple, user-friendly terms:\n\n\
                 Actions:\n{}\n\n\
                 Provide a clear, step-by-step explanation of what will happen when this automation runs.",
                actions_to_text(actions)
            ),
            temperature: 0.3,
            max_tokens: 500,
        };
        match self
            .timed_complete(&request, self.timeouts().explain, "explain actions")
            .await
        {
            Ok(content) => AiResponse::ok(content, self.name(), self.model()),
            Err(error) => AiResponse::failure(error),
        }
    }

    /// 优化建议
    async fn optimize_sequence(&self, actions: &[Action]) -> AiResponse {
        let request = CompletionRequest {
            system: OPTIMIZE_SYSTEM.to_string(),
            prompt: format!(
                "Analyze this automation sequence and suggest optimizations:\n\n\
                 Current Actions:\n{}\n\n\
                 Please suggest:\n\
                 1. Ways to make it more efficient\n\
                 2. Potential timing improvements\n\
                 3. Any redundant actions that could be removed\n\
                 4. Better approaches for the same outcome\n\n\
                 Provide specific, actionable recommendations.",
                actions_to_text(actions)
            ),
            temperature: 0.4,
            max_tokens: 800,
        };
        match self
            .timed_complete(&request, self.timeouts().optimize, "optimize sequence")
            .await
        {
            Ok(content) => AiResponse::ok(content, self.name(), self.model()),
            Err(error) => AiResponse::failure(error),
        }
    }

    /// complete + 超时；错误信息带上操作名与后端名
    async fn timed_complete(
        &self,
        request: &CompletionRequest,
        limit: Duration,
        operation: &str,
    ) -> Result<String, String> {
        let result = match tokio::time::timeout(limit, self.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(format!("request timed out after {limit:?}")),
        };
        result.map_err(|e| {
            let message = format!("Failed to {operation} with {}: {e}", self.name());
            tracing::error!(provider = self.name(), "{}", message);
            message
        })
    }
}
