//! Provider 调用结果

use std::collections::BTreeMap;

use crate::action::Action;

/// 一次生成 / 解释 / 优化调用的结果；失败不抛错，写入 error
#[derive(Debug, Clone, PartialEq)]
pub struct AiResponse {
    pub success: bool,
    pub content: String,
    /// 仅生成调用填充
    pub actions: Option<Vec<Action>>,
    pub error: Option<String>,
    /// provider / model
    pub metadata: BTreeMap<String, String>,
}

impl AiResponse {
    pub fn ok(content: impl Into<String>, provider: &str, model: &str) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("provider".to_string(), provider.to_string());
        metadata.insert("model".to_string(), model.to_string());
        Self {
            success: true,
            content: content.into(),
            actions: None,
            error: None,
            metadata,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: String::new(),
            actions: None,
            error: Some(error.into()),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = Some(actions);
        self
    }

    pub fn provider(&self) -> Option<&str> {
        self.metadata.get("provider").map(String::as_str)
    }
}
