//! 错误类型
//!
//! - ActionError：动作构造 / 执行失败（执行失败只有 Execution 一种）
//! - SequenceError：序列运行与结构修改的调用方错误
//! - StorageError：序列文件读写
//!
//! 校验失败不是错误，以数据形式（bool / Vec<String>）返回；
//! AI 解析失败与 Provider 失败也不走这里，分别在 parser 内吸收、写入 AiResponse.error。

use thiserror::Error;

/// 单个动作的错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActionError {
    /// 工厂收到未知的 type 判别字段
    #[error("Unknown action type: {0}")]
    UnknownType(String),

    /// 判别字段已识别，但字段解码失败
    #[error("Failed to decode {kind}: {message}")]
    Decode { kind: String, message: String },

    /// 转为字典失败
    #[error("Failed to encode {kind}: {message}")]
    Encode { kind: String, message: String },

    /// 执行阶段唯一的错误通道：包装一次底层输入注入失败
    #[error("Failed to execute {kind}: {message}")]
    Execution { kind: String, message: String },
}

impl ActionError {
    pub fn execution(kind: &str, message: impl Into<String>) -> Self {
        Self::Execution {
            kind: kind.to_string(),
            message: message.into(),
        }
    }
}

/// 序列运行 / 修改错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SequenceError {
    #[error("Sequence is already running")]
    AlreadyRunning,

    #[error("Sequence cannot be modified while running")]
    Running,

    #[error("Action index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Sequence is invalid: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("Worker failed: {0}")]
    Worker(String),
}

/// 序列文件读写错误
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported sequence format: {0}")]
    Format(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_message_carries_variant() {
        let err = ActionError::execution("ClickAction", "display not found");
        assert_eq!(
            err.to_string(),
            "Failed to execute ClickAction: display not found"
        );
    }

    #[test]
    fn test_invalid_joins_messages() {
        let err = SequenceError::Invalid(vec!["Sequence is empty".into(), "x".into()]);
        assert_eq!(err.to_string(), "Sequence is invalid: Sequence is empty; x");
    }
}
