//! 自然语言 → 动作：生成式后端抽象、具体后端、注册表与结果解析

pub mod gemini;
pub mod mock;
pub mod openai;
pub mod parser;
pub mod provider;
pub mod registry;
pub mod response;

pub use mock::MockProvider;
pub use parser::parse_actions;
pub use provider::{actions_to_text, AiProvider, CompletionRequest, OperationTimeouts};
pub use registry::ProviderRegistry;
pub use response::AiResponse;
