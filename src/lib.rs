//! Autotyper - Rust 输入自动化序列器
//!
//! 模块划分：
//! - **action**: 动作模型（打字 / 点击 / 等待 / 热键 / 特殊键 / 滚动 / 拖拽）、特殊键分词、输入驱动
//! - **sequence**: 动作序列、执行引擎、进度事件、后台运行器、文件存储
//! - **ai**: 自然语言 → 动作（Gemini / OpenAI 兼容 / Mock 后端、注册表、响应解析）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型
//! - **observability**: 日志初始化

pub mod action;
pub mod ai;
pub mod config;
pub mod core;
pub mod observability;
pub mod sequence;

pub use action::{Action, ActionKind, InputDriver};
pub use sequence::{ActionSequence, RunOutcome, SequenceRunner};
