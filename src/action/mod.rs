//! 动作模型：数据类型、特殊键分词、输入驱动

pub mod driver;
pub mod keys;
pub mod types;

pub use driver::{create_driver, DryRunDriver, InputDriver, MouseButton, ScrollDirection};
pub use keys::{special_keys_help, tokenize, Segment};
pub use types::{Action, ActionKind};
