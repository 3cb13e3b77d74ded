//! 动作序列：执行引擎、进度事件、后台运行器、文件存储

pub mod engine;
pub mod events;
pub mod runner;
pub mod storage;

pub use engine::{format_duration, ActionSequence};
pub use events::{ProgressEvent, RunEvent, RunOutcome};
pub use runner::{RunHandle, RunReport, SequenceRunner};
pub use storage::{load_sequence, save_sequence, LoadedSequence};
