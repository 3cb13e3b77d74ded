//! 序列文件读写
//!
//! 当前格式为包装对象（配置 + actions 数组）；兼容旧格式：顶层直接是动作数组。
//! 单个动作加载失败时跳过并记录，调用方可从 skipped 得知数量。

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::types::now_timestamp;
use crate::action::Action;
use crate::core::error::StorageError;
use crate::sequence::engine::ActionSequence;

/// 加载结果
#[derive(Debug)]
pub struct LoadedSequence {
    pub sequence: ActionSequence,
    /// 因无法解析而跳过的动作数
    pub skipped: usize,
}

fn default_loop_count() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

/// 包装格式的文件记录；actions 保持原始 JSON，逐条解码
#[derive(Debug, Serialize, Deserialize)]
struct SequenceFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default = "now_timestamp")]
    created_at: f64,
    #[serde(default = "now_timestamp")]
    modified_at: f64,
    #[serde(default)]
    loop_enabled: bool,
    #[serde(default = "default_loop_count")]
    loop_count: u32,
    #[serde(default)]
    repeat_interval: f64,
    #[serde(default = "default_true")]
    stop_on_error: bool,
    #[serde(default)]
    actions: Vec<Value>,
}

impl SequenceFile {
    fn from_sequence(sequence: &ActionSequence) -> Result<Self, StorageError> {
        let actions = sequence
            .actions()
            .iter()
            .map(Action::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Format(e.to_string()))?;
        Ok(Self {
            name: Some(sequence.name.clone()),
            description: sequence.description.clone(),
            created_at: sequence.created_at,
            modified_at: sequence.modified_at,
            loop_enabled: sequence.loop_enabled,
            loop_count: sequence.loop_count,
            repeat_interval: sequence.repeat_interval,
            stop_on_error: sequence.stop_on_error,
            actions,
        })
    }
}

/// 序列 → JSON 对象
pub fn sequence_to_value(sequence: &ActionSequence) -> Result<Value, StorageError> {
    Ok(serde_json::to_value(SequenceFile::from_sequence(sequence)?)?)
}

fn decode_actions(entries: &[Value]) -> (Vec<Action>, usize) {
    let mut actions = Vec::with_capacity(entries.len());
    let mut skipped = 0;
    for (i, entry) in entries.iter().enumerate() {
        match Action::from_value(entry) {
            Ok(action) => actions.push(action),
            Err(e) => {
                tracing::warn!(index = i, error = %e, "Failed to load action, skipping");
                skipped += 1;
            }
        }
    }
    (actions, skipped)
}

/// JSON → 序列；接受包装对象或旧版动作数组
///
/// 包装对象中字段类型不符（如 `"loop_count": "3"`）返回 [`StorageError::Format`]，不回退到默认值。
pub fn sequence_from_value(value: &Value, fallback_name: &str) -> Result<LoadedSequence, StorageError> {
    match value {
        Value::Array(entries) => {
            let (actions, skipped) = decode_actions(entries);
            Ok(LoadedSequence {
                sequence: ActionSequence::with_actions(fallback_name, actions),
                skipped,
            })
        }
        Value::Object(_) => {
            let file = SequenceFile::deserialize(value)
                .map_err(|e| StorageError::Format(format!("invalid sequence file: {e}")))?;
            let (actions, skipped) = decode_actions(&file.actions);
            let name = file.name.unwrap_or_else(|| fallback_name.to_string());
            let mut sequence = ActionSequence::with_actions(name, actions);
            sequence.description = file.description;
            sequence.created_at = file.created_at;
            sequence.modified_at = file.modified_at;
            sequence.loop_enabled = file.loop_enabled;
            sequence.loop_count = file.loop_count;
            sequence.repeat_interval = file.repeat_interval;
            sequence.stop_on_error = file.stop_on_error;
            Ok(LoadedSequence { sequence, skipped })
        }
        other => Err(StorageError::Format(format!(
            "expected an object or an array, found {}",
            json_kind(other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// 读取序列文件；旧格式以文件名（不含扩展名）作为序列名
pub fn load_sequence(path: impl AsRef<Path>) -> Result<LoadedSequence, StorageError> {
    let path = path.as_ref();
    let data = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&data)?;
    let fallback = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Untitled Sequence");
    let loaded = sequence_from_value(&value, fallback)?;
    tracing::info!(
        path = %path.display(),
        actions = loaded.sequence.len(),
        skipped = loaded.skipped,
        "Loaded sequence"
    );
    Ok(loaded)
}

/// 写入序列文件（pretty JSON）；更新 modified_at，父目录不存在时自动创建
pub fn save_sequence(sequence: &mut ActionSequence, path: impl AsRef<Path>) -> Result<(), StorageError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    sequence.touch();
    let data = serde_json::to_string_pretty(&SequenceFile::from_sequence(sequence)?)?;
    std::fs::write(path, data)?;
    tracing::info!(path = %path.display(), actions = sequence.len(), "Saved sequence");
    Ok(())
}
