//! 生成结果解析：模型自由文本 → 已校验的动作列表
//!
//! 两阶段，从不报错：
//! 1. 结构化：取第一个 `{` 到最后一个 `}` 解码 JSON，逐条读取 `actions` 数组，坏条目单独跳过
//! 2. 文本兜底：结构化阶段无从下手时（无花括号、JSON 解码失败、没有 actions 数组），
//!    按行识别 `type:` / `click:` / `wait:` 前缀
//!
//! 两阶段产出的动作都要通过 validate。

use serde_json::Value;

use crate::action::{Action, ActionKind};

/// 解析模型输出；结果可能为空
pub fn parse_actions(content: &str) -> Vec<Action> {
    match structured_actions(content) {
        Some(actions) => actions,
        None => {
            tracing::debug!("No structured action list found, falling back to line patterns");
            heuristic_actions(content)
        }
    }
}

/// 结构化阶段；没有可解析的 `{"actions": [...]}` 时返回 None
pub fn structured_actions(content: &str) -> Option<Vec<Action>> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end < start {
        return None;
    }

    let value: Value = match serde_json::from_str(&content[start..=end]) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse AI response as JSON");
            return None;
        }
    };
    let entries = value.get("actions")?.as_array()?;

    let actions = entries
        .iter()
        .enumerate()
        .filter_map(|(i, entry)| match entry_to_action(entry) {
            Ok(action) => Some(action),
            Err(reason) => {
                tracing::warn!(index = i, entry = %entry, reason = %reason, "Skipping generated action");
                None
            }
        })
        .collect();
    Some(actions)
}

fn str_field(entry: &Value, field: &str) -> Result<String, String> {
    match entry.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(format!("'{field}' must be a string")),
        None => Err(format!("missing '{field}'")),
    }
}

fn int_field(entry: &Value, field: &str) -> Result<i64, String> {
    let value = entry.get(field).ok_or_else(|| format!("missing '{field}'"))?;
    value
        .as_i64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        })
        .ok_or_else(|| format!("'{field}' must be an integer"))
}

fn num_field(entry: &Value, field: &str) -> Result<f64, String> {
    entry
        .get(field)
        .ok_or_else(|| format!("missing '{field}'"))?
        .as_f64()
        .ok_or_else(|| format!("'{field}' must be a number"))
}

fn keys_field(entry: &Value) -> Result<Vec<String>, String> {
    match entry.get("keys") {
        Some(Value::String(key)) => Ok(vec![key.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|k| {
                k.as_str()
                    .map(String::from)
                    .ok_or_else(|| "'keys' must contain strings".to_string())
            })
            .collect(),
        Some(_) => Err("'keys' must be a list of strings".to_string()),
        None => Err("missing 'keys'".to_string()),
    }
}

/// 单条结构化条目；type 大小写不敏感
fn entry_to_action(entry: &Value) -> Result<Action, String> {
    let kind = entry
        .get("type")
        .and_then(Value::as_str)
        .ok_or("missing 'type'")?
        .to_uppercase();
    let delay = match entry.get("delay") {
        None | Some(Value::Null) => 0.0,
        Some(v) => v.as_f64().ok_or("'delay' must be a number")?,
    };

    let action = match kind.as_str() {
        "TYPE" => Action::type_text(str_field(entry, "text")?).with_delay(delay),
        "CLICK" => {
            let button = match entry.get("button") {
                None | Some(Value::Null) => "left".to_string(),
                Some(_) => str_field(entry, "button")?,
            };
            Action::new(ActionKind::Click {
                x: int_field(entry, "x")?,
                y: int_field(entry, "y")?,
                button,
            })
            .with_delay(delay)
        }
        // Delay 只用自己的 wait_time
        "DELAY" => Action::wait(num_field(entry, "wait_time")?),
        "HOTKEY" => Action::hotkey(keys_field(entry)?).with_delay(delay),
        "SPECIAL_KEY" => Action::special_key(str_field(entry, "key")?).with_delay(delay),
        other => return Err(format!("unknown action type '{other}'")),
    };

    if !action.validate() {
        return Err(format!("invalid action: {action}"));
    }
    Ok(action)
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}

fn line_to_action(line: &str) -> Option<Action> {
    if let Some(rest) = strip_prefix_ignore_case(line, "type:") {
        return Some(Action::type_text(rest.trim()).with_delay(0.5));
    }
    if let Some(rest) = strip_prefix_ignore_case(line, "click:") {
        let coords: Vec<&str> = rest.trim().split(',').collect();
        let [x, y] = coords.as_slice() else {
            return None;
        };
        let x = x.trim().parse::<i64>().ok()?;
        let y = y.trim().parse::<i64>().ok()?;
        return Some(Action::new(ActionKind::Click {
            x,
            y,
            button: "left".to_string(),
        })
        .with_delay(0.2));
    }
    if let Some(rest) = strip_prefix_ignore_case(line, "wait:") {
        return rest.trim().parse::<f64>().ok().map(Action::wait);
    }
    None
}

/// 文本兜底阶段：逐行匹配前缀，其余行忽略
pub fn heuristic_actions(content: &str) -> Vec<Action> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(line_to_action)
        .filter(|action| {
            let valid = action.validate();
            if !valid {
                tracing::warn!(action = %action, "Dropping invalid action from text response");
            }
            valid
        })
        .collect()
}
