//! 动作数据模型
//!
//! Action = 公共字段 + ActionKind（带 `type` 判别字段的和类型）。
//! 序列化为扁平 JSON 对象：`type`、公共字段、派生的 `description`、各变体字段。

use std::fmt;
use std::time::Duration;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::action::driver::{InputDriver, MouseButton, ScrollDirection};
use crate::action::keys::{tokenize, Segment};
use crate::core::error::ActionError;

fn default_button() -> String {
    "left".to_string()
}

fn default_wait_time() -> f64 {
    1.0
}

fn default_special_key() -> String {
    "enter".to_string()
}

fn default_clicks() -> i64 {
    3
}

fn default_direction() -> String {
    "up".to_string()
}

fn default_duration() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

/// 坐标等整数字段：也接受小数部分为 0 的浮点（`100.0`）
fn integral<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Number {
        Int(i64),
        Float(f64),
    }

    match Number::deserialize(deserializer)? {
        Number::Int(v) => Ok(v),
        Number::Float(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
            Ok(f as i64)
        }
        Number::Float(f) => Err(D::Error::custom(format!("expected an integer, found {f}"))),
    }
}

/// 当前时间（epoch 秒，毫秒精度）
pub(crate) fn now_timestamp() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

/// 动作变体
///
/// button / direction 以字符串保存，非法值由 validate 报告，执行时才映射到驱动枚举。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ActionKind {
    #[serde(rename = "TypeAction")]
    Type {
        #[serde(default)]
        text: String,
    },
    #[serde(rename = "ClickAction")]
    Click {
        #[serde(default, deserialize_with = "integral")]
        x: i64,
        #[serde(default, deserialize_with = "integral")]
        y: i64,
        #[serde(default = "default_button")]
        button: String,
    },
    /// 自身等待 wait_time，忽略公共 delay
    #[serde(rename = "DelayAction")]
    Delay {
        #[serde(default = "default_wait_time")]
        wait_time: f64,
    },
    #[serde(rename = "HotkeyAction")]
    Hotkey {
        #[serde(default)]
        keys: Vec<String>,
    },
    #[serde(rename = "SpecialKeyAction")]
    SpecialKey {
        #[serde(default = "default_special_key")]
        key: String,
    },
    #[serde(rename = "ScrollAction")]
    Scroll {
        #[serde(default, deserialize_with = "integral")]
        x: i64,
        #[serde(default, deserialize_with = "integral")]
        y: i64,
        #[serde(default = "default_clicks", deserialize_with = "integral")]
        clicks: i64,
        #[serde(default = "default_direction")]
        direction: String,
    },
    #[serde(rename = "DragAction")]
    Drag {
        #[serde(default, deserialize_with = "integral")]
        start_x: i64,
        #[serde(default, deserialize_with = "integral")]
        start_y: i64,
        #[serde(default, deserialize_with = "integral")]
        end_x: i64,
        #[serde(default, deserialize_with = "integral")]
        end_y: i64,
        #[serde(default = "default_duration")]
        duration: f64,
        #[serde(default = "default_button")]
        button: String,
    },
}

impl ActionKind {
    /// 全部判别字段
    pub const TYPE_NAMES: [&'static str; 7] = [
        "TypeAction",
        "ClickAction",
        "DelayAction",
        "HotkeyAction",
        "SpecialKeyAction",
        "ScrollAction",
        "DragAction",
    ];

    /// `type` 判别字段
    pub fn type_name(&self) -> &'static str {
        match self {
            ActionKind::Type { .. } => "TypeAction",
            ActionKind::Click { .. } => "ClickAction",
            ActionKind::Delay { .. } => "DelayAction",
            ActionKind::Hotkey { .. } => "HotkeyAction",
            ActionKind::SpecialKey { .. } => "SpecialKeyAction",
            ActionKind::Scroll { .. } => "ScrollAction",
            ActionKind::Drag { .. } => "DragAction",
        }
    }

    /// 默认显示名
    pub fn default_name(&self) -> String {
        match self {
            ActionKind::Type { .. } => "Type Text".to_string(),
            ActionKind::Click { button, .. } => format!("{} Click", capitalize(button)),
            ActionKind::Delay { .. } => "Delay".to_string(),
            ActionKind::Hotkey { .. } => "Hotkey".to_string(),
            ActionKind::SpecialKey { .. } => "Special Key".to_string(),
            ActionKind::Scroll { direction, .. } => format!("Scroll {}", capitalize(direction)),
            ActionKind::Drag { button, .. } => format!("Drag {}", capitalize(button)),
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// 字典形态（读）：name 缺省时取变体默认显示名
#[derive(Deserialize)]
struct ActionRecord {
    #[serde(flatten)]
    kind: ActionKind,
    #[serde(default)]
    delay: f64,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "now_timestamp")]
    created_at: f64,
}

/// 字典形态（写）：与 ActionRecord 同一组字段，另带派生的 description
#[derive(Serialize)]
struct ActionDocument<'a> {
    #[serde(flatten)]
    kind: &'a ActionKind,
    delay: f64,
    id: &'a Option<Value>,
    name: &'a str,
    description: String,
    enabled: bool,
    created_at: f64,
}

/// 一个输入动作
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub kind: ActionKind,
    /// 执行前等待（秒）；Delay 变体忽略
    pub delay: f64,
    /// 不透明标识，原样保存（字符串、数字均可）
    pub id: Option<Value>,
    pub name: String,
    /// false 时执行为无操作成功
    pub enabled: bool,
    /// epoch 秒
    pub created_at: f64,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            name: kind.default_name(),
            kind,
            delay: 0.0,
            id: None,
            enabled: true,
            created_at: now_timestamp(),
        }
    }

    pub fn type_text(text: impl Into<String>) -> Self {
        Self::new(ActionKind::Type { text: text.into() })
    }

    pub fn click(x: i64, y: i64, button: MouseButton) -> Self {
        Self::new(ActionKind::Click {
            x,
            y,
            button: button.as_str().to_string(),
        })
    }

    pub fn wait(wait_time: f64) -> Self {
        Self::new(ActionKind::Delay { wait_time })
    }

    pub fn hotkey<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ActionKind::Hotkey {
            keys: keys.into_iter().map(Into::into).collect(),
        })
    }

    pub fn special_key(key: impl Into<String>) -> Self {
        Self::new(ActionKind::SpecialKey { key: key.into() })
    }

    pub fn scroll(x: i64, y: i64, clicks: i64, direction: ScrollDirection) -> Self {
        Self::new(ActionKind::Scroll {
            x,
            y,
            clicks,
            direction: direction.as_str().to_string(),
        })
    }

    pub fn drag(start: (i64, i64), end: (i64, i64), duration: f64, button: MouseButton) -> Self {
        Self::new(ActionKind::Drag {
            start_x: start.0,
            start_y: start.1,
            end_x: end.0,
            end_y: end.1,
            duration,
            button: button.as_str().to_string(),
        })
    }

    pub fn with_delay(mut self, delay: f64) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// 工厂：先按 `type` 判别字段分派，再按默认值解码变体字段
    pub fn from_value(value: &Value) -> Result<Self, ActionError> {
        let type_name = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ActionError::UnknownType("<missing>".to_string()))?;
        if !ActionKind::TYPE_NAMES.contains(&type_name) {
            return Err(ActionError::UnknownType(type_name.to_string()));
        }

        let record: ActionRecord =
            serde_json::from_value(value.clone()).map_err(|e| ActionError::Decode {
                kind: type_name.to_string(),
                message: e.to_string(),
            })?;

        let name = record
            .name
            .unwrap_or_else(|| record.kind.default_name());
        Ok(Self {
            kind: record.kind,
            delay: record.delay,
            id: record.id,
            name,
            enabled: record.enabled,
            created_at: record.created_at,
        })
    }

    /// 扁平字典形式
    pub fn to_value(&self) -> Result<Value, ActionError> {
        let document = ActionDocument {
            kind: &self.kind,
            delay: self.delay,
            id: &self.id,
            name: &self.name,
            description: self.description(),
            enabled: self.enabled,
            created_at: self.created_at,
        };
        serde_json::to_value(document).map_err(|e| ActionError::Encode {
            kind: self.kind_name().to_string(),
            message: e.to_string(),
        })
    }

    /// 经字典往返得到的副本（保留 id）
    pub fn duplicate(&self) -> Result<Self, ActionError> {
        Self::from_value(&self.to_value()?)
    }

    pub fn kind_name(&self) -> &'static str {
        self.kind.type_name()
    }

    /// 派生的人类可读描述
    pub fn description(&self) -> String {
        match &self.kind {
            ActionKind::Type { text } => {
                let preview: String = text.chars().take(50).collect();
                if text.chars().count() > 50 {
                    format!("Type: {preview}...")
                } else {
                    format!("Type: {preview}")
                }
            }
            ActionKind::Click { x, y, button } => format!("Click {button} at ({x}, {y})"),
            ActionKind::Delay { wait_time } => format!("Wait for {wait_time} seconds"),
            ActionKind::Hotkey { keys } => format!("Press {}", keys.join("+")),
            ActionKind::SpecialKey { key } => format!("Press {key} key"),
            ActionKind::Scroll {
                x,
                y,
                clicks,
                direction,
            } => format!("Scroll {direction} {clicks} clicks at ({x}, {y})"),
            ActionKind::Drag {
                start_x,
                start_y,
                end_x,
                end_y,
                ..
            } => format!("Drag from ({start_x}, {start_y}) to ({end_x}, {end_y})"),
        }
    }

    pub fn validate(&self) -> bool {
        if !is_non_negative(self.delay) {
            return false;
        }
        match &self.kind {
            ActionKind::Type { .. } => true,
            ActionKind::Click { x, y, button } => {
                *x >= 0 && *y >= 0 && button.parse::<MouseButton>().is_ok()
            }
            ActionKind::Delay { wait_time } => is_non_negative(*wait_time),
            ActionKind::Hotkey { keys } => !keys.is_empty(),
            ActionKind::SpecialKey { key } => !key.trim().is_empty(),
            ActionKind::Scroll {
                clicks, direction, ..
            } => *clicks > 0 && direction.parse::<ScrollDirection>().is_ok(),
            ActionKind::Drag {
                duration, button, ..
            } => {
                duration.is_finite()
                    && *duration > 0.0
                    && button.parse::<MouseButton>().is_ok()
            }
        }
    }

    /// 执行动作：禁用 → 直接成功；否则先等 delay（Delay 变体除外），再调用驱动
    ///
    /// 驱动层的任何失败都包装为 [`ActionError::Execution`]。
    pub fn execute(&self, driver: &mut dyn InputDriver) -> Result<bool, ActionError> {
        if !self.enabled {
            tracing::debug!(action = %self, "Skipping disabled action");
            return Ok(true);
        }

        self.perform(driver).map_err(|e| {
            tracing::error!(kind = self.kind_name(), error = %e, "Action failed");
            ActionError::execution(self.kind_name(), e.to_string())
        })
    }

    fn perform(&self, driver: &mut dyn InputDriver) -> anyhow::Result<bool> {
        if !matches!(self.kind, ActionKind::Delay { .. }) && self.delay > 0.0 {
            std::thread::sleep(seconds(self.delay)?);
        }

        match &self.kind {
            ActionKind::Type { text } => {
                for segment in tokenize(text) {
                    match segment {
                        Segment::Text(literal) => driver.type_text(literal)?,
                        Segment::Key(key) => driver.press_key(key)?,
                    }
                }
            }
            ActionKind::Click { x, y, button } => {
                driver.click(*x, *y, parse_button(button)?)?;
            }
            ActionKind::Delay { wait_time } => {
                if *wait_time > 0.0 {
                    std::thread::sleep(seconds(*wait_time)?);
                }
            }
            ActionKind::Hotkey { keys } => driver.hotkey(keys)?,
            ActionKind::SpecialKey { key } => driver.press_key(key)?,
            ActionKind::Scroll {
                x,
                y,
                clicks,
                direction,
            } => {
                let direction = direction
                    .parse::<ScrollDirection>()
                    .map_err(anyhow::Error::msg)?;
                let amount = match direction {
                    ScrollDirection::Up => *clicks,
                    ScrollDirection::Down => -*clicks,
                };
                driver.scroll(*x, *y, amount)?;
            }
            ActionKind::Drag {
                start_x,
                start_y,
                end_x,
                end_y,
                duration,
                button,
            } => {
                driver.drag(
                    (*start_x, *start_y),
                    (*end_x, *end_y),
                    seconds(*duration)?,
                    parse_button(button)?,
                )?;
            }
        }
        Ok(true)
    }
}

fn is_non_negative(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

fn parse_button(button: &str) -> anyhow::Result<MouseButton> {
    button.parse().map_err(anyhow::Error::msg)
}

fn seconds(secs: f64) -> anyhow::Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|e| anyhow::anyhow!("invalid duration {secs}: {e}"))
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let delay = self.delay;
        match &self.kind {
            ActionKind::Type { text } => write!(f, "Type '{text}' (delay: {delay}s)"),
            ActionKind::Click { x, y, button } => {
                write!(f, "Click {button} at ({x}, {y}) (delay: {delay}s)")
            }
            ActionKind::Delay { wait_time } => write!(f, "Wait for {wait_time}s"),
            ActionKind::Hotkey { keys } => {
                write!(f, "Press hotkey {} (delay: {delay}s)", keys.join("+"))
            }
            ActionKind::SpecialKey { key } => write!(f, "Press {key} key (delay: {delay}s)"),
            ActionKind::Scroll {
                x,
                y,
                clicks,
                direction,
            } => write!(
                f,
                "Scroll {direction} {clicks} clicks at ({x}, {y}) (delay: {delay}s)"
            ),
            ActionKind::Drag {
                start_x,
                start_y,
                end_x,
                end_y,
                ..
            } => write!(
                f,
                "Drag from ({start_x}, {start_y}) to ({end_x}, {end_y}) (delay: {delay}s)"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::action::driver::{DriverCall, RecordingDriver};

    fn all_variants() -> Vec<Action> {
        vec![
            Action::type_text("Hello<enter>").with_delay(0.5),
            Action::click(10, 20, MouseButton::Right).with_id("c1"),
            Action::wait(2.5),
            Action::hotkey(["ctrl", "c"]),
            Action::special_key("tab").with_enabled(false),
            Action::scroll(5, 6, 4, ScrollDirection::Down),
            Action::drag((1, 2), (30, 40), 0.75, MouseButton::Middle).with_name("Move file"),
        ]
    }

    #[test]
    fn test_round_trip_every_variant() {
        for action in all_variants() {
            let restored = Action::from_value(&action.to_value().unwrap()).unwrap();
            assert_eq!(restored, action);
        }
    }

    #[test]
    fn test_to_value_is_flat_with_description() {
        let value = Action::click(10, 20, MouseButton::Left).to_value().unwrap();
        assert_eq!(value["type"], "ClickAction");
        assert_eq!(value["x"], 10);
        assert_eq!(value["button"], "left");
        assert_eq!(value["description"], "Click left at (10, 20)");
        assert_eq!(value["name"], "Left Click");
        assert!(value["id"].is_null());
    }

    #[test]
    fn test_from_value_defaults() {
        let action = Action::from_value(&json!({"type": "ScrollAction"})).unwrap();
        assert_eq!(
            action.kind,
            ActionKind::Scroll {
                x: 0,
                y: 0,
                clicks: 3,
                direction: "up".into()
            }
        );
        assert_eq!(action.name, "Scroll Up");
        assert_eq!(action.delay, 0.0);
        assert!(action.enabled);

        let delay = Action::from_value(&json!({"type": "DelayAction", "name": ""})).unwrap();
        assert_eq!(delay.kind, ActionKind::Delay { wait_time: 1.0 });
        assert_eq!(delay.name, "");
    }

    #[test]
    fn test_from_value_unknown_or_missing_type() {
        assert_eq!(
            Action::from_value(&json!({"type": "FlyAction"})),
            Err(ActionError::UnknownType("FlyAction".into()))
        );
        assert!(matches!(
            Action::from_value(&json!({"text": "x"})),
            Err(ActionError::UnknownType(_))
        ));
    }

    #[test]
    fn test_from_value_bad_field_is_decode_error() {
        let err = Action::from_value(&json!({"type": "ClickAction", "x": "left"})).unwrap_err();
        assert!(matches!(err, ActionError::Decode { ref kind, .. } if kind == "ClickAction"));
    }

    #[test]
    fn test_validate_rules() {
        assert!(Action::type_text("").validate());
        assert!(!Action::click(-1, 0, MouseButton::Left).validate());
        assert!(!Action::new(ActionKind::Click {
            x: 1,
            y: 1,
            button: "thumb".into()
        })
        .validate());
        assert!(!Action::wait(-0.1).validate());
        assert!(!Action::hotkey(Vec::<String>::new()).validate());
        assert!(!Action::special_key("  ").validate());
        assert!(!Action::scroll(0, 0, 0, ScrollDirection::Up).validate());
        assert!(!Action::drag((0, 0), (1, 1), 0.0, MouseButton::Left).validate());
        assert!(!Action::type_text("x").with_delay(-1.0).validate());
        assert!(!Action::type_text("x").with_delay(f64::NAN).validate());
        for action in all_variants() {
            assert!(action.validate(), "{action}");
        }
    }

    #[test]
    fn test_execute_type_splits_special_keys() {
        let mut driver = RecordingDriver::new();
        let calls = driver.calls();
        let ok = Action::type_text("Hi<enter>there").execute(&mut driver).unwrap();
        assert!(ok);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                DriverCall::Type("Hi".into()),
                DriverCall::Press("enter".into()),
                DriverCall::Type("there".into())
            ]
        );
    }

    #[test]
    fn test_execute_disabled_is_noop() {
        let mut driver = RecordingDriver::new();
        let calls = driver.calls();
        let ok = Action::click(1, 1, MouseButton::Left)
            .with_enabled(false)
            .execute(&mut driver)
            .unwrap();
        assert!(ok);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_execute_scroll_sign_and_drag() {
        let mut driver = RecordingDriver::new();
        let calls = driver.calls();
        Action::scroll(3, 4, 2, ScrollDirection::Down)
            .execute(&mut driver)
            .unwrap();
        Action::drag((0, 0), (5, 5), 0.5, MouseButton::Left)
            .execute(&mut driver)
            .unwrap();
        let calls = calls.lock().unwrap();
        assert_eq!(calls[0], DriverCall::Scroll(3, 4, -2));
        assert_eq!(
            calls[1],
            DriverCall::Drag((0, 0), (5, 5), Duration::from_millis(500), MouseButton::Left)
        );
    }

    #[test]
    fn test_execute_failure_wrapped() {
        let mut driver = RecordingDriver::new().fail_when(|c| matches!(c, DriverCall::Hotkey(_)));
        let err = Action::hotkey(["ctrl", "s"]).execute(&mut driver).unwrap_err();
        assert!(matches!(err, ActionError::Execution { ref kind, .. } if kind == "HotkeyAction"));

        let bad_button = Action::new(ActionKind::Click {
            x: 0,
            y: 0,
            button: "thumb".into(),
        });
        let err = bad_button.execute(&mut RecordingDriver::new()).unwrap_err();
        assert!(err.to_string().contains("invalid mouse button"));
    }

    #[test]
    fn test_duplicate_keeps_id() {
        let original = Action::special_key("escape").with_id("k-1");
        let copy = original.duplicate().unwrap();
        assert_eq!(copy, original);
        assert_eq!(copy.id, Some(json!("k-1")));
    }

    #[test]
    fn test_opaque_id_and_integral_float_coordinates() {
        let typed = Action::from_value(&json!({"type": "TypeAction", "id": 7})).unwrap();
        assert_eq!(typed.id, Some(json!(7)));
        assert_eq!(typed.to_value().unwrap()["id"], 7);

        let click = Action::from_value(&json!({"type": "ClickAction", "x": 100.0, "y": 5})).unwrap();
        assert_eq!(
            click.kind,
            ActionKind::Click {
                x: 100,
                y: 5,
                button: "left".into()
            }
        );

        let err = Action::from_value(&json!({"type": "ClickAction", "x": 1.5})).unwrap_err();
        assert!(matches!(err, ActionError::Decode { .. }));
    }

    #[test]
    fn test_to_value_and_from_value_share_field_names() {
        let drag = Action::drag((1, 2), (3, 4), 0.5, MouseButton::Right).with_delay(0.1);
        let value = drag.to_value().unwrap();
        for field in [
            "type", "delay", "id", "name", "description", "enabled", "created_at", "start_x",
            "start_y", "end_x", "end_y", "duration", "button",
        ] {
            assert!(value.get(field).is_some(), "missing {field}");
        }
        assert_eq!(value["type"], "DragAction");
        assert_eq!(value.as_object().unwrap().len(), 13);
    }

    #[test]
    fn test_display_and_description() {
        assert_eq!(
            Action::type_text("hi").with_delay(0.5).to_string(),
            "Type 'hi' (delay: 0.5s)"
        );
        assert_eq!(Action::wait(2.0).to_string(), "Wait for 2s");
        assert_eq!(
            Action::hotkey(["ctrl", "v"]).to_string(),
            "Press hotkey ctrl+v (delay: 0s)"
        );
        let long = "x".repeat(60);
        assert_eq!(
            Action::type_text(long).description(),
            format!("Type: {}...", "x".repeat(50))
        );
        assert_eq!(
            Action::scroll(1, 2, 3, ScrollDirection::Up).description(),
            "Scroll up 3 clicks at (1, 2)"
        );
    }
}
