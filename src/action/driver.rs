//! 输入注入后端
//!
//! 动作执行只依赖 InputDriver trait；真实键鼠注入（enigo，需开启 `enigo` feature）、
//! 只打日志的 DryRunDriver、记录调用的 RecordingDriver 都实现它。

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 鼠标按键
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn as_str(&self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        }
    }
}

impl FromStr for MouseButton {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(MouseButton::Left),
            "right" => Ok(MouseButton::Right),
            "middle" => Ok(MouseButton::Middle),
            other => Err(format!("invalid mouse button: {other}")),
        }
    }
}

impl fmt::Display for MouseButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 滚动方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
}

impl ScrollDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
        }
    }
}

impl FromStr for ScrollDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(ScrollDirection::Up),
            "down" => Ok(ScrollDirection::Down),
            other => Err(format!("invalid scroll direction: {other}")),
        }
    }
}

/// 操作系统输入注入原语；坐标为屏幕绝对像素
///
/// scroll 的 amount 为正表示向上、为负表示向下。
pub trait InputDriver: Send {
    fn name(&self) -> &str;

    fn type_text(&mut self, text: &str) -> anyhow::Result<()>;

    fn press_key(&mut self, key: &str) -> anyhow::Result<()>;

    /// 依次按下 keys，再逆序松开
    fn hotkey(&mut self, keys: &[String]) -> anyhow::Result<()>;

    fn click(&mut self, x: i64, y: i64, button: MouseButton) -> anyhow::Result<()>;

    fn scroll(&mut self, x: i64, y: i64, amount: i64) -> anyhow::Result<()>;

    fn drag(
        &mut self,
        from: (i64, i64),
        to: (i64, i64),
        duration: Duration,
        button: MouseButton,
    ) -> anyhow::Result<()>;
}

/// 只记录日志、不触碰真实设备
#[derive(Debug, Default)]
pub struct DryRunDriver;

impl InputDriver for DryRunDriver {
    fn name(&self) -> &str {
        "dry-run"
    }

    fn type_text(&mut self, text: &str) -> anyhow::Result<()> {
        tracing::info!(text = %text, "dry-run: type");
        Ok(())
    }

    fn press_key(&mut self, key: &str) -> anyhow::Result<()> {
        tracing::info!(key = %key, "dry-run: press");
        Ok(())
    }

    fn hotkey(&mut self, keys: &[String]) -> anyhow::Result<()> {
        tracing::info!(keys = %keys.join("+"), "dry-run: hotkey");
        Ok(())
    }

    fn click(&mut self, x: i64, y: i64, button: MouseButton) -> anyhow::Result<()> {
        tracing::info!(x, y, button = %button, "dry-run: click");
        Ok(())
    }

    fn scroll(&mut self, x: i64, y: i64, amount: i64) -> anyhow::Result<()> {
        tracing::info!(x, y, amount, "dry-run: scroll");
        Ok(())
    }

    fn drag(
        &mut self,
        from: (i64, i64),
        to: (i64, i64),
        duration: Duration,
        button: MouseButton,
    ) -> anyhow::Result<()> {
        tracing::info!(?from, ?to, ?duration, button = %button, "dry-run: drag");
        Ok(())
    }
}

/// RecordingDriver 记录下的一次调用
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    Type(String),
    Press(String),
    Hotkey(Vec<String>),
    Click(i64, i64, MouseButton),
    Scroll(i64, i64, i64),
    Drag((i64, i64), (i64, i64), Duration, MouseButton),
}

type FailurePredicate = Box<dyn Fn(&DriverCall) -> bool + Send>;

/// 记录所有调用（含失败的那次），可配置在某类调用上失败；用于测试与预演
///
/// 调用日志通过 [`RecordingDriver::calls`] 共享，驱动移交给后台 worker 后仍可读取。
pub struct RecordingDriver {
    calls: Arc<Mutex<Vec<DriverCall>>>,
    fail_when: Option<FailurePredicate>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_when: None,
        }
    }

    /// 满足谓词的调用返回错误
    pub fn fail_when(mut self, predicate: impl Fn(&DriverCall) -> bool + Send + 'static) -> Self {
        self.fail_when = Some(Box::new(predicate));
        self
    }

    /// 调用日志句柄
    pub fn calls(&self) -> Arc<Mutex<Vec<DriverCall>>> {
        Arc::clone(&self.calls)
    }

    fn record(&mut self, call: DriverCall) -> anyhow::Result<()> {
        let failed = self.fail_when.as_ref().is_some_and(|p| p(&call));
        let description = format!("{call:?}");
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
        if failed {
            anyhow::bail!("simulated device failure on {description}");
        }
        Ok(())
    }
}

impl Default for RecordingDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl InputDriver for RecordingDriver {
    fn name(&self) -> &str {
        "recording"
    }

    fn type_text(&mut self, text: &str) -> anyhow::Result<()> {
        self.record(DriverCall::Type(text.to_string()))
    }

    fn press_key(&mut self, key: &str) -> anyhow::Result<()> {
        self.record(DriverCall::Press(key.to_string()))
    }

    fn hotkey(&mut self, keys: &[String]) -> anyhow::Result<()> {
        self.record(DriverCall::Hotkey(keys.to_vec()))
    }

    fn click(&mut self, x: i64, y: i64, button: MouseButton) -> anyhow::Result<()> {
        self.record(DriverCall::Click(x, y, button))
    }

    fn scroll(&mut self, x: i64, y: i64, amount: i64) -> anyhow::Result<()> {
        self.record(DriverCall::Scroll(x, y, amount))
    }

    fn drag(
        &mut self,
        from: (i64, i64),
        to: (i64, i64),
        duration: Duration,
        button: MouseButton,
    ) -> anyhow::Result<()> {
        self.record(DriverCall::Drag(from, to, duration, button))
    }
}

/// 按名称创建驱动：dry-run / enigo
pub fn create_driver(name: &str) -> anyhow::Result<Box<dyn InputDriver>> {
    match name {
        "dry-run" => Ok(Box::new(DryRunDriver)),
        #[cfg(feature = "enigo")]
        "enigo" => Ok(Box::new(enigo_driver::EnigoDriver)),
        #[cfg(not(feature = "enigo"))]
        "enigo" => anyhow::bail!("driver 'enigo' requires building with --features enigo"),
        other => anyhow::bail!("Unknown input driver: {other}"),
    }
}

#[cfg(feature = "enigo")]
pub mod enigo_driver {
    //! 基于 enigo 的真实键鼠注入；每次调用新建 Enigo 连接，驱动本身保持 Send

    use std::time::Duration;

    use anyhow::anyhow;
    use enigo::{Axis, Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};

    use super::{InputDriver, MouseButton};

    /// 拖拽插值步数
    const DRAG_STEPS: u32 = 20;

    pub struct EnigoDriver;

    fn connect() -> anyhow::Result<Enigo> {
        Enigo::new(&Settings::default()).map_err(|e| anyhow!("failed to init enigo: {e}"))
    }

    fn to_button(button: MouseButton) -> Button {
        match button {
            MouseButton::Left => Button::Left,
            MouseButton::Right => Button::Right,
            MouseButton::Middle => Button::Middle,
        }
    }

    fn to_key(name: &str) -> anyhow::Result<Key> {
        let key = match name.to_lowercase().as_str() {
            "enter" | "return" => Key::Return,
            "tab" => Key::Tab,
            "space" => Key::Space,
            "backspace" => Key::Backspace,
            "delete" => Key::Delete,
            "escape" | "esc" => Key::Escape,
            "shift" => Key::Shift,
            "ctrl" | "control" => Key::Control,
            "alt" => Key::Alt,
            "capslock" => Key::CapsLock,
            "pageup" => Key::PageUp,
            "pagedown" => Key::PageDown,
            "home" => Key::Home,
            "end" => Key::End,
            "up" => Key::UpArrow,
            "down" => Key::DownArrow,
            "left" => Key::LeftArrow,
            "right" => Key::RightArrow,
            "win" | "windows" | "cmd" | "command" | "meta" => Key::Meta,
            "f1" => Key::F1,
            "f2" => Key::F2,
            "f3" => Key::F3,
            "f4" => Key::F4,
            "f5" => Key::F5,
            "f6" => Key::F6,
            "f7" => Key::F7,
            "f8" => Key::F8,
            "f9" => Key::F9,
            "f10" => Key::F10,
            "f11" => Key::F11,
            "f12" => Key::F12,
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Key::Unicode(c),
                    _ => return Err(anyhow!("unsupported key: {other}")),
                }
            }
        };
        Ok(key)
    }

    fn coord(v: i64) -> anyhow::Result<i32> {
        i32::try_from(v).map_err(|_| anyhow!("coordinate out of range: {v}"))
    }

    impl InputDriver for EnigoDriver {
        fn name(&self) -> &str {
            "enigo"
        }

        fn type_text(&mut self, text: &str) -> anyhow::Result<()> {
            connect()?
                .text(text)
                .map_err(|e| anyhow!("failed to type text: {e}"))
        }

        fn press_key(&mut self, key: &str) -> anyhow::Result<()> {
            connect()?
                .key(to_key(key)?, Direction::Click)
                .map_err(|e| anyhow!("failed to press {key}: {e}"))
        }

        fn hotkey(&mut self, keys: &[String]) -> anyhow::Result<()> {
            let mut enigo = connect()?;
            let keys = keys
                .iter()
                .map(|k| to_key(k))
                .collect::<anyhow::Result<Vec<_>>>()?;
            for key in &keys {
                enigo
                    .key(*key, Direction::Press)
                    .map_err(|e| anyhow!("failed to press hotkey: {e}"))?;
            }
            for key in keys.iter().rev() {
                enigo
                    .key(*key, Direction::Release)
                    .map_err(|e| anyhow!("failed to release hotkey: {e}"))?;
            }
            Ok(())
        }

        fn click(&mut self, x: i64, y: i64, button: MouseButton) -> anyhow::Result<()> {
            let mut enigo = connect()?;
            enigo
                .move_mouse(coord(x)?, coord(y)?, Coordinate::Abs)
                .map_err(|e| anyhow!("failed to move mouse: {e}"))?;
            enigo
                .button(to_button(button), Direction::Click)
                .map_err(|e| anyhow!("failed to click: {e}"))
        }

        fn scroll(&mut self, x: i64, y: i64, amount: i64) -> anyhow::Result<()> {
            let mut enigo = connect()?;
            enigo
                .move_mouse(coord(x)?, coord(y)?, Coordinate::Abs)
                .map_err(|e| anyhow!("failed to move mouse: {e}"))?;
            // enigo 正值向下
            enigo
                .scroll(-coord(amount)?, Axis::Vertical)
                .map_err(|e| anyhow!("failed to scroll: {e}"))
        }

        fn drag(
            &mut self,
            from: (i64, i64),
            to: (i64, i64),
            duration: Duration,
            button: MouseButton,
        ) -> anyhow::Result<()> {
            let mut enigo = connect()?;
            let (x0, y0) = (coord(from.0)?, coord(from.1)?);
            let (x1, y1) = (coord(to.0)?, coord(to.1)?);
            enigo
                .move_mouse(x0, y0, Coordinate::Abs)
                .map_err(|e| anyhow!("failed to move mouse: {e}"))?;
            enigo
                .button(to_button(button), Direction::Press)
                .map_err(|e| anyhow!("failed to press button: {e}"))?;
            let step_pause = duration / DRAG_STEPS;
            for step in 1..=DRAG_STEPS as i32 {
                let x = x0 + (x1 - x0) * step / DRAG_STEPS as i32;
                let y = y0 + (y1 - y0) * step / DRAG_STEPS as i32;
                std::thread::sleep(step_pause);
                enigo
                    .move_mouse(x, y, Coordinate::Abs)
                    .map_err(|e| anyhow!("failed to move mouse: {e}"))?;
            }
            enigo
                .button(to_button(button), Direction::Release)
                .map_err(|e| anyhow!("failed to release button: {e}"))
        }
    }
}
