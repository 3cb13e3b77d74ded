//! 序列执行引擎
//!
//! ActionSequence 持有有序动作列表与循环配置，按 loop / delay / stop_on_error 策略
//! 同步执行。取消是协作式的：只在每轮循环开始与每个动作开始前轮询停止谓词。
//! 运行期字段（is_running / current_action_index / current_loop）在任何退出路径上
//! 都由 RunGuard 复位。

use std::fmt;
use std::time::Duration;

use crate::action::{Action, ActionKind, InputDriver};
use crate::action::types::now_timestamp;
use crate::core::error::SequenceError;
use crate::sequence::events::{ProgressEvent, RunOutcome};

/// 有序动作序列
#[derive(Debug, Clone)]
pub struct ActionSequence {
    pub name: String,
    pub description: String,
    pub created_at: f64,
    pub modified_at: f64,
    pub loop_enabled: bool,
    /// 启用循环时的轮数，至少为 1
    pub loop_count: u32,
    /// 两轮之间的间隔（秒）
    pub repeat_interval: f64,
    pub stop_on_error: bool,
    actions: Vec<Action>,
    is_running: bool,
    current_action_index: usize,
    current_loop: u32,
}

impl Default for ActionSequence {
    fn default() -> Self {
        Self::new("Untitled Sequence")
    }
}

/// 运行期字段复位（含 panic 展开路径）
struct RunGuard<'a> {
    sequence: &'a mut ActionSequence,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.sequence.is_running = false;
        self.sequence.current_action_index = 0;
        self.sequence.current_loop = 0;
    }
}

fn emit(progress: &mut Option<&mut dyn FnMut(ProgressEvent)>, event: ProgressEvent) {
    if let Some(callback) = progress.as_mut() {
        callback(event);
    }
}

fn stop_requested(stop: Option<&dyn Fn() -> bool>) -> bool {
    stop.is_some_and(|check| check())
}

impl ActionSequence {
    pub fn new(name: impl Into<String>) -> Self {
        let now = now_timestamp();
        Self {
            name: name.into(),
            description: String::new(),
            created_at: now,
            modified_at: now,
            loop_enabled: false,
            loop_count: 1,
            repeat_interval: 0.0,
            stop_on_error: true,
            actions: Vec::new(),
            is_running: false,
            current_action_index: 0,
            current_loop: 0,
        }
    }

    /// 以给定动作列表构造（加载文件 / AI 生成时使用）
    pub fn with_actions(name: impl Into<String>, actions: Vec<Action>) -> Self {
        let mut sequence = Self::new(name);
        sequence.actions = actions;
        sequence
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn current_action_index(&self) -> usize {
        self.current_action_index
    }

    /// 运行中从 1 开始；空闲时为 0
    pub fn current_loop(&self) -> u32 {
        self.current_loop
    }

    /// 实际执行的轮数
    pub fn effective_loops(&self) -> u32 {
        if self.loop_enabled {
            self.loop_count
        } else {
            1
        }
    }

    pub(crate) fn touch(&mut self) {
        self.modified_at = now_timestamp();
    }

    fn ensure_idle(&self) -> Result<(), SequenceError> {
        if self.is_running {
            return Err(SequenceError::Running);
        }
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<(), SequenceError> {
        if index >= self.actions.len() {
            return Err(SequenceError::IndexOutOfRange {
                index,
                len: self.actions.len(),
            });
        }
        Ok(())
    }

    pub fn add_action(&mut self, action: Action) -> Result<(), SequenceError> {
        self.ensure_idle()?;
        tracing::info!(action = %action, "Added action to sequence");
        self.actions.push(action);
        self.touch();
        Ok(())
    }

    /// 插入到 index 处；index == len 等价于追加
    pub fn insert_action(&mut self, index: usize, action: Action) -> Result<(), SequenceError> {
        self.ensure_idle()?;
        if index > self.actions.len() {
            return Err(SequenceError::IndexOutOfRange {
                index,
                len: self.actions.len(),
            });
        }
        self.actions.insert(index, action);
        self.touch();
        Ok(())
    }

    pub fn remove_action(&mut self, index: usize) -> Result<Action, SequenceError> {
        self.ensure_idle()?;
        self.check_index(index)?;
        let removed = self.actions.remove(index);
        tracing::info!(action = %removed, "Removed action from sequence");
        self.touch();
        Ok(removed)
    }

    pub fn move_action(&mut self, from: usize, to: usize) -> Result<(), SequenceError> {
        self.ensure_idle()?;
        self.check_index(from)?;
        self.check_index(to)?;
        let action = self.actions.remove(from);
        self.actions.insert(to, action);
        tracing::info!(from, to, "Moved action");
        self.touch();
        Ok(())
    }

    /// 在 index 之后插入该动作的副本
    pub fn duplicate_action(&mut self, index: usize) -> Result<(), SequenceError> {
        self.ensure_idle()?;
        self.check_index(index)?;
        let original = &self.actions[index];
        let copy = original.duplicate().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Dictionary round-trip failed, cloning in memory");
            original.clone()
        });
        self.actions.insert(index + 1, copy);
        self.touch();
        Ok(())
    }

    pub fn clear(&mut self) -> Result<(), SequenceError> {
        self.ensure_idle()?;
        self.actions.clear();
        tracing::info!("Cleared all actions from sequence");
        self.touch();
        Ok(())
    }

    /// 校验，返回全部问题描述（空表示可运行）
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.actions.is_empty() {
            errors.push("Sequence is empty".to_string());
        }
        for (i, action) in self.actions.iter().enumerate() {
            if !action.validate() {
                errors.push(format!("Action {} is invalid: {}", i + 1, action));
            }
        }
        if self.loop_count < 1 {
            errors.push("Loop count must be at least 1".to_string());
        }
        if !(self.repeat_interval.is_finite() && self.repeat_interval >= 0.0) {
            errors.push("Repeat interval must be ≥ 0".to_string());
        }
        errors
    }

    /// 估算一次完整运行耗时（秒）：各动作 delay + 等待 / 拖拽时长，乘以轮数，加轮间间隔
    pub fn estimated_duration(&self) -> f64 {
        let per_loop: f64 = self
            .actions
            .iter()
            .filter(|a| a.enabled)
            .map(|a| match &a.kind {
                ActionKind::Delay { wait_time } => *wait_time,
                ActionKind::Drag { duration, .. } => a.delay + duration,
                _ => a.delay,
            })
            .sum();
        let loops = self.effective_loops();
        let pauses = if self.repeat_interval > 0.0 {
            f64::from(loops.saturating_sub(1)) * self.repeat_interval
        } else {
            0.0
        };
        per_loop * f64::from(loops) + pauses
    }

    /// 执行序列
    ///
    /// 已在运行时返回 [`SequenceError::AlreadyRunning`]；动作失败不是错误，
    /// 体现在 [`RunOutcome`] 中。
    pub fn execute(
        &mut self,
        driver: &mut dyn InputDriver,
        progress: Option<&mut dyn FnMut(ProgressEvent)>,
        stop: Option<&dyn Fn() -> bool>,
    ) -> Result<RunOutcome, SequenceError> {
        if self.is_running {
            return Err(SequenceError::AlreadyRunning);
        }
        self.is_running = true;

        let guard = RunGuard { sequence: self };
        let outcome = guard.sequence.run_loops(driver, progress, stop);
        drop(guard);

        tracing::info!(sequence = %self.name, ?outcome, "Sequence finished");
        Ok(outcome)
    }

    fn run_loops(
        &mut self,
        driver: &mut dyn InputDriver,
        mut progress: Option<&mut dyn FnMut(ProgressEvent)>,
        stop: Option<&dyn Fn() -> bool>,
    ) -> RunOutcome {
        let loop_count = self.effective_loops();
        let total_actions = self.actions.len();
        tracing::info!(
            sequence = %self.name,
            loops = loop_count,
            actions = total_actions,
            driver = driver.name(),
            "Starting sequence"
        );

        for loop_index in 0..loop_count {
            self.current_loop = loop_index + 1;
            if stop_requested(stop) {
                tracing::info!(loop_index, "Stop requested");
                return RunOutcome::Stopped;
            }

            for action_index in 0..total_actions {
                self.current_action_index = action_index;
                if stop_requested(stop) {
                    tracing::info!(loop_index, action_index, "Stop requested");
                    return RunOutcome::Stopped;
                }

                let action = &self.actions[action_index];
                emit(
                    &mut progress,
                    ProgressEvent::Action {
                        loop_index,
                        loop_count,
                        action_index,
                        total_actions,
                        action: action.to_string(),
                    },
                );

                let error = match action.execute(driver) {
                    Ok(true) => continue,
                    Ok(false) => "action reported failure".to_string(),
                    Err(e) => e.to_string(),
                };

                emit(
                    &mut progress,
                    ProgressEvent::ActionFailed {
                        loop_index,
                        action_index,
                        error: error.clone(),
                    },
                );
                if self.stop_on_error {
                    tracing::error!(action = %action, error = %error, "Action failed, stopping sequence");
                    return RunOutcome::Failed;
                }
                tracing::warn!(action = %action, error = %error, "Action failed, continuing");
            }

            if self.loop_enabled && loop_index + 1 < loop_count && self.repeat_interval > 0.0 {
                emit(
                    &mut progress,
                    ProgressEvent::LoopPause {
                        loop_index,
                        loop_count,
                        interval_secs: self.repeat_interval,
                    },
                );
                std::thread::sleep(Duration::from_secs_f64(self.repeat_interval.min(86_400.0)));
            }
        }

        RunOutcome::Completed
    }
}

impl fmt::Display for ActionSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ActionSequence '{}' with {} actions",
            self.name,
            self.actions.len()
        )
    }
}

/// 时长格式化：`12.5s` / `3m 4.0s` / `1h 2m 3.0s`
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{seconds:.1}s")
    } else if seconds < 3600.0 {
        let minutes = (seconds / 60.0).floor();
        format!("{}m {:.1}s", minutes as u64, seconds - minutes * 60.0)
    } else {
        let hours = (seconds / 3600.0).floor();
        let rest = seconds - hours * 3600.0;
        let minutes = (rest / 60.0).floor();
        format!(
            "{}h {}m {:.1}s",
            hours as u64,
            minutes as u64,
            rest - minutes * 60.0
        )
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::action::driver::{DriverCall, RecordingDriver};
    use crate::action::MouseButton;

    fn three_actions() -> ActionSequence {
        ActionSequence::with_actions(
            "three",
            vec![
                Action::type_text("one"),
                Action::special_key("tab"),
                Action::type_text("three"),
            ],
        )
    }

    fn fail_on_press() -> RecordingDriver {
        RecordingDriver::new().fail_when(|c| matches!(c, DriverCall::Press(_)))
    }

    #[test]
    fn test_stop_on_error_aborts() {
        let mut sequence = three_actions();
        let mut driver = fail_on_press();
        let calls = driver.calls();

        let outcome = sequence.execute(&mut driver, None, None).unwrap();
        assert_eq!(outcome, RunOutcome::Failed);
        assert!(!outcome.is_success());
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                DriverCall::Type("one".into()),
                DriverCall::Press("tab".into())
            ]
        );
    }

    #[test]
    fn test_continue_on_error_runs_everything_in_order() {
        let mut sequence = three_actions();
        sequence.stop_on_error = false;
        let mut driver = fail_on_press();
        let calls = driver.calls();
        let mut failures = Vec::new();
        let mut on_progress = |e: ProgressEvent| {
            if let ProgressEvent::ActionFailed { action_index, .. } = e {
                failures.push(action_index);
            }
        };

        let outcome = sequence
            .execute(&mut driver, Some(&mut on_progress), None)
            .unwrap();
        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                DriverCall::Type("one".into()),
                DriverCall::Press("tab".into()),
                DriverCall::Type("three".into())
            ]
        );
        assert_eq!(failures, vec![1]);
    }

    #[test]
    fn test_loop_pause_markers_between_iterations() {
        let mut sequence = ActionSequence::with_actions("loops", vec![Action::type_text("x")]);
        sequence.loop_enabled = true;
        sequence.loop_count = 3;
        sequence.repeat_interval = 0.01;
        let mut events = Vec::new();
        let mut on_progress = |e: ProgressEvent| events.push(e);

        let outcome = sequence
            .execute(&mut RecordingDriver::new(), Some(&mut on_progress), None)
            .unwrap();
        assert_eq!(outcome, RunOutcome::Completed);

        let kinds: Vec<&str> = events
            .iter()
            .map(|e| match e {
                ProgressEvent::Action { .. } => "action",
                ProgressEvent::LoopPause { .. } => "pause",
                ProgressEvent::ActionFailed { .. } => "failed",
            })
            .collect();
        assert_eq!(kinds, vec!["action", "pause", "action", "pause", "action"]);
        assert!(matches!(
            events[0],
            ProgressEvent::Action {
                loop_index: 0,
                loop_count: 3,
                action_index: 0,
                total_actions: 1,
                ..
            }
        ));

        let indices: Vec<(&str, u32)> = events
            .iter()
            .map(|e| match e {
                ProgressEvent::Action { loop_index, .. } => ("action", *loop_index),
                ProgressEvent::LoopPause { loop_index, .. } => ("pause", *loop_index),
                ProgressEvent::ActionFailed { loop_index, .. } => ("failed", *loop_index),
            })
            .collect();
        assert_eq!(
            indices,
            vec![("action", 0), ("pause", 0), ("action", 1), ("pause", 1), ("action", 2)]
        );
    }

    #[test]
    fn test_loop_count_ignored_when_looping_disabled() {
        let mut sequence = ActionSequence::with_actions("once", vec![Action::type_text("x")]);
        sequence.loop_count = 5;
        let mut driver = RecordingDriver::new();
        let calls = driver.calls();
        sequence.execute(&mut driver, None, None).unwrap();
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_runtime_reset_after_every_exit() {
        // 成功
        let mut sequence = three_actions();
        sequence.execute(&mut RecordingDriver::new(), None, None).unwrap();
        assert_runtime_reset(&sequence);

        // 中止
        let mut sequence = three_actions();
        sequence.execute(&mut fail_on_press(), None, None).unwrap();
        assert_runtime_reset(&sequence);

        // 提前停止：第三次轮询（第二个动作前）停止
        let mut sequence = three_actions();
        let polls = Cell::new(0);
        let stop = || {
            polls.set(polls.get() + 1);
            polls.get() > 2
        };
        let outcome = sequence
            .execute(&mut RecordingDriver::new(), None, Some(&stop))
            .unwrap();
        assert_eq!(outcome, RunOutcome::Stopped);
        assert!(outcome.is_success());
        assert_runtime_reset(&sequence);
    }

    fn assert_runtime_reset(sequence: &ActionSequence) {
        assert!(!sequence.is_running());
        assert_eq!(sequence.current_action_index(), 0);
        assert_eq!(sequence.current_loop(), 0);
    }

    #[test]
    fn test_stop_before_start_runs_nothing() {
        let mut sequence = three_actions();
        let mut driver = RecordingDriver::new();
        let calls = driver.calls();
        let stop = || true;
        let outcome = sequence.execute(&mut driver, None, Some(&stop)).unwrap();
        assert_eq!(outcome, RunOutcome::Stopped);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_reentry_and_mutation_rejected_while_running() {
        let mut sequence = three_actions();
        sequence.is_running = true;
        assert_eq!(
            sequence.execute(&mut RecordingDriver::new(), None, None),
            Err(SequenceError::AlreadyRunning)
        );
        assert_eq!(
            sequence.add_action(Action::wait(1.0)),
            Err(SequenceError::Running)
        );
        assert_eq!(sequence.remove_action(0), Err(SequenceError::Running));
        assert_eq!(sequence.move_action(0, 1), Err(SequenceError::Running));
        assert_eq!(sequence.duplicate_action(0), Err(SequenceError::Running));
        assert_eq!(sequence.clear(), Err(SequenceError::Running));
        assert_eq!(sequence.len(), 3);
    }

    #[test]
    fn test_mutations_reorder_and_bump_modified_at() {
        let mut sequence = three_actions();
        sequence.modified_at = 0.0;

        sequence.move_action(2, 0).unwrap();
        assert!(sequence.modified_at > 0.0);
        assert_eq!(
            sequence.actions()[0].kind,
            ActionKind::Type {
                text: "three".into()
            }
        );

        sequence.duplicate_action(0).unwrap();
        assert_eq!(sequence.len(), 4);
        assert_eq!(sequence.actions()[1], sequence.actions()[0]);

        let removed = sequence.remove_action(1).unwrap();
        assert_eq!(removed.kind, ActionKind::Type { text: "three".into() });

        sequence
            .insert_action(3, Action::click(1, 2, MouseButton::Left))
            .unwrap();
        assert_eq!(sequence.len(), 4);
        assert_eq!(
            sequence.insert_action(9, Action::wait(1.0)),
            Err(SequenceError::IndexOutOfRange { index: 9, len: 4 })
        );
        assert_eq!(
            sequence.remove_action(4).unwrap_err(),
            SequenceError::IndexOutOfRange { index: 4, len: 4 }
        );

        sequence.clear().unwrap();
        assert!(sequence.is_empty());
    }

    #[test]
    fn test_validate_messages() {
        let mut sequence = ActionSequence::new("empty");
        sequence.loop_count = 0;
        sequence.repeat_interval = -1.0;
        assert_eq!(
            sequence.validate(),
            vec![
                "Sequence is empty",
                "Loop count must be at least 1",
                "Repeat interval must be ≥ 0"
            ]
        );

        let sequence = ActionSequence::with_actions(
            "bad",
            vec![Action::type_text("ok"), Action::hotkey(Vec::<String>::new())],
        );
        assert_eq!(
            sequence.validate(),
            vec!["Action 2 is invalid: Press hotkey  (delay: 0s)"]
        );
    }

    #[test]
    fn test_estimated_duration_and_format() {
        let mut sequence = ActionSequence::with_actions(
            "timing",
            vec![
                Action::type_text("a").with_delay(0.5),
                Action::wait(2.0),
                Action::drag((0, 0), (1, 1), 1.0, MouseButton::Left),
            ],
        );
        sequence.loop_enabled = true;
        sequence.loop_count = 2;
        sequence.repeat_interval = 1.0;
        assert_eq!(sequence.estimated_duration(), 8.0);

        assert_eq!(format_duration(12.34), "12.3s");
        assert_eq!(format_duration(125.0), "2m 5.0s");
        assert_eq!(format_duration(3723.0), "1h 2m 3.0s");
    }
}
