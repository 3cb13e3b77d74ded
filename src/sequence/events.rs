//! 运行过程事件：引擎回调与后台 worker 通道共用，可序列化为 JSON 行输出

use serde::Serialize;

/// 一次运行的结局
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// 所有循环跑完
    Completed,
    /// 被停止谓词 / 取消令牌中断
    Stopped,
    /// stop_on_error 下某个动作失败
    Failed,
}

impl RunOutcome {
    /// 只有 Failed 视为失败
    pub fn is_success(&self) -> bool {
        !matches!(self, RunOutcome::Failed)
    }
}

/// 引擎进度事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// 即将执行第 action_index 个动作（loop_index、action_index 都从 0 开始）
    Action {
        loop_index: u32,
        loop_count: u32,
        action_index: usize,
        total_actions: usize,
        action: String,
    },
    /// 第 loop_index 轮结束后、下一轮开始前的间隔
    LoopPause {
        loop_index: u32,
        loop_count: u32,
        interval_secs: f64,
    },
    /// 动作失败（stop_on_error=false 时随后继续）
    ActionFailed {
        loop_index: u32,
        action_index: usize,
        error: String,
    },
}

/// 后台运行事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    /// 倒计时剩余秒数
    Countdown { remaining: u64 },
    Progress(ProgressEvent),
    Finished { outcome: RunOutcome },
}
