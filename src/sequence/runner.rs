//! 后台运行：把序列与驱动移交给 spawn_blocking worker
//!
//! 调用方保留异步上下文，通过 RunHandle 读取事件、取消与等待结果；
//! 运行结束后序列的所有权随 RunReport 交还。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::action::InputDriver;
use crate::core::error::SequenceError;
use crate::sequence::engine::ActionSequence;
use crate::sequence::events::{ProgressEvent, RunEvent, RunOutcome};

/// 一次运行的结果
#[derive(Debug)]
pub struct RunReport {
    pub sequence: ActionSequence,
    pub outcome: RunOutcome,
}

/// worker 退出时清除忙碌标记
struct BusyFlag(Arc<AtomicBool>);

impl Drop for BusyFlag {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// 序列运行器：同一时刻只允许一次运行
#[derive(Debug, Clone, Default)]
pub struct SequenceRunner {
    busy: Arc<AtomicBool>,
    countdown_secs: u64,
}

impl SequenceRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开始前倒计时秒数（0 表示不倒计时）
    pub fn with_countdown(mut self, secs: u64) -> Self {
        self.countdown_secs = secs;
        self
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// 校验后启动后台运行
    ///
    /// 需在 Tokio 运行时内调用；不在运行时内时返回 [`SequenceError::Worker`]。
    pub fn start(
        &self,
        sequence: ActionSequence,
        driver: Box<dyn InputDriver>,
    ) -> Result<RunHandle, SequenceError> {
        let problems = sequence.validate();
        if !problems.is_empty() {
            return Err(SequenceError::Invalid(problems));
        }
        let runtime = Handle::try_current().map_err(|e| SequenceError::Worker(e.to_string()))?;
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SequenceError::AlreadyRunning);
        }

        let busy = BusyFlag(Arc::clone(&self.busy));
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let countdown = self.countdown_secs;

        tracing::info!(sequence = %sequence.name, countdown, "Starting background run");
        let join = runtime.spawn_blocking(move || {
            let _busy = busy;
            run_worker(sequence, driver, countdown, token, tx)
        });

        Ok(RunHandle {
            events: rx,
            cancel,
            join,
        })
    }
}

fn run_worker(
    mut sequence: ActionSequence,
    mut driver: Box<dyn InputDriver>,
    countdown: u64,
    token: CancellationToken,
    tx: mpsc::UnboundedSender<RunEvent>,
) -> Result<RunReport, SequenceError> {
    for remaining in (1..=countdown).rev() {
        if token.is_cancelled() {
            break;
        }
        let _ = tx.send(RunEvent::Countdown { remaining });
        std::thread::sleep(Duration::from_secs(1));
    }

    let outcome = if token.is_cancelled() {
        tracing::info!("Run cancelled during countdown");
        RunOutcome::Stopped
    } else {
        let mut forward = |event: ProgressEvent| {
            let _ = tx.send(RunEvent::Progress(event));
        };
        let stop = || token.is_cancelled();
        sequence.execute(driver.as_mut(), Some(&mut forward), Some(&stop))?
    };

    let _ = tx.send(RunEvent::Finished { outcome });
    Ok(RunReport { sequence, outcome })
}

/// 运行中的句柄
pub struct RunHandle {
    events: mpsc::UnboundedReceiver<RunEvent>,
    cancel: CancellationToken,
    join: JoinHandle<Result<RunReport, SequenceError>>,
}

impl RunHandle {
    /// 下一个事件；worker 结束且事件读完后返回 None
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        self.events.recv().await
    }

    /// 请求停止（在下一个轮询点生效）
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 等待 worker 结束，取回序列与结局
    pub async fn wait(self) -> Result<RunReport, SequenceError> {
        self.join
            .await
            .map_err(|e| SequenceError::Worker(e.to_string()))?
    }
}
