//! Notifier - 固定周期的后台定时线程
//!
//! 从构造时刻起，每隔 `period` 在专用线程中调用一次回调，直到 `stop()` 或 `Drop`。
//!
//! # 定时模式
//!
//! - [`TimingMode::Sleep`]: 在 crossbeam 关闭通道上 `recv_deadline`，
//!   `stop()` 会立即唤醒线程
//! - [`TimingMode::Spin`]: 使用 `spin_sleep` 实现低抖动延时，
//!   占用更多 CPU，关闭标志每个周期检查一次
//!
//! # 调度
//!
//! 截止时间每次严格前进一个周期，不会累积漂移。
//! 回调执行过久导致下一个截止时间已经过去时，记为一次超时（overrun），
//! 从当前时刻重新对齐，不补发错过的周期。
//!
//! # 示例
//!
//! ```rust
//! use pidloop_runner::{Notifier, TimingMode};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::time::Duration;
//!
//! let count = Arc::new(AtomicUsize::new(0));
//! let c = count.clone();
//! let mut notifier = Notifier::start(
//!     "example",
//!     Duration::from_millis(5),
//!     TimingMode::Sleep,
//!     move || {
//!         c.fetch_add(1, Ordering::Relaxed);
//!     },
//! )
//! .unwrap();
//!
//! std::thread::sleep(Duration::from_millis(30));
//! notifier.stop();
//! assert!(count.load(Ordering::Relaxed) > 0);
//! ```

use crate::error::{Result, RunnerError};
use crossbeam_channel::{RecvTimeoutError, Sender};
use spin_sleep::SpinSleeper;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// 定时模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimingMode {
    /// 阻塞等待（默认）
    #[default]
    Sleep,
    /// 自旋等待，低抖动
    Spin,
}

/// 定时线程计数器
#[derive(Debug, Default)]
struct NotifierStats {
    ticks: AtomicU64,
    overruns: AtomicU64,
}

/// 固定周期定时器
pub struct Notifier {
    handle: Option<JoinHandle<()>>,
    /// 丢弃即通知 Sleep 模式的线程退出
    shutdown_tx: Option<Sender<()>>,
    /// Spin 模式的关闭标志
    shutdown: Arc<AtomicBool>,
    stats: Arc<NotifierStats>,
    period: Duration,
}

impl Notifier {
    /// 启动定时线程
    ///
    /// # 参数
    ///
    /// - `name`: 线程名
    /// - `period`: 周期（> 0）
    /// - `mode`: 定时模式
    /// - `handler`: 每个周期调用一次
    ///
    /// # 错误
    ///
    /// - 周期为 0 时返回 `RunnerError::InvalidPeriod`
    /// - 线程创建失败时返回 `RunnerError::Spawn`
    pub fn start<F>(name: &str, period: Duration, mode: TimingMode, handler: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        if period.is_zero() {
            return Err(RunnerError::InvalidPeriod { period: 0.0 });
        }

        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let shutdown = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(NotifierStats::default());

        let loop_shutdown = shutdown.clone();
        let loop_stats = stats.clone();
        let thread_name = name.to_string();

        let handle = thread::Builder::new().name(thread_name.clone()).spawn(move || {
            // 设置线程优先级（可选 feature）
            #[cfg(feature = "realtime")]
            {
                use thread_priority::*;

                match set_current_thread_priority(ThreadPriority::Max) {
                    Ok(_) => {
                        tracing::info!("{} thread priority set to MAX (realtime)", thread_name);
                    },
                    Err(e) => {
                        tracing::warn!(
                            "Failed to set {} thread priority: {}. \
                            On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
                            thread_name,
                            e
                        );
                    },
                }
            }

            let wait: Box<dyn FnMut(Instant) -> bool> = match mode {
                TimingMode::Sleep => Box::new(move |deadline| {
                    match shutdown_rx.recv_deadline(deadline) {
                        Err(RecvTimeoutError::Timeout) => true,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
                    }
                }),
                TimingMode::Spin => {
                    let sleeper = SpinSleeper::default();
                    Box::new(move |deadline| {
                        let now = Instant::now();
                        if deadline > now {
                            sleeper.sleep(deadline - now);
                        }
                        !loop_shutdown.load(Ordering::Acquire)
                    })
                },
            };

            tracing::debug!("{} started: period {:?}, mode {:?}", thread_name, period, mode);
            notifier_loop(period, wait, &loop_stats, handler, &thread_name);
            tracing::debug!("{} stopped", thread_name);
        })?;

        Ok(Notifier {
            handle: Some(handle),
            shutdown_tx: Some(shutdown_tx),
            shutdown,
            stats,
            period,
        })
    }

    /// 周期
    pub fn period(&self) -> Duration {
        self.period
    }

    /// 已经执行的回调次数
    pub fn ticks(&self) -> u64 {
        self.stats.ticks.load(Ordering::Relaxed)
    }

    /// 超时（错过截止时间）次数
    pub fn overruns(&self) -> u64 {
        self.stats.overruns.load(Ordering::Relaxed)
    }

    /// 定时线程是否仍在运行
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// 停止定时线程并等待退出（幂等）
    ///
    /// 在回调内部（即定时线程自身）调用时只发出停止信号，不等待。
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        drop(self.shutdown_tx.take());

        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            let _ = handle.join();
        }
    }
}

/// 定时循环
///
/// `wait` 等待到截止时间，返回 `false` 表示收到关闭信号。
fn notifier_loop<F>(
    period: Duration,
    mut wait: Box<dyn FnMut(Instant) -> bool>,
    stats: &NotifierStats,
    mut handler: F,
    name: &str,
) where
    F: FnMut(),
{
    let mut deadline = Instant::now() + period;

    while wait(deadline) {
        handler();
        stats.ticks.fetch_add(1, Ordering::Relaxed);

        deadline += period;
        let now = Instant::now();
        if deadline <= now {
            let overruns = stats.overruns.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::warn!(
                "{} overran its period of {:?} by {:?} (overruns: {})",
                name,
                period,
                now - deadline,
                overruns
            );
            deadline = now + period;
        }
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("period", &self.period)
            .field("ticks", &self.ticks())
            .field("overruns", &self.overruns())
            .field("running", &self.is_running())
            .finish()
    }
}
