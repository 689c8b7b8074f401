//! Controller Runner - 周期性执行控制器
//!
//! 在专用定时线程中每个周期调用一次 `controller.update()`，
//! 并把结果交给输出回调（例如写入执行器）。
//!
//! # 状态机
//!
//! ```text
//!            enable()
//! Disabled ───────────► Enabled
//!    ▲                     │
//!    └─────────────────────┘
//!      disable()  → controller_output(0.0)
//! ```
//!
//! 定时线程从构造时刻就开始运行，`enabled` 只决定 tick 是否产生输出。
//!
//! # 锁
//!
//! - **输出锁**（可重入）: 包住 tick 中的 `update()` + 输出回调，以及 `disable()` 的清零输出
//! - **使能锁**: 只保护 `enabled` 标志
//!
//! 因此 `disable()` 与 tick 的输出互斥：正在进行的 tick 先完成，
//! 之后的 tick 必然看到 `enabled == false`，清零输出之后不会再出现旧的非零输出。
//! 输出锁可重入，输出回调里调用 `disable()` 不会死锁。
//!
//! # 示例
//!
//! ```rust,no_run
//! use pidloop_controller::PidController;
//! use pidloop_runner::ControllerRunner;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pid = Arc::new(PidController::builder(0.5, 0.0, 0.0, || 0.0).period(0.01).build()?);
//! pid.set_reference(1.0);
//!
//! let runner = ControllerRunner::new(pid.clone(), |output| {
//!     println!("actuator <- {output:.3}");
//! })?;
//! runner.enable();
//! std::thread::sleep(std::time::Duration::from_millis(100));
//! runner.disable(); // 执行器收到 0.0
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, RunnerError};
use crate::notifier::{Notifier, TimingMode};
use parking_lot::{Mutex, ReentrantMutex};
use pidloop_controller::Controller;
use std::fmt;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// 输出回调
pub type ControllerOutput = Box<dyn Fn(f64) + Send + Sync>;

/// 定时线程与各个句柄共享的状态
struct RunnerShared<C: Controller + ?Sized> {
    controller: Arc<C>,
    controller_output: ControllerOutput,
    /// 使能锁
    enabled: Mutex<bool>,
    /// 输出锁
    output_lock: ReentrantMutex<()>,
    /// 产生输出的 tick 数
    outputs: AtomicU64,
}

impl<C: Controller + ?Sized> RunnerShared<C> {
    fn enable(&self) {
        let mut enabled = self.enabled.lock();
        if !*enabled {
            tracing::debug!("Controller runner enabled");
        }
        *enabled = true;
    }

    fn disable(&self) {
        let _output = self.output_lock.lock();
        {
            let mut enabled = self.enabled.lock();
            if *enabled {
                tracing::debug!("Controller runner disabled");
            }
            *enabled = false;
        }
        (self.controller_output)(0.0);
    }

    fn is_enabled(&self) -> bool {
        *self.enabled.lock()
    }

    fn tick(&self) {
        let _output = self.output_lock.lock();
        if self.is_enabled() {
            let value = self.controller.update();
            (self.controller_output)(value);
            self.outputs.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(output = value, "Controller runner tick");
        }
    }
}

/// 控制器 Runner
///
/// 拥有定时线程；`Drop` 时停止定时线程（不会自动调用 `disable()`）。
pub struct ControllerRunner<C: Controller + ?Sized + 'static> {
    shared: Arc<RunnerShared<C>>,
    notifier: Notifier,
}

impl<C: Controller + ?Sized + 'static> ControllerRunner<C> {
    /// 创建 Runner 并立即启动定时线程（初始为 Disabled）
    ///
    /// 周期在构造时从 `controller.period()` 读取一次。
    ///
    /// # 错误
    ///
    /// - 控制器周期不是有限正数、或无法表示为非零 `Duration` 时返回
    ///   `RunnerError::InvalidPeriod`（携带控制器报告的原始值）
    /// - 定时线程创建失败时返回 `RunnerError::Spawn`
    pub fn new<F>(controller: Arc<C>, controller_output: F) -> Result<Self>
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        Self::with_timing(controller, controller_output, TimingMode::default())
    }

    /// 指定定时模式创建 Runner
    pub fn with_timing<F>(controller: Arc<C>, controller_output: F, mode: TimingMode) -> Result<Self>
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        let period = controller.period();
        let interval = match Duration::try_from_secs_f64(period) {
            Ok(interval) if !interval.is_zero() => interval,
            _ => return Err(RunnerError::InvalidPeriod { period }),
        };

        let shared = Arc::new(RunnerShared {
            controller,
            controller_output: Box::new(controller_output),
            enabled: Mutex::new(false),
            output_lock: ReentrantMutex::new(()),
            outputs: AtomicU64::new(0),
        });

        let tick_shared = shared.clone();
        let notifier = Notifier::start(
            "pidloop-runner",
            interval,
            mode,
            move || tick_shared.tick(),
        )?;

        Ok(ControllerRunner { shared, notifier })
    }

    /// 允许 tick 产生输出
    pub fn enable(&self) {
        self.shared.enable();
    }

    /// 禁止 tick 产生输出，并立即输出 0.0
    ///
    /// 与正在进行的 tick 互斥：返回后不会再出现非零输出，直到再次 `enable()`。
    pub fn disable(&self) {
        self.shared.disable();
    }

    /// 是否使能
    pub fn is_enabled(&self) -> bool {
        self.shared.is_enabled()
    }

    /// 可跨线程克隆的控制句柄
    pub fn handle(&self) -> RunnerHandle<C> {
        RunnerHandle {
            shared: self.shared.clone(),
        }
    }

    /// 被驱动的控制器
    pub fn controller(&self) -> &Arc<C> {
        &self.shared.controller
    }

    /// 定时周期
    pub fn period(&self) -> Duration {
        self.notifier.period()
    }

    /// 定时线程执行过的 tick 数（含未使能时的 tick）
    pub fn ticks(&self) -> u64 {
        self.notifier.ticks()
    }

    /// 产生过输出的 tick 数
    pub fn outputs(&self) -> u64 {
        self.shared.outputs.load(Ordering::Relaxed)
    }

    /// 定时超时次数
    pub fn overruns(&self) -> u64 {
        self.notifier.overruns()
    }

    /// 停止定时线程
    ///
    /// 不会调用 `disable()`；需要安全输出时先调用 `disable()`。
    pub fn stop(&mut self) {
        self.notifier.stop();
    }
}

impl<C: Controller + ?Sized + 'static> fmt::Debug for ControllerRunner<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerRunner")
            .field("enabled", &self.is_enabled())
            .field("outputs", &self.outputs())
            .field("notifier", &self.notifier)
            .finish()
    }
}

/// Runner 控制句柄
///
/// 供其他线程（UI、网络处理等）使能/禁止 Runner。
///
/// 句柄持有共享状态的强引用。输出回调需要控制 Runner 时应捕获
/// [`WeakRunnerHandle`]（[`RunnerHandle::downgrade`]），
/// 否则回调与共享状态互相引用，Runner 释放后控制器也不会被释放。
pub struct RunnerHandle<C: Controller + ?Sized + 'static> {
    shared: Arc<RunnerShared<C>>,
}

impl<C: Controller + ?Sized + 'static> RunnerHandle<C> {
    /// 见 [`ControllerRunner::enable`]
    pub fn enable(&self) {
        self.shared.enable();
    }

    /// 见 [`ControllerRunner::disable`]
    pub fn disable(&self) {
        self.shared.disable();
    }

    /// 是否使能
    pub fn is_enabled(&self) -> bool {
        self.shared.is_enabled()
    }

    /// 被驱动的控制器
    pub fn controller(&self) -> &Arc<C> {
        &self.shared.controller
    }

    /// 不持有共享状态的弱句柄，可安全放进输出回调
    pub fn downgrade(&self) -> WeakRunnerHandle<C> {
        WeakRunnerHandle {
            shared: Arc::downgrade(&self.shared),
        }
    }
}

impl<C: Controller + ?Sized + 'static> Clone for RunnerHandle<C> {
    fn clone(&self) -> Self {
        RunnerHandle {
            shared: self.shared.clone(),
        }
    }
}

/// Runner 弱控制句柄
///
/// Runner 释放后所有操作变为空操作。
pub struct WeakRunnerHandle<C: Controller + ?Sized + 'static> {
    shared: Weak<RunnerShared<C>>,
}

impl<C: Controller + ?Sized + 'static> WeakRunnerHandle<C> {
    /// 升级为强句柄；Runner 已释放时返回 `None`
    pub fn upgrade(&self) -> Option<RunnerHandle<C>> {
        self.shared.upgrade().map(|shared| RunnerHandle { shared })
    }

    /// 见 [`ControllerRunner::enable`]
    pub fn enable(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.enable();
        }
    }

    /// 见 [`ControllerRunner::disable`]
    pub fn disable(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.disable();
        }
    }

    /// 是否使能；Runner 已释放时为 `false`
    pub fn is_enabled(&self) -> bool {
        self.shared.upgrade().is_some_and(|shared| shared.is_enabled())
    }
}

impl<C: Controller + ?Sized + 'static> Clone for WeakRunnerHandle<C> {
    fn clone(&self) -> Self {
        WeakRunnerHandle {
            shared: self.shared.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct FixedController {
        period: f64,
        updates: AtomicUsize,
    }

    impl Controller for FixedController {
        fn update(&self) -> f64 {
            self.updates.fetch_add(1, Ordering::Relaxed);
            0.5
        }

        fn period(&self) -> f64 {
            self.period
        }
    }

    fn fixed(period: f64) -> Arc<FixedController> {
        Arc::new(FixedController {
            period,
            updates: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_invalid_period_rejected() {
        for period in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let result = ControllerRunner::new(fixed(period), |_| {});
            assert!(matches!(result, Err(RunnerError::InvalidPeriod { .. })));
        }
    }

    #[test]
    fn test_unrepresentable_period_rejected_without_panic() {
        for period in [1e20, f64::MAX] {
            let result = ControllerRunner::new(fixed(period), |_| {});
            assert!(matches!(result, Err(RunnerError::InvalidPeriod { period: p }) if p == period));
        }
    }

    #[test]
    fn test_subnanosecond_period_reports_original_value() {
        let err = ControllerRunner::new(fixed(1e-12), |_| {}).unwrap_err();
        assert!(matches!(err, RunnerError::InvalidPeriod { period } if period == 1e-12));
        assert!(err.to_string().contains("0.000000000001 s"));
    }

    #[test]
    fn test_initially_disabled() {
        let runner = ControllerRunner::new(fixed(0.01), |_| {}).unwrap();
        assert!(!runner.is_enabled());
        assert_eq!(runner.period(), Duration::from_millis(10));
    }

    #[test]
    fn test_enable_disable_toggle() {
        let runner = ControllerRunner::new(fixed(1.0), |_| {}).unwrap();
        runner.enable();
        assert!(runner.is_enabled());
        runner.enable();
        assert!(runner.is_enabled());
        runner.disable();
        assert!(!runner.is_enabled());
    }

    #[test]
    fn test_direct_tick_respects_enabled() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        // 周期很长，只测试手动调用 tick
        let runner = ControllerRunner::new(fixed(60.0), move |v| sink.lock().push(v)).unwrap();

        runner.shared.tick();
        assert!(seen.lock().is_empty());
        assert_eq!(runner.controller().updates.load(Ordering::Relaxed), 0);

        runner.enable();
        runner.shared.tick();
        runner.shared.tick();
        assert_eq!(*seen.lock(), vec![0.5, 0.5]);
        assert_eq!(runner.outputs(), 2);

        runner.disable();
        runner.shared.tick();
        assert_eq!(*seen.lock(), vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn test_disable_outputs_zero_even_when_already_disabled() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let runner = ControllerRunner::new(fixed(60.0), move |v| sink.lock().push(v)).unwrap();

        runner.disable();
        runner.disable();
        assert_eq!(*seen.lock(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_handle_shares_state() {
        let runner = ControllerRunner::new(fixed(60.0), |_| {}).unwrap();
        let handle = runner.handle();
        let other = handle.clone();

        handle.enable();
        assert!(runner.is_enabled());
        other.disable();
        assert!(!runner.is_enabled());
        assert!(Arc::ptr_eq(handle.controller(), runner.controller()));
    }

    #[test]
    fn test_dyn_controller() {
        let controller: Arc<dyn Controller> = fixed(60.0);
        let runner = ControllerRunner::new(controller, |_| {}).unwrap();
        runner.enable();
        runner.shared.tick();
        assert_eq!(runner.outputs(), 1);
    }

    #[test]
    fn test_weak_handle_does_not_keep_runner_alive() {
        let controller = fixed(60.0);
        let runner = ControllerRunner::new(controller.clone(), |_| {}).unwrap();
        let weak = runner.handle().downgrade();

        weak.enable();
        assert!(runner.is_enabled());
        assert!(weak.upgrade().is_some());
        weak.disable();
        assert!(!weak.is_enabled());

        drop(runner);
        assert!(weak.upgrade().is_none());
        assert!(!weak.is_enabled());
        weak.disable();
        assert_eq!(Arc::strong_count(&controller), 1);
    }
}
