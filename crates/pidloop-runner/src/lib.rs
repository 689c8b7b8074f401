//! # pidloop-runner
//!
//! 固定周期驱动 [`Controller`](pidloop_controller::Controller) 的执行框架。
//!
//! ## 包含模块
//!
//! - `notifier` - 固定周期的后台定时线程（阻塞等待或自旋等待）
//! - `runner` - `ControllerRunner`：使能/禁止，禁止时保证输出 0
//! - `error` - Runner 层错误
//!
//! ## Feature Flags
//!
//! - `realtime` - 把定时线程优先级提升到最高（失败只记录警告）

pub mod error;
pub mod notifier;
pub mod runner;

// 重新导出常用类型
pub use error::{Result, RunnerError};
pub use notifier::{Notifier, TimingMode};
pub use runner::{ControllerOutput, ControllerRunner, RunnerHandle, WeakRunnerHandle};
