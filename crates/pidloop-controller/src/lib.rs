//! # pidloop-controller
//!
//! 周期性闭环控制的计算单元。
//!
//! ## 包含模块
//!
//! - `controller` - `Controller` trait，Runner 依赖的唯一接口
//! - `pid` - 带前馈、连续输入和到位判定的 PID 控制器
//! - `bang_bang` - 两档输出的 Bang-Bang 控制器
//! - `config` - 控制器配置（纯数据结构）
//! - `error` - 构造与配置校验错误
//!
//! ## Feature Flags
//!
//! - `serde` - 为 `PidConfig` / `ToleranceKind` 派生序列化
//!
//! ## 使用示例
//!
//! ```rust
//! use pidloop_controller::{Controller, PidController};
//! use std::sync::Arc;
//!
//! let pid = Arc::new(
//!     PidController::builder(0.5, 0.0, 0.0, || 90.0)
//!         .period(0.02)
//!         .build()
//!         .unwrap(),
//! );
//! pid.set_input_range(0.0, 360.0);
//! pid.set_continuous(true);
//! pid.set_reference(270.0);
//!
//! // 误差恰好是半周期，折叠后保持 +180，输出被钳位到上限
//! assert_eq!(pid.error(), 180.0);
//! assert_eq!(pid.update(), 1.0);
//! ```

pub mod bang_bang;
pub mod config;
pub mod controller;
pub mod error;
pub mod pid;

// 重新导出常用类型
pub use bang_bang::BangBangController;
pub use config::{PidConfig, ToleranceConfig};
pub use controller::Controller;
pub use error::{ControllerError, Result};
pub use pid::{
    DEFAULT_PERIOD, DEFAULT_TOLERANCE, Feedforward, MeasurementSource, PidController,
    PidControllerBuilder, PidGains, PidSnapshot, ToleranceKind,
};
