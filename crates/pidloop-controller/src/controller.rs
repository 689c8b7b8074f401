//! Controller trait - 闭环控制器通用接口
//!
//! `ControllerRunner` 只依赖这个 trait，不关心具体的控制算法。
//! PID、Bang-Bang 或其他闭环策略都可以替换进去。
//!
//! # 设计理念
//!
//! - **共享所有权**: 控制器通常放在 `Arc` 中，同时被定时线程和配置线程访问，
//!   因此 `update()` 接收 `&self`，由实现者自己负责内部加锁
//! - **自带数据源**: 测量值由控制器内部的回调读取，`update()` 无参数
//! - **固定周期**: `period()` 在构造后不变，Runner 在构造时读取一次
//!
//! # 示例
//!
//! ```rust
//! use pidloop_controller::Controller;
//! use std::sync::atomic::{AtomicU64, Ordering};
//!
//! struct ConstantController {
//!     value: AtomicU64,
//! }
//!
//! impl Controller for ConstantController {
//!     fn update(&self) -> f64 {
//!         f64::from_bits(self.value.load(Ordering::Relaxed))
//!     }
//!
//!     fn period(&self) -> f64 {
//!         0.02
//!     }
//! }
//!
//! let c = ConstantController { value: AtomicU64::new(0.5f64.to_bits()) };
//! assert_eq!(c.update(), 0.5);
//! ```

/// 闭环控制器通用接口
///
/// # 线程安全
///
/// 要求 `Send + Sync`：`update()` 在定时线程中调用，
/// 而 setter 可能同时在其他线程中调用。
pub trait Controller: Send + Sync {
    /// 计算一步控制输出
    ///
    /// 每次调用读取一次测量值并推进内部状态。
    fn update(&self) -> f64;

    /// 控制周期（秒，> 0）
    fn period(&self) -> f64;

    /// 清除历史状态（可选）
    ///
    /// 默认什么都不做。有积分/微分状态的控制器应该覆盖此方法。
    fn reset(&self) {}
}

impl<C: Controller + ?Sized> Controller for std::sync::Arc<C> {
    fn update(&self) -> f64 {
        (**self).update()
    }

    fn period(&self) -> f64 {
        (**self).period()
    }

    fn reset(&self) {
        (**self).reset()
    }
}
