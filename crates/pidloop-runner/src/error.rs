//! Runner 层错误类型定义

use thiserror::Error;

/// Runner 层错误类型
#[derive(Error, Debug)]
pub enum RunnerError {
    /// 控制器周期无效（必须为有限正数，单位：秒）
    #[error("Invalid controller period: {period} s (must be finite and > 0)")]
    InvalidPeriod {
        /// 控制器报告的周期
        period: f64,
    },

    /// 定时线程创建失败
    #[error("Failed to spawn timer thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Runner 层 Result 别名
pub type Result<T> = std::result::Result<T, RunnerError>;
