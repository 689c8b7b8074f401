//! 控制器层错误类型定义
//!
//! 运行时操作（`update`、`at_reference` 等）从不返回错误，
//! 这里的错误只出现在构造和配置校验阶段。

use thiserror::Error;

/// 控制器错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControllerError {
    /// 控制周期无效（必须为有限正数，单位：秒）
    #[error("Invalid period: {period} s (must be finite and > 0)")]
    InvalidPeriod {
        /// 传入的周期
        period: f64,
    },

    /// 增益不是有限值
    #[error("Invalid gain {name}: {value} (must be finite)")]
    InvalidGain {
        /// 增益名称（kp / ki / kd）
        name: &'static str,
        /// 传入的值
        value: f64,
    },

    /// 输出范围上下限颠倒
    #[error("Invalid output range: [{min}, {max}] (min must not exceed max)")]
    InvalidOutputRange {
        /// 下限
        min: f64,
        /// 上限
        max: f64,
    },
}

/// 控制器层 Result 别名
pub type Result<T> = std::result::Result<T, ControllerError>;

/// 校验控制周期
pub(crate) fn check_period(period: f64) -> Result<f64> {
    if period.is_finite() && period > 0.0 {
        Ok(period)
    } else {
        Err(ControllerError::InvalidPeriod { period })
    }
}
