//! PID 配置
//!
//! 纯数据结构，启用 `serde` feature 后可以从 TOML / JSON 等格式读取。
//!
//! ```toml
//! kp = 0.8
//! ki = 0.1
//! kd = 0.02
//! period_s = 0.02
//! reference = 90.0
//! input_range = [0.0, 360.0]
//! output_range = [-1.0, 1.0]
//! continuous = true
//!
//! [tolerance]
//! kind = "absolute"
//! value = 0.5
//! ```

use crate::error::{ControllerError, Result, check_period};
use crate::pid::{
    DEFAULT_PERIOD, DEFAULT_TOLERANCE, PidGains, PidStateAccess, ToleranceKind,
};

/// 到位容差配置
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct ToleranceConfig {
    /// 容差类型
    pub kind: ToleranceKind,
    /// 误差容差
    pub value: f64,
    /// 误差变化率容差（`None` 表示不检查）
    pub delta: Option<f64>,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        ToleranceConfig {
            kind: ToleranceKind::Absolute,
            value: DEFAULT_TOLERANCE,
            delta: None,
        }
    }
}

/// PID 控制器配置
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct PidConfig {
    /// 比例增益
    pub kp: f64,
    /// 积分增益
    pub ki: f64,
    /// 微分增益
    pub kd: f64,
    /// 控制周期（秒）
    pub period_s: f64,
    /// 初始目标值
    pub reference: f64,
    /// 输入范围 `[min, max]`，`None` 表示不限制
    pub input_range: Option<[f64; 2]>,
    /// 输出钳位范围 `[min, max]`
    pub output_range: [f64; 2],
    /// 是否为连续输入
    pub continuous: bool,
    /// 到位容差
    pub tolerance: ToleranceConfig,
}

impl Default for PidConfig {
    fn default() -> Self {
        PidConfig {
            kp: 1.0,
            ki: 0.0,
            kd: 0.0,
            period_s: DEFAULT_PERIOD,
            reference: 0.0,
            input_range: None,
            output_range: [-1.0, 1.0],
            continuous: false,
            tolerance: ToleranceConfig::default(),
        }
    }
}

impl PidConfig {
    /// 增益
    pub fn gains(&self) -> PidGains {
        PidGains {
            kp: self.kp,
            ki: self.ki,
            kd: self.kd,
        }
    }

    /// 校验配置
    ///
    /// 增益必须是有限值，周期必须是有限正数，输出范围不能颠倒。
    /// 输入范围颠倒不算错误（等价于关闭范围限制）。
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("kp", self.kp), ("ki", self.ki), ("kd", self.kd)] {
            if !value.is_finite() {
                return Err(ControllerError::InvalidGain { name, value });
            }
        }

        check_period(self.period_s)?;

        let [min, max] = self.output_range;
        if min.is_nan() || max.is_nan() || min > max {
            return Err(ControllerError::InvalidOutputRange { min, max });
        }

        Ok(())
    }

    /// 写入控制器状态（调用方已持有锁）
    ///
    /// 先设置范围再设置目标值，保证目标值按新输入范围钳位。
    pub(crate) fn write_into(&self, state: &mut PidStateAccess<'_>) {
        state.set_gains(self.gains());

        let [out_min, out_max] = self.output_range;
        state.set_output_range(out_min, out_max);

        let [in_min, in_max] = self.input_range.unwrap_or([0.0, 0.0]);
        state.set_input_range(in_min, in_max);
        state.set_continuous(self.continuous);

        state.set_tolerance(
            self.tolerance.kind,
            self.tolerance.value,
            self.tolerance.delta.unwrap_or(f64::INFINITY),
        );

        state.set_reference(self.reference);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PidController;

    #[test]
    fn test_default_config_is_valid() {
        let config = PidConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gains(), PidGains { kp: 1.0, ki: 0.0, kd: 0.0 });
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = PidConfig {
            ki: f64::INFINITY,
            ..PidConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ControllerError::InvalidGain { name: "ki", .. })
        ));

        let config = PidConfig {
            period_s: 0.0,
            ..PidConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ControllerError::InvalidPeriod { period: 0.0 })
        );

        let config = PidConfig {
            output_range: [1.0, -1.0],
            ..PidConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ControllerError::InvalidOutputRange { min: 1.0, max: -1.0 })
        );
    }

    #[test]
    fn test_inverted_input_range_is_allowed() {
        let config = PidConfig {
            input_range: Some([10.0, -10.0]),
            ..PidConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_config_applies_everything() {
        let config = PidConfig {
            kp: 0.5,
            ki: 0.1,
            kd: 0.01,
            period_s: 0.02,
            reference: 400.0,
            input_range: Some([0.0, 360.0]),
            output_range: [-12.0, 12.0],
            continuous: true,
            tolerance: ToleranceConfig {
                kind: ToleranceKind::Percent,
                value: 1.0,
                delta: Some(10.0),
            },
        };

        let pid = PidController::from_config(&config, || 0.0).unwrap();
        assert_eq!(pid.gains(), PidGains { kp: 0.5, ki: 0.1, kd: 0.01 });
        assert_eq!(pid.period(), 0.02);
        // 目标值被输入范围钳位
        assert_eq!(pid.reference(), 360.0);
        assert_eq!(pid.input_range(), 360.0);
        assert_eq!(pid.output_range(), (-12.0, 12.0));
        assert!(pid.is_continuous());
        assert_eq!(pid.tolerance(), (ToleranceKind::Percent, 1.0, 10.0));
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        let config = PidConfig {
            period_s: -1.0,
            ..PidConfig::default()
        };
        assert!(PidController::from_config(&config, || 0.0).is_err());
    }

    #[test]
    fn test_apply_config_keeps_history_and_period() {
        let pid = PidController::builder(1.0, 0.0, 0.0, || 0.0).period(1.0).build().unwrap();
        pid.set_output_range(-100.0, 100.0);
        pid.set_reference(5.0);
        pid.update();
        let prev_error = pid.prev_error();

        let config = PidConfig {
            kp: 2.0,
            period_s: 0.5,
            reference: 7.0,
            ..PidConfig::default()
        };
        pid.apply_config(&config).unwrap();

        assert_eq!(pid.period(), 1.0);
        assert_eq!(pid.p(), 2.0);
        assert_eq!(pid.reference(), 7.0);
        assert_eq!(pid.output_range(), (-1.0, 1.0));
        assert_eq!(pid.prev_error(), prev_error);
    }

    #[test]
    fn test_apply_config_rejects_invalid_without_side_effects() {
        let pid = PidController::builder(1.0, 0.0, 0.0, || 0.0).build().unwrap();
        let config = PidConfig {
            kp: f64::NAN,
            ..PidConfig::default()
        };
        assert!(pid.apply_config(&config).is_err());
        assert_eq!(pid.p(), 1.0);
    }
}
