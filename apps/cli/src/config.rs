//! 仿真配置文件
//!
//! ```toml
//! duration_s = 5.0
//!
//! [controller]
//! kp = 2.0
//! ki = 3.0
//! kd = 0.05
//! period_s = 0.02
//! reference = 1.0
//! output_range = [-1.0, 1.0]
//!
//! [controller.tolerance]
//! kind = "absolute"
//! value = 0.02
//!
//! [plant]
//! kind = "first-order"
//! gain = 2.0
//! time_constant_s = 0.5
//! ```

use anyhow::{Context, Result, bail};
use pidloop_controller::{PidConfig, ToleranceConfig, ToleranceKind};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// 被控对象类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlantKind {
    /// 一阶惯性环节
    #[default]
    FirstOrder,
    /// 纯积分环节
    Integrator,
}

/// 被控对象参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlantConfig {
    pub kind: PlantKind,
    /// 输入增益
    pub gain: f64,
    /// 时间常数（秒），仅一阶环节使用
    pub time_constant_s: f64,
    /// 初始状态
    pub initial: f64,
    /// 恒定扰动
    pub disturbance: f64,
}

impl Default for PlantConfig {
    fn default() -> Self {
        PlantConfig {
            kind: PlantKind::FirstOrder,
            gain: 2.0,
            time_constant_s: 0.5,
            initial: 0.0,
            disturbance: 0.0,
        }
    }
}

/// 仿真配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    /// 仿真时长（秒）
    pub duration_s: f64,
    pub controller: PidConfig,
    pub plant: PlantConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            duration_s: 5.0,
            controller: PidConfig {
                kp: 2.0,
                ki: 3.0,
                kd: 0.05,
                period_s: 0.02,
                reference: 1.0,
                tolerance: ToleranceConfig {
                    kind: ToleranceKind::Absolute,
                    value: 0.02,
                    delta: None,
                },
                ..PidConfig::default()
            },
            plant: PlantConfig::default(),
        }
    }
}

impl SimConfig {
    /// 从 TOML 文件加载并校验
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// 解析 TOML 字符串并校验
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: SimConfig = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// 序列化为 TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if !(self.duration_s.is_finite() && self.duration_s > 0.0)
            || Duration::try_from_secs_f64(self.duration_s).is_err()
        {
            bail!("duration_s must be a positive, representable number of seconds, got {}", self.duration_s);
        }

        self.controller.validate().context("Invalid [controller] section")?;

        let plant = &self.plant;
        if !plant.gain.is_finite() || !plant.initial.is_finite() || !plant.disturbance.is_finite() {
            bail!("[plant] gain, initial and disturbance must be finite");
        }
        if plant.kind == PlantKind::FirstOrder
            && !(plant.time_constant_s.is_finite() && plant.time_constant_s > 0.0)
        {
            bail!(
                "[plant] time_constant_s must be a positive number, got {}",
                plant.time_constant_s
            );
        }

        Ok(())
    }

    /// 连续输入时对象状态的折叠区间
    pub fn wrap_range(&self) -> Option<[f64; 2]> {
        match self.controller.input_range {
            Some([min, max]) if self.controller.continuous && max > min => Some([min, max]),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_round_trips() {
        let config = SimConfig::default();
        let text = config.to_toml().unwrap();
        assert!(text.contains("[controller]"));
        assert!(text.contains("[plant]"));
        assert_eq!(SimConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = SimConfig::from_toml(
            r#"
            [controller]
            kp = 0.5
            continuous = true
            input_range = [-180.0, 180.0]

            [plant]
            kind = "integrator"
            "#,
        )
        .unwrap();

        assert_eq!(config.controller.kp, 0.5);
        assert_eq!(config.controller.ki, 0.0);
        assert_eq!(config.plant.kind, PlantKind::Integrator);
        assert_eq!(config.duration_s, 5.0);
        assert_eq!(config.wrap_range(), Some([-180.0, 180.0]));
    }

    #[test]
    fn test_percent_tolerance_parses() {
        let config = SimConfig::from_toml(
            r#"
            [controller.tolerance]
            kind = "percent"
            value = 5.0
            delta = 1.0
            "#,
        )
        .unwrap();
        assert_eq!(config.controller.tolerance.kind, ToleranceKind::Percent);
        assert_eq!(config.controller.tolerance.delta, Some(1.0));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = SimConfig::from_toml("[controller]\nkq = 1.0\n").unwrap_err();
        assert!(format!("{:#}", err).contains("kq"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(SimConfig::from_toml("duration_s = 0.0").is_err());
        assert!(SimConfig::from_toml("duration_s = 1e30").is_err());
        assert!(SimConfig::from_toml("[controller]\nperiod_s = -0.1\n").is_err());
        assert!(SimConfig::from_toml("[controller]\noutput_range = [1.0, -1.0]\n").is_err());
        assert!(SimConfig::from_toml("[plant]\ntime_constant_s = 0.0\n").is_err());
        // 积分环节不使用时间常数
        assert!(SimConfig::from_toml("[plant]\nkind = \"integrator\"\ntime_constant_s = 0.0\n").is_ok());
    }

    #[test]
    fn test_wrap_range_requires_continuous() {
        let mut config = SimConfig::default();
        config.controller.input_range = Some([0.0, 360.0]);
        assert_eq!(config.wrap_range(), None);
        config.controller.continuous = true;
        assert_eq!(config.wrap_range(), Some([0.0, 360.0]));
    }
}
