//! 仿真被控对象
//!
//! 每个控制周期用显式欧拉法积分一步：
//!
//! - 一阶惯性: `x' = (gain * u + disturbance - x) / time_constant`
//! - 纯积分:   `x' = gain * u + disturbance`
//!
//! 连续输入时状态折叠到 `[min, max)`。

use crate::config::{PlantConfig, PlantKind};
use parking_lot::Mutex;

/// 被控对象
///
/// 测量回调（定时线程）和采样（主线程）共享同一个实例。
#[derive(Debug)]
pub struct Plant {
    config: PlantConfig,
    wrap: Option<[f64; 2]>,
    state: Mutex<f64>,
}

impl Plant {
    pub fn new(config: &PlantConfig, wrap: Option<[f64; 2]>) -> Self {
        let plant = Plant {
            config: config.clone(),
            wrap,
            state: Mutex::new(config.initial),
        };
        *plant.state.lock() = plant.wrapped(config.initial);
        plant
    }

    /// 当前测量值
    pub fn measurement(&self) -> f64 {
        *self.state.lock()
    }

    /// 以输入 `input` 前进 `dt` 秒
    pub fn step(&self, input: f64, dt: f64) {
        let mut x = self.state.lock();
        let drive = self.config.gain * input + self.config.disturbance;
        let dx = match self.config.kind {
            PlantKind::FirstOrder => (drive - *x) / self.config.time_constant_s,
            PlantKind::Integrator => drive,
        };
        *x = self.wrapped(*x + dx * dt);
    }

    fn wrapped(&self, x: f64) -> f64 {
        match self.wrap {
            Some([min, max]) => min + (x - min).rem_euclid(max - min),
            None => x,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_order(gain: f64, tau: f64) -> PlantConfig {
        PlantConfig {
            kind: PlantKind::FirstOrder,
            gain,
            time_constant_s: tau,
            ..PlantConfig::default()
        }
    }

    #[test]
    fn test_first_order_settles_at_gain_times_input() {
        let plant = Plant::new(&first_order(2.0, 0.1), None);
        for _ in 0..1000 {
            plant.step(0.5, 0.01);
        }
        assert!((plant.measurement() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_first_order_single_step() {
        let plant = Plant::new(&first_order(1.0, 1.0), None);
        plant.step(1.0, 0.1);
        assert!((plant.measurement() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_integrator_accumulates_with_disturbance() {
        let config = PlantConfig {
            kind: PlantKind::Integrator,
            gain: 2.0,
            disturbance: -0.5,
            initial: 1.0,
            ..PlantConfig::default()
        };
        let plant = Plant::new(&config, None);
        plant.step(1.0, 0.5);
        // 1.0 + (2.0 * 1.0 - 0.5) * 0.5
        assert_eq!(plant.measurement(), 1.75);
    }

    #[test]
    fn test_wraparound() {
        let config = PlantConfig {
            kind: PlantKind::Integrator,
            gain: 1.0,
            initial: 350.0,
            ..PlantConfig::default()
        };
        let plant = Plant::new(&config, Some([0.0, 360.0]));
        plant.step(20.0, 1.0);
        assert!((plant.measurement() - 10.0).abs() < 1e-9);

        plant.step(-30.0, 1.0);
        assert!((plant.measurement() - 340.0).abs() < 1e-9);
    }

    #[test]
    fn test_initial_state_is_wrapped() {
        let config = PlantConfig {
            initial: 540.0,
            ..PlantConfig::default()
        };
        let plant = Plant::new(&config, Some([-180.0, 180.0]));
        assert_eq!(plant.measurement(), -180.0);
    }
}
