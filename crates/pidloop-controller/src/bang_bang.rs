//! Bang-Bang 控制器
//!
//! 低于目标值时输出上限，否则输出下限。主要用于单向执行器（如飞轮加速）。

use crate::controller::Controller;
use crate::error::{Result, check_period};
use crate::pid::{DEFAULT_PERIOD, MeasurementSource};
use parking_lot::Mutex;
use std::fmt;

#[derive(Debug, Clone, Copy)]
struct BangBangState {
    reference: f64,
    minimum_output: f64,
    maximum_output: f64,
    output: f64,
}

/// Bang-Bang 控制器
pub struct BangBangController {
    state: Mutex<BangBangState>,
    period: f64,
    measurement_source: MeasurementSource,
}

impl BangBangController {
    /// 创建控制器，输出范围默认为 `[0, 1]`
    ///
    /// # 错误
    ///
    /// 周期不是有限正数时返回 `ControllerError::InvalidPeriod`。
    pub fn new<M>(measurement_source: M, period: f64) -> Result<Self>
    where
        M: Fn() -> f64 + Send + Sync + 'static,
    {
        Ok(Self::with_checked_period(Box::new(measurement_source), check_period(period)?))
    }

    /// 使用默认周期创建
    pub fn with_default_period<M>(measurement_source: M) -> Self
    where
        M: Fn() -> f64 + Send + Sync + 'static,
    {
        Self::with_checked_period(Box::new(measurement_source), DEFAULT_PERIOD)
    }

    fn with_checked_period(measurement_source: MeasurementSource, period: f64) -> Self {
        BangBangController {
            state: Mutex::new(BangBangState {
                reference: 0.0,
                minimum_output: 0.0,
                maximum_output: 1.0,
                output: 0.0,
            }),
            period,
            measurement_source,
        }
    }

    /// 设置目标值
    pub fn set_reference(&self, reference: f64) {
        self.state.lock().reference = reference;
    }

    /// 当前目标值
    pub fn reference(&self) -> f64 {
        self.state.lock().reference
    }

    /// 设置两档输出
    pub fn set_output_range(&self, minimum: f64, maximum: f64) {
        let mut state = self.state.lock();
        state.minimum_output = minimum;
        state.maximum_output = maximum;
    }

    /// 上一次 `update()` 的输出
    pub fn output(&self) -> f64 {
        self.state.lock().output
    }
}

impl Controller for BangBangController {
    fn update(&self) -> f64 {
        let measurement = (self.measurement_source)();
        let mut state = self.state.lock();
        state.output = if measurement < state.reference {
            state.maximum_output
        } else {
            state.minimum_output
        };
        state.output
    }

    fn period(&self) -> f64 {
        self.period
    }

    fn reset(&self) {
        self.state.lock().output = 0.0;
    }
}

impl fmt::Debug for BangBangController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BangBangController")
            .field("period", &self.period)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}
