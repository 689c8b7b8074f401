//! PID Controller - 比例-积分-微分控制器
//!
//! 实现带前馈项的离散 PID 控制算法，测量值由回调读取。
//!
//! # 算法
//!
//! ```text
//! e      = wrap(reference - measurement)
//! I      = clamp(I + e * T, min_out / Ki, max_out / Ki)      (仅当 Ki != 0)
//! output = clamp(Kp * e + Ki * I + Kd * (e - e_prev) / T + feedforward, min_out, max_out)
//! ```
//!
//! 其中 `T` 为固定控制周期，`wrap` 为连续输入（如角度）下的最短路径误差。
//!
//! # 特性
//!
//! - **积分饱和保护**: 积分累积值被限制在 `[min_out / Ki, max_out / Ki]`
//! - **Ki = 0 冻结积分**: 积分项不再累积，也不会衰减或清零
//! - **连续输入**: 误差折叠到 `(-range/2, range/2]`，采用向下取整取模
//! - **线程安全**: 所有可变状态由一把锁保护，回调在锁外调用
//!
//! # 示例
//!
//! ```rust
//! use pidloop_controller::PidController;
//!
//! let pid = PidController::builder(1.0, 0.0, 0.0, || 0.0)
//!     .period(1.0)
//!     .build()
//!     .unwrap();
//! pid.set_output_range(-100.0, 100.0);
//! pid.set_reference(10.0);
//!
//! assert_eq!(pid.update(), 10.0);
//! ```

use crate::config::PidConfig;
use crate::controller::Controller;
use crate::error::{Result, check_period};
use parking_lot::Mutex;
use std::fmt;

/// 默认控制周期（秒）
pub const DEFAULT_PERIOD: f64 = 0.05;

/// 默认到位容差
pub const DEFAULT_TOLERANCE: f64 = 0.05;

/// 测量值回调
pub type MeasurementSource = Box<dyn Fn() -> f64 + Send + Sync>;

/// 前馈回调
pub type Feedforward = Box<dyn Fn() -> f64 + Send + Sync>;

/// 到位判定的容差类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ToleranceKind {
    /// 原始单位的绝对容差
    #[default]
    Absolute,
    /// 输入范围的百分比
    Percent,
}

/// PID 增益
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PidGains {
    /// 比例增益
    pub kp: f64,
    /// 积分增益
    pub ki: f64,
    /// 微分增益
    pub kd: f64,
}

/// 一次加锁取得的控制器状态副本
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidSnapshot {
    /// 当前增益
    pub gains: PidGains,
    /// 目标值
    pub reference: f64,
    /// 上一次 `update()` 的误差
    pub prev_error: f64,
    /// 积分累积值
    pub total_error: f64,
    /// 上一次 `update()` 的输出
    pub output: f64,
}

/// 锁内状态
#[derive(Debug, Clone, Copy)]
struct PidState {
    kp: f64,
    ki: f64,
    kd: f64,

    reference: f64,

    minimum_input: f64,
    maximum_input: f64,
    input_range: f64,
    continuous: bool,

    minimum_output: f64,
    maximum_output: f64,

    prev_error: f64,
    total_error: f64,
    output: f64,

    tolerance_kind: ToleranceKind,
    tolerance: f64,
    delta_tolerance: f64,
}

impl PidState {
    fn new(kp: f64, ki: f64, kd: f64) -> Self {
        PidState {
            kp,
            ki,
            kd,
            reference: 0.0,
            minimum_input: 0.0,
            maximum_input: 0.0,
            input_range: 0.0,
            continuous: false,
            minimum_output: -1.0,
            maximum_output: 1.0,
            prev_error: 0.0,
            total_error: 0.0,
            output: 0.0,
            tolerance_kind: ToleranceKind::Absolute,
            tolerance: DEFAULT_TOLERANCE,
            delta_tolerance: f64::INFINITY,
        }
    }

    /// 输入范围非空时把目标值钳位进去
    fn apply_reference(&mut self, reference: f64) {
        self.reference = if self.maximum_input > self.minimum_input {
            clamp(reference, self.minimum_input, self.maximum_input)
        } else {
            reference
        };
    }

    /// 连续输入下的最短路径误差
    ///
    /// 取模采用向下取整语义（`rem_euclid`，除数恒为正），
    /// 结果落在 `(-range/2, range/2]`。
    fn continuous_error(&self, error: f64) -> f64 {
        if self.continuous && self.input_range > 0.0 {
            let error = error.rem_euclid(self.input_range);
            if error > self.input_range / 2.0 {
                error - self.input_range
            } else {
                error
            }
        } else {
            error
        }
    }

    fn snapshot(&self) -> PidSnapshot {
        PidSnapshot {
            gains: PidGains {
                kp: self.kp,
                ki: self.ki,
                kd: self.kd,
            },
            reference: self.reference,
            prev_error: self.prev_error,
            total_error: self.total_error,
            output: self.output,
        }
    }
}

/// 钳位，上下限颠倒时返回下限，不会 panic
fn clamp(value: f64, low: f64, high: f64) -> f64 {
    value.min(high).max(low)
}

/// 容差比较，无穷大的容差总是通过
fn within(value: f64, limit: f64) -> bool {
    limit == f64::INFINITY || value < limit
}

/// PID 控制器
///
/// 所有配置可以在任意线程、任意时刻修改，从下一次 `update()` 起生效。
/// `update()` 是唯一推进 `prev_error` / `total_error` / `output` 的方法。
pub struct PidController {
    state: Mutex<PidState>,
    period: f64,
    measurement_source: MeasurementSource,
    feedforward: Feedforward,
}

impl PidController {
    /// 创建 Builder
    ///
    /// # 参数
    ///
    /// - `kp` / `ki` / `kd`: 初始增益（不做校验）
    /// - `measurement_source`: 测量值回调，每次 `update()` 恰好调用一次
    pub fn builder<M>(kp: f64, ki: f64, kd: f64, measurement_source: M) -> PidControllerBuilder
    where
        M: Fn() -> f64 + Send + Sync + 'static,
    {
        PidControllerBuilder {
            kp,
            ki,
            kd,
            measurement_source: Box::new(measurement_source),
            feedforward: None,
            period: DEFAULT_PERIOD,
            config: None,
        }
    }

    /// 按配置构建控制器
    ///
    /// 等价于 `builder(..).config(config).build()`。
    pub fn from_config<M>(config: &PidConfig, measurement_source: M) -> Result<Self>
    where
        M: Fn() -> f64 + Send + Sync + 'static,
    {
        Self::builder(config.kp, config.ki, config.kd, measurement_source)
            .config(config)
            .build()
    }

    /// 在一次加锁内应用配置（周期除外，周期在构造后不可变）
    ///
    /// 历史状态（误差、积分、输出）保持不变。
    pub fn apply_config(&self, config: &PidConfig) -> Result<()> {
        config.validate()?;
        if config.period_s != self.period {
            tracing::warn!(
                "Ignoring period {} s from config: controller period is fixed at {} s",
                config.period_s,
                self.period
            );
        }
        self.with_state(|state| config.write_into(state));
        tracing::debug!("Applied PID config: {:?}", config);
        Ok(())
    }

    /// 同时设置三个增益
    pub fn set_pid(&self, kp: f64, ki: f64, kd: f64) {
        let mut state = self.state.lock();
        state.kp = kp;
        state.ki = ki;
        state.kd = kd;
    }

    /// 设置比例增益
    pub fn set_p(&self, kp: f64) {
        self.state.lock().kp = kp;
    }

    /// 设置积分增益
    ///
    /// 设为 0 时积分累积值保持冻结，恢复非零后从冻结值继续。
    pub fn set_i(&self, ki: f64) {
        self.state.lock().ki = ki;
    }

    /// 设置微分增益
    pub fn set_d(&self, kd: f64) {
        self.state.lock().kd = kd;
    }

    /// 比例增益
    pub fn p(&self) -> f64 {
        self.state.lock().kp
    }

    /// 积分增益
    pub fn i(&self) -> f64 {
        self.state.lock().ki
    }

    /// 微分增益
    pub fn d(&self) -> f64 {
        self.state.lock().kd
    }

    /// 当前增益
    pub fn gains(&self) -> PidGains {
        let state = self.state.lock();
        PidGains {
            kp: state.kp,
            ki: state.ki,
            kd: state.kd,
        }
    }

    /// 控制周期（秒）
    pub fn period(&self) -> f64 {
        self.period
    }

    /// 设置目标值
    ///
    /// 当 `maximum_input > minimum_input` 时钳位到输入范围内，否则原样保存。
    pub fn set_reference(&self, reference: f64) {
        self.state.lock().apply_reference(reference);
    }

    /// 当前目标值
    pub fn reference(&self) -> f64 {
        self.state.lock().reference
    }

    /// 设置输入范围
    ///
    /// 同时决定连续输入的周期，并立即按新范围重新钳位当前目标值。
    /// `maximum <= minimum` 表示关闭范围限制。
    pub fn set_input_range(&self, minimum: f64, maximum: f64) {
        let mut state = self.state.lock();
        state.minimum_input = minimum;
        state.maximum_input = maximum;
        state.input_range = maximum - minimum;

        let previous = state.reference;
        state.apply_reference(previous);
        if state.reference != previous {
            tracing::debug!(
                "Reference {} re-clamped to {} by input range [{}, {}]",
                previous,
                state.reference,
                minimum,
                maximum
            );
        }
    }

    /// 输入范围宽度（`maximum - minimum`）
    pub fn input_range(&self) -> f64 {
        self.state.lock().input_range
    }

    /// 设置输出钳位范围
    ///
    /// 积分累积值在下一次 `update()` 时才会按新范围钳位。
    pub fn set_output_range(&self, minimum: f64, maximum: f64) {
        let mut state = self.state.lock();
        state.minimum_output = minimum;
        state.maximum_output = maximum;
    }

    /// 输出钳位范围 `(minimum, maximum)`
    pub fn output_range(&self) -> (f64, f64) {
        let state = self.state.lock();
        (state.minimum_output, state.maximum_output)
    }

    /// 开关连续输入（误差首尾相接，如角度）
    pub fn set_continuous(&self, continuous: bool) {
        self.state.lock().continuous = continuous;
    }

    /// 是否为连续输入
    pub fn is_continuous(&self) -> bool {
        self.state.lock().continuous
    }

    /// 设置绝对容差
    ///
    /// `delta_tolerance` 为误差变化率的容差，传 `f64::INFINITY` 表示不检查。
    pub fn set_absolute_tolerance(&self, tolerance: f64, delta_tolerance: f64) {
        let mut state = self.state.lock();
        state.tolerance_kind = ToleranceKind::Absolute;
        state.tolerance = tolerance;
        state.delta_tolerance = delta_tolerance;
    }

    /// 设置百分比容差（相对输入范围宽度）
    ///
    /// `delta_tolerance` 同样按百分比解释，传 `f64::INFINITY` 表示不检查。
    pub fn set_percent_tolerance(&self, tolerance: f64, delta_tolerance: f64) {
        let mut state = self.state.lock();
        state.tolerance_kind = ToleranceKind::Percent;
        state.tolerance = tolerance;
        state.delta_tolerance = delta_tolerance;
    }

    /// 当前容差 `(kind, tolerance, delta_tolerance)`
    pub fn tolerance(&self) -> (ToleranceKind, f64, f64) {
        let state = self.state.lock();
        (state.tolerance_kind, state.tolerance, state.delta_tolerance)
    }

    /// 重新读取测量值并返回误差，不修改任何状态
    pub fn error(&self) -> f64 {
        self.error_and_delta().0
    }

    /// 重新读取测量值并返回误差变化率 `(error - prev_error) / period`
    pub fn delta_error(&self) -> f64 {
        self.error_and_delta().1
    }

    /// 瞬时到位判定
    ///
    /// 只反映当前这一次读数；需要“持续到位”的调用方自行做时间上的去抖。
    pub fn at_reference(&self) -> bool {
        let measurement = (self.measurement_source)();
        let state = self.state.lock();

        let error = state.continuous_error(state.reference - measurement);
        let delta_error = (error - state.prev_error) / self.period;

        match state.tolerance_kind {
            ToleranceKind::Absolute => {
                error.abs() < state.tolerance && within(delta_error.abs(), state.delta_tolerance)
            },
            ToleranceKind::Percent => {
                let scale = state.input_range / 100.0;
                let delta_limit = if state.delta_tolerance == f64::INFINITY {
                    f64::INFINITY
                } else {
                    state.delta_tolerance * scale
                };
                error.abs() < state.tolerance * scale && within(delta_error.abs(), delta_limit)
            },
        }
    }

    /// 连续输入下的误差折叠
    ///
    /// 非连续或输入范围为空时原样返回。
    pub fn continuous_error(&self, error: f64) -> f64 {
        self.state.lock().continuous_error(error)
    }

    /// 计算一步控制输出
    ///
    /// 前馈和测量回调在锁外调用，回调中访问本控制器不会死锁。
    pub fn update(&self) -> f64 {
        let feedforward = (self.feedforward)();
        let measurement = (self.measurement_source)();
        let period = self.period;

        let mut state = self.state.lock();

        let error = state.continuous_error(state.reference - measurement);

        if state.ki != 0.0 {
            let a = state.minimum_output / state.ki;
            let b = state.maximum_output / state.ki;
            state.total_error = clamp(state.total_error + error * period, a.min(b), a.max(b));
        }

        let output = clamp(
            state.kp * error
                + state.ki * state.total_error
                + state.kd * (error - state.prev_error) / period
                + feedforward,
            state.minimum_output,
            state.maximum_output,
        );

        state.prev_error = error;
        state.output = output;

        tracing::trace!(
            measurement,
            error,
            total_error = state.total_error,
            output,
            "PID update"
        );

        output
    }

    /// 清除历史（误差、积分、输出），保留增益、范围和目标值
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.prev_error = 0.0;
        state.total_error = 0.0;
        state.output = 0.0;
        tracing::debug!("PID controller reset");
    }

    /// 上一次 `update()` 的输出
    pub fn output(&self) -> f64 {
        self.state.lock().output
    }

    /// 上一次 `update()` 的误差
    pub fn prev_error(&self) -> f64 {
        self.state.lock().prev_error
    }

    /// 积分累积值
    pub fn total_error(&self) -> f64 {
        self.state.lock().total_error
    }

    /// 一次加锁取得状态副本
    pub fn snapshot(&self) -> PidSnapshot {
        self.state.lock().snapshot()
    }

    /// 一次测量读数同时得到误差和误差变化率
    fn error_and_delta(&self) -> (f64, f64) {
        let measurement = (self.measurement_source)();
        let state = self.state.lock();
        let error = state.continuous_error(state.reference - measurement);
        (error, (error - state.prev_error) / self.period)
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut PidStateAccess<'_>) -> R) -> R {
        let mut state = self.state.lock();
        f(&mut PidStateAccess { state: &mut state })
    }
}

/// 配置模块在单次加锁内批量修改状态时使用
pub(crate) struct PidStateAccess<'a> {
    state: &'a mut PidState,
}

impl PidStateAccess<'_> {
    pub(crate) fn set_gains(&mut self, gains: PidGains) {
        self.state.kp = gains.kp;
        self.state.ki = gains.ki;
        self.state.kd = gains.kd;
    }

    pub(crate) fn set_input_range(&mut self, minimum: f64, maximum: f64) {
        self.state.minimum_input = minimum;
        self.state.maximum_input = maximum;
        self.state.input_range = maximum - minimum;
        let reference = self.state.reference;
        self.state.apply_reference(reference);
    }

    pub(crate) fn set_output_range(&mut self, minimum: f64, maximum: f64) {
        self.state.minimum_output = minimum;
        self.state.maximum_output = maximum;
    }

    pub(crate) fn set_continuous(&mut self, continuous: bool) {
        self.state.continuous = continuous;
    }

    pub(crate) fn set_tolerance(&mut self, kind: ToleranceKind, tolerance: f64, delta: f64) {
        self.state.tolerance_kind = kind;
        self.state.tolerance = tolerance;
        self.state.delta_tolerance = delta;
    }

    pub(crate) fn set_reference(&mut self, reference: f64) {
        self.state.apply_reference(reference);
    }
}

impl fmt::Debug for PidController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PidController")
            .field("period", &self.period)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl Controller for PidController {
    fn update(&self) -> f64 {
        PidController::update(self)
    }

    fn period(&self) -> f64 {
        self.period
    }

    fn reset(&self) {
        PidController::reset(self)
    }
}

/// PidController Builder
///
/// # 示例
///
/// ```rust
/// use pidloop_controller::PidController;
///
/// let pid = PidController::builder(0.8, 0.1, 0.02, || 0.0)
///     .feedforward(|| 0.05)
///     .period(0.02)
///     .build()
///     .unwrap();
/// assert_eq!(pid.period(), 0.02);
/// ```
pub struct PidControllerBuilder {
    kp: f64,
    ki: f64,
    kd: f64,
    measurement_source: MeasurementSource,
    feedforward: Option<Feedforward>,
    period: f64,
    config: Option<PidConfig>,
}

impl PidControllerBuilder {
    /// 设置前馈回调（默认恒为 0），每次 `update()` 无条件叠加到输出
    pub fn feedforward<F>(mut self, feedforward: F) -> Self
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        self.feedforward = Some(Box::new(feedforward));
        self
    }

    /// 设置控制周期（秒，默认 0.05）
    pub fn period(mut self, period: f64) -> Self {
        self.period = period;
        self
    }

    /// 使用配置中的增益、周期、范围、容差和目标值
    pub fn config(mut self, config: &PidConfig) -> Self {
        self.kp = config.kp;
        self.ki = config.ki;
        self.kd = config.kd;
        self.period = config.period_s;
        self.config = Some(config.clone());
        self
    }

    /// 构建控制器
    ///
    /// # 错误
    ///
    /// - 周期不是有限正数时返回 `ControllerError::InvalidPeriod`
    /// - 设置了配置且配置校验失败时返回对应错误
    pub fn build(self) -> Result<PidController> {
        let period = check_period(self.period)?;
        if let Some(config) = &self.config {
            config.validate()?;
        }

        let controller = PidController {
            state: Mutex::new(PidState::new(self.kp, self.ki, self.kd)),
            period,
            measurement_source: self.measurement_source,
            feedforward: self.feedforward.unwrap_or_else(|| Box::new(|| 0.0)),
        };
        if let Some(config) = &self.config {
            controller.with_state(|state| config.write_into(state));
        }
        Ok(controller)
    }
}
