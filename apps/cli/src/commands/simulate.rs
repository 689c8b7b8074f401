//! 仿真命令
//!
//! 用 `ControllerRunner` 驱动 PID 控制器闭环控制仿真对象，
//! 主线程定期采样并打印进度。

use crate::config::SimConfig;
use crate::plant::Plant;
use anyhow::{Context, Result};
use clap::Args;
use pidloop_controller::{PidController, PidSnapshot};
use pidloop_runner::{ControllerRunner, TimingMode};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// 每隔多少个控制周期采样一次
const SAMPLE_EVERY: u32 = 10;

/// 仿真命令参数
#[derive(Args, Debug, Default)]
pub struct SimulateCommand {
    /// 配置文件（TOML），缺省使用内置默认配置
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 仿真时长（秒）
    #[arg(short, long)]
    pub duration: Option<f64>,

    /// 目标值
    #[arg(short, long, allow_hyphen_values = true)]
    pub reference: Option<f64>,

    /// 比例增益
    #[arg(long, allow_hyphen_values = true)]
    pub kp: Option<f64>,

    /// 积分增益
    #[arg(long, allow_hyphen_values = true)]
    pub ki: Option<f64>,

    /// 微分增益
    #[arg(long, allow_hyphen_values = true)]
    pub kd: Option<f64>,

    /// 使用自旋定时（低抖动，占用 CPU）
    #[arg(long)]
    pub spin: bool,

    /// 连续 N 次采样到位后提前结束
    #[arg(long, value_name = "N")]
    pub until_settled: Option<u32>,

    /// 不打印进度行
    #[arg(short, long)]
    pub quiet: bool,
}

/// 一次采样
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub elapsed: Duration,
    pub measurement: f64,
    pub at_reference: bool,
    pub pid: PidSnapshot,
}

/// 仿真结果
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub elapsed: Duration,
    pub final_measurement: f64,
    pub reference: f64,
    pub settled: bool,
    pub interrupted: bool,
    pub ticks: u64,
    pub outputs: u64,
    pub overruns: u64,
}

impl SimulateCommand {
    /// 合并配置文件和命令行参数
    pub fn resolve_config(&self) -> Result<SimConfig> {
        let mut config = match &self.config {
            Some(path) => SimConfig::load(path)?,
            None => SimConfig::default(),
        };

        if let Some(duration) = self.duration {
            config.duration_s = duration;
        }
        if let Some(reference) = self.reference {
            config.controller.reference = reference;
        }
        if let Some(kp) = self.kp {
            config.controller.kp = kp;
        }
        if let Some(ki) = self.ki {
            config.controller.ki = ki;
        }
        if let Some(kd) = self.kd {
            config.controller.kd = kd;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn execute(&self, interrupted: &AtomicBool) -> Result<SimulationReport> {
        let config = self.resolve_config()?;
        let mode = if self.spin {
            TimingMode::Spin
        } else {
            TimingMode::Sleep
        };

        println!(
            "Simulating {:?} plant for {:.2}s (kp={}, ki={}, kd={}, period={}s, reference={})",
            config.plant.kind,
            config.duration_s,
            config.controller.kp,
            config.controller.ki,
            config.controller.kd,
            config.controller.period_s,
            config.controller.reference,
        );

        let quiet = self.quiet;
        let report = run_simulation(&config, mode, self.until_settled, interrupted, |sample| {
            if !quiet {
                println!(
                    "t={:7.3}s  x={:+10.4}  u={:+8.4}  e={:+10.4}{}",
                    sample.elapsed.as_secs_f64(),
                    sample.measurement,
                    sample.pid.output,
                    sample.pid.prev_error,
                    if sample.at_reference { "  ✓" } else { "" },
                );
            }
        })?;

        print_report(&report);
        Ok(report)
    }
}

/// 运行一次闭环仿真
///
/// `interrupted` 置位或时长用完时结束；`until_settled` 为 `Some(n)` 时，
/// 连续 n 次采样 `at_reference()` 后提前结束。
/// 结束前总是先 `disable()`，对象最后收到的输入为 0。
pub fn run_simulation<F>(
    config: &SimConfig,
    mode: TimingMode,
    until_settled: Option<u32>,
    interrupted: &AtomicBool,
    mut on_sample: F,
) -> Result<SimulationReport>
where
    F: FnMut(&Sample),
{
    let period = config.controller.period_s;
    let duration = Duration::try_from_secs_f64(config.duration_s)
        .with_context(|| format!("Unsupported duration_s {}", config.duration_s))?;
    let sample_interval = Duration::try_from_secs_f64(period)
        .ok()
        .and_then(|p| p.checked_mul(SAMPLE_EVERY))
        .with_context(|| format!("Unsupported period_s {}", period))?;

    let plant = Arc::new(Plant::new(&config.plant, config.wrap_range()));

    let source = plant.clone();
    let pid = Arc::new(
        PidController::from_config(&config.controller, move || source.measurement())
            .context("Failed to build PID controller")?,
    );

    let actuator = plant.clone();
    let mut runner = ControllerRunner::with_timing(
        pid.clone(),
        move |u| actuator.step(u, period),
        mode,
    )
    .context("Failed to start controller runner")?;

    let start = Instant::now();
    let mut settled_samples = 0u32;

    tracing::info!("Simulation started ({:?} timing)", mode);
    runner.enable();

    let was_interrupted = loop {
        thread::sleep(sample_interval);
        if interrupted.load(Ordering::SeqCst) {
            break true;
        }

        let sample = Sample {
            elapsed: start.elapsed(),
            measurement: plant.measurement(),
            at_reference: pid.at_reference(),
            pid: pid.snapshot(),
        };
        on_sample(&sample);

        settled_samples = if sample.at_reference {
            settled_samples + 1
        } else {
            0
        };
        if let Some(n) = until_settled
            && settled_samples >= n
        {
            tracing::info!("Settled for {} consecutive samples", n);
            break false;
        }
        if sample.elapsed >= duration {
            break false;
        }
    };

    runner.disable();
    runner.stop();
    tracing::info!("Simulation stopped");

    Ok(SimulationReport {
        elapsed: start.elapsed(),
        final_measurement: plant.measurement(),
        reference: pid.reference(),
        settled: pid.at_reference(),
        interrupted: was_interrupted,
        ticks: runner.ticks(),
        outputs: runner.outputs(),
        overruns: runner.overruns(),
    })
}

fn print_report(report: &SimulationReport) {
    println!();
    if report.interrupted {
        println!("⚠️  Interrupted after {:.3}s", report.elapsed.as_secs_f64());
    }
    println!(
        "Final measurement: {:.4} (reference {:.4})",
        report.final_measurement, report.reference
    );
    if report.settled {
        println!("✅ Settled at reference");
    } else {
        println!("❌ Not at reference");
    }
    println!(
        "Ticks: {}  outputs: {}  overruns: {}",
        report.ticks, report.outputs, report.overruns
    );
}
