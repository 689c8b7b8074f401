//! # pidloop CLI
//!
//! 在仿真对象上运行 PID 闭环，便于调参和验证。
//!
//! ```bash
//! # 生成配置模板
//! pidloop-cli config template --output sim.toml
//!
//! # 校验配置
//! pidloop-cli config check sim.toml
//!
//! # 运行仿真（Ctrl-C 提前结束）
//! pidloop-cli simulate --config sim.toml --duration 3 --reference 0.5
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

mod commands;
mod config;
mod plant;

use commands::{ConfigCommand, SimulateCommand};

/// pidloop CLI - PID 控制器仿真工具
#[derive(Parser, Debug)]
#[command(name = "pidloop-cli")]
#[command(about = "Simulate PID control loops and manage their configuration", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 在仿真对象上运行闭环控制
    Simulate {
        #[command(flatten)]
        args: SimulateCommand,
    },
}

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pidloop_cli=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config(cmd) => cmd.execute(),

        Commands::Simulate { args } => {
            let interrupted = Arc::new(AtomicBool::new(false));
            let flag = interrupted.clone();
            ctrlc::set_handler(move || {
                eprintln!("\nReceived interrupt signal. Stopping simulation...");
                flag.store(true, Ordering::SeqCst);
            })
            .context("Failed to install Ctrl-C handler")?;

            args.execute(&interrupted)?;
            Ok(())
        },
    }
}
