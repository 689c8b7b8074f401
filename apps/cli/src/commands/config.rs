//! 配置管理命令
//!
//! 生成配置模板、校验配置文件

use crate::config::SimConfig;
use anyhow::{Context, Result};
use clap::Subcommand;
use std::fs;
use std::path::{Path, PathBuf};

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 输出默认配置模板
    Template {
        /// 写入文件（默认输出到 stdout）
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// 覆盖已存在的文件
        #[arg(short, long)]
        force: bool,
    },

    /// 检查配置文件
    Check {
        /// 配置文件路径
        path: PathBuf,
    },
}

impl ConfigCommand {
    pub fn execute(self) -> Result<()> {
        match self {
            ConfigCommand::Template { output, force } => Self::template_(output.as_deref(), force),

            ConfigCommand::Check { path } => Self::check_(&path),
        }
    }

    fn template_(output: Option<&Path>, force: bool) -> Result<()> {
        let content = format!(
            "# pidloop simulation config\n\n{}",
            SimConfig::default().to_toml()?
        );

        match output {
            Some(path) => {
                if path.exists() && !force {
                    anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
                }
                fs::write(path, content)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("✅ Wrote config template to {}", path.display());
            },
            None => print!("{}", content),
        }

        Ok(())
    }

    fn check_(path: &Path) -> Result<()> {
        let config = SimConfig::load(path)?;
        let controller = &config.controller;

        println!("✅ {} is valid", path.display());
        println!(
            "  controller: kp={} ki={} kd={} period={}s reference={}",
            controller.kp, controller.ki, controller.kd, controller.period_s, controller.reference
        );
        match controller.input_range {
            Some([min, max]) => println!(
                "  input range: [{}, {}]{}",
                min,
                max,
                if controller.continuous { " (continuous)" } else { "" }
            ),
            None => println!("  input range: unbounded"),
        }
        println!(
            "  output range: [{}, {}]",
            controller.output_range[0], controller.output_range[1]
        );
        println!(
            "  plant: {:?} gain={} duration={}s",
            config.plant.kind, config.plant.gain, config.duration_s
        );

        Ok(())
    }
}
