//! Hive - 计划 / 执行编排引擎
//!
//! 入口：初始化日志，按配置装配编排器，对命令行给出的目标建计划并执行，打印结果。
//!
//! 用法：`hive [--config path/to/file.toml] <goal...>`

use std::path::PathBuf;

use anyhow::{bail, Context};
use hive::core::create_builder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hive::observability::init();

    let mut args = std::env::args().skip(1).peekable();
    let mut config_path = None;
    if args.peek().map(String::as_str) == Some("--config") {
        args.next();
        let path = args.next().context("--config requires a path")?;
        config_path = Some(PathBuf::from(path));
    }

    let goal = args.collect::<Vec<_>>().join(" ");
    if goal.trim().is_empty() {
        bail!("usage: hive [--config <file>] <goal>");
    }

    let orchestrator = create_builder(config_path).build();
    let result = orchestrator.execute(goal.trim()).await;
    println!("{}", result);

    Ok(())
}
