use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use homework_grader::utils::logging;
use homework_grader::{App, Config};

/// 借助大模型批改学生作业
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML 配置文件路径
    #[arg(long, short, env = "GRADER_CONFIG")]
    config: Option<PathBuf>,

    /// 作业根目录（覆盖配置文件和环境变量）
    #[arg(long)]
    homework_root: Option<PathBuf>,

    /// 不生成缩放后的分数文件
    #[arg(long)]
    no_normalize: bool,

    /// 批量批改的最大并发数
    #[arg(long)]
    max_workers: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 读取 .env（不存在也没关系）
    dotenvy::dotenv().ok();

    // 初始化日志
    logging::init();

    // 加载配置，命令行参数优先
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(root) = cli.homework_root {
        config.homework_root = root;
    }
    if cli.no_normalize {
        config.normalize = false;
    }
    if let Some(workers) = cli.max_workers {
        config.max_workers = workers;
    }
    config.validate()?;

    // 初始化并运行应用
    let stats = App::initialize(config).await?.run().await?;
    if stats.failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}
