//! 日志工具模块
//!
//! 提供订阅器初始化，以及运行过程中的横幅和统计输出

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;
use crate::orchestrator::batch_processor::RunStats;
use crate::orchestrator::homework_processor::HomeworkSummary;

/// 初始化日志系统
///
/// 级别由 `RUST_LOG` 控制，默认 `info`，例如 `RUST_LOG=homework_grader=debug`。
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_line_number(true)
        .init();
}

/// 测试环境使用，可重复调用
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

fn now() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 作业批改启动 - {}", now());
    info!("📁 作业目录: {}", config.homework_root.display());
    info!(
        "🤖 模型: 校准 {} / 批改 {}",
        config.prepare_model, config.gen_model
    );
    info!(
        "📊 最大并发数: {}，每批 {} 人，样本 {}~{} 人",
        config.max_workers,
        config.effective_batch_size(),
        config.calibration_min,
        config.calibration_max
    );
    info!("{}", "=".repeat(60));
}

pub fn log_homeworks_found(total: usize) {
    info!("✓ 找到 {} 份待处理的作业", total);
    info!("💡 作业依次处理，每份作业内部并发批改\n");
}

pub fn log_homework_start(index: usize, total: usize, homework_id: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始处理第 {}/{} 份作业: {}", index, total, homework_id);
    info!("{}", "=".repeat(60));
}

pub fn log_homework_complete(summary: &HomeworkSummary) {
    info!("\n{}", "─".repeat(60));
    info!("✓ {}", summary);
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(stats: &RunStats) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!("完成时间: {}", now());
    info!("{}", "=".repeat(60));
    info!("✅ 完成: {}/{}", stats.completed, stats.total);
    info!("⏭️ 跳过（此前已完成）: {}", stats.skipped);
    info!("❌ 失败: {}", stats.failed);
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_counts_characters_not_bytes() {
        assert_eq!(truncate_text("评分标准", 2), "评分...");
        assert_eq!(truncate_text("短", 5), "短");
    }
}
