//! 批量作业处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责扫描作业目录并逐份处理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：创建评分服务客户端，输出启动信息
//! 2. **批量加载**：扫描 `<root>/<班级>/<作业>/answer.json`
//! 3. **顺序处理**：作业之间依次处理，作业内部的并发交给 `BatchGrader`
//! 4. **失败隔离**：单份作业失败只记录日志，继续处理下一份
//! 5. **全局统计**：汇总所有作业的处理结果
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单份作业的细节
//! - **资源所有者**：唯一持有评分服务客户端的模块
//! - **向下委托**：委托 homework_processor 处理单份作业

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::clients::{ResponsesClient, ScoringService};
use crate::config::Config;
use crate::models::loaders::{discover_homeworks, homework_id};
use crate::orchestrator::homework_processor;
use crate::utils::logging;

/// 应用主结构
pub struct App {
    config: Config,
    scoring: Arc<dyn ScoringService>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        logging::log_startup(&config);
        if config.api_key.is_empty() {
            warn!("⚠️ 未设置 GRADER_API_KEY，评分服务可能拒绝请求");
        }

        let client = ResponsesClient::new(&config).context("创建评分服务客户端失败")?;
        Ok(Self::with_scoring(config, Arc::new(client)))
    }

    /// 使用指定的评分服务（测试时替换为替身）
    pub fn with_scoring(config: Config, scoring: Arc<dyn ScoringService>) -> Self {
        Self { config, scoring }
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<RunStats> {
        info!("\n📁 正在扫描待处理的作业...");
        let homeworks = discover_homeworks(&self.config.homework_root)
            .await
            .context("扫描作业目录失败")?;

        if homeworks.is_empty() {
            warn!("⚠️ 没有找到待处理的作业，程序结束");
            return Ok(RunStats::default());
        }

        let total = homeworks.len();
        logging::log_homeworks_found(total);
        let mut stats = RunStats {
            total,
            ..Default::default()
        };

        for (index, dir) in homeworks.iter().enumerate() {
            let id = homework_id(dir);
            logging::log_homework_start(index + 1, total, &id);

            match homework_processor::process_homework(&self.scoring, dir, &self.config).await {
                Ok(summary) if summary.already_complete => stats.skipped += 1,
                Ok(_) => stats.completed += 1,
                Err(e) => {
                    error!("[作业 {}] ❌ 处理失败，跳过: {:#}", id, e);
                    stats.failed += 1;
                }
            }
        }

        logging::print_final_stats(&stats);
        Ok(stats)
    }
}

/// 运行统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub total: usize,
    pub completed: usize,
    /// 此前已全部批改的作业
    pub skipped: usize,
    pub failed: usize,
}
