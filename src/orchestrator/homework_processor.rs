//! 单个作业处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块负责一份作业从加载到落盘的完整过程，是作业级别的编排器。
//!
//! ## 核心功能
//!
//! 1. **加载作业**：读取 `answer.json`，建立作答语料
//! 2. **断点恢复**：已有分数的学生直接视为已批改；全部批改过则跳过
//! 3. **建立上下文**：发送题目信息，得到对话句柄
//! 4. **评分标准**：已有评分标准文件则直接复用，否则运行校准
//! 5. **批量批改**：委托 `BatchGrader` 批改剩余学生
//! 6. **分数缩放**：对最终账本做一次归一化并保存
//! 7. **统计输出**：记录校准/批量/失败人数

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::clients::{ScoringRequest, ScoringService};
use crate::config::Config;
use crate::models::loaders::{homework_id, load_document};
use crate::services::{normalize_ledger, AnswerCorpus, HomeworkStorage, ScoreLedger};
use crate::utils::logging;
use crate::workflow::prompts::{self, ATTACH_INSTRUCTIONS, CONTEXT_INSTRUCTIONS};
use crate::workflow::{BatchGrader, CalibrationEngine, GradingContext};

/// 附加已有评分标准时使用的温度
pub const ATTACH_TEMPERATURE: f32 = 0.3;

/// 单个作业的处理统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HomeworkSummary {
    pub homework_id: String,
    /// 作业中的学生总数
    pub total: usize,
    /// 从分数文件恢复的学生数
    pub resumed: usize,
    /// 校准阶段获得分数的学生数
    pub calibrated: usize,
    pub batch_graded: usize,
    /// 记为失败的学生数
    pub failed: usize,
    /// 是否复用了已有的评分标准
    pub reused_standard: bool,
    /// 此前已全部批改，本次未发出任何请求
    pub already_complete: bool,
}

impl HomeworkSummary {
    fn new(homework_id: String, total: usize) -> Self {
        Self {
            homework_id,
            total,
            ..Default::default()
        }
    }
}

impl fmt::Display for HomeworkSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[作业 {}] 共 {} 人：恢复 {}，校准 {}，批量 {}，失败 {}",
            self.homework_id,
            self.total,
            self.resumed,
            self.calibrated,
            self.batch_graded,
            self.failed
        )
    }
}

/// 处理单个作业目录
pub async fn process_homework(
    scoring: &Arc<dyn ScoringService>,
    homework_dir: &Path,
    config: &Config,
) -> Result<HomeworkSummary> {
    let id = homework_id(homework_dir);
    let document = load_document(homework_dir)
        .await
        .with_context(|| format!("加载作业 {} 失败", id))?;
    let storage = HomeworkStorage::new(homework_dir);
    let mut summary = HomeworkSummary::new(id.clone(), document.submissions.len());

    // ========== 断点恢复 ==========
    let mut corpus = AnswerCorpus::new(document.submissions);
    let persisted = storage
        .load_scores()
        .with_context(|| format!("读取作业 {} 的分数文件失败", id))?;
    summary.resumed = corpus.resume(&persisted);
    let persisted: Vec<_> = persisted
        .into_iter()
        .filter(|r| corpus.is_corrected(&r.student_id))
        .collect();

    if corpus.uncorrected_len() == 0 {
        info!("[作业 {}] ⏭️ 所有学生均已批改，跳过", id);
        summary.already_complete = true;
        if config.normalize && !storage.normalized_path().exists() {
            let ledger = ScoreLedger::with_entries(persisted);
            save_normalized(&storage, &ledger, config, &id);
        }
        return Ok(summary);
    }
    if summary.resumed > 0 {
        info!(
            "[作业 {}] 🔁 从分数文件恢复 {} 人，剩余 {} 人",
            id,
            summary.resumed,
            corpus.uncorrected_len()
        );
    }

    let ledger = Arc::new(
        ScoreLedger::with_entries(persisted).with_subscriber(storage.score_writer()),
    );
    let mut ctx = GradingContext::new(id.clone());

    // ========== 建立上下文 ==========
    let base = scoring
        .create_context(
            &config.prepare_model,
            CONTEXT_INSTRUCTIONS,
            &document.bank.to_content(),
        )
        .await
        .with_context(|| format!("作业 {} 创建评分上下文失败", id))?;

    // ========== 评分标准：复用或校准 ==========
    let existing = storage
        .load_standard()
        .with_context(|| format!("读取作业 {} 的评分标准失败", id))?;
    match existing {
        Some(standard) => {
            info!("[作业 {}] 📄 发现已有评分标准，跳过校准", id);
            let content =
                prompts::attach_content(&standard, corpus.demonstrations(config.demonstration_count));
            let reply = scoring
                .respond(ScoringRequest {
                    model: &config.prepare_model,
                    previous: Some(&base),
                    instructions: ATTACH_INSTRUCTIONS,
                    content: &content,
                    temperature: ATTACH_TEMPERATURE,
                })
                .await
                .with_context(|| format!("作业 {} 附加评分标准失败", id))?;
            ctx.calibrate(standard, reply.handle);
            summary.reused_standard = true;
        }
        None => {
            let engine = CalibrationEngine::new(Arc::clone(scoring), config);
            let outcome = engine
                .calibrate(&mut ctx, &base, &mut corpus, &ledger)
                .await
                .with_context(|| format!("作业 {} 校准失败", id))?;
            summary.calibrated = outcome.scored.len();

            if let Err(e) = storage.save_standard(&ctx.grading_standard) {
                error!("[作业 {}] 保存评分标准失败: {}", id, e);
            }
        }
    }

    // ========== 批量批改 ==========
    let grader = BatchGrader::new(Arc::clone(scoring), config);
    let stats = grader
        .grade_remaining(&ctx, &mut corpus, Arc::clone(&ledger))
        .await
        .with_context(|| format!("作业 {} 批量批改失败", id))?;
    summary.batch_graded = stats.graded;
    summary.failed = stats.failed;

    let recorded = ledger.len();
    if recorded < summary.total {
        warn!(
            "[作业 {}] ⚠️ 账本只有 {}/{} 人的记录，缺少的学生未获得分数",
            id, recorded, summary.total
        );
    }

    // ========== 分数缩放 ==========
    if config.normalize {
        save_normalized(&storage, &ledger, config, &id);
    }

    logging::log_homework_complete(&summary);
    Ok(summary)
}

/// 对最终账本归一化一次并保存，失败只记录日志
fn save_normalized(storage: &HomeworkStorage, ledger: &ScoreLedger, config: &Config, id: &str) {
    let normalized = normalize_ledger(&ledger.snapshot(), config.normalization_band());
    match storage.save_normalized(&normalized) {
        Ok(()) => info!("[作业 {}] ✓ 已保存 {} 人的缩放分数", id, normalized.len()),
        Err(e) => error!("[作业 {}] 保存缩放分数失败: {}", id, e),
    }
}
