//! 批量批改 - 流程层
//!
//! 校准之后，把剩余学生切成小批次并发批改。
//!
//! ## 并发模型
//!
//! - 每个批次一个 `tokio::spawn` 任务，`Semaphore` 限制同时在途的请求数
//! - 批次之间学生互不重叠，任务各自写账本（账本内部加锁）
//! - 语料分区只由调用方持有，任务把结果通过 channel 发回，由调用方统一提交

use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};

use crate::clients::{ContextHandle, ScoringRequest, ScoringService};
use crate::config::Config;
use crate::error::GradingResult;
use crate::models::score::scores_for;
use crate::models::{ScoreResult, Submission};
use crate::services::{AnswerCorpus, ScoreLedger};
use crate::utils::logging::truncate_text;
use crate::workflow::grading_ctx::GradingContext;
use crate::workflow::prompts;

/// 批量批改请求使用的温度
pub const BATCH_TEMPERATURE: f32 = 0.6;

/// 重试耗尽的学生记录的错误信息
pub const RETRY_EXHAUSTED: &str = "超过重试次数上限";

#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub model: String,
    pub batch_size: usize,
    pub max_workers: usize,
    pub max_retries: usize,
    pub verbose_logging: bool,
}

impl BatchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.gen_model.clone(),
            batch_size: config.effective_batch_size(),
            max_workers: config.max_workers,
            max_retries: config.max_retries,
            verbose_logging: config.verbose_logging,
        }
    }
}

/// 批量批改统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchStats {
    pub batches: usize,
    pub graded: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
struct BatchOutcome {
    graded: usize,
    failed: usize,
}

pub struct BatchGrader {
    scoring: Arc<dyn ScoringService>,
    settings: Arc<BatchSettings>,
}

impl BatchGrader {
    pub fn new(scoring: Arc<dyn ScoringService>, config: &Config) -> Self {
        Self::with_settings(scoring, BatchSettings::from_config(config))
    }

    pub fn with_settings(scoring: Arc<dyn ScoringService>, settings: BatchSettings) -> Self {
        Self {
            scoring,
            settings: Arc::new(settings),
        }
    }

    /// 批改所有未批改学生
    ///
    /// 评分标准为空时直接返回 `Sequencing` 错误，不发出任何请求。
    pub async fn grade_remaining(
        &self,
        ctx: &GradingContext,
        corpus: &mut AnswerCorpus,
        ledger: Arc<ScoreLedger>,
    ) -> GradingResult<BatchStats> {
        let handle = ctx.grading_handle()?.clone();
        let batches = corpus.batches(self.settings.batch_size);
        if batches.is_empty() {
            info!("{} 没有剩余学生需要批量批改", ctx);
            return Ok(BatchStats::default());
        }

        info!(
            "{} 📦 剩余 {} 名学生，分为 {} 批（每批最多 {} 人，并发 {}）",
            ctx,
            corpus.uncorrected_len(),
            batches.len(),
            self.settings.batch_size,
            self.settings.max_workers
        );

        let semaphore = Arc::new(Semaphore::new(self.settings.max_workers));
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<ScoreResult>>();
        let mut stats = BatchStats {
            batches: batches.len(),
            ..Default::default()
        };

        let mut handles = Vec::with_capacity(batches.len());
        for (index, batch) in batches.into_iter().enumerate() {
            let batch_no = index + 1;
            let task = BatchTask {
                label: format!("{} [批次 {}]", ctx, batch_no),
                scoring: Arc::clone(&self.scoring),
                settings: Arc::clone(&self.settings),
                handle: handle.clone(),
                ledger: Arc::clone(&ledger),
                tx: tx.clone(),
            };
            let semaphore = Arc::clone(&semaphore);

            let join = tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return BatchOutcome::default(),
                };
                task.run(batch).await
            });
            handles.push((batch_no, join));
        }
        drop(tx);

        // 只有这里修改语料分区
        while let Some(results) = rx.recv().await {
            corpus.commit_scored(&results);
        }

        let (numbers, joins): (Vec<usize>, Vec<_>) = handles.into_iter().unzip();
        for (batch_no, joined) in numbers.into_iter().zip(join_all(joins).await) {
            match joined {
                Ok(outcome) => {
                    stats.graded += outcome.graded;
                    stats.failed += outcome.failed;
                }
                Err(e) => error!("{} [批次 {}] 任务执行失败: {}", ctx, batch_no, e),
            }
        }

        info!(
            "{} ✓ 批量批改完成: 成功 {} 人，失败 {} 人",
            ctx, stats.graded, stats.failed
        );
        Ok(stats)
    }
}

struct BatchTask {
    label: String,
    scoring: Arc<dyn ScoringService>,
    settings: Arc<BatchSettings>,
    handle: ContextHandle,
    ledger: Arc<ScoreLedger>,
    tx: mpsc::UnboundedSender<Vec<ScoreResult>>,
}

impl BatchTask {
    /// 一个批次最多请求 `max_retries` 次，每次只发送仍缺分数的学生
    async fn run(self, batch: Vec<Submission>) -> BatchOutcome {
        let mut remaining = batch;
        let mut outcome = BatchOutcome::default();

        for attempt in 1..=self.settings.max_retries {
            if remaining.is_empty() {
                break;
            }
            let ids: Vec<String> = remaining.iter().map(|s| s.student_id.clone()).collect();
            debug!("{} 第 {} 次请求，学生: {}", self.label, attempt, ids.join(", "));

            let instructions = prompts::batch_instructions(&ids);
            let content = prompts::students_content(&remaining);
            let request = ScoringRequest {
                model: &self.settings.model,
                previous: Some(&self.handle),
                instructions: &instructions,
                content: &content,
                temperature: BATCH_TEMPERATURE,
            };

            let reply = match self.scoring.respond(request).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!("{} 第 {} 次请求失败: {}", self.label, attempt, e);
                    continue;
                }
            };
            if self.settings.verbose_logging {
                debug!("{} 模型回复: {}", self.label, truncate_text(&reply.raw_text, 500));
            }

            let scored = parse_batch_scores(reply.parsed.as_ref(), &ids);
            if scored.is_empty() {
                warn!("{} 第 {} 次回复中没有可用的分数", self.label, attempt);
                continue;
            }

            remaining.retain(|s| !scored.iter().any(|r| r.student_id == s.student_id));
            outcome.graded += scored.len();
            self.commit(scored);

            if !remaining.is_empty() {
                warn!(
                    "{} 第 {} 次回复缺少 {} 名学生，单独重试",
                    self.label,
                    attempt,
                    remaining.len()
                );
            }
        }

        if !remaining.is_empty() {
            let failed: Vec<ScoreResult> = remaining
                .iter()
                .map(|s| ScoreResult::failure(s.student_id.clone(), RETRY_EXHAUSTED))
                .collect();
            error!(
                "{} ❌ {} 名学生重试 {} 次后仍无分数，记为失败",
                self.label,
                failed.len(),
                self.settings.max_retries
            );
            outcome.failed = failed.len();
            self.commit(failed);
        }

        outcome
    }

    fn commit(&self, results: Vec<ScoreResult>) {
        self.ledger.update_many(results.clone());
        if self.tx.send(results).is_err() {
            warn!("{} 结果通道已关闭", self.label);
        }
    }
}

/// 分数可能在 `student_scores` 下，也可能直接是顶层对象
fn parse_batch_scores(parsed: Option<&Value>, ids: &[String]) -> Vec<ScoreResult> {
    let Some(root) = parsed.and_then(Value::as_object) else {
        return Vec::new();
    };
    let entries = root
        .get("student_scores")
        .and_then(Value::as_object)
        .unwrap_or(root);
    scores_for(entries, ids)
}
