//! 校准流程 - 流程层
//!
//! 从未批改学生中抽样，一次请求同时得到评分标准和样本分数。
//!
//! 流程：
//! 1. 抽样 k 名学生（初始为上限）
//! 2. 请求评分标准 + 每名样本学生的分数
//! 3. 评分标准非空且覆盖至少 ⌈ratio·k⌉ 名学生即接受
//! 4. 否则重试，每连续失败 2 次 k 减 1（不低于下限），每次重新抽样
//! 5. 重试耗尽时退回到覆盖人数最多的回复；一次也没有则本作业失败

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::clients::{ContextHandle, ScoringReply, ScoringRequest, ScoringService};
use crate::config::Config;
use crate::error::{GradingError, GradingResult};
use crate::models::score::scores_for;
use crate::models::ScoreResult;
use crate::services::{AnswerCorpus, ScoreLedger};
use crate::utils::logging::truncate_text;
use crate::workflow::grading_ctx::GradingContext;
use crate::workflow::prompts;

/// 校准请求使用的温度
pub const CALIBRATION_TEMPERATURE: f32 = 0.5;

/// 每连续失败多少次缩小一次样本
const SHRINK_EVERY: usize = 2;

#[derive(Debug, Clone)]
pub struct CalibrationSettings {
    pub model: String,
    pub min_sample: usize,
    pub max_sample: usize,
    pub max_retries: usize,
    pub completeness_ratio: f64,
    pub commit_unscored_samples: bool,
    pub verbose_logging: bool,
}

impl CalibrationSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.prepare_model.clone(),
            min_sample: config.calibration_min,
            max_sample: config.calibration_max,
            max_retries: config.max_retries,
            completeness_ratio: config.completeness_ratio,
            commit_unscored_samples: config.commit_unscored_samples,
            verbose_logging: config.verbose_logging,
        }
    }

    /// 接受一次校准回复所需的最少评分人数
    pub fn completeness_threshold(&self, sample_size: usize) -> usize {
        ((self.completeness_ratio * sample_size as f64).ceil() as usize).max(1)
    }
}

/// 被接受的校准结果
#[derive(Debug, Clone)]
pub struct CalibrationOutcome {
    pub standard: String,
    pub handle: ContextHandle,
    pub scored: Vec<ScoreResult>,
    /// 被接受那次请求抽到的学生
    pub sampled: Vec<String>,
    pub attempts: usize,
}

impl CalibrationOutcome {
    /// 抽到了但回复中没有分数的学生
    pub fn unscored(&self) -> Vec<String> {
        self.sampled
            .iter()
            .filter(|id| !self.scored.iter().any(|r| &r.student_id == *id))
            .cloned()
            .collect()
    }
}

pub struct CalibrationEngine {
    scoring: Arc<dyn ScoringService>,
    settings: CalibrationSettings,
}

impl CalibrationEngine {
    pub fn new(scoring: Arc<dyn ScoringService>, config: &Config) -> Self {
        Self::with_settings(scoring, CalibrationSettings::from_config(config))
    }

    pub fn with_settings(scoring: Arc<dyn ScoringService>, settings: CalibrationSettings) -> Self {
        Self { scoring, settings }
    }

    /// 运行校准并提交结果
    ///
    /// 成功后：样本分数写入账本，评分标准和句柄写入 `ctx`，样本学生移到已批改部分。
    pub async fn calibrate(
        &self,
        ctx: &mut GradingContext,
        base: &ContextHandle,
        corpus: &mut AnswerCorpus,
        ledger: &ScoreLedger,
    ) -> GradingResult<CalibrationOutcome> {
        let outcome = self.run(ctx, base, corpus).await?;

        ledger.update_many(outcome.scored.clone());
        ctx.calibrate(outcome.standard.clone(), outcome.handle.clone());
        corpus.commit_scored(&outcome.scored);

        let unscored = outcome.unscored();
        if !unscored.is_empty() {
            if self.settings.commit_unscored_samples {
                warn!(
                    "{} ⚠️ {} 名样本学生未获得分数，仍标记为已批改: {}",
                    ctx,
                    unscored.len(),
                    unscored.join(", ")
                );
                corpus.commit(&unscored);
            } else {
                warn!(
                    "{} {} 名样本学生未获得分数，留给批量批改: {}",
                    ctx,
                    unscored.len(),
                    unscored.join(", ")
                );
            }
        }

        info!(
            "{} ✓ 校准完成：第 {} 次尝试，样本 {} 人，获得分数 {} 人",
            ctx,
            outcome.attempts,
            outcome.sampled.len(),
            outcome.scored.len()
        );
        Ok(outcome)
    }

    /// 只负责重试循环，不修改任何状态
    async fn run(
        &self,
        ctx: &GradingContext,
        base: &ContextHandle,
        corpus: &AnswerCorpus,
    ) -> GradingResult<CalibrationOutcome> {
        let available = corpus.uncorrected_len();
        let mut sample_size = self.settings.max_sample.min(available);
        let floor = self.settings.min_sample.min(sample_size);
        let mut best: Option<CalibrationOutcome> = None;
        let mut failures = 0usize;

        for attempt in 1..=self.settings.max_retries {
            let sample = corpus.sample(sample_size)?;
            let sampled: Vec<String> = sample.iter().map(|s| s.student_id.clone()).collect();
            let threshold = self.settings.completeness_threshold(sample_size);
            info!(
                "{} 🎯 第 {} 次校准，抽样 {} 人（至少需要 {} 人的分数）",
                ctx, attempt, sample_size, threshold
            );

            let instructions = prompts::calibration_instructions(sample_size);
            let content = prompts::students_content(&sample);
            let request = ScoringRequest {
                model: &self.settings.model,
                previous: Some(base),
                instructions: &instructions,
                content: &content,
                temperature: CALIBRATION_TEMPERATURE,
            };

            match self.scoring.respond(request).await {
                Ok(reply) => {
                    if self.settings.verbose_logging {
                        debug!("{} 模型回复: {}", ctx, truncate_text(&reply.raw_text, 500));
                    }
                    let candidate = parse_calibration(reply, sampled, attempt);
                    let count = candidate.scored.len();
                    let has_standard = !candidate.standard.is_empty();

                    if has_standard && count >= threshold {
                        return Ok(candidate);
                    }
                    warn!(
                        "{} 第 {} 次校准结果不完整：评分标准{}，分数 {}/{}",
                        ctx,
                        attempt,
                        if has_standard { "已生成" } else { "为空" },
                        count,
                        sample_size
                    );
                    let better = best.as_ref().map_or(true, |b| count > b.scored.len());
                    if has_standard && count > 0 && better {
                        best = Some(candidate);
                    }
                }
                Err(e) => warn!("{} 第 {} 次校准请求失败: {}", ctx, attempt, e),
            }

            failures += 1;
            if failures % SHRINK_EVERY == 0 && sample_size > floor {
                sample_size -= 1;
                info!("{} 连续失败 {} 次，样本缩小为 {} 人", ctx, SHRINK_EVERY, sample_size);
            }
        }

        match best {
            Some(best) => {
                warn!(
                    "{} ⚠️ 重试 {} 次未达到完整度要求，使用最好的一次（第 {} 次，{} 人）",
                    ctx,
                    self.settings.max_retries,
                    best.attempts,
                    best.scored.len()
                );
                Ok(best)
            }
            None => Err(GradingError::CalibrationExhausted {
                attempts: self.settings.max_retries,
            }),
        }
    }
}

fn parse_calibration(reply: ScoringReply, sampled: Vec<String>, attempt: usize) -> CalibrationOutcome {
    let parsed = reply.parsed.as_ref().and_then(Value::as_object);

    let standard = match parsed.and_then(|root| root.get("grading_standard")) {
        Some(Value::String(text)) => text.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    let scored = parsed
        .and_then(|root| root.get("student_scores"))
        .and_then(Value::as_object)
        .map(|entries| scores_for(entries, &sampled))
        .unwrap_or_default();

    CalibrationOutcome {
        standard,
        handle: reply.handle,
        scored,
        sampled,
        attempts: attempt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{calibration_reply, submissions, ScriptedScoring};

    fn settings() -> CalibrationSettings {
        CalibrationSettings {
            model: "prepare".to_string(),
            min_sample: 5,
            max_sample: 8,
            max_retries: 10,
            completeness_ratio: 0.8,
            commit_unscored_samples: true,
            verbose_logging: false,
        }
    }

    fn fixture(n: usize) -> (GradingContext, ContextHandle, AnswerCorpus, ScoreLedger) {
        (
            GradingContext::new("班级/作业"),
            ContextHandle::new("resp_ctx"),
            AnswerCorpus::new(submissions(n)),
            ScoreLedger::new(),
        )
    }

    #[test]
    fn threshold_is_ceiling_of_ratio() {
        let settings = settings();
        assert_eq!(settings.completeness_threshold(8), 7);
        assert_eq!(settings.completeness_threshold(5), 4);
        assert_eq!(settings.completeness_threshold(1), 1);
    }

    #[tokio::test]
    async fn first_complete_reply_is_accepted() {
        let scoring = Arc::new(ScriptedScoring::new().then_respond(|req| {
            Ok(calibration_reply("按步骤给分", &req.students(), 80.0))
        }));
        let engine = CalibrationEngine::with_settings(scoring.clone(), settings());
        let (mut ctx, base, mut corpus, ledger) = fixture(8);

        let outcome = engine
            .calibrate(&mut ctx, &base, &mut corpus, &ledger)
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.sampled.len(), 8);
        assert_eq!(ledger.len(), 8);
        assert_eq!(corpus.uncorrected_len(), 0);
        assert!(ctx.is_calibrated());
        assert_eq!(ctx.grading_standard, "按步骤给分");

        let requests = scoring.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "prepare");
        assert_eq!(requests[0].previous.as_deref(), Some("resp_ctx"));
        assert_eq!(requests[0].temperature, CALIBRATION_TEMPERATURE);
    }

    #[tokio::test]
    async fn sample_shrinks_after_two_failures() {
        let scoring = Arc::new(
            ScriptedScoring::new()
                .reply(r#"{"grading_standard": "", "student_scores": {}}"#)
                .fail("连接超时")
                .then_respond(|req| Ok(calibration_reply("标准", &req.students(), 70.0))),
        );
        let engine = CalibrationEngine::with_settings(scoring.clone(), settings());
        let (mut ctx, base, mut corpus, ledger) = fixture(10);

        let outcome = engine
            .calibrate(&mut ctx, &base, &mut corpus, &ledger)
            .await
            .unwrap();

        let sizes: Vec<usize> = scoring.requests().iter().map(|r| r.students().len()).collect();
        assert_eq!(sizes, vec![8, 8, 7]);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(corpus.uncorrected_len(), 3);
    }

    #[tokio::test]
    async fn best_partial_reply_is_used_when_retries_run_out() {
        let scoring = Arc::new(ScriptedScoring::new().then_respond(|req| {
            let students = req.students();
            Ok(calibration_reply("标准", &students[..2], 60.0))
        }));
        let mut settings = settings();
        settings.max_retries = 3;
        let engine = CalibrationEngine::with_settings(scoring.clone(), settings);
        let (mut ctx, base, mut corpus, ledger) = fixture(8);

        let outcome = engine
            .calibrate(&mut ctx, &base, &mut corpus, &ledger)
            .await
            .unwrap();

        assert_eq!(scoring.requests().len(), 3);
        assert_eq!(outcome.scored.len(), 2);
        assert_eq!(ledger.len(), 2);
        assert_eq!(corpus.corrected_len(), outcome.sampled.len());
    }

    #[tokio::test]
    async fn no_usable_reply_is_fatal_and_leaves_state_untouched() {
        let scoring = Arc::new(ScriptedScoring::new().then_respond(|_| Ok("第1轮：pass".to_string())));
        let engine = CalibrationEngine::with_settings(scoring.clone(), settings());
        let (mut ctx, base, mut corpus, ledger) = fixture(8);

        let err = engine
            .calibrate(&mut ctx, &base, &mut corpus, &ledger)
            .await
            .unwrap_err();

        assert!(matches!(err, GradingError::CalibrationExhausted { attempts: 10 }));
        assert_eq!(scoring.requests().len(), 10);
        assert!(ledger.is_empty());
        assert_eq!(corpus.uncorrected_len(), 8);
        assert!(!ctx.is_calibrated());
    }

    #[tokio::test]
    async fn unscored_samples_can_stay_uncorrected() {
        let scoring = Arc::new(ScriptedScoring::new().then_respond(|req| {
            let students = req.students();
            Ok(calibration_reply("标准", &students[..7], 75.0))
        }));
        let mut settings = settings();
        settings.commit_unscored_samples = false;
        let engine = CalibrationEngine::with_settings(scoring, settings);
        let (mut ctx, base, mut corpus, ledger) = fixture(8);

        let outcome = engine
            .calibrate(&mut ctx, &base, &mut corpus, &ledger)
            .await
            .unwrap();

        let unscored = outcome.unscored();
        assert_eq!(unscored.len(), 1);
        assert!(corpus.is_uncorrected(&unscored[0]));
        assert_eq!(corpus.corrected_len(), 7);
    }

    #[tokio::test]
    async fn small_corpus_samples_everyone() {
        let scoring = Arc::new(ScriptedScoring::new().then_respond(|req| {
            Ok(calibration_reply("标准", &req.students(), 90.0))
        }));
        let engine = CalibrationEngine::with_settings(scoring.clone(), settings());
        let (mut ctx, base, mut corpus, ledger) = fixture(3);

        engine
            .calibrate(&mut ctx, &base, &mut corpus, &ledger)
            .await
            .unwrap();
        assert_eq!(scoring.requests()[0].students().len(), 3);
        assert_eq!(ledger.len(), 3);
    }
}
