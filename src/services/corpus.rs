//! 作答语料 - 业务能力层
//!
//! 把一份作业的全部作答分成"未批改"和"已批改"两部分。
//! 一个学生任何时刻只属于其中一部分，且只能从未批改移到已批改。

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, warn};

use crate::error::{GradingError, GradingResult};
use crate::models::{ContentItem, ScoreResult, Submission};

/// 已批改的作答，附带模型此前给出的评分（用作后续提示中的示例）
#[derive(Debug, Clone)]
pub struct CorrectedSubmission {
    pub submission: Submission,
    pub prior_answer: Option<String>,
}

/// 一份作业的作答语料
#[derive(Debug, Default)]
pub struct AnswerCorpus {
    uncorrected: BTreeMap<String, Submission>,
    corrected: BTreeMap<String, CorrectedSubmission>,
}

impl AnswerCorpus {
    /// 所有作答初始都在未批改部分
    pub fn new(submissions: Vec<Submission>) -> Self {
        let mut uncorrected = BTreeMap::new();
        for submission in submissions {
            if let Some(previous) = uncorrected.insert(submission.student_id.clone(), submission) {
                warn!("学生 {} 的作答重复出现，保留最后一份", previous.student_id);
            }
        }
        Self {
            uncorrected,
            corrected: BTreeMap::new(),
        }
    }

    pub fn uncorrected_len(&self) -> usize {
        self.uncorrected.len()
    }

    pub fn corrected_len(&self) -> usize {
        self.corrected.len()
    }

    pub fn total_len(&self) -> usize {
        self.uncorrected.len() + self.corrected.len()
    }

    pub fn is_uncorrected(&self, student_id: &str) -> bool {
        self.uncorrected.contains_key(student_id)
    }

    pub fn is_corrected(&self, student_id: &str) -> bool {
        self.corrected.contains_key(student_id)
    }

    pub fn corrected(&self, student_id: &str) -> Option<&CorrectedSubmission> {
        self.corrected.get(student_id)
    }

    pub fn uncorrected_keys(&self) -> Vec<String> {
        self.uncorrected.keys().cloned().collect()
    }

    /// 从未批改部分无放回随机抽取 `n` 份，不修改分区
    pub fn sample(&self, n: usize) -> GradingResult<Vec<Submission>> {
        self.sample_with(n, &mut rand::thread_rng())
    }

    pub fn sample_with<R: Rng + ?Sized>(
        &self,
        n: usize,
        rng: &mut R,
    ) -> GradingResult<Vec<Submission>> {
        if n > self.uncorrected.len() {
            return Err(GradingError::SampleTooLarge {
                requested: n,
                available: self.uncorrected.len(),
            });
        }

        let pool: Vec<&Submission> = self.uncorrected.values().collect();
        Ok(pool
            .choose_multiple(rng, n)
            .map(|submission| (*submission).clone())
            .collect())
    }

    /// 按固定大小切分剩余的未批改作答，不修改分区
    pub fn batches(&self, batch_size: usize) -> Vec<Vec<Submission>> {
        let submissions: Vec<Submission> = self.uncorrected.values().cloned().collect();
        submissions
            .chunks(batch_size.max(1))
            .map(<[Submission]>::to_vec)
            .collect()
    }

    /// 把指定学生移到已批改部分，返回实际移动的数量
    ///
    /// 已经移动过或不存在的学生直接忽略。
    pub fn commit<S: AsRef<str>>(&mut self, keys: &[S]) -> usize {
        keys.iter()
            .filter(|key| self.move_to_corrected(key.as_ref(), None))
            .count()
    }

    /// 提交评分结果：移动学生并记录模型的评分作为示例
    pub fn commit_scored(&mut self, results: &[ScoreResult]) -> usize {
        results
            .iter()
            .filter(|result| {
                let prior = result.success.then(|| result.demonstration());
                self.move_to_corrected(&result.student_id, prior)
            })
            .count()
    }

    /// 根据已持久化的分数恢复分区
    ///
    /// 账本中出现的每个学生都直接移到已批改部分，保证重复运行时不会再次请求评分服务。
    /// 只有成功的记录才会作为示例，失败记录的 0 分不会发给模型。
    pub fn resume<'a, I>(&mut self, results: I) -> usize
    where
        I: IntoIterator<Item = &'a ScoreResult>,
    {
        let mut moved = 0;
        for result in results {
            let prior = result.success.then(|| result.demonstration());
            if self.move_to_corrected(&result.student_id, prior) {
                moved += 1;
            } else if !self.corrected.contains_key(&result.student_id) {
                warn!("分数文件中的学生 {} 不在本次作业中", result.student_id);
            }
        }
        debug!("恢复了 {} 名已批改学生", moved);
        moved
    }

    /// 挑选最多 `n` 个已批改示例，展开为评分服务内容
    pub fn demonstrations(&self, n: usize) -> Vec<ContentItem> {
        let annotated: Vec<&CorrectedSubmission> = self
            .corrected
            .values()
            .filter(|entry| entry.prior_answer.is_some())
            .collect();

        let mut content = Vec::new();
        for entry in annotated.choose_multiple(&mut rand::thread_rng(), n) {
            content.extend(entry.submission.to_content());
            if let Some(answer) = &entry.prior_answer {
                content.push(ContentItem::text(format!("已给出的评分：{}", answer)));
            }
        }
        content
    }

    fn move_to_corrected(&mut self, student_id: &str, prior_answer: Option<String>) -> bool {
        match self.uncorrected.remove(student_id) {
            Some(submission) => {
                self.corrected.insert(
                    student_id.to_string(),
                    CorrectedSubmission {
                        submission,
                        prior_answer,
                    },
                );
                true
            }
            None => false,
        }
    }
}
