//! 分数归一化
//!
//! 把原始分数线性映射到配置的区间。落在 `[original_min, original_max]` 之外的
//! 分数原样保留。映射不是幂等的，每个作业只能对原始账本应用一次。

use std::collections::BTreeMap;

use crate::services::ledger::LedgerSnapshot;

/// 归一化区间
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationBand {
    pub normalized_min: f64,
    pub normalized_max: f64,
    pub original_min: f64,
    pub original_max: f64,
}

impl Default for NormalizationBand {
    fn default() -> Self {
        Self {
            normalized_min: 60.0,
            normalized_max: 85.0,
            original_min: 20.0,
            original_max: 85.0,
        }
    }
}

impl NormalizationBand {
    /// 该分数是否会被映射
    pub fn covers(&self, score: f64) -> bool {
        (self.original_min..=self.original_max).contains(&score)
    }

    /// 映射单个分数
    pub fn scale(&self, score: f64) -> f64 {
        if !self.covers(score) {
            return score;
        }
        score / 100.0 * (self.normalized_max - self.normalized_min) + self.normalized_min
    }
}

pub fn normalize(scores: &BTreeMap<String, f64>, band: NormalizationBand) -> BTreeMap<String, f64> {
    scores
        .iter()
        .map(|(student, &score)| (student.clone(), band.scale(score)))
        .collect()
}

/// 对账本快照做归一化
///
/// 输出包含账本中的所有学生。失败记录不参与映射，保留原始的 0 分，
/// 避免在区间下限为 0 时被抬到 `normalized_min`。
pub fn normalize_ledger(snapshot: &LedgerSnapshot, band: NormalizationBand) -> BTreeMap<String, f64> {
    snapshot
        .iter()
        .map(|(student, result)| {
            let score = if result.success {
                band.scale(result.score)
            } else {
                result.score
            };
            (student.clone(), score)
        })
        .collect()
}
