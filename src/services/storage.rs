//! 作业结果落盘 - 业务能力层
//!
//! 只负责读写作业目录下的结果文件，不关心流程：
//! - `original_student_score.json`：原始分数账本（每次账本更新都会重写）
//! - `评分标准.md`：校准得到的评分标准
//! - `normalized_student_score.json`：归一化后的分数

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::error::{GradingError, GradingResult};
use crate::models::{PersistedScore, ScoreResult};
use crate::services::ledger::LedgerSnapshot;

pub const SCORE_FILE: &str = "original_student_score.json";
pub const STANDARD_FILE: &str = "评分标准.md";
pub const NORMALIZED_FILE: &str = "normalized_student_score.json";

/// 单个作业目录的结果存储
#[derive(Debug, Clone)]
pub struct HomeworkStorage {
    dir: PathBuf,
}

impl HomeworkStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn score_path(&self) -> PathBuf {
        self.dir.join(SCORE_FILE)
    }

    pub fn standard_path(&self) -> PathBuf {
        self.dir.join(STANDARD_FILE)
    }

    pub fn normalized_path(&self) -> PathBuf {
        self.dir.join(NORMALIZED_FILE)
    }

    /// 读取已保存的原始分数，文件不存在时返回空列表
    ///
    /// 无法识别的条目会被跳过，对应学生会重新批改。
    pub fn load_scores(&self) -> GradingResult<Vec<ScoreResult>> {
        let path = self.score_path();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&path).map_err(|e| GradingError::persistence(&path, e))?;
        let entries: Map<String, Value> =
            serde_json::from_str(&content).map_err(|e| GradingError::document(&path, e))?;

        let mut results = Vec::with_capacity(entries.len());
        for (student_id, value) in entries {
            match PersistedScore::from_value(&value) {
                Some(persisted) => results.push(persisted.into_result(student_id)),
                None => warn!("分数文件中学生 {} 的记录无法识别，将重新批改", student_id),
            }
        }
        debug!("从 {} 读取到 {} 条分数", path.display(), results.len());
        Ok(results)
    }

    /// 重写原始分数文件
    pub fn save_scores(&self, snapshot: &LedgerSnapshot) -> GradingResult<()> {
        let entries: BTreeMap<&str, PersistedScore> = snapshot
            .iter()
            .map(|(student, result)| (student.as_str(), PersistedScore::from(result)))
            .collect();
        self.write_json(&self.score_path(), &entries)
    }

    /// 读取已保存的评分标准，文件不存在或内容为空时返回 `None`
    pub fn load_standard(&self) -> GradingResult<Option<String>> {
        let path = self.standard_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|e| GradingError::persistence(&path, e))?;
        let trimmed = content.trim();
        Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
    }

    pub fn save_standard(&self, standard: &str) -> GradingResult<()> {
        let path = self.standard_path();
        write_atomically(&path, standard.as_bytes())
    }

    pub fn save_normalized(&self, scores: &BTreeMap<String, f64>) -> GradingResult<()> {
        self.write_json(&self.normalized_path(), scores)
    }

    /// 账本订阅者：每次更新后重写分数文件，失败只记录日志
    pub fn score_writer(&self) -> impl Fn(&LedgerSnapshot, &[String]) + Send + Sync + 'static {
        let storage = self.clone();
        move |snapshot, changed| {
            if let Err(e) = storage.save_scores(snapshot) {
                error!("保存分数失败（本次更新 {} 名学生）: {}", changed.len(), e);
            }
        }
    }

    fn write_json<T: serde::Serialize + ?Sized>(&self, path: &Path, value: &T) -> GradingResult<()> {
        let content =
            serde_json::to_string_pretty(value).map_err(|e| GradingError::document(path, e))?;
        write_atomically(path, content.as_bytes())
    }
}

/// 先写临时文件再改名，避免中途失败留下半截文件
fn write_atomically(path: &Path, content: &[u8]) -> GradingResult<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, content).map_err(|e| GradingError::persistence(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| GradingError::persistence(path, e))
}
