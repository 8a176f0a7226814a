use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 单个学生的评分结果
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreResult {
    pub student_id: String,
    /// 成功时位于 [0, 100]
    pub score: f64,
    /// 评分依据
    pub rationale: String,
    pub success: bool,
    pub error: Option<String>,
}

impl ScoreResult {
    pub fn success(student_id: impl Into<String>, score: f64, rationale: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            score,
            rationale: rationale.into(),
            success: true,
            error: None,
        }
    }

    /// 重试耗尽后的失败记录，分数记为 0
    pub fn failure(student_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            score: 0.0,
            rationale: String::new(),
            success: false,
            error: Some(error.into()),
        }
    }

    /// 从模型回复中某个学生的条目解析评分
    ///
    /// 条目可以是 `{"score": 85, "scoring_criteria": "..."}`、裸数字或数字字符串。
    /// 分数无法解析或不在 [0, 100] 内时返回 `None`，调用方视为该学生缺失。
    pub fn from_reply_entry(student_id: &str, entry: &Value) -> Option<Self> {
        let (score_value, rationale) = match entry {
            Value::Object(map) => (
                map.get("score")?,
                map.get("scoring_criteria")
                    .map(value_to_text)
                    .unwrap_or_default(),
            ),
            other => (other, String::new()),
        };

        let score = parse_score(score_value)?;
        Some(Self::success(student_id, score, rationale))
    }

    /// 已批改示例：模型此前对该学生的回答
    pub fn demonstration(&self) -> String {
        let mut entry = serde_json::Map::new();
        entry.insert(
            self.student_id.clone(),
            serde_json::json!({
                "score": self.score,
                "scoring_criteria": self.rationale,
            }),
        );
        Value::Object(entry).to_string()
    }
}

/// 从回复的 学生 → 评分 映射中取出指定学生的结果
///
/// 只保留 `student_ids` 中的学生；模型额外返回的名字会被忽略。
pub fn scores_for(entries: &Map<String, Value>, student_ids: &[String]) -> Vec<ScoreResult> {
    student_ids
        .iter()
        .filter_map(|id| {
            entries
                .get(id)
                .and_then(|entry| ScoreResult::from_reply_entry(id, entry))
        })
        .collect()
}

fn parse_score(value: &Value) -> Option<f64> {
    let score = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('分').trim().parse().ok()?,
        _ => return None,
    };
    (score.is_finite() && (0.0..=100.0).contains(&score)).then_some(score)
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// 分数文件中的单条记录
///
/// 成功记录只包含 `score` 和 `scoring_criteria`，失败记录额外带 `success: false` 和 `error`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedScore {
    pub score: f64,
    #[serde(default)]
    pub scoring_criteria: String,
    #[serde(default = "default_success", skip_serializing_if = "is_true")]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn default_success() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

impl PersistedScore {
    /// 兼容旧格式：值可能是裸数字
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self {
                score: n.as_f64()?,
                scoring_criteria: String::new(),
                success: true,
                error: None,
            }),
            Value::Object(_) => serde_json::from_value(value.clone()).ok(),
            _ => None,
        }
    }

    pub fn into_result(self, student_id: impl Into<String>) -> ScoreResult {
        ScoreResult {
            student_id: student_id.into(),
            score: self.score,
            rationale: self.scoring_criteria,
            success: self.success,
            error: self.error,
        }
    }
}

impl From<&ScoreResult> for PersistedScore {
    fn from(result: &ScoreResult) -> Self {
        Self {
            score: result.score,
            scoring_criteria: result.rationale.clone(),
            success: result.success,
            error: result.error.clone(),
        }
    }
}
