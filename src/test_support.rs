//! 测试用评分服务替身
//!
//! 先按顺序回放排队的回复，队列用完后交给可选的应答函数。
//! 每次请求都会被记录，方便断言模型、温度、句柄和学生名单。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::clients::{extract_json, ContextHandle, ScoringReply, ScoringRequest, ScoringService};
use crate::error::{GradingError, GradingResult};
use crate::models::{AnswerBlock, ContentItem, Submission};

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub model: String,
    pub previous: Option<String>,
    pub instructions: String,
    pub content: Vec<ContentItem>,
    pub temperature: f32,
}

impl RecordedRequest {
    /// 请求内容中出现的学生（按学生分隔行解析）
    pub fn students(&self) -> Vec<String> {
        self.content
            .iter()
            .filter_map(|item| match item {
                ContentItem::Text { text } => text
                    .trim()
                    .strip_prefix("===== 学生: ")
                    .and_then(|rest| rest.strip_suffix(" ====="))
                    .map(str::to_string),
                ContentItem::Image { .. } => None,
            })
            .collect()
    }
}

type Responder = Box<dyn Fn(&RecordedRequest) -> GradingResult<String> + Send + Sync>;

#[derive(Default)]
pub struct ScriptedScoring {
    queue: Mutex<VecDeque<GradingResult<String>>>,
    responder: Option<Responder>,
    requests: Mutex<Vec<RecordedRequest>>,
    counter: AtomicUsize,
}

impl ScriptedScoring {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()))
    }

    pub fn fail(self, message: &str) -> Self {
        self.push(Err(GradingError::transport("scripted", message)))
    }

    pub fn then_respond<F>(mut self, responder: F) -> Self
    where
        F: Fn(&RecordedRequest) -> GradingResult<String> + Send + Sync + 'static,
    {
        self.responder = Some(Box::new(responder));
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn push(self, entry: GradingResult<String>) -> Self {
        self.queue.lock().unwrap().push_back(entry);
        self
    }
}

#[async_trait]
impl ScoringService for ScriptedScoring {
    async fn respond(&self, request: ScoringRequest<'_>) -> GradingResult<ScoringReply> {
        let recorded = RecordedRequest {
            model: request.model.to_string(),
            previous: request.previous.map(|h| h.as_str().to_string()),
            instructions: request.instructions.to_string(),
            content: request.content.to_vec(),
            temperature: request.temperature,
        };
        self.requests.lock().unwrap().push(recorded.clone());

        let queued = self.queue.lock().unwrap().pop_front();
        let text = match (queued, &self.responder) {
            (Some(entry), _) => entry?,
            (None, Some(responder)) => responder(&recorded)?,
            (None, None) => return Err(GradingError::transport("scripted", "脚本已用完")),
        };

        let id = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ScoringReply {
            parsed: extract_json(&text),
            raw_text: text,
            handle: ContextHandle::new(format!("resp_{}", id)),
        })
    }
}

/// `学生01` .. `学生NN`，每人一道题的文字作答
pub fn submissions(n: usize) -> Vec<Submission> {
    (1..=n)
        .map(|i| {
            Submission::new(
                format!("学生{:02}", i),
                vec![AnswerBlock {
                    question_id: "1".to_string(),
                    items: vec![ContentItem::text(format!("第 {} 份作答", i))],
                }],
            )
        })
        .collect()
}

pub fn score_map(students: &[String], score: f64) -> Value {
    let entries: Map<String, Value> = students
        .iter()
        .map(|s| (s.clone(), json!({"score": score, "scoring_criteria": "按标准给分"})))
        .collect();
    Value::Object(entries)
}

pub fn calibration_reply(standard: &str, students: &[String], score: f64) -> String {
    format!(
        "```json\n{}\n```",
        json!({"grading_standard": standard, "student_scores": score_map(students, score)})
    )
}

pub fn batch_reply(students: &[String], score: f64) -> String {
    json!({"student_scores": score_map(students, score)}).to_string()
}
