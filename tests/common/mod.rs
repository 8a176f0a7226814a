//! 集成测试公用工具：评分服务替身和作业目录构造

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use homework_grader::clients::extract_json;
use homework_grader::workflow::prompts::{ATTACH_INSTRUCTIONS, CONTEXT_INSTRUCTIONS};
use homework_grader::{
    Config, ContentItem, ContextHandle, GradingResult, ScoringReply, ScoringRequest,
    ScoringService,
};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Context,
    Calibration,
    Attach,
    Batch,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub kind: CallKind,
    pub model: String,
    pub previous: Option<String>,
    pub students: Vec<String>,
    pub texts: Vec<String>,
    pub temperature: f32,
}

type Responder = dyn Fn(&Call) -> GradingResult<String> + Send + Sync;

/// 按请求类型应答的评分服务替身
pub struct FakeScoring {
    responder: Box<Responder>,
    calls: Mutex<Vec<Call>>,
    counter: AtomicUsize,
}

impl FakeScoring {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&Call) -> GradingResult<String> + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
            counter: AtomicUsize::new(0),
        })
    }

    /// 校准和批量批改都给每个学生打同样的分数
    pub fn uniform(score: f64) -> Arc<Self> {
        Self::new(move |call| Ok(default_reply(call, score)))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<CallKind> {
        self.calls().iter().map(|c| c.kind).collect()
    }

    pub fn calls_of(&self, kind: CallKind) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.kind == kind).collect()
    }
}

#[async_trait]
impl ScoringService for FakeScoring {
    async fn respond(&self, request: ScoringRequest<'_>) -> GradingResult<ScoringReply> {
        let kind = if request.instructions == CONTEXT_INSTRUCTIONS {
            CallKind::Context
        } else if request.instructions == ATTACH_INSTRUCTIONS {
            CallKind::Attach
        } else if request.instructions.contains("grading_standard") {
            CallKind::Calibration
        } else {
            CallKind::Batch
        };

        let texts: Vec<String> = request
            .content
            .iter()
            .filter_map(|item| match item {
                ContentItem::Text { text } => Some(text.clone()),
                ContentItem::Image { .. } => None,
            })
            .collect();
        let students = texts
            .iter()
            .filter_map(|t| {
                t.trim()
                    .strip_prefix("===== 学生: ")
                    .and_then(|rest| rest.strip_suffix(" ====="))
                    .map(str::to_string)
            })
            .collect();

        let call = Call {
            kind,
            model: request.model.to_string(),
            previous: request.previous.map(|h| h.as_str().to_string()),
            students,
            texts,
            temperature: request.temperature,
        };
        self.calls.lock().unwrap().push(call.clone());

        let text = (self.responder)(&call)?;
        let id = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ScoringReply {
            parsed: extract_json(&text),
            raw_text: text,
            handle: ContextHandle::new(format!("resp_{}", id)),
        })
    }
}

pub fn score_map(students: &[String], score: f64) -> Value {
    let entries: Map<String, Value> = students
        .iter()
        .map(|s| (s.clone(), json!({"score": score, "scoring_criteria": "按标准给分"})))
        .collect();
    Value::Object(entries)
}

pub fn calibration_reply(standard: &str, students: &[String], score: f64) -> String {
    json!({"grading_standard": standard, "student_scores": score_map(students, score)}).to_string()
}

pub fn batch_reply(students: &[String], score: f64) -> String {
    format!(
        "评分结果如下：\n```json\n{}\n```",
        json!({"student_scores": score_map(students, score)})
    )
}

pub fn default_reply(call: &Call, score: f64) -> String {
    match call.kind {
        CallKind::Context => "好的，已了解题目。".to_string(),
        CallKind::Attach => "已确认评分标准。".to_string(),
        CallKind::Calibration => calibration_reply("每题按步骤给分", &call.students, score),
        CallKind::Batch => batch_reply(&call.students, score),
    }
}

/// 在 `<root>/<class>/<homework>/answer.json` 写入 `n` 名学生的作业
pub fn write_homework(root: &Path, class: &str, homework: &str, n: usize) -> PathBuf {
    let dir = root.join(class).join(homework);
    std::fs::create_dir_all(&dir).unwrap();

    let answers: Map<String, Value> = (1..=n)
        .map(|i| {
            (
                student(i),
                json!({"1": {"text": [format!("第 {} 份作答", i)], "images": []}}),
            )
        })
        .collect();
    let document = json!({
        "questions": {
            "1": {"stem": {"text": ["配置 DHCP 服务器"], "images": []}, "reference_answer": "yum install dhcp"}
        },
        "student_answers": answers
    });
    std::fs::write(dir.join("answer.json"), document.to_string()).unwrap();
    dir
}

pub fn student(i: usize) -> String {
    format!("学生{:02}", i)
}

pub fn test_config(root: &Path) -> Config {
    Config {
        homework_root: root.to_path_buf(),
        prepare_model: "prepare-model".to_string(),
        gen_model: "gen-model".to_string(),
        calibration_min: 5,
        calibration_max: 8,
        batch_size: 3,
        max_workers: 2,
        max_retries: 10,
        ..Config::default()
    }
}

pub fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}
