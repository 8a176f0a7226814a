use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::fs;

use crate::error::{GradingError, GradingResult};
use crate::models::content::{AnswerBlock, ContentItem, Question, QuestionBank, Submission};

/// 作业数据文件名
pub const ANSWER_FILE: &str = "answer.json";

/// 一份作业的全部数据
#[derive(Debug, Clone)]
pub struct HomeworkDocument {
    pub bank: QuestionBank,
    pub submissions: Vec<Submission>,
}

#[derive(Deserialize)]
struct RawDocument {
    #[serde(alias = "题目")]
    questions: Map<String, Value>,
    #[serde(alias = "学生回答")]
    student_answers: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawQuestion {
    #[serde(alias = "题干", default)]
    stem: RawStem,
    #[serde(alias = "正确答案", default)]
    reference_answer: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawStem {
    Parts(RawParts),
    Plain(String),
}

impl Default for RawStem {
    fn default() -> Self {
        RawStem::Parts(RawParts::default())
    }
}

#[derive(Deserialize, Default)]
struct RawParts {
    #[serde(default)]
    text: TextField,
    #[serde(default)]
    images: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TextField {
    Many(Vec<String>),
    One(String),
}

impl Default for TextField {
    fn default() -> Self {
        TextField::Many(Vec::new())
    }
}

impl TextField {
    fn into_vec(self) -> Vec<String> {
        match self {
            TextField::Many(parts) => parts,
            TextField::One(text) => vec![text],
        }
    }
}

/// 解析作业数据（JSON 文本）
///
/// 同时接受英文键（`questions`/`student_answers`/`stem`/`reference_answer`）
/// 和中文键（`题目`/`学生回答`/`题干`/`正确答案`）。题目和学生保持文件中的顺序。
pub fn parse_document(content: &str, path: &Path) -> GradingResult<HomeworkDocument> {
    let raw: RawDocument =
        serde_json::from_str(content).map_err(|e| GradingError::document(path, e))?;

    let mut questions = Vec::with_capacity(raw.questions.len());
    for (question_id, value) in raw.questions {
        let question: RawQuestion = serde_json::from_value(value)
            .map_err(|e| GradingError::document(path, format!("题目 {}: {}", question_id, e)))?;
        let (stem_text, stem_images) = match question.stem {
            RawStem::Parts(parts) => (parts.text.into_vec(), parts.images),
            RawStem::Plain(text) => (vec![text], Vec::new()),
        };
        questions.push(Question {
            question_id,
            stem_text,
            stem_images,
            reference_answer: question.reference_answer.unwrap_or_default(),
        });
    }

    let mut submissions = Vec::with_capacity(raw.student_answers.len());
    for (student_id, value) in raw.student_answers {
        let blocks: Map<String, Value> = serde_json::from_value(value)
            .map_err(|e| GradingError::document(path, format!("学生 {}: {}", student_id, e)))?;

        let mut answers = Vec::with_capacity(blocks.len());
        for (question_id, block) in blocks {
            let parts: RawParts = serde_json::from_value(block).map_err(|e| {
                GradingError::document(path, format!("学生 {} 题目 {}: {}", student_id, question_id, e))
            })?;
            let mut items: Vec<ContentItem> = parts
                .text
                .into_vec()
                .into_iter()
                .filter(|text| !text.trim().is_empty())
                .map(ContentItem::text)
                .collect();
            items.extend(parts.images.into_iter().map(ContentItem::image));
            answers.push(AnswerBlock { question_id, items });
        }
        submissions.push(Submission::new(student_id, answers));
    }

    Ok(HomeworkDocument {
        bank: QuestionBank::new(questions),
        submissions,
    })
}

/// 从作业目录加载 `answer.json`
pub async fn load_document(homework_dir: &Path) -> GradingResult<HomeworkDocument> {
    let path = homework_dir.join(ANSWER_FILE);
    let content = fs::read_to_string(&path)
        .await
        .map_err(|e| GradingError::persistence(&path, e))?;

    let document = parse_document(&content, &path)?;
    tracing::info!(
        "成功加载作业: {} 道题目, {} 名学生",
        document.bank.len(),
        document.submissions.len()
    );
    Ok(document)
}

/// 扫描作业根目录，返回所有包含 `answer.json` 的作业目录
///
/// 目录结构为 `<root>/<班级>/<作业>/answer.json`，结果按路径排序。
pub async fn discover_homeworks(root: &Path) -> GradingResult<Vec<PathBuf>> {
    if !root.exists() {
        return Err(GradingError::document(root, "作业根目录不存在"));
    }

    let mut homework_dirs = Vec::new();
    let mut classes = fs::read_dir(root)
        .await
        .map_err(|e| GradingError::persistence(root, e))?;

    while let Some(class_entry) = classes
        .next_entry()
        .await
        .map_err(|e| GradingError::persistence(root, e))?
    {
        let class_dir = class_entry.path();
        if !class_dir.is_dir() {
            continue;
        }

        let mut homeworks = fs::read_dir(&class_dir)
            .await
            .map_err(|e| GradingError::persistence(&class_dir, e))?;
        while let Some(entry) = homeworks
            .next_entry()
            .await
            .map_err(|e| GradingError::persistence(&class_dir, e))?
        {
            let path = entry.path();
            if path.join(ANSWER_FILE).is_file() {
                homework_dirs.push(path);
            } else if path.is_dir() {
                tracing::warn!("跳过没有 {} 的目录: {}", ANSWER_FILE, path.display());
            }
        }
    }

    homework_dirs.sort();
    Ok(homework_dirs)
}

/// 作业标识：`<班级>/<作业>`
pub fn homework_id(homework_dir: &Path) -> String {
    let name = |p: Option<&Path>| {
        p.and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    };
    let homework = name(Some(homework_dir));
    let class = name(homework_dir.parent());
    if class.is_empty() {
        homework
    } else {
        format!("{}/{}", class, homework)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENGLISH_DOC: &str = r#"{
        "questions": {
            "2": {"stem": {"text": ["配置作用域"], "images": ["https://img/q2.png"]}, "reference_answer": "略"},
            "1": {"stem": {"text": ["安装 DHCP"], "images": []}, "reference_answer": "yum install dhcp"}
        },
        "student_answers": {
            "李四": {"1": {"text": ["yum install dhcp"], "images": []}, "2": {"text": [], "images": ["https://img/s.png"]}},
            "张三": {"1": {"text": [""], "images": []}}
        }
    }"#;

    #[test]
    fn parses_english_document_in_order() {
        let doc = parse_document(ENGLISH_DOC, Path::new("answer.json")).unwrap();

        let ids: Vec<&str> = doc.bank.questions.iter().map(|q| q.question_id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1"]);
        assert_eq!(doc.bank.questions[0].stem_images, vec!["https://img/q2.png"]);

        let students: Vec<&str> = doc.submissions.iter().map(|s| s.student_id.as_str()).collect();
        assert_eq!(students, vec!["李四", "张三"]);
        assert_eq!(
            doc.submissions[0].answers[1].items,
            vec![ContentItem::image("https://img/s.png")]
        );
        assert!(doc.submissions[1].answers[0].items.is_empty());
    }

    #[test]
    fn parses_chinese_keys_and_plain_stem() {
        let content = r#"{
            "题目": {"一": {"题干": "简述 DNS 解析过程", "正确答案": null}},
            "学生回答": {"王五": {"一": {"text": "递归查询", "images": []}}}
        }"#;
        let doc = parse_document(content, Path::new("answer.json")).unwrap();
        assert_eq!(doc.bank.questions[0].stem_text, vec!["简述 DNS 解析过程"]);
        assert_eq!(doc.bank.questions[0].reference_answer, "");
        assert_eq!(
            doc.submissions[0].answers[0].items,
            vec![ContentItem::text("递归查询")]
        );
    }

    #[test]
    fn malformed_document_is_a_document_error() {
        let err = parse_document(r#"{"questions": {}}"#, Path::new("answer.json")).unwrap_err();
        assert!(matches!(err, GradingError::Document { .. }));
    }

    #[test]
    fn homework_id_joins_class_and_homework() {
        assert_eq!(
            homework_id(Path::new("/data/homework/计算机2401/DHCP")),
            "计算机2401/DHCP"
        );
    }

    #[tokio::test]
    async fn discovers_nested_homeworks_sorted() {
        let root = tempfile::tempdir().unwrap();
        for dir in ["b/hw2", "a/hw1", "a/empty"] {
            std::fs::create_dir_all(root.path().join(dir)).unwrap();
        }
        std::fs::write(root.path().join("b/hw2").join(ANSWER_FILE), ENGLISH_DOC).unwrap();
        std::fs::write(root.path().join("a/hw1").join(ANSWER_FILE), ENGLISH_DOC).unwrap();

        let found = discover_homeworks(root.path()).await.unwrap();
        assert_eq!(
            found,
            vec![root.path().join("a/hw1"), root.path().join("b/hw2")]
        );
    }
}
