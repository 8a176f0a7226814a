use std::fmt;

use serde::{Deserialize, Serialize};

/// 发送给评分服务的一段内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    Text { text: String },
    /// 图片引用（URL 或 data URI），由评分服务自行获取
    Image { url: String },
}

impl ContentItem {
    pub fn text(text: impl Into<String>) -> Self {
        ContentItem::Text { text: text.into() }
    }

    pub fn image(url: impl Into<String>) -> Self {
        ContentItem::Image { url: url.into() }
    }
}

/// 学生对某一道题的作答
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerBlock {
    pub question_id: String,
    pub items: Vec<ContentItem>,
}

/// 一名学生的完整作答，加载后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub student_id: String,
    pub answers: Vec<AnswerBlock>,
}

impl Submission {
    pub fn new(student_id: impl Into<String>, answers: Vec<AnswerBlock>) -> Self {
        Self {
            student_id: student_id.into(),
            answers,
        }
    }

    /// 展开为评分服务可读的内容列表
    ///
    /// 以学生分隔行开头，每道题的文字拼成一段，图片紧随其后。
    /// 没有作答的题目输出空答案，让模型能明确给 0 分。
    pub fn to_content(&self) -> Vec<ContentItem> {
        let mut content = vec![ContentItem::text(format!(
            "\n===== 学生: {} =====",
            self.student_id
        ))];

        for block in &self.answers {
            let texts: Vec<&str> = block
                .items
                .iter()
                .filter_map(|item| match item {
                    ContentItem::Text { text } => Some(text.as_str()),
                    ContentItem::Image { .. } => None,
                })
                .collect();
            let image_count = block.items.len() - texts.len();

            let mut line = format!("{}：{}", block.question_id, texts.join(" "));
            if image_count > 0 {
                line.push_str(&format!("（附 {} 张截图）", image_count));
            }
            content.push(ContentItem::text(line));

            for item in &block.items {
                if let ContentItem::Image { .. } = item {
                    content.push(item.clone());
                }
            }
        }

        content
    }
}

/// 题目：题干（文字 + 图片）和参考答案
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub question_id: String,
    pub stem_text: Vec<String>,
    pub stem_images: Vec<String>,
    pub reference_answer: String,
}

/// 按顺序排列的题库，整个作业批改过程中只读
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionBank {
    pub questions: Vec<Question>,
}

impl QuestionBank {
    pub fn new(questions: Vec<Question>) -> Self {
        Self { questions }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// 创建评分上下文时发送的题目内容
    pub fn to_content(&self) -> Vec<ContentItem> {
        let mut content = Vec::new();
        for question in &self.questions {
            let reference = if question.reference_answer.trim().is_empty() {
                "（无）"
            } else {
                question.reference_answer.as_str()
            };
            content.push(ContentItem::text(format!(
                "{}:\n题干: {}\n参考答案: {}",
                question.question_id,
                question.stem_text.join(" "),
                reference
            )));
            content.extend(question.stem_images.iter().map(ContentItem::image));
        }
        content
    }
}

impl fmt::Display for Submission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[学生 {} 作答 {} 题]", self.student_id, self.answers.len())
    }
}
