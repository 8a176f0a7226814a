//! 提示词与请求内容构建
//!
//! 所有发给评分服务的说明文字都在这里，流程代码只负责决定何时发送。

use crate::models::{ContentItem, Submission};

/// 创建评分上下文时的系统说明
pub const CONTEXT_INSTRUCTIONS: &str = "你是一名教师，负责评阅学生作业。\
我会先提供题目信息和参考答案，然后逐步发送学生的作答。\
请仔细阅读并理解每道题目的要求和评分要点。";

/// 复用已有评分标准时的说明
pub const ATTACH_INSTRUCTIONS: &str = "请确认已理解评分标准，不需要展开说明。";

/// 校准：一次请求同时生成评分标准和抽样学生的分数
pub fn calibration_instructions(sample_size: usize) -> String {
    format!(
        "基于前面的题目信息，现在提供 {n} 名学生的作答。\n\
         请完成以下任务：\n\
         1. 分析学生整体水平\n\
         2. 制定评分标准\n\
         3. 为每位学生打分并给出评分依据\n\
         \n输出要求：\n\
         - 评分标准要详细、可操作、可解释\n\
         - 分数要客观反映学生水平，有适当区分度，满分 100 分\n\
         - 必须为所有 {n} 名学生打分\n\
         \n输出格式（严格 JSON）：\n\
         {{\n  \"grading_standard\": \"...\",\n  \"student_scores\": {{\n    \"张三\": {{\"score\": 85, \"scoring_criteria\": \"...\"}}\n  }}\n}}",
        n = sample_size
    )
}

/// 批量批改：只为列出的学生评分
pub fn batch_instructions(student_ids: &[String]) -> String {
    format!(
        "基于前面的评分标准和参考样本，为以下 {} 名学生评分。\n\
         学生：{}\n\
         要求：\n\
         1. 严格按照评分标准打分\n\
         2. 保持分数一致性\n\
         3. 为每位学生提供评分依据\n\
         \n输出格式（严格 JSON）：\n\
         {{\n  \"student_scores\": {{\n    \"张三\": {{\"score\": 80, \"scoring_criteria\": \"...\"}}\n  }}\n}}",
        student_ids.len(),
        student_ids.join(", ")
    )
}

/// 多名学生的作答依次展开
pub fn students_content(submissions: &[Submission]) -> Vec<ContentItem> {
    submissions.iter().flat_map(Submission::to_content).collect()
}

/// 附加已有评分标准，连同已批改示例一起发送
pub fn attach_content(standard: &str, demonstrations: Vec<ContentItem>) -> Vec<ContentItem> {
    let mut content = vec![ContentItem::text(format!(
        "以下是本次评分标准，请牢记并用于后续评分。\n{}",
        standard
    ))];
    if !demonstrations.is_empty() {
        content.push(ContentItem::text("以下是已批改的参考样本："));
        content.extend(demonstrations);
    }
    content
}
