//! # Homework Grader
//!
//! 借助大模型批改学生作业的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的分层架构：
//!
//! ### ① 基础设施层（Clients）
//! - `clients/` - 只负责和评分服务交互，不关心批改流程
//! - `ScoringService` - 评分服务能力（创建上下文、发起一次交互）
//! - `ResponsesClient` - 基于 Responses API 的实现，用上下文句柄续接对话
//! - `extract_json` - 从模型回复中尽力提取 JSON
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单份作业的数据
//! - `AnswerCorpus` - 未批改/已批改两个分区
//! - `ScoreLedger` - 并发安全的分数账本，支持更新订阅
//! - `normalize` - 分数缩放
//! - `HomeworkStorage` - 作业目录下的结果文件
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一份作业"的批改流程
//! - `GradingContext` - 评分标准 + 对话句柄
//! - `CalibrationEngine` - 抽样生成评分标准（重试、缩小样本）
//! - `BatchGrader` - 并发批量批改剩余学生
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 扫描作业目录，逐份处理并汇总统计
//! - `orchestrator/homework_processor` - 单份作业：恢复 → 校准 → 批改 → 缩放
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

#[cfg(test)]
mod test_support;

// 重新导出常用类型
pub use clients::{ContextHandle, ResponsesClient, ScoringReply, ScoringRequest, ScoringService};
pub use config::Config;
pub use error::{ConfigError, GradingError, GradingResult};
pub use models::{ContentItem, ScoreResult, Submission};
pub use orchestrator::{process_homework, App, HomeworkSummary, RunStats};
pub use services::{AnswerCorpus, NormalizationBand, ScoreLedger};
pub use workflow::{BatchGrader, CalibrationEngine, GradingContext};
