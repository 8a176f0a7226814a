//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责作业级别的调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量作业处理器
//! - 管理应用生命周期（初始化、运行）
//! - 扫描作业目录（Vec<作业目录>）
//! - 隔离单份作业的失败
//! - 输出全局统计信息
//!
//! ### `homework_processor` - 单个作业处理器
//! - 加载作业、恢复已有分数
//! - 创建评分上下文，复用或生成评分标准
//! - 委托 BatchGrader 批改剩余学生
//! - 归一化并保存分数
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<作业>)
//!     ↓
//! homework_processor (处理单份作业)
//!     ↓
//! workflow (CalibrationEngine / BatchGrader)
//!     ↓
//! services (能力层：corpus / ledger / normalizer / storage)
//!     ↓
//! clients (基础设施：ScoringService)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：batch_processor 管批量，homework_processor 管单份
//! 2. **资源隔离**：只有编排层持有评分服务客户端
//! 3. **向下依赖**：编排层 → workflow → services → clients
//! 4. **无业务逻辑**：只做调度和统计，不做具体评分判断

pub mod batch_processor;
pub mod homework_processor;

pub use batch_processor::{App, RunStats};
pub use homework_processor::{process_homework, HomeworkSummary};
