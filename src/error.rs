//! 错误类型
//!
//! 批改引擎内部统一使用 [`GradingError`]，编排层和二进制入口使用 `anyhow`。
//! 可预期、常见的"模型输出解析失败"不属于错误，见
//! [`crate::clients::json_extract::extract_json`]。

use std::path::PathBuf;

use thiserror::Error;

/// 批改引擎错误
#[derive(Debug, Error)]
pub enum GradingError {
    /// 评分服务网络/HTTP 错误，可重试
    #[error("评分服务调用失败 (模型: {model}): {message}")]
    Transport { model: String, message: String },

    /// 校准阶段重试次数耗尽，仅对当前作业致命
    #[error("校准失败: 已尝试 {attempts} 次仍未得到有效的评分标准")]
    CalibrationExhausted { attempts: usize },

    /// 在评分标准生成之前就开始批量批改
    #[error("流程顺序错误: {0}")]
    Sequencing(&'static str),

    /// 抽样数量超过未批改学生数量
    #[error("抽样数量 {requested} 超过未批改学生数量 {available}")]
    SampleTooLarge { requested: usize, available: usize },

    /// 作业数据文件无法读取或格式不正确
    #[error("作业文件无效 ({}): {reason}", path.display())]
    Document { path: PathBuf, reason: String },

    /// 读写持久化文件失败
    #[error("文件读写失败 ({}): {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 配置错误
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: &'static str,
    },

    /// 配置文件无法读取或解析
    #[error("配置文件无效 ({}): {reason}", path.display())]
    File { path: PathBuf, reason: String },

    /// 配置项取值不合法
    #[error("配置项 {field} 不合法: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ========== 便捷构造函数 ==========

impl GradingError {
    /// 创建评分服务调用错误
    pub fn transport(model: impl Into<String>, message: impl std::fmt::Display) -> Self {
        GradingError::Transport {
            model: model.into(),
            message: message.to_string(),
        }
    }

    /// 创建作业文件错误
    pub fn document(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        GradingError::Document {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// 创建文件读写错误
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GradingError::Persistence {
            path: path.into(),
            source,
        }
    }
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

// ========== Result 类型别名 ==========

/// 批改引擎结果类型
pub type GradingResult<T> = Result<T, GradingError>;
