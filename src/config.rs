use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::services::normalizer::NormalizationBand;

/// 批量批改允许的批次大小范围
pub const BATCH_SIZE_RANGE: (usize, usize) = (3, 5);

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- 评分服务 ---
    pub api_key: String,
    pub api_base_url: String,
    /// 生成评分标准、创建上下文使用的模型
    pub prepare_model: String,
    /// 批量批改使用的模型
    pub gen_model: String,
    /// 单次请求超时（秒）
    pub request_timeout_secs: u64,
    pub max_output_tokens: u32,

    // --- 作业目录 ---
    /// 作业根目录，结构为 `<root>/<班级>/<作业>/answer.json`
    pub homework_root: PathBuf,

    // --- 批改流程 ---
    /// 批量批改的最大并发数
    pub max_workers: usize,
    /// 校准抽样数量下限
    pub calibration_min: usize,
    /// 校准抽样数量上限（首次尝试使用）
    pub calibration_max: usize,
    /// 每批学生数量，会被限制在 3..=5
    pub batch_size: usize,
    pub max_retries: usize,
    /// 校准响应至少覆盖抽样学生的比例
    pub completeness_ratio: f64,
    /// 复用评分标准时附带的已批改示例数量
    pub demonstration_count: usize,
    /// 校准响应中缺失的抽样学生是否也视为已批改
    pub commit_unscored_samples: bool,

    // --- 分数缩放 ---
    pub normalize: bool,
    pub normalized_min: f64,
    pub normalized_max: f64,
    pub original_min: f64,
    pub original_max: f64,

    /// 是否输出模型原始回复
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base_url: "https://api.openai.com/v1".to_string(),
            prepare_model: "gpt-4o".to_string(),
            gen_model: "gpt-4o".to_string(),
            request_timeout_secs: 300,
            max_output_tokens: 4096,
            homework_root: PathBuf::from("homework"),
            max_workers: 6,
            calibration_min: 5,
            calibration_max: 8,
            batch_size: 3,
            max_retries: 10,
            completeness_ratio: 0.8,
            demonstration_count: 3,
            commit_unscored_samples: true,
            normalize: true,
            normalized_min: 60.0,
            normalized_max: 85.0,
            original_min: 20.0,
            original_max: 85.0,
            verbose_logging: false,
        }
    }
}

impl Config {
    /// 依次读取配置文件（可选）和环境变量，并校验
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        let config = base.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件读取，缺省字段使用默认值
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::File {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::File { reason, .. } => ConfigError::File {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::File {
            path: PathBuf::new(),
            reason: e.to_string(),
        })
    }

    fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        override_string("GRADER_API_KEY", &mut self.api_key);
        override_string("GRADER_API_BASE_URL", &mut self.api_base_url);
        override_string("GRADER_PREPARE_MODEL", &mut self.prepare_model);
        override_string("GRADER_GEN_MODEL", &mut self.gen_model);
        if let Ok(root) = std::env::var("GRADER_HOMEWORK_ROOT") {
            self.homework_root = PathBuf::from(root);
        }
        override_parsed("GRADER_REQUEST_TIMEOUT_SECS", "u64", &mut self.request_timeout_secs)?;
        override_parsed("GRADER_MAX_OUTPUT_TOKENS", "u32", &mut self.max_output_tokens)?;
        override_parsed("GRADER_MAX_WORKERS", "usize", &mut self.max_workers)?;
        override_parsed("GRADER_CALIBRATION_MIN", "usize", &mut self.calibration_min)?;
        override_parsed("GRADER_CALIBRATION_MAX", "usize", &mut self.calibration_max)?;
        override_parsed("GRADER_BATCH_SIZE", "usize", &mut self.batch_size)?;
        override_parsed("GRADER_MAX_RETRIES", "usize", &mut self.max_retries)?;
        override_parsed("GRADER_COMPLETENESS_RATIO", "f64", &mut self.completeness_ratio)?;
        override_parsed("GRADER_DEMONSTRATION_COUNT", "usize", &mut self.demonstration_count)?;
        override_parsed(
            "GRADER_COMMIT_UNSCORED_SAMPLES",
            "bool",
            &mut self.commit_unscored_samples,
        )?;
        override_parsed("GRADER_NORMALIZE", "bool", &mut self.normalize)?;
        override_parsed("GRADER_NORMALIZED_MIN", "f64", &mut self.normalized_min)?;
        override_parsed("GRADER_NORMALIZED_MAX", "f64", &mut self.normalized_max)?;
        override_parsed("GRADER_ORIGINAL_MIN", "f64", &mut self.original_min)?;
        override_parsed("GRADER_ORIGINAL_MAX", "f64", &mut self.original_max)?;
        override_parsed("VERBOSE_LOGGING", "bool", &mut self.verbose_logging)?;
        Ok(self)
    }

    /// 校验取值范围
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.calibration_min == 0 {
            return Err(ConfigError::invalid("calibration_min", "必须大于 0"));
        }
        if self.calibration_min > self.calibration_max {
            return Err(ConfigError::invalid(
                "calibration_min",
                format!(
                    "下限 {} 大于上限 {}",
                    self.calibration_min, self.calibration_max
                ),
            ));
        }
        if self.max_workers == 0 {
            return Err(ConfigError::invalid("max_workers", "必须大于 0"));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::invalid("max_retries", "必须大于 0"));
        }
        if !(self.completeness_ratio > 0.0 && self.completeness_ratio <= 1.0) {
            return Err(ConfigError::invalid(
                "completeness_ratio",
                format!("{} 不在 (0, 1] 范围内", self.completeness_ratio),
            ));
        }
        if self.normalized_min > self.normalized_max {
            return Err(ConfigError::invalid(
                "normalized_min",
                "缩放下限大于缩放上限",
            ));
        }
        if self.original_min > self.original_max {
            return Err(ConfigError::invalid("original_min", "原始下限大于原始上限"));
        }
        Ok(())
    }

    /// 限制在 3..=5 之后的批次大小
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.clamp(BATCH_SIZE_RANGE.0, BATCH_SIZE_RANGE.1)
    }

    pub fn normalization_band(&self) -> NormalizationBand {
        NormalizationBand {
            normalized_min: self.normalized_min,
            normalized_max: self.normalized_max,
            original_min: self.original_min,
            original_max: self.original_max,
        }
    }
}

fn override_string(var_name: &str, target: &mut String) {
    if let Ok(value) = std::env::var(var_name) {
        *target = value;
    }
}

fn override_parsed<T: FromStr>(
    var_name: &str,
    expected_type: &'static str,
    target: &mut T,
) -> Result<(), ConfigError> {
    if let Ok(value) = std::env::var(var_name) {
        *target = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type,
            })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.effective_batch_size(), 3);
    }

    #[test]
    fn batch_size_is_clamped() {
        let mut config = Config::default();
        config.batch_size = 1;
        assert_eq!(config.effective_batch_size(), 3);
        config.batch_size = 9;
        assert_eq!(config.effective_batch_size(), 5);
        config.batch_size = 4;
        assert_eq!(config.effective_batch_size(), 4);
    }

    #[test]
    fn toml_fields_are_optional() {
        let config = Config::from_toml_str(
            r#"
            gen_model = "qwen-vl"
            calibration_min = 3
            calibration_max = 6
            normalize = false
            "#,
        )
        .unwrap();
        assert_eq!(config.gen_model, "qwen-vl");
        assert_eq!(config.prepare_model, Config::default().prepare_model);
        assert_eq!(config.calibration_max, 6);
        assert!(!config.normalize);
        assert_eq!(config.max_retries, 10);
    }

    #[test]
    fn invalid_bounds_are_rejected() {
        let mut config = Config::default();
        config.calibration_min = 9;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "calibration_min", .. })
        ));

        let mut config = Config::default();
        config.completeness_ratio = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.max_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_toml_is_reported() {
        assert!(matches!(
            Config::from_toml_str("max_workers = \"many\""),
            Err(ConfigError::File { .. })
        ));
    }
}
