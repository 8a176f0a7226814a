//! 批改上下文
//!
//! 封装"这份作业的评分标准是什么、后续请求从哪个对话状态继续"这一信息。
//! 每个作业各持有一份，按引用在流程中传递。

use std::fmt::Display;

use crate::clients::ContextHandle;
use crate::error::{GradingError, GradingResult};

#[derive(Debug, Clone)]
pub struct GradingContext {
    /// 作业标识（仅用于日志显示）
    pub homework_id: String,

    /// 最近一次确认评分标准的对话句柄
    pub context_handle: Option<ContextHandle>,

    /// 为空表示尚未校准
    pub grading_standard: String,
}

impl GradingContext {
    pub fn new(homework_id: impl Into<String>) -> Self {
        Self {
            homework_id: homework_id.into(),
            context_handle: None,
            grading_standard: String::new(),
        }
    }

    pub fn is_calibrated(&self) -> bool {
        !self.grading_standard.trim().is_empty() && self.context_handle.is_some()
    }

    /// 记录校准（或复用）得到的评分标准和对话句柄
    pub fn calibrate(&mut self, standard: impl Into<String>, handle: ContextHandle) {
        self.grading_standard = standard.into();
        self.context_handle = Some(handle);
    }

    /// 批量批改前的检查：评分标准必须已经存在
    pub fn grading_handle(&self) -> GradingResult<&ContextHandle> {
        if self.grading_standard.trim().is_empty() {
            return Err(GradingError::Sequencing("评分标准为空，不能开始批量批改"));
        }
        self.context_handle
            .as_ref()
            .ok_or(GradingError::Sequencing("缺少评分上下文，不能开始批量批改"))
    }
}

impl Display for GradingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[作业 {}]", self.homework_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_refuses_batch_grading() {
        let ctx = GradingContext::new("计算机2401/DHCP");
        assert!(!ctx.is_calibrated());
        assert!(matches!(
            ctx.grading_handle(),
            Err(GradingError::Sequencing(_))
        ));
        assert_eq!(ctx.to_string(), "[作业 计算机2401/DHCP]");
    }

    #[test]
    fn blank_standard_is_not_calibrated() {
        let mut ctx = GradingContext::new("hw");
        ctx.calibrate("   ", ContextHandle::new("resp_1"));
        assert!(!ctx.is_calibrated());
        assert!(ctx.grading_handle().is_err());

        ctx.calibrate("按步骤给分", ContextHandle::new("resp_2"));
        assert_eq!(ctx.grading_handle().unwrap().as_str(), "resp_2");
    }
}
