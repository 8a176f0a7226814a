//! 评分服务客户端 - 基础设施层
//!
//! 只负责和远端模型交互，不关心批改流程。
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 的 Responses API（`client.responses()`）
//! - 兼容 OpenAI API 的服务（如 Azure, Doubao 等），`reqwest` 只负责超时配置
//! - 通过 `previous_response_id` 复用服务端保存的对话状态（上下文句柄），
//!   后续请求无需重复发送题目和评分标准
//! - 回复文本经 [`extract_json`] 尽力解析为 JSON，解析失败不报错

use std::fmt;
use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::responses::{
        CreateResponse, CreateResponseArgs, EasyInputContent, EasyInputMessage, ImageDetail,
        InputContent, InputImageContent, InputItem, InputTextContent, MessageType, Role,
    },
    Client,
};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::clients::json_extract::extract_json;
use crate::config::Config;
use crate::error::{GradingError, GradingResult};
use crate::models::ContentItem;

/// 创建上下文时使用的温度
pub const CONTEXT_TEMPERATURE: f32 = 0.3;

/// 服务端对话状态的不透明引用
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextHandle(String);

impl ContextHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 一次评分服务请求
#[derive(Debug, Clone, Copy)]
pub struct ScoringRequest<'a> {
    pub model: &'a str,
    /// 为 `None` 时开启新的对话
    pub previous: Option<&'a ContextHandle>,
    pub instructions: &'a str,
    pub content: &'a [ContentItem],
    pub temperature: f32,
}

/// 评分服务回复
#[derive(Debug, Clone)]
pub struct ScoringReply {
    pub raw_text: String,
    /// 提取失败时为 `None`
    pub parsed: Option<Value>,
    /// 包含本次交互在内的新上下文句柄
    pub handle: ContextHandle,
}

/// 评分服务能力
///
/// 网络错误以 [`GradingError::Transport`] 返回，输出解析失败体现为
/// `ScoringReply::parsed == None`。实现者除返回的句柄外不保存任何调用间状态。
#[async_trait]
pub trait ScoringService: Send + Sync {
    /// 发起一次交互
    async fn respond(&self, request: ScoringRequest<'_>) -> GradingResult<ScoringReply>;

    /// 发送系统说明和题目内容，返回可复用的上下文句柄
    async fn create_context(
        &self,
        model: &str,
        instructions: &str,
        content: &[ContentItem],
    ) -> GradingResult<ContextHandle> {
        let reply = self
            .respond(ScoringRequest {
                model,
                previous: None,
                instructions,
                content,
                temperature: CONTEXT_TEMPERATURE,
            })
            .await?;
        info!("评分上下文已创建: {}", reply.handle);
        Ok(reply.handle)
    }
}

/// Responses API 客户端
pub struct ResponsesClient {
    client: Client<OpenAIConfig>,
    max_output_tokens: u32,
}

impl ResponsesClient {
    /// 创建新的客户端
    pub fn new(config: &Config) -> GradingResult<Self> {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.api_key)
            .with_api_base(api_base(&config.api_base_url));

        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| GradingError::transport(&config.prepare_model, e))?;

        Ok(Self {
            client: Client::with_config(openai_config).with_http_client(http_client),
            max_output_tokens: config.max_output_tokens,
        })
    }

    fn build_request(&self, request: &ScoringRequest<'_>) -> GradingResult<CreateResponse> {
        let content: Vec<InputContent> = request
            .content
            .iter()
            .map(|item| match item {
                ContentItem::Text { text } => {
                    InputContent::InputText(InputTextContent { text: text.clone() })
                }
                ContentItem::Image { url } => InputContent::InputImage(InputImageContent {
                    detail: ImageDetail::Auto,
                    file_id: None,
                    image_url: Some(url.clone()),
                }),
            })
            .collect();

        let message = EasyInputMessage {
            r#type: MessageType::Message,
            role: Role::User,
            content: EasyInputContent::ContentList(content),
        };

        let mut args = CreateResponseArgs::default();
        args.model(request.model)
            .input(vec![InputItem::EasyMessage(message)])
            .instructions(request.instructions)
            .temperature(request.temperature)
            .max_output_tokens(self.max_output_tokens);
        if let Some(previous) = request.previous {
            args.previous_response_id(previous.as_str());
        }
        args.build()
            .map_err(|e| GradingError::transport(request.model, e))
    }
}

#[async_trait]
impl ScoringService for ResponsesClient {
    async fn respond(&self, request: ScoringRequest<'_>) -> GradingResult<ScoringReply> {
        debug!(
            "调用评分服务，模型: {}, 内容条数: {}, 续接上下文: {}",
            request.model,
            request.content.len(),
            request.previous.is_some()
        );

        let body = self.build_request(&request)?;
        let response = self.client.responses().create(body).await.map_err(|e| {
            warn!("评分服务调用失败: {}", e);
            GradingError::transport(request.model, e)
        })?;

        debug!("评分服务调用成功: {}", response.id);
        let raw_text = response.output_text().unwrap_or_default();
        Ok(into_reply(response.id, raw_text))
    }
}

/// 兼容服务的地址通常以 `/v1` 结尾，去掉多余的斜杠
fn api_base(url: &str) -> &str {
    url.trim_end_matches('/')
}

fn into_reply(id: String, raw_text: String) -> ScoringReply {
    let parsed = extract_json(&raw_text);
    if parsed.is_none() {
        debug!("回复中未提取到 JSON，长度: {} 字符", raw_text.chars().count());
    }
    ScoringReply {
        raw_text,
        parsed,
        handle: ContextHandle::new(id),
    }
}
