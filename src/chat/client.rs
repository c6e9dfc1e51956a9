use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use crate::chat::streaming::{StreamChunk, text_deltas};
use crate::config::{AppConfig, DEFAULT_SESSION_ID};
use crate::error::ChatError;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);
const BODY_PREVIEW_CHARS: usize = 500;

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    mode: &'static str,
    #[serde(rename = "sessionId")]
    session_id: &'a str,
    attachments: Vec<Value>,
}

/// 工作区聊天客户端
///
/// `stream` 决定 [`chat_url`](Self::chat_url) 指向 `chat` 还是 `stream-chat`。
#[derive(Debug, Clone)]
pub struct WorkspaceClient {
    http: Client,
    base_url: String,
    workspace_slug: String,
    api_key: String,
    session_id: String,
    stream: bool,
    request_timeout: Duration,
    stream_timeout: Duration,
}

impl WorkspaceClient {
    pub fn new(config: &AppConfig) -> Result<Self, ChatError> {
        if config.api_key.trim().is_empty() {
            return Err(ChatError::Config("api_key 未配置".to_string()));
        }
        Ok(Self {
            http: Client::new(),
            base_url: config.model_server_base_url.trim_end_matches('/').to_string(),
            workspace_slug: config.workspace_slug.clone(),
            api_key: config.api_key.clone(),
            session_id: DEFAULT_SESSION_ID.to_string(),
            stream: config.stream,
            request_timeout: config.request_timeout(),
            stream_timeout: config.stream_timeout(),
        })
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn is_streaming(&self) -> bool {
        self.stream
    }

    fn endpoint(&self, streaming: bool) -> String {
        let action = if streaming { "stream-chat" } else { "chat" };
        format!("{}/workspace/{}/{}", self.base_url, self.workspace_slug, action)
    }

    pub fn chat_url(&self) -> String {
        self.endpoint(self.stream)
    }

    fn get(&self, url: String) -> RequestBuilder {
        self.http
            .get(url)
            .header(ACCEPT, "application/json")
            .bearer_auth(&self.api_key)
    }

    fn chat_request(&self, streaming: bool, message: &str) -> RequestBuilder {
        let timeout = if streaming { self.stream_timeout } else { self.request_timeout };
        let body = ChatRequest {
            message,
            mode: "chat",
            session_id: &self.session_id,
            attachments: Vec::new(),
        };
        // json() 同时设置 Content-Type
        self.http
            .post(self.endpoint(streaming))
            .header(ACCEPT, "application/json")
            .bearer_auth(&self.api_key)
            .timeout(timeout)
            .json(&body)
    }

    /// 检查工作区是否可访问
    pub async fn check_server(&self) -> bool {
        let url = format!("{}/workspace/{}", self.base_url, self.workspace_slug);
        match self.get(url).timeout(CHECK_TIMEOUT).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("模型服务不可达: {}", e);
                false
            }
        }
    }

    /// 列出可用的工作区，用于查找 `workspace_slug`
    pub async fn list_workspaces(&self) -> Result<Value, ChatError> {
        let url = format!("{}/workspaces", self.base_url);
        let response = self.get(url).timeout(self.request_timeout).send().await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }

    /// 阻塞式对话，返回完整回复
    pub async fn blocking_chat(&self, message: &str) -> Result<String, ChatError> {
        debug!("POST {}", self.endpoint(false));
        let response = self.chat_request(false, message).send().await?;
        let response = ensure_success(response).await?;
        let body = response.text().await?;
        parse_chat_reply(&body)
    }

    /// 流式对话，返回惰性的文本增量流
    ///
    /// 请求在第一次轮询时才发出；再次调用会发起新的请求。
    pub fn stream_chat(&self, message: &str) -> BoxStream<'static, Result<String, ChatError>> {
        let request = self.chat_request(true, message);
        let connect = async move {
            let response = ensure_success(request.send().await?).await?;
            info!("流式回复已开始");
            Ok::<_, ChatError>(text_deltas(response.bytes_stream()))
        };
        stream::once(connect).try_flatten().boxed()
    }
}

async fn ensure_success(response: Response) -> Result<Response, ChatError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ChatError::Status {
        status: status.as_u16(),
        body: preview(&body),
    })
}

fn preview(body: &str) -> String {
    body.chars().take(BODY_PREVIEW_CHARS).collect()
}

/// 解析 `chat` 接口的响应体
pub fn parse_chat_reply(body: &str) -> Result<String, ChatError> {
    let reply: StreamChunk = serde_json::from_str(body)?;
    if let Some(text) = reply.text {
        return Ok(text);
    }
    match reply.error_message() {
        Some(message) => Err(ChatError::Server(message)),
        None => Err(ChatError::InvalidResponse(preview(body))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(stream: bool) -> AppConfig {
        AppConfig {
            api_key: "secret".to_string(),
            model_server_base_url: "http://localhost:3001/api/v1/".to_string(),
            workspace_slug: "greenlens".to_string(),
            stream,
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_chat_url_follows_stream_flag() {
        let client = WorkspaceClient::new(&config(false)).unwrap();
        assert_eq!(client.chat_url(), "http://localhost:3001/api/v1/workspace/greenlens/chat");
        let client = WorkspaceClient::new(&config(true)).unwrap();
        assert_eq!(client.chat_url(), "http://localhost:3001/api/v1/workspace/greenlens/stream-chat");
        assert!(client.is_streaming());
    }

    #[test]
    fn test_missing_api_key() {
        let mut cfg = config(false);
        cfg.api_key = "  ".to_string();
        assert!(matches!(WorkspaceClient::new(&cfg), Err(ChatError::Config(_))));
    }

    #[test]
    fn test_request_body_shape() {
        let body = ChatRequest {
            message: "hi",
            mode: "chat",
            session_id: DEFAULT_SESSION_ID,
            attachments: Vec::new(),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "message": "hi",
                "mode": "chat",
                "sessionId": "eco-copilot-session",
                "attachments": []
            })
        );
    }

    #[test]
    fn test_parse_chat_reply() {
        assert_eq!(parse_chat_reply(r#"{"textResponse":"2.1 kg"}"#).unwrap(), "2.1 kg");
        assert!(matches!(
            parse_chat_reply(r#"{"textResponse":null,"error":"no model"}"#),
            Err(ChatError::Server(msg)) if msg == "no model"
        ));
        assert!(matches!(parse_chat_reply(r#"{"id":"x"}"#), Err(ChatError::InvalidResponse(_))));
        assert!(matches!(parse_chat_reply("<html>"), Err(ChatError::Json(_))));
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let body = "碳".repeat(600);
        assert_eq!(preview(&body).chars().count(), BODY_PREVIEW_CHARS);
    }

    #[tokio::test]
    async fn test_check_server_unreachable() {
        let mut cfg = config(false);
        cfg.model_server_base_url = "http://127.0.0.1:1/api/v1".to_string();
        let client = WorkspaceClient::new(&cfg).unwrap();
        assert!(!client.check_server().await);
    }
}
