use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::AppConfig;
use crate::error::ChatError;

const OLLAMA_TIMEOUT: Duration = Duration::from_secs(120);
pub const EMPTY_REPLY: &str = "(No response)";

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateReply {
    #[serde(default)]
    response: Option<String>,
}

/// 本地 Ollama 生成接口客户端
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: Client,
    url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            url: url.into(),
            model: model.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.ollama_url.clone(), config.ollama_model.clone())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn generate(&self, prompt: &str) -> Result<String, ChatError> {
        debug!("POST {} (model {})", self.url, self.model);
        let response = self
            .http
            .post(&self.url)
            .timeout(OLLAMA_TIMEOUT)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
            })
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;
        parse_generate_reply(&body)
    }
}

/// 取出 `response` 字段并去掉首尾空白，空回复替换为占位文本
pub fn parse_generate_reply(body: &str) -> Result<String, ChatError> {
    let reply: GenerateReply = serde_json::from_str(body)?;
    let text = reply.response.unwrap_or_default();
    let text = text.trim();
    if text.is_empty() {
        Ok(EMPTY_REPLY.to_string())
    } else {
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_generate_reply() {
        assert_eq!(
            parse_generate_reply(r#"{"model":"llama2","response":"  Reuse the jar.\n"}"#).unwrap(),
            "Reuse the jar."
        );
        assert_eq!(parse_generate_reply(r#"{"response":"   "}"#).unwrap(), EMPTY_REPLY);
        assert_eq!(parse_generate_reply(r#"{"done":true}"#).unwrap(), EMPTY_REPLY);
        assert!(parse_generate_reply("not json").is_err());
    }

    #[test]
    fn test_request_body() {
        let body = GenerateRequest {
            model: "llama2:7b-chat",
            prompt: "hi",
            stream: false,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"model": "llama2:7b-chat", "prompt": "hi", "stream": false})
        );
    }

    #[test]
    fn test_from_config() {
        let client = OllamaClient::from_config(&AppConfig::default());
        assert_eq!(client.model(), "llama2:7b-chat");
    }
}
