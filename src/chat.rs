//! 文本生成模块
//!
//! 检测到商品后，把可持续性提示词发送给文本生成后端：
//!
//! - [`WorkspaceClient`]：工作区聊天服务，支持阻塞与流式两种接口
//! - [`OllamaClient`]：本地 Ollama 服务
//!
//! 后端在启动时由 [`select_generator`] 根据配置选择一次。

pub mod client;
pub mod ollama;
pub mod streaming;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use tracing::info;

use crate::config::{AppConfig, Backend};
use crate::error::ChatError;

pub use client::{WorkspaceClient, parse_chat_reply};
pub use ollama::OllamaClient;
pub use streaming::{ChunkDecoder, StreamChunk, text_deltas};

/// 文本生成能力
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    /// 后端是否可达，默认认为可达
    async fn is_available(&self) -> bool {
        true
    }

    async fn generate(&self, prompt: &str) -> Result<String, ChatError>;
}

#[async_trait]
impl TextGenerator for WorkspaceClient {
    fn name(&self) -> &'static str {
        "workspace"
    }

    async fn is_available(&self) -> bool {
        self.check_server().await
    }

    async fn generate(&self, prompt: &str) -> Result<String, ChatError> {
        if self.is_streaming() {
            self.stream_chat(prompt).try_collect::<Vec<_>>().await.map(|parts| parts.concat())
        } else {
            self.blocking_chat(prompt).await
        }
    }
}

#[async_trait]
impl TextGenerator for OllamaClient {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn generate(&self, prompt: &str) -> Result<String, ChatError> {
        OllamaClient::generate(self, prompt).await
    }
}

/// 根据配置选择文本生成后端
pub fn select_generator(config: &AppConfig) -> Result<Box<dyn TextGenerator>, ChatError> {
    let generator: Box<dyn TextGenerator> = match config.backend {
        Backend::Workspace => Box::new(WorkspaceClient::new(config)?),
        Backend::Ollama => Box::new(OllamaClient::from_config(config)),
    };
    info!("文本生成后端: {}", generator.name());
    Ok(generator)
}

/// 构造商品的环境影响分析提示词
pub fn sustainability_prompt(product: &str) -> String {
    format!(
        "Analyze this product for environmental impact: {}\n\
         \n\
         Provide:\n\
         1. CO₂ estimate (kg CO₂e per serving)\n\
         2. Two sustainable alternatives with brief explanations\n\
         3. One encouraging message\n\
         \n\
         Keep response concise and practical.",
        product.trim()
    )
}
