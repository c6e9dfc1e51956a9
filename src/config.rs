//! 配置模块
//!
//! 编译期常量（模型输入、采集参数、类别表）以及从 `config.yaml` 读取的运行配置。

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ConfigError;

pub const STREAM_CAPACITY: usize = 16;
pub const PERSON_CLASS_LABEL: &str = "person";

// 目标检测超参数配置
pub const DEFAULT_INPUT_WIDTH: u32 = 640;
pub const DEFAULT_INPUT_HEIGHT: u32 = 640;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

// 摄像头采集参数（仅作为提示，设备可以忽略）
pub const CAPTURE_WIDTH: u32 = 640;
pub const CAPTURE_HEIGHT: u32 = 480;
pub const CAPTURE_FPS: u32 = 30;
pub const CAPTURE_BUFFER_SIZE: u32 = 1;

pub const DEFAULT_MODEL_PATH: &str = "models/yolov8_det_w8a8.onnx";
pub const DEFAULT_BASE_URL: &str = "http://localhost:3001/api/v1";
pub const DEFAULT_WORKSPACE_SLUG: &str = "greenlens";
pub const DEFAULT_SESSION_ID: &str = "eco-copilot-session";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434/api/generate";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama2:7b-chat";

/// COCO 类别表（80 类，按索引访问）
pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat",
    "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack",
    "umbrella", "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball",
    "kite", "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket",
    "bottle", "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple",
    "sandwich", "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair",
    "couch", "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator",
    "book", "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// 文本生成后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// 工作区聊天服务（AnythingLLM 风格的 REST API）
    #[default]
    #[serde(alias = "npu")]
    Workspace,
    /// 本地 Ollama 服务
    Ollama,
}

impl Backend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "workspace" | "npu" => Some(Self::Workspace),
            "ollama" => Some(Self::Ollama),
            _ => None,
        }
    }
}

/// 运行配置
///
/// 字段名与 `config.yaml` 中的键保持一致，缺省的键使用默认值。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_key: String,
    pub model_server_base_url: String,
    pub workspace_slug: String,
    /// 是否使用 `stream-chat` 接口
    pub stream: bool,
    /// 流式请求超时（秒）
    pub stream_timeout: u64,
    /// 阻塞式请求超时（秒）
    pub request_timeout: u64,
    pub backend: Backend,
    pub ollama_url: String,
    pub ollama_model: String,
    pub model_path: PathBuf,
    pub camera_index: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model_server_base_url: DEFAULT_BASE_URL.to_string(),
            workspace_slug: DEFAULT_WORKSPACE_SLUG.to_string(),
            stream: false,
            stream_timeout: 30,
            request_timeout: 15,
            backend: Backend::Workspace,
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            ollama_model: DEFAULT_OLLAMA_MODEL.to_string(),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            camera_index: 0,
        }
    }
}

impl AppConfig {
    /// 从 YAML 文件加载配置，并应用环境变量覆盖
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml_str(&text)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        debug!("已加载配置文件 {}", path.display());
        Ok(config)
    }

    /// 文件不存在时退回默认配置
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }
        warn!("配置文件 {} 不存在，使用默认配置", path.display());
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// 应用 `GL_BACKEND` / `OLLAMA_URL` / `OLLAMA_MODEL` 覆盖
    ///
    /// `lookup` 返回变量值，便于测试时不修改进程环境。
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("GL_BACKEND") {
            match Backend::parse(&value) {
                Some(backend) => self.backend = backend,
                None => warn!("忽略未知的 GL_BACKEND 取值: {}", value),
            }
        }
        if let Some(url) = lookup("OLLAMA_URL") {
            self.ollama_url = url;
        }
        if let Some(model) = lookup("OLLAMA_MODEL") {
            self.ollama_model = model;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url_ok = |url: &str| url.starts_with("http://") || url.starts_with("https://");

        if !url_ok(&self.model_server_base_url) {
            return Err(ConfigError::Invalid(format!(
                "model_server_base_url 必须以 http:// 或 https:// 开头: {}",
                self.model_server_base_url
            )));
        }
        if self.backend == Backend::Ollama && !url_ok(&self.ollama_url) {
            return Err(ConfigError::Invalid(format!(
                "ollama_url 必须以 http:// 或 https:// 开头: {}",
                self.ollama_url
            )));
        }
        if self.workspace_slug.trim().is_empty() {
            return Err(ConfigError::Invalid("workspace_slug 不能为空".to_string()));
        }
        if self.stream_timeout == 0 || self.request_timeout == 0 {
            return Err(ConfigError::Invalid("超时时间必须大于 0".to_string()));
        }
        if self.camera_index > 100 {
            return Err(ConfigError::Invalid("camera_index 过大 (最大 100)".to_string()));
        }
        Ok(())
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}
