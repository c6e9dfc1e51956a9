//! 错误类型

use std::path::PathBuf;
use thiserror::Error;

/// 检测器错误
#[derive(Error, Debug)]
pub enum DetectError {
    /// 模型加载失败，检测器进入禁用状态
    #[error("无法加载模型 {path}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },

    /// 单次推理失败，调用方决定跳过该帧或终止采集
    #[error("推理失败: {0}")]
    Inference(String),

    #[error("预处理失败: {0}")]
    Preprocess(String),
}

/// 采集循环错误
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("摄像头 {index} 无法打开: {reason}")]
    CameraUnavailable { index: u32, reason: String },

    /// 读帧失败，循环继续运行
    #[error("读取帧失败 (连续 {consecutive} 次)")]
    FrameRead { consecutive: u32 },

    #[error(transparent)]
    Inference(#[from] DetectError),

    #[error("采集循环已在运行")]
    AlreadyRunning,

    #[error("无法启动采集线程: {0}")]
    Spawn(#[from] std::io::Error),
}

/// 文本生成（聊天服务）错误
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("聊天配置无效: {0}")]
    Config(String),

    #[error("HTTP 请求失败: {0}")]
    Http(#[from] reqwest::Error),

    #[error("服务器返回状态码 {status}: {body}")]
    Status { status: u16, body: String },

    #[error("模型服务错误: {0}")]
    Server(String),

    #[error("无法解析的响应: {0}")]
    InvalidResponse(String),

    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),
}

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("读取配置失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("配置格式错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("配置无效: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_load_message_names_path() {
        let err = DetectError::ModelLoad {
            path: PathBuf::from("models/missing.onnx"),
            reason: "文件不存在".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("models/missing.onnx"));
        assert!(message.contains("文件不存在"));
    }

    #[test]
    fn test_inference_error_into_capture_error() {
        let err: CaptureError = DetectError::Inference("boom".to_string()).into();
        match err {
            CaptureError::Inference(DetectError::Inference(msg)) => assert_eq!(msg, "boom"),
            other => panic!("Expected Inference error, got {other:?}"),
        }
    }

    #[test]
    fn test_camera_unavailable_display() {
        let err = CaptureError::CameraUnavailable {
            index: 0,
            reason: "busy".to_string(),
        };
        assert!(err.to_string().contains("摄像头 0"));
    }

    #[test]
    fn test_spawn_error_from_io() {
        let err: CaptureError = std::io::Error::new(std::io::ErrorKind::WouldBlock, "no threads").into();
        assert!(matches!(err, CaptureError::Spawn(_)));
        assert!(err.to_string().contains("no threads"));
    }

    #[test]
    fn test_json_error_from_serde() {
        let err: ChatError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(matches!(err, ChatError::Json(_)));
    }
}
