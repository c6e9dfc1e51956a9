pub mod capture;
pub mod chat;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod utils;

// 重新导出常用类型和函数
pub use capture::{CaptureEvent, CaptureLoop, CaptureSettings, DirectoryCamera, FrameSink, LoopState, StreamSink};
pub use chat::{OllamaClient, TextGenerator, WorkspaceClient, select_generator, sustainability_prompt};
pub use config::AppConfig;
pub use detect::{BoundingBox, Detection, YoloDetector, draw_detections, top_detection};
pub use error::{CaptureError, ChatError, ConfigError, DetectError};
pub use frame::{ChannelOrder, Frame};
