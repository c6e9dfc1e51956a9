//! 采集模块
//!
//! 摄像头采集线程 → 同步检测 → 发布给消费者（UI 层）。

pub mod camera;
pub mod core;
pub mod sink;

pub use camera::{Camera, CameraProperty, CameraProvider, CaptureHints, DirectoryCamera};
pub use self::core::{CaptureLoop, CaptureSettings, LoopState};
pub use sink::{CaptureEvent, FrameSink, StreamSink};
