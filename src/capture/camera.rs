//! 摄像头接缝
//!
//! `CameraProvider` 负责按索引打开设备，`Camera` 负责设置采集提示、读帧与释放。
//! 具体设备实现在 crate 之外；这里提供一个用目录中的图像文件模拟摄像头的实现。

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::{CAPTURE_BUFFER_SIZE, CAPTURE_FPS, CAPTURE_HEIGHT, CAPTURE_WIDTH};
use crate::error::CaptureError;
use crate::frame::Frame;

/// 可设置的采集属性
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraProperty {
    FrameWidth(u32),
    FrameHeight(u32),
    Fps(u32),
    /// 设备内部缓冲的帧数，越小越不容易读到过期帧
    BufferSize(u32),
}

/// 打开设备后请求的采集参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureHints {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub buffer_size: u32,
}

impl Default for CaptureHints {
    fn default() -> Self {
        Self {
            width: CAPTURE_WIDTH,
            height: CAPTURE_HEIGHT,
            fps: CAPTURE_FPS,
            buffer_size: CAPTURE_BUFFER_SIZE,
        }
    }
}

impl CaptureHints {
    pub fn properties(&self) -> [CameraProperty; 4] {
        [
            CameraProperty::FrameWidth(self.width),
            CameraProperty::FrameHeight(self.height),
            CameraProperty::Fps(self.fps),
            CameraProperty::BufferSize(self.buffer_size),
        ]
    }
}

/// 已打开的摄像头
///
/// 只在采集线程中使用。`release` 消费句柄，释放后无法再读帧。
pub trait Camera: Send {
    /// 尽力设置属性，设备忽略时返回 false
    fn set(&mut self, property: CameraProperty) -> bool;

    /// 阻塞读取一帧，失败时返回 `None`
    fn read(&mut self) -> Option<Frame>;

    fn release(self: Box<Self>);
}

/// 按索引打开摄像头
pub trait CameraProvider: Send + Sync {
    fn open(&self, index: u32) -> Result<Box<dyn Camera>, CaptureError>;
}

/// 依次应用采集提示，被拒绝的提示只记录日志
pub fn apply_hints(camera: &mut dyn Camera, hints: &CaptureHints) {
    for property in hints.properties() {
        if !camera.set(property) {
            debug!("摄像头忽略了采集参数 {:?}", property);
        }
    }
}

/// 用目录中的图像文件模拟的摄像头
///
/// 只有索引 0 可用；文件按名称排序后循环播放。
pub struct DirectoryCamera {
    dir: PathBuf,
}

impl DirectoryCamera {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn list_frames(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut frames: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg" | "bmp"))
                    .unwrap_or(false)
            })
            .collect();
        frames.sort();
        Ok(frames)
    }
}

impl CameraProvider for DirectoryCamera {
    fn open(&self, index: u32) -> Result<Box<dyn Camera>, CaptureError> {
        let unavailable = |reason: String| CaptureError::CameraUnavailable { index, reason };

        if index != 0 {
            return Err(unavailable("目录摄像头只提供索引 0".to_string()));
        }
        let frames = Self::list_frames(&self.dir)
            .map_err(|e| unavailable(format!("{}: {}", self.dir.display(), e)))?;
        if frames.is_empty() {
            return Err(unavailable(format!("{} 中没有图像文件", self.dir.display())));
        }

        info!("目录摄像头已打开: {} ({} 帧)", self.dir.display(), frames.len());
        Ok(Box::new(DirectoryFeed { frames, cursor: 0 }))
    }
}

struct DirectoryFeed {
    frames: Vec<PathBuf>,
    cursor: usize,
}

impl Camera for DirectoryFeed {
    fn set(&mut self, property: CameraProperty) -> bool {
        // 文件帧的分辨率固定
        matches!(property, CameraProperty::Fps(_) | CameraProperty::BufferSize(_))
    }

    fn read(&mut self) -> Option<Frame> {
        let path = &self.frames[self.cursor];
        self.cursor = (self.cursor + 1) % self.frames.len();
        match Frame::open(path) {
            Ok(frame) => Some(frame),
            Err(e) => {
                debug!("无法解码 {}: {}", path.display(), e);
                None
            }
        }
    }

    fn release(self: Box<Self>) {
        debug!("目录摄像头已释放");
    }
}
