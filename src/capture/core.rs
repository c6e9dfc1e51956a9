use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::capture::camera::{Camera, CameraProvider, CaptureHints, apply_hints};
use crate::capture::sink::{CaptureEvent, FrameSink};
use crate::config::{CAPTURE_FPS, PERSON_CLASS_LABEL};
use crate::detect::{YoloDetector, exclude_class};
use crate::error::{CaptureError, DetectError};
use crate::frame::Frame;

/// 采集循环状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
}

/// 采集循环参数
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// 摄像头索引
    pub camera_index: u32,
    /// 打开设备后请求的采集参数
    pub hints: CaptureHints,
    /// 每次迭代的时间预算
    pub frame_interval: Duration,
    /// 发布前剔除的类别
    pub excluded_class: String,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            camera_index: 0,
            hints: CaptureHints::default(),
            frame_interval: Duration::from_secs(1) / CAPTURE_FPS,
            excluded_class: PERSON_CLASS_LABEL.to_string(),
        }
    }
}

/// 摄像头采集循环
///
/// 在后台线程中以固定节奏读帧、同步检测、剔除 person 类别后发布给消费者。
/// 状态只有 Idle 和 Running 两种：
///
/// - 运行中再次 `start` 返回 `CaptureError::AlreadyRunning`
/// - 空闲时 `stop` 什么也不做
/// - 单帧读取或推理失败（包括推理后端 panic）只作为 `CaptureEvent::Fault` 发布，循环不会停止
/// - 采集线程因其他原因退出时状态回到 Idle，摄像头仍会被释放
pub struct CaptureLoop {
    provider: Arc<dyn CameraProvider>,
    detector: Arc<Mutex<YoloDetector>>,
    sink: Arc<dyn FrameSink>,
    settings: CaptureSettings,
    running: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl CaptureLoop {
    /// 推荐由外部传入检测器，便于多次启停之间复用已加载的模型
    pub fn new(
        provider: Arc<dyn CameraProvider>,
        detector: Arc<Mutex<YoloDetector>>,
        sink: Arc<dyn FrameSink>,
    ) -> Self {
        Self {
            provider,
            detector,
            sink,
            settings: CaptureSettings::default(),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub fn with_settings(mut self, settings: CaptureSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    pub fn state(&self) -> LoopState {
        match &self.worker {
            Some(handle) if !handle.is_finished() => LoopState::Running,
            _ => LoopState::Idle,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == LoopState::Running
    }

    /// 打开摄像头并启动采集线程
    ///
    /// 摄像头无法打开时返回 `CaptureError::CameraUnavailable`，状态保持 Idle。
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.is_running() {
            return Err(CaptureError::AlreadyRunning);
        }
        // 回收意外退出的旧线程
        self.stop();

        let index = self.settings.camera_index;
        let mut camera = self.provider.open(index)?;
        apply_hints(camera.as_mut(), &self.settings.hints);
        info!("摄像头 {} 已打开", index);

        self.running.store(true, Ordering::Release);
        let worker = Worker {
            camera: CameraGuard(Some(camera)),
            detector: Arc::clone(&self.detector),
            sink: Arc::clone(&self.sink),
            running: Arc::clone(&self.running),
            frame_interval: self.settings.frame_interval,
            excluded_class: self.settings.excluded_class.clone(),
        };

        let spawned = thread::Builder::new()
            .name("greenlens-capture".to_string())
            .spawn(move || worker.run());
        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                info!("采集循环已启动");
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                Err(CaptureError::Spawn(e))
            }
        }
    }

    /// 停止采集线程，等待当前迭代结束并释放摄像头
    pub fn stop(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };
        self.running.store(false, Ordering::Release);
        if handle.join().is_err() {
            error!("采集线程异常退出");
        }
        info!("采集循环已停止");
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

/// 持有摄像头句柄，析构时释放（线程 panic 展开时也会执行）
struct CameraGuard(Option<Box<dyn Camera>>);

impl CameraGuard {
    fn read(&mut self) -> Option<Frame> {
        self.0.as_mut().and_then(|camera| camera.read())
    }
}

impl Drop for CameraGuard {
    fn drop(&mut self) {
        if let Some(camera) = self.0.take() {
            camera.release();
            debug!("摄像头已释放");
        }
    }
}

/// 采集线程私有数据，摄像头句柄只在这里被访问
struct Worker {
    camera: CameraGuard,
    detector: Arc<Mutex<YoloDetector>>,
    sink: Arc<dyn FrameSink>,
    running: Arc<AtomicBool>,
    frame_interval: Duration,
    excluded_class: String,
}

impl Worker {
    fn run(mut self) {
        let mut sequence = 0u64;
        let mut consecutive_failures = 0u32;

        while self.running.load(Ordering::Acquire) {
            let started = Instant::now();
            self.step(&mut sequence, &mut consecutive_failures);

            // 只睡剩余的时间预算
            if let Some(residual) = self.frame_interval.checked_sub(started.elapsed()) {
                thread::sleep(residual);
            }
        }

        debug!("采集线程退出，共发布 {} 帧", sequence);
    }

    fn step(&mut self, sequence: &mut u64, consecutive_failures: &mut u32) {
        let Some(frame) = self.camera.read() else {
            *consecutive_failures += 1;
            if *consecutive_failures == 1 {
                warn!("读取帧失败，下个周期重试");
            }
            self.sink.publish(CaptureEvent::Fault(CaptureError::FrameRead {
                consecutive: *consecutive_failures,
            }));
            return;
        };
        if *consecutive_failures > 0 {
            debug!("连续 {} 次读帧失败后恢复", consecutive_failures);
            *consecutive_failures = 0;
        }

        let detector = &self.detector;
        let result = panic::catch_unwind(AssertUnwindSafe(|| detector.lock().detect(&frame)))
            .unwrap_or_else(|payload| Err(DetectError::Inference(panic_message(&*payload))));
        match result {
            Ok(detections) => {
                let detections = exclude_class(detections, &self.excluded_class);
                self.sink.publish(CaptureEvent::Frame {
                    sequence: *sequence,
                    frame,
                    detections,
                });
                *sequence += 1;
            }
            Err(e) => {
                warn!("跳过该帧: {}", e);
                self.sink.publish(CaptureEvent::Fault(CaptureError::Inference(e)));
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "未知原因".to_string());
    format!("检测器 panic: {}", detail)
}
