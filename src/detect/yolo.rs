use std::path::Path;
use std::time::Instant;
use tracing::{debug, error};

use crate::config::{COCO_CLASSES, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_INPUT_HEIGHT, DEFAULT_INPUT_WIDTH};
use crate::detect::bounds::Detection;
use crate::detect::infer::{InferenceBackend, OrtBackend};
use crate::detect::posts::{ScaleMessage, process_detections};
use crate::detect::prevs::preprocess;
use crate::error::DetectError;
use crate::frame::Frame;

/// 检测器配置，构造后不可修改
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    /// 模型输入宽度
    pub input_width: u32,
    /// 模型输入高度
    pub input_height: u32,
    /// 置信度阈值，低于此值的检测结果将被过滤
    pub confidence_threshold: f32,
    /// 类别表
    pub class_names: &'static [&'static str],
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            input_width: DEFAULT_INPUT_WIDTH,
            input_height: DEFAULT_INPUT_HEIGHT,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            class_names: &COCO_CLASSES,
        }
    }
}

/// YOLO目标检测器
///
/// 封装了完整的检测流程，包括图像预处理、模型推理和结果后处理。
/// 模型加载失败的检测器处于禁用状态，`detect` 永远返回空列表。
///
/// # 示例
///
/// ```no_run
/// use greenlens::{Frame, YoloDetector};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut detector = YoloDetector::load("models/yolov8_det_w8a8.onnx")?;
/// let frame = Frame::open("data/bottle.jpg")?;
/// let detections = detector.detect(&frame)?;
/// # Ok(())
/// # }
/// ```
pub struct YoloDetector {
    backend: Option<Box<dyn InferenceBackend>>,
    config: DetectorConfig,
    load_error: Option<String>,
}

impl YoloDetector {
    /// 加载 ONNX 模型，失败时返回 `DetectError::ModelLoad`
    pub fn load(model_path: impl AsRef<Path>) -> Result<Self, DetectError> {
        let backend = OrtBackend::load(model_path)?;
        Ok(Self::with_backend(Box::new(backend)))
    }

    /// 加载 ONNX 模型，失败时记录一次错误并返回禁用的检测器
    ///
    /// 失败原因可以通过 [`YoloDetector::load_error`] 取得。
    pub fn load_or_disabled(model_path: impl AsRef<Path>) -> Self {
        match Self::load(model_path) {
            Ok(detector) => detector,
            Err(e) => {
                error!("{}，检测器已禁用", e);
                Self {
                    backend: None,
                    config: DetectorConfig::default(),
                    load_error: Some(e.to_string()),
                }
            }
        }
    }

    /// 使用任意推理后端创建检测器
    pub fn with_backend(backend: Box<dyn InferenceBackend>) -> Self {
        Self {
            backend: Some(backend),
            config: DetectorConfig::default(),
            load_error: None,
        }
    }

    pub fn with_config(mut self, config: DetectorConfig) -> Self {
        self.config = config;
        self
    }

    /// 设置置信度阈值
    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.config.confidence_threshold = threshold;
        self
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    /// 完整的检测流程：从帧到检测结果
    ///
    /// 结果按模型候选顺序排列，不做 NMS。推理运行时出错时返回
    /// `DetectError::Inference`。
    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectError> {
        let Some(backend) = self.backend.as_mut() else {
            return Ok(Vec::new());
        };

        let config = &self.config;
        let input_tensor = preprocess(frame, config.input_width, config.input_height);

        // 为模型推理添加计时
        let start_time = Instant::now();
        let output = backend.run(&input_tensor)?;
        debug!("{} 推理耗时: {:?}, 候选数 {}", backend.name(), start_time.elapsed(), output.len());

        let message = ScaleMessage {
            o_width: frame.width(),
            o_height: frame.height(),
            s_width: config.input_width,
            s_height: config.input_height,
        };
        Ok(process_detections(
            &output,
            &message,
            config.confidence_threshold,
            config.class_names,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::infer::RawOutput;
    use crate::frame::ChannelOrder;
    use ndarray::Array4;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct FixedBackend {
        output: RawOutput,
        seen_shape: Arc<Mutex<Vec<usize>>>,
    }

    impl FixedBackend {
        fn boxed(output: RawOutput) -> Box<Self> {
            Box::new(Self { output, seen_shape: Arc::default() })
        }
    }

    impl InferenceBackend for FixedBackend {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn run(&mut self, input: &Array4<f32>) -> Result<RawOutput, DetectError> {
            *self.seen_shape.lock() = input.shape().to_vec();
            Ok(self.output.clone())
        }
    }

    struct FailingBackend;

    impl InferenceBackend for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn run(&mut self, _input: &Array4<f32>) -> Result<RawOutput, DetectError> {
            Err(DetectError::Inference("device lost".to_string()))
        }
    }

    fn frame(width: u32, height: u32) -> Frame {
        Frame::from_raw(width, height, ChannelOrder::Bgr, vec![128; (width * height * 3) as usize]).unwrap()
    }

    #[test]
    fn test_missing_model_disables_detector() {
        let mut detector = YoloDetector::load_or_disabled("models/definitely-missing.onnx");
        assert!(!detector.is_enabled());
        assert!(detector.load_error().unwrap().contains("definitely-missing.onnx"));
        assert!(detector.detect(&frame(8, 8)).unwrap().is_empty());
        assert!(detector.detect(&frame(8, 8)).unwrap().is_empty());
    }

    #[test]
    fn test_strict_load_fails() {
        assert!(matches!(
            YoloDetector::load("models/definitely-missing.onnx"),
            Err(DetectError::ModelLoad { .. })
        ));
    }

    #[test]
    fn test_detect_rescales_to_frame() {
        let output = RawOutput::from_flat(vec![100.0, 100.0, 200.0, 200.0], vec![0.88], vec![39]).unwrap();
        let mut detector = YoloDetector::with_backend(FixedBackend::boxed(output));
        let detections = detector.detect(&frame(1280, 960)).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(
            (detections[0].bbox.x1, detections[0].bbox.y1, detections[0].bbox.x2, detections[0].bbox.y2),
            (200, 150, 400, 300)
        );
        assert_eq!(detections[0].class_name, "bottle");
    }

    #[test]
    fn test_input_tensor_shape() {
        let output = RawOutput::from_flat(Vec::new(), Vec::new(), Vec::new()).unwrap();
        let backend = FixedBackend::boxed(output);
        let seen_shape = Arc::clone(&backend.seen_shape);
        let mut detector = YoloDetector::with_backend(backend);
        detector.detect(&frame(64, 48)).unwrap();
        assert_eq!(*seen_shape.lock(), [1, 3, 640, 640]);
    }

    #[test]
    fn test_inference_error_propagates() {
        let mut detector = YoloDetector::with_backend(Box::new(FailingBackend));
        assert!(matches!(detector.detect(&frame(8, 8)), Err(DetectError::Inference(_))));
    }

    #[test]
    fn test_custom_threshold() {
        let output = RawOutput::from_flat(vec![0.0, 0.0, 320.0, 320.0], vec![0.4], vec![41]).unwrap();
        let mut detector = YoloDetector::with_backend(FixedBackend::boxed(output))
            .with_confidence_threshold(0.3);
        assert_eq!(detector.detect(&frame(64, 64)).unwrap()[0].class_name, "cup");
    }
}
