//! 检测模块 - 基于 YOLO 的目标检测
//!
//! 该模块提供一整套目标检测功能，包括：
//! - 模型加载
//! - 图像预处理
//! - 模型推理
//! - 结果后处理
//! - 可视化绘制
//!
//! # 工作流程
//!
//! 1. 使用 `YoloDetector::load` 或 `YoloDetector::load_or_disabled` 加载 ONNX 模型
//! 2. 从摄像头或图像文件取得 `Frame`
//! 3. 调用 `detect` 执行检测
//! 4. 使用 `draw_detections` 绘制检测结果
//!
//! # 示例
//!
//! ```no_run
//! use greenlens::{Frame, YoloDetector, draw_detections, top_detection};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut detector = YoloDetector::load_or_disabled("models/yolov8_det_w8a8.onnx");
//! let frame = Frame::open("data/bottle.jpg")?;
//!
//! let detections = detector.detect(&frame)?;
//! if let Some(best) = top_detection(&detections) {
//!     println!("{} ({:.2})", best.class_name, best.confidence);
//! }
//! let annotated = draw_detections(&frame, &detections);
//! annotated.save("annotated.png")?;
//! # Ok(())
//! # }
//! ```

pub mod bounds;
pub mod draw;
pub mod infer;
pub mod model;
pub mod posts;
pub mod prevs;
pub mod yolo;

// 重新导出常用类型和函数
pub use bounds::{BoundingBox, Detection, exclude_class, top_detection};
pub use draw::draw_detections;
pub use infer::{InferenceBackend, OrtBackend, RawOutput};
pub use model::load_model;
pub use yolo::{DetectorConfig, YoloDetector};
