//! 后处理模块
//!
//! 负责把模型输出的候选框转换为原图坐标下的检测结果：置信度过滤、
//! 按轴线性缩放、裁剪到图像范围、剔除退化框、解析类别名称。
//!
//! 这里不做排序，也不做非极大值抑制(NMS)：输出顺序与模型候选顺序一致，
//! 重叠框全部保留。

use crate::detect::bounds::{BoundingBox, Detection};
use crate::detect::infer::RawOutput;

/// 图像缩放信息
///
/// `o_*` 为原始帧尺寸，`s_*` 为模型输入尺寸。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleMessage {
    pub o_width: u32,
    pub o_height: u32,
    pub s_width: u32,
    pub s_height: u32,
}

impl ScaleMessage {
    fn scale_x(&self) -> f32 {
        self.o_width as f32 / self.s_width as f32
    }

    fn scale_y(&self) -> f32 {
        self.o_height as f32 / self.s_height as f32
    }
}

/// 解析类别名称，超出类别表时回退为 `class_<id>`
pub fn class_label(class_names: &[&str], class_id: i64) -> String {
    usize::try_from(class_id)
        .ok()
        .and_then(|idx| class_names.get(idx))
        .map(|name| name.to_string())
        .unwrap_or_else(|| format!("class_{class_id}"))
}

/// 先截断取整再裁剪到 [0, max]
fn clamp_coord(value: f32, max: u32) -> u32 {
    (value as i64).clamp(0, max as i64) as u32
}

/// 处理模型输出
///
/// # 参数
/// * `output` - 模型原始输出
/// * `message` - 原始帧与模型输入的尺寸
/// * `confidence_threshold` - 置信度阈值，低于该值（或非有限值）的候选被丢弃
/// * `class_names` - 类别表
///
/// # 返回值
/// 按模型候选顺序排列的检测结果
pub fn process_detections(
    output: &RawOutput,
    message: &ScaleMessage,
    confidence_threshold: f32,
    class_names: &[&str],
) -> Vec<Detection> {
    let (scale_x, scale_y) = (message.scale_x(), message.scale_y());
    let mut detections = Vec::new();

    for (i, row) in output.boxes().rows().into_iter().enumerate() {
        let confidence = output.scores()[i];
        if confidence.is_nan() || confidence < confidence_threshold {
            continue;
        }

        let bbox = BoundingBox {
            x1: clamp_coord(row[0] * scale_x, message.o_width),
            y1: clamp_coord(row[1] * scale_y, message.o_height),
            x2: clamp_coord(row[2] * scale_x, message.o_width),
            y2: clamp_coord(row[3] * scale_y, message.o_height),
        };
        if !bbox.is_valid() {
            continue;
        }

        let class_id = output.class_ids()[i];
        detections.push(Detection {
            bbox,
            confidence,
            class_id,
            class_name: class_label(class_names, class_id),
        });
    }

    detections
}
