use image::{RgbImage, imageops::{self, FilterType}};
use ndarray::{Array3, Array4, Axis};

use crate::frame::Frame;

/// 调整图像大小以适应模型输入
///
/// 直接拉伸到目标尺寸，不保持宽高比（与训练时的预处理一致），使用双线性插值。
///
/// # 参数
/// * `frame` - 原始帧（任意通道顺序）
/// * `width` - 目标宽度
/// * `height` - 目标高度
///
/// # 返回值
/// 返回调整大小后的 RGB 图像
pub fn resize_frame(frame: &Frame, width: u32, height: u32) -> RgbImage {
    imageops::resize(&frame.to_rgb_image(), width, height, FilterType::Triangle)
}

/// 将图像转换为模型输入张量
///
/// 1. 归一化像素值到[0, 1]范围
/// 2. 调整维度顺序为NCHW格式
///
/// # 返回值
/// 返回形状为(1, 3, height, width)的四维张量，通道顺序为RGB
pub fn image_to_tensor(img: &RgbImage) -> Array4<f32> {
    let (width, height) = img.dimensions();
    let hwc: Vec<f32> = img.as_raw().iter().map(|v| *v as f32 / 255.0).collect();
    match Array3::from_shape_vec((height as usize, width as usize, 3), hwc) {
        // HWC → CHW 后按标准布局重排，推理时直接取连续内存
        Ok(hwc) => hwc
            .permuted_axes([2, 0, 1])
            .insert_axis(Axis(0))
            .as_standard_layout()
            .into_owned(),
        Err(_) => Array4::zeros((1, 3, height as usize, width as usize)),
    }
}

/// 完整预处理：缩放、转 RGB、归一化、HWC → CHW、增加批次维度
pub fn preprocess(frame: &Frame, input_width: u32, input_height: u32) -> Array4<f32> {
    let resized = resize_frame(frame, input_width, input_height);
    image_to_tensor(&resized)
}
