use image::RgbImage;
use std::fmt;
use std::path::Path;

/// 像素字节的通道顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    /// 摄像头原生顺序
    Bgr,
    Rgb,
}

/// 一帧采集图像
///
/// 紧凑排列的 8 位三通道像素，行优先。帧只在一次采集迭代内有效，
/// 发布给消费者时按值移交。
#[derive(Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    order: ChannelOrder,
    data: Vec<u8>,
}

impl Frame {
    /// 由原始像素创建帧
    ///
    /// 尺寸为 0 或数据长度不等于 `width * height * 3` 时返回 `None`。
    pub fn from_raw(width: u32, height: u32, order: ChannelOrder, data: Vec<u8>) -> Option<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(3)?;
        if expected == 0 || data.len() != expected {
            return None;
        }
        Some(Self { width, height, order, data })
    }

    pub fn from_rgb_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            order: ChannelOrder::Rgb,
            data: image.into_raw(),
        }
    }

    /// 从图像文件解码
    pub fn open(path: impl AsRef<Path>) -> Result<Self, image::ImageError> {
        let image = image::open(path)?.into_rgb8();
        Ok(Self::from_rgb_image(image))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn order(&self) -> ChannelOrder {
        self.order
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// 转换为 RGB 图像（必要时交换 B/R 通道）
    pub fn to_rgb_image(&self) -> RgbImage {
        let mut data = self.data.clone();
        if self.order == ChannelOrder::Bgr {
            for pixel in data.chunks_exact_mut(3) {
                pixel.swap(0, 2);
            }
        }
        // 长度在构造时已校验
        RgbImage::from_raw(self.width, self.height, data).unwrap_or_default()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}
