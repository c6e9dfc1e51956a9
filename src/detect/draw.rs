use image::{ImageBuffer, Rgba, RgbaImage};
use raqote::{DrawOptions, DrawTarget, LineJoin, PathBuilder, SolidSource, Source, StrokeStyle};

use crate::config::PERSON_CLASS_LABEL;
use crate::detect::bounds::Detection;
use crate::frame::Frame;

/// 在帧上绘制检测结果
///
/// person 类别使用青色，其他类别使用绿色。
///
/// # 返回值
/// 返回绘制了检测框的 RGBA 图像
pub fn draw_detections(frame: &Frame, detections: &[Detection]) -> RgbaImage {
    let (img_width, img_height) = (frame.width(), frame.height());
    let mut dt = DrawTarget::new(img_width as i32, img_height as i32);

    // 将原始图像绘制到DrawTarget上
    let rgb_image = frame.to_rgb_image();
    let image_data: Vec<u32> = rgb_image
        .pixels()
        .map(|pixel| {
            let [r, g, b] = pixel.0;
            u32::from_le_bytes([b, g, r, 0xFF])
        })
        .collect();

    let img = raqote::Image {
        width: img_width as i32,
        height: img_height as i32,
        data: &image_data,
    };
    dt.draw_image_at(0.0, 0.0, &img, &DrawOptions::new());

    for detection in detections {
        let bbox = &detection.bbox;

        let mut pb = PathBuilder::new();
        pb.rect(bbox.x1 as f32, bbox.y1 as f32, bbox.width() as f32, bbox.height() as f32);
        let path = pb.finish();

        let color = if detection.class_name == PERSON_CLASS_LABEL {
            SolidSource { r: 0x00, g: 0xFF, b: 0xFF, a: 0xFF }
        } else {
            SolidSource { r: 0x4C, g: 0xAF, b: 0x50, a: 0xFF }
        };

        dt.stroke(
            &path,
            &Source::Solid(color),
            &StrokeStyle {
                join: LineJoin::Round,
                width: 2.0,
                ..StrokeStyle::default()
            },
            &DrawOptions::default(),
        );
    }

    // 将DrawTarget转换回图像（ARGB 预乘，alpha 恒为 0xFF）
    let data = dt.get_data();
    ImageBuffer::from_fn(img_width, img_height, |x, y| {
        let bytes = data[(y * img_width + x) as usize].to_le_bytes();
        Rgba([bytes[2], bytes[1], bytes[0], bytes[3]])
    })
}
