/// 边界框结构
///
/// 原图像素坐标系下的矩形，由后处理保证 `x1 < x2`、`y1 < y2` 且不超出图像范围。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoundingBox {
    /// 左上角x坐标
    pub x1: u32,
    /// 左上角y坐标
    pub y1: u32,
    /// 右下角x坐标
    pub x2: u32,
    /// 右下角y坐标
    pub y2: u32,
}

impl BoundingBox {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// 检查边界框是否有效（宽度和高度都大于0）
    pub fn is_valid(&self) -> bool {
        self.x2 > self.x1 && self.y2 > self.y1
    }
}

/// 检测结果结构
///
/// 每帧重新生成，生成后不再修改，只会被过滤。
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// 目标的边界框
    pub bbox: BoundingBox,
    /// 置信度
    pub confidence: f32,
    /// 类别ID（模型原始输出，可能超出类别表）
    pub class_id: i64,
    /// 类别名称
    pub class_name: String,
}

impl Detection {
    pub fn new(bbox: BoundingBox, confidence: f32, class_id: i64, class_name: String) -> Self {
        Self { bbox, confidence, class_id, class_name }
    }
}

/// 去掉指定类别的检测结果，保持原有顺序
pub fn exclude_class(detections: Vec<Detection>, class_name: &str) -> Vec<Detection> {
    detections
        .into_iter()
        .filter(|d| d.class_name != class_name)
        .collect()
}

/// 选出置信度最高的检测结果
///
/// 后处理不做 NMS，需要“最佳目标”的调用方用它自行挑选。
pub fn top_detection(detections: &[Detection]) -> Option<&Detection> {
    detections
        .iter()
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
}
