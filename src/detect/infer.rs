//! 推理模块
//!
//! `InferenceBackend` 是推理运行时的接缝：输入一个预处理好的张量，
//! 返回三组等长的原始输出（框、置信度、类别）。默认实现基于 ONNX Runtime。

use ndarray::{Array2, Array4};
use ort::{inputs, session::Session, value::Tensor};
use std::path::Path;

use crate::detect::model::load_model;
use crate::error::DetectError;

/// 模型一次调用的原始输出
///
/// 三个数组等长（N 个候选）；`boxes` 形状为 (N, 4)，坐标位于模型输入空间，
/// 顺序为 [x1, y1, x2, y2]。
#[derive(Debug, Clone, PartialEq)]
pub struct RawOutput {
    boxes: Array2<f32>,
    scores: Vec<f32>,
    class_ids: Vec<i64>,
}

impl RawOutput {
    pub fn new(boxes: Array2<f32>, scores: Vec<f32>, class_ids: Vec<i64>) -> Result<Self, DetectError> {
        if boxes.ncols() != 4 {
            return Err(DetectError::Inference(format!(
                "边界框每行应有 4 个值，实际为 {}",
                boxes.ncols()
            )));
        }
        if boxes.nrows() != scores.len() || scores.len() != class_ids.len() {
            return Err(DetectError::Inference(format!(
                "输出长度不一致: boxes={} scores={} class_ids={}",
                boxes.nrows(),
                scores.len(),
                class_ids.len()
            )));
        }
        Ok(Self { boxes, scores, class_ids })
    }

    /// 由扁平的 `[x1, y1, x2, y2, ...]` 数据构建
    pub fn from_flat(boxes: Vec<f32>, scores: Vec<f32>, class_ids: Vec<i64>) -> Result<Self, DetectError> {
        let rows = scores.len();
        if boxes.len() != rows * 4 {
            return Err(DetectError::Inference(format!(
                "边界框数据长度 {} 与候选数 {} 不匹配",
                boxes.len(),
                rows
            )));
        }
        let boxes = Array2::from_shape_vec((rows, 4), boxes)
            .map_err(|e| DetectError::Inference(e.to_string()))?;
        Self::new(boxes, scores, class_ids)
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn boxes(&self) -> &Array2<f32> {
        &self.boxes
    }

    pub fn scores(&self) -> &[f32] {
        &self.scores
    }

    pub fn class_ids(&self) -> &[i64] {
        &self.class_ids
    }
}

/// 推理运行时
///
/// 同一实例不保证可重入，只在单个线程中顺序调用。
pub trait InferenceBackend: Send {
    /// 后端名称
    fn name(&self) -> &'static str;

    /// 对形状为 (1, 3, H, W) 的张量执行一次推理
    fn run(&mut self, input: &Array4<f32>) -> Result<RawOutput, DetectError>;
}

/// ONNX Runtime 后端
pub struct OrtBackend {
    session: Session,
    input_name: String,
}

impl OrtBackend {
    pub fn load(model_path: impl AsRef<Path>) -> Result<Self, DetectError> {
        let path = model_path.as_ref();
        let session = load_model(path)?;
        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| DetectError::ModelLoad {
                path: path.to_path_buf(),
                reason: "模型没有输入节点".to_string(),
            })?;
        Ok(Self { session, input_name })
    }
}

impl InferenceBackend for OrtBackend {
    fn name(&self) -> &'static str {
        "onnxruntime"
    }

    fn run(&mut self, input: &Array4<f32>) -> Result<RawOutput, DetectError> {
        run_inference(&mut self.session, &self.input_name, input)
    }
}

/// 运行模型推理
///
/// 模型需要有三个输出：boxes `[1, N, 4]`、scores `[1, N]`、class ids `[1, N]`。
/// 类别输出可以是 int64 也可以是 float32。
pub fn run_inference(
    model: &mut Session,
    input_name: &str,
    input: &Array4<f32>,
) -> Result<RawOutput, DetectError> {
    let err = |e: ort::Error| DetectError::Inference(e.to_string());

    let shape: Vec<usize> = input.shape().to_vec();
    // 按逻辑顺序取数据，与内存布局无关
    let data: Vec<f32> = input.iter().copied().collect();
    let input_tensor = Tensor::from_array(([shape[0], shape[1], shape[2], shape[3]], data)).map_err(err)?;
    let outputs = model.run(inputs![input_name => input_tensor]).map_err(err)?;

    if outputs.len() < 3 {
        return Err(DetectError::Inference(format!(
            "模型应有 3 个输出，实际为 {}",
            outputs.len()
        )));
    }

    let boxes = outputs[0].try_extract_tensor::<f32>().map_err(err)?.1.to_vec();
    let scores = outputs[1].try_extract_tensor::<f32>().map_err(err)?.1.to_vec();
    let class_ids = match outputs[2].try_extract_tensor::<i64>() {
        Ok((_, ids)) => ids.to_vec(),
        Err(_) => outputs[2]
            .try_extract_tensor::<f32>()
            .map_err(err)?
            .1
            .iter()
            .map(|id| *id as i64)
            .collect(),
    };

    RawOutput::from_flat(boxes, scores, class_ids)
}
