use ort::session::{Session, builder::GraphOptimizationLevel};
use std::path::Path;
use tracing::info;

use crate::error::DetectError;

/// 加载 ONNX 检测模型
///
/// 应用 Level3 图优化和 4 个算子内线程。文件不存在、图损坏或与运行时不兼容时
/// 返回 `DetectError::ModelLoad`。
///
/// # 示例
///
/// ```no_run
/// use greenlens::detect::model::load_model;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let session = load_model("models/yolov8_det_w8a8.onnx")?;
/// # Ok(())
/// # }
/// ```
pub fn load_model(model_path: impl AsRef<Path>) -> Result<Session, DetectError> {
    let path = model_path.as_ref();
    let fail = |reason: String| DetectError::ModelLoad {
        path: path.to_path_buf(),
        reason,
    };

    if !path.exists() {
        return Err(fail("文件不存在".to_string()));
    }

    let build = || -> Result<Session, ort::Error> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(path)?;
        Ok(session)
    };
    let session = build().map_err(|e| fail(e.to_string()))?;

    info!("已加载 ONNX 模型: {}", path.display());
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_reports_path() {
        match load_model("models/not-here.onnx") {
            Err(DetectError::ModelLoad { path, reason }) => {
                assert_eq!(path, Path::new("models/not-here.onnx"));
                assert_eq!(reason, "文件不存在");
            }
            other => panic!("Expected ModelLoad error, got {:?}", other.map(|_| ())),
        }
    }
}
