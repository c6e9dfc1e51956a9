use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use greenlens::chat::WorkspaceClient;
use greenlens::config::PERSON_CLASS_LABEL;
use greenlens::detect::exclude_class;
use greenlens::{
    AppConfig, CaptureEvent, CaptureLoop, CaptureSettings, DirectoryCamera, Frame, StreamSink,
    YoloDetector, draw_detections, select_generator, sustainability_prompt, top_detection,
};

#[derive(Parser)]
#[command(name = "greenlens")]
#[command(about = "识别镜头前的商品并给出可持续性建议")]
struct Cli {
    /// 配置文件路径
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 对单张图像执行检测
    Detect {
        /// ONNX 模型路径，缺省时使用配置中的 model_path
        #[arg(long)]
        model: Option<PathBuf>,
        #[arg(long)]
        image: PathBuf,
        /// 保存标注后的图像
        #[arg(long)]
        annotate: Option<PathBuf>,
        /// 把置信度最高的商品发送给文本生成后端
        #[arg(long)]
        ask: bool,
    },
    /// 用目录中的图像模拟摄像头运行采集循环
    Watch {
        #[arg(long)]
        model: Option<PathBuf>,
        #[arg(long)]
        frames: PathBuf,
        #[arg(long, default_value = "10")]
        seconds: u64,
    },
    /// 询问某个商品的环境影响
    Ask { product: String },
    /// 列出可用的工作区
    Workspaces,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("无法加载配置 {}", cli.config.display()))?;

    match cli.command {
        Command::Detect { model, image, annotate, ask: ask_backend } => {
            let model = model.unwrap_or_else(|| config.model_path.clone());
            // 模型加载与推理都是阻塞操作
            let best = tokio::task::spawn_blocking(move || run_detect(model, image, annotate)).await??;
            match best {
                Some(product) if ask_backend => ask(&config, &product).await,
                _ => Ok(()),
            }
        }
        Command::Watch { model, frames, seconds } => {
            let model = model.unwrap_or_else(|| config.model_path.clone());
            let camera_index = config.camera_index;
            let duration = Duration::from_secs(seconds);
            tokio::task::spawn_blocking(move || run_watch(camera_index, model, frames, duration)).await??;
            Ok(())
        }
        Command::Ask { product } => ask(&config, &product).await,
        Command::Workspaces => {
            let client = WorkspaceClient::new(&config)?;
            if !client.check_server().await {
                warn!("工作区 {} 不可达", config.workspace_slug);
            }
            let listing = client.list_workspaces().await?;
            println!("{}", serde_json::to_string_pretty(&listing)?);
            Ok(())
        }
    }
}

/// 对单张图像执行检测，返回置信度最高的商品名称
fn run_detect(model: PathBuf, image: PathBuf, annotate: Option<PathBuf>) -> anyhow::Result<Option<String>> {
    let mut detector = YoloDetector::load(&model)?;
    let frame = Frame::open(&image).with_context(|| format!("无法读取图像 {}", image.display()))?;

    let start = Instant::now();
    let detections = detector.detect(&frame)?;
    info!("检测完成，用时 {:?}，共 {} 个目标", start.elapsed(), detections.len());

    if let Some(path) = annotate {
        draw_detections(&frame, &detections)
            .save(&path)
            .with_context(|| format!("无法保存标注图像 {}", path.display()))?;
        info!("标注图像已保存到 {}", path.display());
    }

    let products = exclude_class(detections, PERSON_CLASS_LABEL);
    for d in &products {
        println!(
            "{:<16} {:.2}  ({}, {}, {}, {})",
            d.class_name, d.confidence, d.bbox.x1, d.bbox.y1, d.bbox.x2, d.bbox.y2
        );
    }

    let Some(best) = top_detection(&products) else {
        println!("未检测到商品");
        return Ok(None);
    };
    println!("置信度最高: {} ({:.2})", best.class_name, best.confidence);
    Ok(Some(best.class_name.clone()))
}

/// 运行采集循环 `duration` 时长，返回收到的帧数
fn run_watch(camera_index: u32, model: PathBuf, frames: PathBuf, duration: Duration) -> anyhow::Result<u64> {
    let detector = YoloDetector::load_or_disabled(&model);
    if !detector.is_enabled() {
        warn!("检测器已禁用，只发布原始帧");
    }

    let sink = StreamSink::default();
    let stream = sink.stream();
    let settings = CaptureSettings {
        camera_index,
        ..CaptureSettings::default()
    };
    let mut capture = CaptureLoop::new(
        Arc::new(DirectoryCamera::new(frames)),
        Arc::new(Mutex::new(detector)),
        Arc::new(sink),
    )
    .with_settings(settings);
    capture.start()?;

    let mut seen = 0u64;
    let deadline = Instant::now() + duration;
    loop {
        thread::sleep(Duration::from_millis(200).min(duration));
        let events = stream.lock().drain();
        for event in events {
            match event {
                CaptureEvent::Frame { sequence, detections, .. } => {
                    seen += 1;
                    match top_detection(&detections) {
                        Some(best) => info!("#{} {} ({:.2})", sequence, best.class_name, best.confidence),
                        None => info!("#{} 未检测到商品", sequence),
                    }
                }
                CaptureEvent::Fault(e) => warn!("{}", e),
            }
        }
        if Instant::now() >= deadline {
            break;
        }
    }

    capture.stop();
    let dropped = stream.lock().dropped();
    if dropped > 0 {
        info!("消费过慢，丢弃了 {} 个事件", dropped);
    }
    Ok(seen)
}

async fn ask(config: &AppConfig, product: &str) -> anyhow::Result<()> {
    if product.trim().is_empty() {
        bail!("商品名称不能为空");
    }
    let generator = select_generator(config)?;
    if !generator.is_available().await {
        warn!("{} 后端不可达，请确认模型服务已启动", generator.name());
    }
    let reply = generator
        .generate(&sustainability_prompt(product))
        .await
        .with_context(|| format!("{} 后端请求失败", generator.name()))?;
    println!("{}", reply);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_watch_replays_directory_without_model() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::from_pixel(8, 6, Rgb([10, 20, 30])).save(dir.path().join("0001.png")).unwrap();

        let seen = run_watch(
            0,
            dir.path().join("missing.onnx"),
            dir.path().to_path_buf(),
            Duration::from_millis(300),
        )
        .unwrap();
        assert!(seen > 0);
    }

    #[test]
    fn test_watch_reports_unavailable_camera() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_watch(0, dir.path().join("missing.onnx"), dir.path().to_path_buf(), Duration::ZERO)
            .unwrap_err();
        assert!(err.downcast_ref::<greenlens::CaptureError>().is_some());
    }

    #[tokio::test]
    async fn test_detect_runs_off_the_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("missing.onnx");
        let image = dir.path().join("missing.png");
        let result = tokio::task::spawn_blocking(move || run_detect(model, image, None)).await.unwrap();
        let err = result.unwrap_err();
        assert!(err.downcast_ref::<greenlens::DetectError>().is_some());
    }
}
