use parking_lot::Mutex;
use std::sync::Arc;

use crate::detect::Detection;
use crate::error::CaptureError;
use crate::frame::Frame;
use crate::utils::stream::Stream;

/// 采集线程发布给消费者的事件
#[derive(Debug)]
pub enum CaptureEvent {
    /// 一帧图像及其（已过滤的）检测结果，两者总是对应同一帧
    Frame {
        sequence: u64,
        frame: Frame,
        detections: Vec<Detection>,
    },
    /// 单次迭代失败的被动通知，循环继续运行
    Fault(CaptureError),
}

/// 事件消费者（UI 层）
///
/// `publish` 在采集线程上调用，不应长时间阻塞。
pub trait FrameSink: Send + Sync {
    fn publish(&self, event: CaptureEvent);
}

impl<F> FrameSink for F
where
    F: Fn(CaptureEvent) + Send + Sync,
{
    fn publish(&self, event: CaptureEvent) {
        self(event)
    }
}

/// 写入共享环形流的消费者，满时覆盖最旧的事件
#[derive(Clone)]
pub struct StreamSink {
    stream: Arc<Mutex<Stream<CaptureEvent>>>,
}

impl StreamSink {
    pub fn new(stream: Arc<Mutex<Stream<CaptureEvent>>>) -> Self {
        Self { stream }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(Arc::new(Mutex::new(Stream::with_capacity(capacity))))
    }

    pub fn stream(&self) -> Arc<Mutex<Stream<CaptureEvent>>> {
        Arc::clone(&self.stream)
    }
}

impl Default for StreamSink {
    fn default() -> Self {
        Self::new(Arc::new(Mutex::new(Stream::new())))
    }
}

impl FrameSink for StreamSink {
    fn publish(&self, event: CaptureEvent) {
        self.stream.lock().write(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_sink_keeps_latest() {
        let sink = StreamSink::with_capacity(2);
        for consecutive in 1..=3 {
            sink.publish(CaptureEvent::Fault(CaptureError::FrameRead { consecutive }));
        }
        let stream = sink.stream();
        let mut stream = stream.lock();
        assert_eq!(stream.dropped(), 1);
        match stream.read_latest() {
            Some(CaptureEvent::Fault(CaptureError::FrameRead { consecutive })) => assert_eq!(consecutive, 3),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_closure_sink() {
        let seen = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&seen);
        let sink = move |_event: CaptureEvent| *counter.lock() += 1;
        sink.publish(CaptureEvent::Fault(CaptureError::AlreadyRunning));
        assert_eq!(*seen.lock(), 1);
    }
}
