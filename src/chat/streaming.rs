//! 流式聊天解析
//!
//! `stream-chat` 接口返回按换行分隔的 JSON 块，行首可能带 `data: ` 前缀。
//! 不完整的行先缓冲，收到 `close: true` 的块后结束。

use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::pin::Pin;
use tracing::debug;

use crate::error::ChatError;

/// 一个已解码的流式块
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StreamChunk {
    #[serde(rename = "textResponse", default)]
    pub text: Option<String>,
    #[serde(default)]
    pub close: bool,
    #[serde(default)]
    pub error: Option<Value>,
}

impl StreamChunk {
    /// 服务端报告的错误信息（`null`、`false` 与空串都视为无错误）
    pub fn error_message(&self) -> Option<String> {
        match &self.error {
            None | Some(Value::Null) | Some(Value::Bool(false)) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        }
    }
}

/// 按行缓冲的块解码器
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    buffer: Vec<u8>,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加字节，返回本次凑齐的完整块
    pub fn push(&mut self, bytes: &[u8]) -> Vec<StreamChunk> {
        self.buffer.extend_from_slice(bytes);
        let mut chunks = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(chunk) = parse_line(&line) {
                chunks.push(chunk);
            }
        }
        chunks
    }

    /// 字节流结束时处理残留的最后一行
    pub fn finish(&mut self) -> Vec<StreamChunk> {
        let line = std::mem::take(&mut self.buffer);
        parse_line(&line).into_iter().collect()
    }
}

fn parse_line(line: &[u8]) -> Option<StreamChunk> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    let line = line.strip_prefix("data:").map(str::trim_start).unwrap_or(line);
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(chunk) => Some(chunk),
        Err(e) => {
            debug!("跳过无法解析的流式块: {}", e);
            None
        }
    }
}

struct DeltaState<S> {
    bytes: Pin<Box<S>>,
    decoder: ChunkDecoder,
    pending: VecDeque<StreamChunk>,
    exhausted: bool,
    closed: bool,
}

/// 把字节流转换为惰性的文本增量序列
///
/// 遇到 `close` 块、服务端错误或字节流结束时终止。
pub fn text_deltas<S, B, E>(bytes: S) -> impl Stream<Item = Result<String, ChatError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<ChatError> + Send,
{
    let state = DeltaState {
        bytes: Box::pin(bytes),
        decoder: ChunkDecoder::new(),
        pending: VecDeque::new(),
        exhausted: false,
        closed: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(chunk) = st.pending.pop_front() {
                if let Some(message) = chunk.error_message() {
                    st.closed = true;
                    st.pending.clear();
                    return Some((Err(ChatError::Server(message)), st));
                }
                if chunk.close {
                    st.closed = true;
                    st.pending.clear();
                }
                match chunk.text {
                    Some(text) if !text.is_empty() => return Some((Ok(text), st)),
                    _ => continue,
                }
            }
            if st.closed || st.exhausted {
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(bytes)) => {
                    let chunks = st.decoder.push(bytes.as_ref());
                    st.pending.extend(chunks);
                }
                Some(Err(e)) => {
                    st.exhausted = true;
                    return Some((Err(e.into()), st));
                }
                None => {
                    st.exhausted = true;
                    let chunks = st.decoder.finish();
                    st.pending.extend(chunks);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_buffers_partial_lines() {
        let mut decoder = ChunkDecoder::new();
        assert!(decoder.push(br#"{"textResponse":"Hel"#).is_empty());
        let chunks = decoder.push(b"lo\"}\n{\"textResponse\":\" world\"}\n");
        let texts: Vec<_> = chunks.iter().map(|c| c.text.clone().unwrap()).collect();
        assert_eq!(texts, ["Hello", " world"]);
    }

    #[test]
    fn test_decoder_strips_data_prefix_and_skips_garbage() {
        let mut decoder = ChunkDecoder::new();
        let chunks = decoder.push(b"data: {\"textResponse\":\"a\"}\n: keep-alive\n\ndata: {\"close\":true}\n");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text.as_deref(), Some("a"));
        assert!(chunks[1].close);
    }

    #[test]
    fn test_decoder_finish_flushes_last_line() {
        let mut decoder = ChunkDecoder::new();
        assert!(decoder.push(br#"{"textResponse":"tail","close":true}"#).is_empty());
        let chunks = decoder.finish();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].close);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_error_message_variants() {
        let chunk: StreamChunk = serde_json::from_str(r#"{"error":false}"#).unwrap();
        assert_eq!(chunk.error_message(), None);
        let chunk: StreamChunk = serde_json::from_str(r#"{"error":null}"#).unwrap();
        assert_eq!(chunk.error_message(), None);
        let chunk: StreamChunk = serde_json::from_str(r#"{"error":"model offline"}"#).unwrap();
        assert_eq!(chunk.error_message().as_deref(), Some("model offline"));
    }

    fn byte_stream(parts: Vec<&'static str>) -> impl Stream<Item = Result<Vec<u8>, ChatError>> + Send + 'static {
        stream::iter(parts.into_iter().map(|p| Ok(p.as_bytes().to_vec())))
    }

    #[tokio::test]
    async fn test_text_deltas_stop_at_close() {
        let parts = vec![
            "{\"textResponse\":\"CO\"}\n{\"textRes",
            "ponse\":\"2 estimate\"}\n",
            "{\"textResponse\":\"\",\"close\":true}\n",
            "{\"textResponse\":\"ignored\"}\n",
        ];
        let deltas: Vec<String> = text_deltas(byte_stream(parts))
            .map(|d| d.unwrap())
            .collect()
            .await;
        assert_eq!(deltas, ["CO", "2 estimate"]);
    }

    #[tokio::test]
    async fn test_text_deltas_without_close_ends_with_stream() {
        let deltas: Vec<_> = text_deltas(byte_stream(vec!["{\"textResponse\":\"x\"}\n", "{\"textResponse\":\"y\"}"]))
            .collect()
            .await;
        let deltas: Vec<String> = deltas.into_iter().map(|d| d.unwrap()).collect();
        assert_eq!(deltas, ["x", "y"]);
    }

    #[tokio::test]
    async fn test_text_deltas_surface_server_error() {
        let parts = vec!["{\"textResponse\":\"ok\"}\n{\"error\":\"quota exceeded\"}\n{\"textResponse\":\"late\"}\n"];
        let items: Vec<_> = text_deltas(byte_stream(parts)).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "ok");
        assert!(matches!(&items[1], Err(ChatError::Server(msg)) if msg == "quota exceeded"));
    }

    #[tokio::test]
    async fn test_text_deltas_transport_error() {
        let parts: Vec<Result<Vec<u8>, ChatError>> = vec![
            Ok(b"{\"textResponse\":\"a\"}\n".to_vec()),
            Err(ChatError::InvalidResponse("reset".to_string())),
        ];
        let items: Vec<_> = text_deltas(stream::iter(parts)).collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[1].is_err());
    }
}
