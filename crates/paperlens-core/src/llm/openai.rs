//! OpenAI-compatible `/chat/completions` backend, one-shot and SSE streaming.

use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures_util::{Stream, StreamExt, stream};
use serde_json::{Value, json};

use super::{ChatBackend, ChatRequest, DeltaStream, ModelError};
use crate::Config;
use crate::text_utils::truncate_chars;

pub struct OpenAiCompatible {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl OpenAiCompatible {
    /// Fails with [`ModelError::MissingApiKey`] when no non-blank key is given.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        let api_key = api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(ModelError::MissingApiKey)?;
        // `read_timeout` bounds each gap between body chunks, not the whole stream
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .read_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            timeout,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ModelError> {
        Self::new(
            config.base_url.clone(),
            config.api_key.clone(),
            config.model_timeout(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn body(request: &ChatRequest, stream: bool) -> Value {
        json!({
            "model": request.model,
            "temperature": request.temperature,
            "messages": request.messages,
            "stream": stream,
        })
    }
}

impl ChatBackend for OpenAiCompatible {
    fn complete<'a>(
        &'a self,
        request: &'a ChatRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, ModelError>> + Send + 'a>> {
        Box::pin(async move {
            let resp = self
                .client
                .post(self.endpoint())
                .bearer_auth(&self.api_key)
                .timeout(self.timeout)
                .json(&Self::body(request, false))
                .send()
                .await?;
            let resp = check_response_status(resp).await?;
            let json: Value = resp.json().await?;
            parse_completion(&json)
        })
    }

    fn stream<'a>(
        &'a self,
        request: &'a ChatRequest,
    ) -> Pin<Box<dyn Future<Output = Result<DeltaStream, ModelError>> + Send + 'a>> {
        Box::pin(async move {
            let send = self
                .client
                .post(self.endpoint())
                .bearer_auth(&self.api_key)
                .json(&Self::body(request, true))
                .send();
            let resp = tokio::time::timeout(self.timeout, send)
                .await
                .map_err(|_| ModelError::Timeout(self.timeout))??;
            let resp = check_response_status(resp).await?;
            Ok(decode_delta_stream(resp.bytes_stream()))
        })
    }
}

/// Pass successful responses through; turn error statuses into [`ModelError::Api`].
async fn check_response_status(resp: reqwest::Response) -> Result<reqwest::Response, ModelError> {
    let status = resp.status().as_u16();
    if status < 400 {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|body| {
            body["error"]["message"]
                .as_str()
                .or_else(|| body["message"].as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            let raw = truncate_chars(text.trim(), 300);
            if raw.is_empty() {
                "unknown API error".to_string()
            } else {
                raw.to_string()
            }
        });
    Err(ModelError::Api { status, message })
}

/// `choices[0].message.content`, with a null content read as empty.
pub fn parse_completion(json: &Value) -> Result<String, ModelError> {
    let choice = &json["choices"][0];
    if choice.is_null() {
        return Err(ModelError::Malformed("response has no choices".to_string()));
    }
    Ok(choice["message"]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseItem {
    Delta(String),
    Done,
    Error(String),
}

/// Splits a chat-completions SSE byte stream into [`SseItem`]s.
///
/// Buffers raw bytes rather than text so a multi-byte character split across
/// network chunks decodes intact.
#[derive(Debug, Default)]
pub struct SseLineDecoder {
    buffer: Vec<u8>,
}

impl SseLineDecoder {
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseItem> {
        self.buffer.extend_from_slice(bytes);
        let mut items = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            items.extend(parse_line(&line));
        }
        items
    }

    /// Flush a trailing line that had no newline.
    pub fn finish(&mut self) -> Vec<SseItem> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&rest).into_iter().collect()
    }
}

fn parse_line(line: &[u8]) -> Option<SseItem> {
    let line = String::from_utf8_lossy(line);
    // Non-data lines (event:, id:, comments) carry nothing for us
    let data = line.trim().strip_prefix("data:")?.trim();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(SseItem::Done);
    }
    match serde_json::from_str::<Value>(data) {
        Ok(json) => {
            if let Some(message) = json["error"]["message"].as_str() {
                return Some(SseItem::Error(message.to_string()));
            }
            let delta = json["choices"][0]["delta"]["content"]
                .as_str()
                .unwrap_or_default();
            Some(SseItem::Delta(delta.to_string()))
        }
        Err(e) => Some(SseItem::Error(format!(
            "failed to parse stream chunk: {e} (data: {})",
            truncate_chars(data, 200)
        ))),
    }
}

struct DecodeState<S> {
    inner: Pin<Box<S>>,
    decoder: SseLineDecoder,
    pending: VecDeque<SseItem>,
    finished: bool,
}

/// Adapt a raw SSE byte stream into non-empty text deltas.
///
/// Ends at `[DONE]` or end of input. An error item or transport error is
/// yielded once and terminates the stream.
pub fn decode_delta_stream<S, B, E>(bytes: S) -> DeltaStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = DecodeState {
        inner: Box::pin(bytes),
        decoder: SseLineDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };
    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                match item {
                    SseItem::Delta(text) if text.is_empty() => continue,
                    SseItem::Delta(text) => return Some((Ok(text), st)),
                    SseItem::Done => return None,
                    SseItem::Error(message) => {
                        st.pending.clear();
                        st.finished = true;
                        return Some((Err(ModelError::Stream(message)), st));
                    }
                }
            }
            if st.finished {
                return None;
            }
            match st.inner.next().await {
                Some(Ok(chunk)) => {
                    let items = st.decoder.feed(chunk.as_ref());
                    st.pending.extend(items);
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(ModelError::Stream(e.to_string())), st));
                }
                None => {
                    st.finished = true;
                    let items = st.decoder.finish();
                    st.pending.extend(items);
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sse(lines: &[&str]) -> Vec<Result<Vec<u8>, String>> {
        lines
            .iter()
            .map(|line| Ok(format!("{line}\n").into_bytes()))
            .collect()
    }

    async fn collect(stream: DeltaStream) -> Vec<Result<String, String>> {
        stream
            .map(|item| item.map_err(|e| e.to_string()))
            .collect()
            .await
    }

    // ── one-shot ──────────────────────────────────────────────────────

    #[test]
    fn completion_content_extracted() {
        let json = json!({"choices": [{"message": {"content": "# Report"}}]});
        assert_eq!(parse_completion(&json).unwrap(), "# Report");

        let null_content = json!({"choices": [{"message": {"content": null}}]});
        assert_eq!(parse_completion(&null_content).unwrap(), "");

        let err = parse_completion(&json!({"error": "x"})).unwrap_err();
        assert!(matches!(err, ModelError::Malformed(_)));
    }

    #[test]
    fn blank_key_rejected() {
        let err = OpenAiCompatible::new("https://x/v1", Some("  ".into()), Duration::from_secs(1));
        assert!(matches!(err, Err(ModelError::MissingApiKey)));
        let ok = OpenAiCompatible::new("https://x/v1/", Some("k".into()), Duration::from_secs(1))
            .unwrap();
        assert_eq!(ok.endpoint(), "https://x/v1/chat/completions");
    }

    #[test]
    fn request_body_shape() {
        let request = ChatRequest {
            model: "qwen-plus-latest".into(),
            temperature: 0.5,
            messages: vec![crate::llm::ChatMessage::user("hi")],
        };
        let body = OpenAiCompatible::body(&request, true);
        assert_eq!(body["model"], "qwen-plus-latest");
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hi");
    }

    // ── streaming ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn deltas_in_order_until_done() {
        let bytes = sse(&[
            r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#,
            "",
            r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#,
            "",
            r#"data: {"choices":[{"delta":{"content":" world"}}]}"#,
            "",
            "data: [DONE]",
            r#"data: {"choices":[{"delta":{"content":"ignored"}}]}"#,
        ]);
        let out = collect(decode_delta_stream(stream::iter(bytes))).await;
        assert_eq!(out, vec![Ok("Hello".to_string()), Ok(" world".to_string())]);
    }

    #[tokio::test]
    async fn lines_split_across_chunks() {
        let payload = "data: {\"choices\":[{\"delta\":{\"content\":\"héllo\"}}]}\n\n";
        let bytes = payload.as_bytes();
        // split inside the two-byte 'é'
        let cut = payload.find('é').unwrap() + 1;
        let parts: Vec<Result<Vec<u8>, String>> =
            vec![Ok(bytes[..cut].to_vec()), Ok(bytes[cut..].to_vec())];
        let out = collect(decode_delta_stream(stream::iter(parts))).await;
        assert_eq!(out, vec![Ok("héllo".to_string())]);
    }

    #[tokio::test]
    async fn trailing_line_without_newline_is_flushed() {
        let parts: Vec<Result<Vec<u8>, String>> =
            vec![Ok(br#"data: {"choices":[{"delta":{"content":"end"}}]}"#.to_vec())];
        let out = collect(decode_delta_stream(stream::iter(parts))).await;
        assert_eq!(out, vec![Ok("end".to_string())]);
    }

    #[tokio::test]
    async fn provider_error_terminates_stream() {
        let bytes = sse(&[
            r#"data: {"choices":[{"delta":{"content":"partial"}}]}"#,
            r#"data: {"error":{"message":"rate limited"}}"#,
            r#"data: {"choices":[{"delta":{"content":"never"}}]}"#,
        ]);
        let out = collect(decode_delta_stream(stream::iter(bytes))).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], Ok("partial".to_string()));
        assert!(out[1].as_ref().unwrap_err().contains("rate limited"));
    }

    #[tokio::test]
    async fn transport_error_terminates_stream() {
        let parts: Vec<Result<Vec<u8>, String>> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n".to_vec()),
            Err("connection reset".to_string()),
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n".to_vec()),
        ];
        let out = collect(decode_delta_stream(stream::iter(parts))).await;
        assert_eq!(out.len(), 2);
        assert!(out[1].as_ref().unwrap_err().contains("connection reset"));
    }

    // ── bounded waits ─────────────────────────────────────────────────

    /// Accepts connections and answers with `reply`, then holds the socket open.
    async fn stalling_server(reply: Option<String>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((mut socket, _)) = listener.accept().await {
                if let Some(reply) = &reply {
                    let mut buf = [0u8; 8192];
                    let _ = socket.read(&mut buf).await;
                    let _ = socket.write_all(reply.as_bytes()).await;
                }
                held.push(socket);
            }
        });
        format!("http://{addr}/v1")
    }

    fn request() -> ChatRequest {
        ChatRequest {
            model: "m".into(),
            temperature: 0.1,
            messages: vec![crate::llm::ChatMessage::user("hi")],
        }
    }

    #[tokio::test]
    async fn stream_open_times_out_when_server_is_silent() {
        let base = stalling_server(None).await;
        let backend =
            OpenAiCompatible::new(base, Some("k".into()), Duration::from_millis(300)).unwrap();
        let request = request();

        let result = tokio::time::timeout(Duration::from_secs(5), backend.stream(&request))
            .await
            .expect("stream open should be bounded");
        // Either the header wait or the per-read bound fires first
        let err = result.err().unwrap();
        assert!(matches!(err, ModelError::Timeout(_) | ModelError::Http(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn stalled_stream_body_ends_with_error() {
        let event = "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\n";
        let reply = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\n\
             transfer-encoding: chunked\r\n\r\n{:x}\r\n{event}\r\n",
            event.len()
        );
        let base = stalling_server(Some(reply)).await;
        let backend =
            OpenAiCompatible::new(base, Some("k".into()), Duration::from_millis(300)).unwrap();
        let request = request();

        let stream = backend.stream(&request).await.unwrap();
        let out = tokio::time::timeout(Duration::from_secs(5), collect(stream))
            .await
            .expect("body reads should be bounded");
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], Ok("hi".to_string()));
        assert!(out[1].is_err());
    }

    #[test]
    fn decoder_ignores_non_data_lines() {
        let mut decoder = SseLineDecoder::default();
        let items = decoder.feed(b": keep-alive\nevent: message\ndata: [DONE]\n");
        assert_eq!(items, vec![SseItem::Done]);
        assert!(decoder.finish().is_empty());
    }
}
