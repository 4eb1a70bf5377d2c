//! Hand-rolled test doubles for the crate's I/O seams.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use futures_util::StreamExt;

use crate::backend::{BackendError, PdfBackend};
use crate::fetch::{HttpResponse, HttpTransport};
use crate::llm::{ChatBackend, ChatRequest, DeltaStream, ModelError};

/// A scripted reply for [`MockTransport`].
#[derive(Clone, Debug)]
#[allow(dead_code)]
pub enum MockReply {
    /// Bodyless response with this status.
    Status(u16),
    Body {
        status: u16,
        body: Vec<u8>,
        /// Post-redirect URL; defaults to the requested URL.
        final_url: Option<String>,
    },
    /// Transport-level failure.
    Network(String),
}

impl MockReply {
    pub fn ok(body: &str) -> Self {
        MockReply::Body {
            status: 200,
            body: body.as_bytes().to_vec(),
            final_url: None,
        }
    }

    #[allow(dead_code)]
    pub fn redirected(final_url: &str, body: &str) -> Self {
        MockReply::Body {
            status: 200,
            body: body.as_bytes().to_vec(),
            final_url: Some(final_url.to_string()),
        }
    }
}

/// [`HttpTransport`] answering from per-URL reply sequences.
///
/// Each call pops the next reply for its URL; the last one repeats once the
/// sequence is exhausted. Unknown URLs answer 404.
#[derive(Default)]
pub struct MockTransport {
    routes: HashMap<String, Mutex<Vec<MockReply>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, url: &str, mut replies: Vec<MockReply>) -> Self {
        assert!(!replies.is_empty(), "route needs at least one reply");
        // Reverse so we can pop() from the front cheaply.
        replies.reverse();
        self.routes.insert(url.to_string(), Mutex::new(replies));
        self
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    fn next_reply(&self, url: &str) -> MockReply {
        *self.calls.lock().unwrap().entry(url.to_string()).or_insert(0) += 1;
        match self.routes.get(url) {
            Some(replies) => {
                let mut replies = replies.lock().unwrap();
                if replies.len() > 1 {
                    replies.pop().unwrap()
                } else {
                    replies[0].clone()
                }
            }
            None => MockReply::Status(404),
        }
    }
}

impl HttpTransport for MockTransport {
    fn get<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, String>> + Send + 'a>> {
        let reply = self.next_reply(url);
        Box::pin(async move {
            match reply {
                MockReply::Status(status) => Ok(HttpResponse {
                    status,
                    final_url: url.to_string(),
                    body: Vec::new(),
                }),
                MockReply::Body {
                    status,
                    body,
                    final_url,
                } => Ok(HttpResponse {
                    status,
                    final_url: final_url.unwrap_or_else(|| url.to_string()),
                    body,
                }),
                MockReply::Network(message) => Err(message),
            }
        })
    }
}

/// A scripted reply for [`MockChat`].
#[derive(Clone, Debug)]
pub enum MockChatReply {
    Text(String),
    Fail(String),
}

type Responder = Box<dyn Fn(&ChatRequest) -> MockChatReply + Send + Sync>;

/// [`ChatBackend`] driven by a responder closure; records every request.
///
/// Streaming splits the reply text after each space so tests can observe
/// delta ordering.
pub struct MockChat {
    responder: Responder,
    requests: Mutex<Vec<ChatRequest>>,
    delay: Option<Duration>,
}

impl MockChat {
    pub fn new(responder: impl Fn(&ChatRequest) -> MockChatReply + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Every reply waits `delay` before resolving.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fixed(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| MockChatReply::Text(text.clone()))
    }

    /// Replies in order, repeating the last one.
    pub fn sequence(mut replies: Vec<MockChatReply>) -> Self {
        assert!(!replies.is_empty(), "sequence needs at least one reply");
        replies.reverse();
        let replies = Mutex::new(replies);
        Self::new(move |_| {
            let mut replies = replies.lock().unwrap();
            if replies.len() > 1 {
                replies.pop().unwrap()
            } else {
                replies[0].clone()
            }
        })
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn answer(&self, request: &ChatRequest) -> MockChatReply {
        self.requests.lock().unwrap().push(request.clone());
        (self.responder)(request)
    }
}

impl ChatBackend for MockChat {
    fn complete<'a>(
        &'a self,
        request: &'a ChatRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, ModelError>> + Send + 'a>> {
        let reply = self.answer(request);
        let delay = self.delay;
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            match reply {
                MockChatReply::Text(text) => Ok(text),
                MockChatReply::Fail(message) => Err(ModelError::Api {
                    status: 500,
                    message,
                }),
            }
        })
    }

    fn stream<'a>(
        &'a self,
        request: &'a ChatRequest,
    ) -> Pin<Box<dyn Future<Output = Result<DeltaStream, ModelError>> + Send + 'a>> {
        let reply = self.answer(request);
        let delay = self.delay;
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            match reply {
                MockChatReply::Text(text) => {
                    let deltas: Vec<Result<String, ModelError>> = text
                        .split_inclusive(' ')
                        .map(|piece| Ok(piece.to_string()))
                        .collect();
                    Ok(futures_util::stream::iter(deltas).boxed())
                }
                MockChatReply::Fail(message) => Err(ModelError::Api {
                    status: 500,
                    message,
                }),
            }
        })
    }
}

/// [`PdfBackend`] returning fixed page texts.
pub struct StubPdf {
    pages: Result<Vec<String>, String>,
}

impl StubPdf {
    pub fn pages(pages: &[&str]) -> Self {
        Self {
            pages: Ok(pages.iter().map(|p| p.to_string()).collect()),
        }
    }

    #[allow(dead_code)]
    pub fn broken(message: &str) -> Self {
        Self {
            pages: Err(message.to_string()),
        }
    }
}

impl PdfBackend for StubPdf {
    fn page_texts(&self, _pdf: &[u8]) -> Result<Vec<String>, BackendError> {
        self.pages
            .clone()
            .map_err(BackendError::OpenError)
    }
}
