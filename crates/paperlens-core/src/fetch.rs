//! Retried HTTP retrieval of paper renderings.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use thiserror::Error;

use crate::Config;
use crate::retry::{RetryError, RetryPolicy};

/// Statuses worth another attempt. Any other status >= 400 fails at once.
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// One completed HTTP exchange, after redirects.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub final_url: String,
    /// Empty for non-success statuses.
    pub body: Vec<u8>,
}

/// Why a single attempt did not produce a usable response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    #[error("{0}")]
    Transport(String),
    #[error("HTTP {0}")]
    Status(u16),
}

impl AttemptFailure {
    pub fn is_retryable(&self) -> bool {
        match self {
            AttemptFailure::Transport(_) => true,
            AttemptFailure::Status(status) => RETRYABLE_STATUSES.contains(status),
        }
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    /// Terminal status, returned without retrying.
    #[error("HTTP {status}")]
    Status { status: u16 },
    #[error("{last} (after {attempts} attempts)")]
    Exhausted { attempts: u32, last: AttemptFailure },
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

impl From<RetryError<AttemptFailure>> for FetchError {
    fn from(err: RetryError<AttemptFailure>) -> Self {
        match err {
            RetryError::Fatal(AttemptFailure::Status(status)) => FetchError::Status { status },
            RetryError::Fatal(last @ AttemptFailure::Transport(_)) => {
                FetchError::Exhausted { attempts: 1, last }
            }
            RetryError::Exhausted { attempts, last } => FetchError::Exhausted { attempts, last },
        }
    }
}

/// Seam over the HTTP client so fetch behaviour can be tested without a network.
pub trait HttpTransport: Send + Sync {
    /// GET `url`, following redirects. Transport-level failures are `Err`;
    /// any HTTP status, including errors, is `Ok`.
    fn get<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, String>> + Send + 'a>>;
}

/// [`HttpTransport`] backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/pdf;q=0.9,*/*;q=0.8"),
        );
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(config.http_timeout())
            .build()?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, String>> + Send + 'a>> {
        Box::pin(async move {
            let resp = self.client.get(url).send().await.map_err(|e| e.to_string())?;
            let status = resp.status();
            let final_url = resp.url().to_string();
            let body = if status.is_success() {
                resp.bytes().await.map_err(|e| e.to_string())?.to_vec()
            } else {
                Vec::new()
            };
            Ok(HttpResponse {
                status: status.as_u16(),
                final_url,
                body,
            })
        })
    }
}

/// Body of a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchedContent {
    Text(String),
    Binary(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub content: FetchedContent,
    pub final_url: String,
}

/// Retried single-resource fetcher.
#[derive(Clone)]
pub struct NetworkFetcher {
    transport: Arc<dyn HttpTransport>,
    retry: RetryPolicy,
}

impl NetworkFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    /// Fetch `url`, retrying transport errors and [`RETRYABLE_STATUSES`].
    ///
    /// With `expect_binary` the body is returned untouched; otherwise it is
    /// decoded as UTF-8 with replacement characters for invalid bytes.
    pub async fn fetch(&self, url: &str, expect_binary: bool) -> Result<Fetched, FetchError> {
        let transport = &self.transport;
        let resp = self
            .retry
            .run(
                "fetch",
                |_| async move {
                    let resp = transport.get(url).await.map_err(AttemptFailure::Transport)?;
                    if resp.status >= 400 {
                        return Err(AttemptFailure::Status(resp.status));
                    }
                    Ok(resp)
                },
                AttemptFailure::is_retryable,
            )
            .await
            .map_err(FetchError::from)?;

        tracing::debug!(
            url,
            final_url = %resp.final_url,
            status = resp.status,
            bytes = resp.body.len(),
            "fetched"
        );

        let content = if expect_binary {
            FetchedContent::Binary(resp.body)
        } else {
            FetchedContent::Text(String::from_utf8_lossy(&resp.body).into_owned())
        };
        Ok(Fetched {
            content,
            final_url: resp.final_url,
        })
    }

    pub async fn fetch_text(&self, url: &str) -> Result<(String, String), FetchError> {
        let fetched = self.fetch(url, false).await?;
        match fetched.content {
            FetchedContent::Text(text) => Ok((text, fetched.final_url)),
            FetchedContent::Binary(bytes) => Ok((
                String::from_utf8_lossy(&bytes).into_owned(),
                fetched.final_url,
            )),
        }
    }

    pub async fn fetch_bytes(&self, url: &str) -> Result<(Vec<u8>, String), FetchError> {
        let fetched = self.fetch(url, true).await?;
        match fetched.content {
            FetchedContent::Binary(bytes) => Ok((bytes, fetched.final_url)),
            FetchedContent::Text(text) => Ok((text.into_bytes(), fetched.final_url)),
        }
    }
}
