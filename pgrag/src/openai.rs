//! Embeddings from the OpenAI `/embeddings` HTTP endpoint (feature `openai`).
//!
//! Failures are classified by HTTP status so callers can tell bad credentials
//! from throttling and from transient outages.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::retry::RetryPolicy;

/// The default OpenAI API base URL.
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// Native output length of `text-embedding-3-small`.
const DEFAULT_DIMENSIONS: usize = 1536;

/// Default per-request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const PROVIDER: &str = "OpenAI";

/// Calls `POST {base_url}/embeddings` with a bearer key.
///
/// Defaults: model `text-embedding-3-small` (1536 dimensions), a 60 second
/// request timeout and no retries. [`with_retry`](Self::with_retry) turns on
/// backoff for throttled and transiently failing requests.
///
/// ```rust,ignore
/// let provider = OpenAIEmbeddingProvider::from_env()?
///     .with_model("text-embedding-3-large")
///     .with_retry(RetryPolicy::with_max_retries(3));
/// let vector = provider.embed("What are the latest financial news?").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    dimensions: usize,
    /// Sent as `dimensions` so the API shortens its vectors.
    request_dimensions: Option<usize>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for OpenAIEmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIEmbeddingProvider")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("dimensions", &self.dimensions)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

fn native_dimensions(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        _ => DEFAULT_DIMENSIONS,
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder().timeout(timeout).build().map_err(|e| RagError::EmbeddingError {
        provider: PROVIDER.into(),
        message: format!("failed to build HTTP client: {e}"),
    })
}

impl OpenAIEmbeddingProvider {
    /// A provider authenticating with `api_key`.
    ///
    /// # Errors
    ///
    /// [`RagError::AuthError`] for a blank key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(RagError::AuthError {
                provider: PROVIDER.into(),
                message: "API key must not be empty".into(),
            });
        }

        Ok(Self {
            client: build_client(DEFAULT_TIMEOUT)?,
            api_key,
            model: DEFAULT_MODEL.into(),
            base_url: OPENAI_BASE_URL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            request_dimensions: None,
            retry: RetryPolicy::default(),
        })
    }

    /// A provider keyed by `OPENAI_API_KEY`; unset is an [`RagError::AuthError`].
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| RagError::AuthError {
            provider: PROVIDER.into(),
            message: "OPENAI_API_KEY environment variable not set".into(),
        })?;
        Self::new(api_key)
    }

    /// Use another embedding model, e.g. `text-embedding-3-large`.
    ///
    /// Unless [`with_dimensions`](Self::with_dimensions) was called, the
    /// reported dimensionality follows the model's native output size.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        if self.request_dimensions.is_none() {
            self.dimensions = native_dimensions(&self.model);
        }
        self
    }

    /// The model name sent with each request.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Ask the API for vectors of `dims` elements instead of the model's
    /// native length. [`dimensions`](EmbeddingProvider::dimensions) reports
    /// the same value.
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }

    /// Point the provider at an OpenAI-compatible server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = build_client(timeout)?;
        Ok(self)
    }

    /// Retry throttled and transiently failing requests.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url)
    }

    async fn request_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let request_body = EmbeddingRequest {
            model: &self.model,
            input: texts.to_vec(),
            dimensions: self.request_dimensions,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                classify_transport_error(&e)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);

            error!(provider = PROVIDER, %status, "API error");
            return Err(classify_status(status, &detail));
        }

        let embedding_response: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            RagError::EmbeddingError {
                provider: PROVIDER.into(),
                message: format!("failed to parse response: {e}"),
            }
        })?;

        order_embeddings(embedding_response.data, texts.len())
    }
}

/// Map a failed HTTP status to the error taxonomy.
fn classify_status(status: StatusCode, detail: &str) -> RagError {
    let provider = PROVIDER.to_string();
    let message = format!("API returned {status}: {detail}");
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RagError::AuthError { provider, message },
        StatusCode::TOO_MANY_REQUESTS => RagError::RateLimitError { provider, message },
        s if s.is_server_error() || s == StatusCode::REQUEST_TIMEOUT => {
            RagError::TransientNetworkError { provider, message }
        }
        _ => RagError::EmbeddingError { provider, message },
    }
}

fn classify_transport_error(e: &reqwest::Error) -> RagError {
    let provider = PROVIDER.to_string();
    let message = format!("request failed: {e}");
    if e.is_connect() || e.is_timeout() || e.is_request() {
        RagError::TransientNetworkError { provider, message }
    } else {
        RagError::EmbeddingError { provider, message }
    }
}

/// Put the returned vectors back in input order and check the count.
fn order_embeddings(mut data: Vec<EmbeddingData>, expected: usize) -> Result<Vec<Vec<f32>>> {
    if data.len() != expected {
        return Err(RagError::EmbeddingError {
            provider: PROVIDER.into(),
            message: format!("expected {expected} embeddings, API returned {}", data.len()),
        });
    }
    data.sort_by_key(|d| d.index);
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

// Wire types

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text]).await?;
        vectors.pop().ok_or_else(|| RagError::EmbeddingError {
            provider: PROVIDER.into(),
            message: "no vector returned for a single input".into(),
        })
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(model = %self.model, text_count = texts.len(), "requesting embeddings");
        self.retry.run("openai_embeddings", || self.request_embeddings(texts)).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
