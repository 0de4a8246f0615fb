//! HTTP access to the catalog: transport seam plus the retrying JSON client.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::NetworkConfig;
use crate::connectivity::Connectivity;

/// Typed failure of a logical fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
  #[error("no network connection")]
  Offline,
  #[error("request timed out")]
  Timeout,
  #[error("server error (HTTP {0})")]
  ServerError(u16),
  #[error("HTTP error {0}")]
  HttpError(u16),
  #[error("request cancelled")]
  Cancelled,
  #[error("transport error: {0}")]
  Transport(String),
  #[error("failed to decode response: {0}")]
  Decode(String),
}

impl FetchError {
  /// Whether another attempt could plausibly succeed.
  pub fn is_retryable(&self) -> bool {
    matches!(
      self,
      FetchError::Timeout | FetchError::ServerError(_) | FetchError::Transport(_)
    )
  }
}

/// Raw response as seen by the client.
#[derive(Debug, Clone)]
pub struct HttpResponse {
  pub status: u16,
  pub body: Vec<u8>,
}

/// Connection-level failure (DNS, refused, reset...).
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// The wire. One GET, no retries, no timeout.
#[async_trait]
pub trait HttpTransport: Send + Sync {
  async fn get(&self, url: &str) -> Result<HttpResponse, TransportError>;
}

/// Production transport backed by reqwest.
pub struct ReqwestTransport {
  client: reqwest::Client,
}

impl ReqwestTransport {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("pokedex/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
  async fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
    let response = self
      .client
      .get(url)
      .send()
      .await
      .map_err(|e| TransportError(e.to_string()))?;

    let status = response.status().as_u16();
    let body = response
      .bytes()
      .await
      .map_err(|e| TransportError(e.to_string()))?;

    Ok(HttpResponse {
      status,
      body: body.to_vec(),
    })
  }
}

/// Per-call knobs for [`NetworkClient::fetch_json_with`].
#[derive(Debug, Clone)]
pub struct FetchOptions {
  pub timeout: Duration,
  /// Additional attempts after the first
  pub retries: u32,
  /// Base delay, doubled on every retry
  pub backoff: Duration,
  pub cancel: Option<CancellationToken>,
}

impl Default for FetchOptions {
  fn default() -> Self {
    Self {
      timeout: Duration::from_millis(8000),
      retries: 3,
      backoff: Duration::from_millis(1000),
      cancel: None,
    }
  }
}

impl From<&NetworkConfig> for FetchOptions {
  fn from(config: &NetworkConfig) -> Self {
    Self {
      timeout: Duration::from_millis(config.timeout_ms),
      retries: config.retries,
      backoff: Duration::from_millis(config.backoff_ms),
      cancel: None,
    }
  }
}

/// Upper bound (exclusive) of the random jitter added to each backoff delay.
const MAX_JITTER_MS: u64 = 200;

/// `base * 2^attempt + jitter`, with `attempt` counted from zero.
pub fn backoff_delay(base: Duration, attempt: u32, jitter: Duration) -> Duration {
  base.saturating_mul(2u32.saturating_pow(attempt)) + jitter
}

fn random_jitter() -> Duration {
  Duration::from_millis(rand::random::<u64>() % MAX_JITTER_MS)
}

/// Run `fut` unless `cancel` fires first.
async fn cancellable<F: Future>(
  cancel: Option<&CancellationToken>,
  fut: F,
) -> Result<F::Output, FetchError> {
  match cancel {
    Some(token) => tokio::select! {
      biased;
      _ = token.cancelled() => Err(FetchError::Cancelled),
      out = fut => Ok(out),
    },
    None => Ok(fut.await),
  }
}

/// JSON client with timeout, retry with exponential backoff and jitter, and
/// an upfront connectivity check.
#[derive(Clone)]
pub struct NetworkClient {
  transport: Arc<dyn HttpTransport>,
  connectivity: Connectivity,
  defaults: FetchOptions,
}

impl NetworkClient {
  pub fn new(transport: Arc<dyn HttpTransport>, connectivity: Connectivity) -> Self {
    Self {
      transport,
      connectivity,
      defaults: FetchOptions::default(),
    }
  }

  /// Replace the default timeout/retry/backoff settings.
  pub fn with_defaults(mut self, defaults: FetchOptions) -> Self {
    self.defaults = defaults;
    self
  }

  pub fn connectivity(&self) -> &Connectivity {
    &self.connectivity
  }

  /// Fetch with the client's default settings.
  pub async fn fetch_json<T: DeserializeOwned>(
    &self,
    url: &str,
    cancel: Option<&CancellationToken>,
  ) -> Result<T, FetchError> {
    let options = FetchOptions {
      cancel: cancel.cloned(),
      ..self.defaults.clone()
    };
    self.fetch_json_with(url, &options).await
  }

  pub async fn fetch_json_with<T: DeserializeOwned>(
    &self,
    url: &str,
    options: &FetchOptions,
  ) -> Result<T, FetchError> {
    let cancel = options.cancel.as_ref();
    let mut attempt = 0u32;

    loop {
      if cancel.is_some_and(|token| token.is_cancelled()) {
        return Err(FetchError::Cancelled);
      }
      if !self.connectivity.is_online() {
        debug!(url, "Skipping request while offline");
        return Err(FetchError::Offline);
      }

      let err = match self.attempt(url, options).await {
        Ok(data) => return Ok(data),
        Err(err) => err,
      };

      if !err.is_retryable() || attempt >= options.retries {
        return Err(err);
      }

      let delay = backoff_delay(options.backoff, attempt, random_jitter());
      warn!(url, attempt, ?delay, "Request failed, retrying: {}", err);
      cancellable(cancel, tokio::time::sleep(delay)).await?;
      attempt += 1;
    }
  }

  async fn attempt<T: DeserializeOwned>(
    &self,
    url: &str,
    options: &FetchOptions,
  ) -> Result<T, FetchError> {
    debug!(url, "GET");
    let request = tokio::time::timeout(options.timeout, self.transport.get(url));

    let response = cancellable(options.cancel.as_ref(), request)
      .await?
      .map_err(|_| FetchError::Timeout)?
      .map_err(|e| FetchError::Transport(e.0))?;

    match response.status {
      200..=299 => {
        serde_json::from_slice(&response.body).map_err(|e| FetchError::Decode(e.to_string()))
      }
      status if status >= 500 => Err(FetchError::ServerError(status)),
      status => Err(FetchError::HttpError(status)),
    }
  }
}
