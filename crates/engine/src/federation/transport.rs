//! Peer federation transport.
//!
//! [`HttpTransport`] talks to a federation gateway with `ureq` (sync) wrapped
//! in `tokio::task::spawn_blocking`, so the async runtime never blocks on
//! network I/O.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use time::Date;

use crate::config::FederationConfig;

/// Environment variable that overrides `federation.auth_token`.
pub const AUTH_TOKEN_ENV: &str = "DKPUBLISH_FEDERATION_AUTH_TOKEN";

const PROTOBUF_MEDIA_TYPE: &str = "application/protobuf; version=1.0";
const BATCH_TAG_HEADER: &str = "batchTag";
const NEXT_BATCH_TAG_HEADER: &str = "nextBatchTag";
const BATCH_SIGNATURE_HEADER: &str = "batchSignature";

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("federation transport is not configured: {0}")]
    NotConfigured(String),

    #[error("request to '{url}' failed: {message}")]
    RequestFailed { url: String, message: String },

    #[error("malformed response from '{url}': {message}")]
    MalformedResponse { url: String, message: String },
}

/// One batch as served by a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBatch {
    pub batch_tag: String,
    pub content: Vec<u8>,
    /// Tag of the following batch of the same day, if the peer has one yet.
    pub next_batch_tag: Option<String>,
}

/// A signed batch ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundBatch {
    pub batch_tag: String,
    pub content: Vec<u8>,
    pub signature: Vec<u8>,
}

#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Fetch a batch published on `date`: the first batch of the day when
    /// `batch_tag` is `None`, otherwise the batch with that tag.
    ///
    /// Returns `Ok(None)` when the peer has nothing for the request.
    async fn get_batch(
        &self,
        date: Date,
        batch_tag: Option<&str>,
    ) -> Result<Option<RemoteBatch>, TransportError>;

    async fn send_batch(&self, batch: &OutboundBatch) -> Result<(), TransportError>;
}

/// Federation gateway client.
///
/// - `base_url` from config (required)
/// - `auth_token` from [`AUTH_TOKEN_ENV`], falling back to config
pub struct HttpTransport {
    base_url: String,
    auth_token: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &FederationConfig) -> Result<Self, TransportError> {
        let base_url = config
            .base_url
            .as_deref()
            .ok_or_else(|| TransportError::NotConfigured("missing 'federation.base_url'".into()))?;
        let auth_token = std::env::var(AUTH_TOKEN_ENV)
            .ok()
            .or_else(|| config.auth_token.clone());
        Ok(HttpTransport {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token,
        })
    }

    pub fn download_url(&self, date: Date) -> String {
        format!("{}/diagnosiskeys/download/{}", self.base_url, date)
    }

    pub fn upload_url(&self) -> String {
        format!("{}/diagnosiskeys/upload", self.base_url)
    }
}

/// Treats an absent, empty or literal `null` header as no next batch.
fn next_tag(value: Option<&str>) -> Option<String> {
    match value.map(str::trim) {
        None | Some("") | Some("null") => None,
        Some(tag) => Some(tag.to_string()),
    }
}

fn join_error(url: &str, e: tokio::task::JoinError) -> TransportError {
    TransportError::RequestFailed {
        url: url.to_string(),
        message: format!("task join error: {}", e),
    }
}

#[async_trait]
impl PeerTransport for HttpTransport {
    async fn get_batch(
        &self,
        date: Date,
        batch_tag: Option<&str>,
    ) -> Result<Option<RemoteBatch>, TransportError> {
        let url = self.download_url(date);
        let auth_token = self.auth_token.clone();
        let batch_tag = batch_tag.map(str::to_string);

        let task_url = url.clone();
        tokio::task::spawn_blocking(move || {
            let url = task_url;
            let agent = ureq::Agent::new_with_defaults();
            let mut request = agent.get(&url).header("Accept", PROTOBUF_MEDIA_TYPE);
            if let Some(ref tag) = batch_tag {
                request = request.header(BATCH_TAG_HEADER, tag);
            }
            if let Some(ref token) = auth_token {
                request = request.header("Authorization", &format!("Bearer {}", token));
            }

            let response = match request.call() {
                Ok(response) => response,
                Err(ureq::Error::StatusCode(404)) => return Ok(None),
                Err(e) => {
                    return Err(TransportError::RequestFailed {
                        url,
                        message: e.to_string(),
                    })
                }
            };

            let header = |name: &str| {
                response
                    .headers()
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            };
            let batch_tag = header(BATCH_TAG_HEADER).filter(|t| !t.is_empty()).ok_or_else(|| {
                TransportError::MalformedResponse {
                    url: url.clone(),
                    message: format!("missing '{}' header", BATCH_TAG_HEADER),
                }
            })?;
            let next_batch_tag = next_tag(header(NEXT_BATCH_TAG_HEADER).as_deref());

            let content = response.into_body().read_to_vec().map_err(|e| {
                TransportError::MalformedResponse {
                    url: url.clone(),
                    message: format!("failed to read body: {}", e),
                }
            })?;

            Ok(Some(RemoteBatch {
                batch_tag,
                content,
                next_batch_tag,
            }))
        })
        .await
        .map_err(|e| join_error(&url, e))?
    }

    async fn send_batch(&self, batch: &OutboundBatch) -> Result<(), TransportError> {
        let url = self.upload_url();
        let auth_token = self.auth_token.clone();
        let batch = batch.clone();

        let task_url = url.clone();
        tokio::task::spawn_blocking(move || {
            let agent = ureq::Agent::new_with_defaults();
            let signature = STANDARD.encode(&batch.signature);
            let mut request = agent
                .post(&task_url)
                .header("Content-Type", PROTOBUF_MEDIA_TYPE)
                .header(BATCH_TAG_HEADER, &batch.batch_tag)
                .header(BATCH_SIGNATURE_HEADER, &signature);
            if let Some(ref token) = auth_token {
                request = request.header("Authorization", &format!("Bearer {}", token));
            }
            request
                .send(&batch.content[..])
                .map(|_| ())
                .map_err(|e| TransportError::RequestFailed {
                    url: task_url,
                    message: e.to_string(),
                })
        })
        .await
        .map_err(|e| join_error(&url, e))?
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
