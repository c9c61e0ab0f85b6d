use std::time::Duration;

use bytes::Bytes;
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Jitter, Quota, RateLimiter};
use reqwest::{Client, StatusCode, Url};
use tracing::warn;

use stride_core::{ActivityId, ActivitySummary, OutputKind};

pub fn default_http_client() -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(concat!("stride/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(60))
        .build()
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("remote service rejected credentials ({0})")]
    Auth(StatusCode),
    #[error("remote service rate limit hit ({0})")]
    RateLimited(StatusCode),
    #[error("remote service returned {0}")]
    Http(StatusCode),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("undecodable remote payload: {0}")]
    Decode(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl RemoteError {
    /// Transient errors are retried through the pacing gate; everything
    /// else is surfaced immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::RateLimited(_) | RemoteError::Network(_) => true,
            RemoteError::Http(status) => status.is_server_error(),
            RemoteError::Auth(_) | RemoteError::Decode(_) | RemoteError::InvalidUrl(_) => false,
        }
    }
}

/// Single serialization point for outbound remote calls. Every request
/// (listing page, export download, retry) must be admitted here first, so
/// consecutive calls are at least the configured delay apart and never
/// concurrent. The optional jitter only ever adds on top of the delay.
pub struct PacingGate {
    limiter: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>>,
    jitter: Option<Jitter>,
}

impl PacingGate {
    pub fn new(delay: Duration, with_jitter: bool) -> Self {
        // Quota::with_period rejects a zero period; a zero delay disables
        // the gate entirely.
        let limiter = Quota::with_period(delay).map(RateLimiter::direct);
        let jitter = (with_jitter && !delay.is_zero()).then(|| Jitter::up_to(delay / 4));
        Self { limiter, jitter }
    }

    pub async fn admit(&self) {
        if let Some(limiter) = &self.limiter {
            match self.jitter {
                Some(jitter) => limiter.until_ready_with_jitter(jitter).await,
                None => limiter.until_ready().await,
            }
        }
    }
}

/// Remote activity API: paged listings plus per-kind export downloads,
/// with pacing and bounded retries baked in.
pub struct ApiClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
    gate: PacingGate,
    max_attempts: u32,
}

impl ApiClient {
    pub fn new(
        client: Client,
        base_url: &str,
        token: Option<String>,
        request_delay: Duration,
        max_attempts: u32,
    ) -> Result<Self, RemoteError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| RemoteError::InvalidUrl(format!("{base_url}: {e}")))?;
        Ok(Self {
            client,
            base_url,
            token,
            gate: PacingGate::new(request_delay, true),
            max_attempts: max_attempts.max(1),
        })
    }

    /// One listing page, newest activities first.
    pub async fn list_activities(
        &self,
        start: usize,
        limit: usize,
    ) -> Result<Vec<ActivitySummary>, RemoteError> {
        let mut url = self.url_for(&["activities"])?;
        url.query_pairs_mut()
            .append_pair("start", &start.to_string())
            .append_pair("limit", &limit.to_string());

        let mut last_err = None;
        for attempt in 1..=self.max_attempts {
            match self.send(&url).await {
                Ok(resp) => {
                    let entries: Vec<serde_json::Value> = resp
                        .json()
                        .await
                        .map_err(|e| RemoteError::Decode(format!("listing page: {e}")))?;
                    return entries
                        .into_iter()
                        .map(|raw| {
                            ActivitySummary::from_api_response(raw)
                                .map_err(|e| RemoteError::Decode(e.to_string()))
                        })
                        .collect();
                }
                Err(e) if e.is_transient() => {
                    warn!("listing page start={start} attempt {attempt}/{}: {e}", self.max_attempts);
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| RemoteError::Decode("no attempts made".into())))
    }

    /// Raw export payload for one (activity, kind).
    pub async fn fetch_export(
        &self,
        id: ActivityId,
        kind: OutputKind,
    ) -> Result<Bytes, RemoteError> {
        if !kind.is_export() {
            return Err(RemoteError::Decode(format!(
                "{kind} is written from the listing payload, not exported"
            )));
        }
        let id_segment = id.to_string();
        let mut url = self.url_for(&["activities", &id_segment, "export"])?;
        url.query_pairs_mut().append_pair("format", kind.extension());

        let mut last_err = None;
        for attempt in 1..=self.max_attempts {
            match self.send(&url).await {
                Ok(resp) => {
                    return resp.bytes().await.map_err(RemoteError::from);
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        activity_id = id,
                        "export {kind} attempt {attempt}/{}: {e}", self.max_attempts
                    );
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| RemoteError::Decode("no attempts made".into())))
    }

    fn url_for(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        {
            let mut segs = url
                .path_segments_mut()
                .map_err(|_| RemoteError::InvalidUrl("cannot-be-a-base url".into()))?;
            segs.pop_if_empty();
            for segment in segments {
                segs.push(segment);
            }
        }
        Ok(url)
    }

    async fn send(&self, url: &Url) -> Result<reqwest::Response, RemoteError> {
        self.gate.admit().await;

        let mut req = self.client.get(url.clone());
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(RemoteError::Auth(status));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(RemoteError::RateLimited(status));
        }
        if !status.is_success() {
            return Err(RemoteError::Http(status));
        }
        Ok(resp)
    }
}
