use bytes::Bytes;

use stride_core::{ActivityId, ActivitySummary, OutputKind};
use stride_infra::net::{ApiClient, RemoteError};

/// The remote side of a pass: paged listings plus per-kind exports. All
/// pacing and retry behavior lives behind this seam, so the engine stays
/// deterministic under test fakes.
#[async_trait::async_trait]
pub trait ActivityProvider: Send + Sync {
    /// One listing page, newest activities first. An empty page means the
    /// history is exhausted.
    async fn list_activities(
        &self,
        start: usize,
        limit: usize,
    ) -> Result<Vec<ActivitySummary>, RemoteError>;

    async fn fetch_export(&self, id: ActivityId, kind: OutputKind)
        -> Result<Bytes, RemoteError>;
}

/// HTTP-backed provider delegating to the paced API client.
pub struct HttpActivityProvider {
    api: ApiClient,
}

impl HttpActivityProvider {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl ActivityProvider for HttpActivityProvider {
    async fn list_activities(
        &self,
        start: usize,
        limit: usize,
    ) -> Result<Vec<ActivitySummary>, RemoteError> {
        self.api.list_activities(start, limit).await
    }

    async fn fetch_export(
        &self,
        id: ActivityId,
        kind: OutputKind,
    ) -> Result<Bytes, RemoteError> {
        self.api.fetch_export(id, kind).await
    }
}
