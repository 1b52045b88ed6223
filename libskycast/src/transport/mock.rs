//! Mock transport for testing
//!
//! A scripted [`ApiTransport`] that records every call. It lets tests drive
//! the session store and the posting pipeline through success, rejection and
//! partial-failure paths without a network.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::ApiError;
use crate::transport::{
    ApiResult, ApiTransport, CreateRecordRequest, CreateRecordResponse, SessionTokens,
};
use crate::types::BlobRef;

pub const MOCK_DID: &str = "did:plc:mock";
pub const MOCK_URI: &str = "at://did:plc:mock/app.bsky.feed.post/3kmock";

/// Scripted responses for each call
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub name: String,
    pub session: ApiResult<SessionTokens>,
    pub refresh: ApiResult<SessionTokens>,
    /// Failures keyed by upload call number, starting at 0
    pub upload_failures: HashMap<usize, ApiError>,
    /// Extra latency keyed by upload call number
    pub upload_delays: HashMap<usize, Duration>,
    pub record: ApiResult<CreateRecordResponse>,
    /// Latency added to every call
    pub delay: Duration,
}

pub fn tokens(did: Option<&str>, access: &str, refresh: &str) -> SessionTokens {
    SessionTokens {
        did: did.map(str::to_string),
        handle: None,
        access_jwt: access.to_string(),
        refresh_jwt: refresh.to_string(),
    }
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            session: Ok(tokens(Some(MOCK_DID), "access-1", "refresh-1")),
            refresh: Ok(tokens(Some(MOCK_DID), "access-2", "refresh-2")),
            upload_failures: HashMap::new(),
            upload_delays: HashMap::new(),
            record: Ok(CreateRecordResponse {
                uri: MOCK_URI.to_string(),
                cid: Some("bafymock".to_string()),
            }),
            delay: Duration::ZERO,
        }
    }
}

/// Everything the mock has been asked to do
#[derive(Debug, Default)]
pub struct MockLog {
    create_session_calls: AtomicUsize,
    refresh_session_calls: AtomicUsize,
    upload_blob_calls: AtomicUsize,
    create_record_calls: AtomicUsize,
    uploads: Mutex<Vec<Vec<u8>>>,
    records: Mutex<Vec<CreateRecordRequest>>,
    bearer_tokens: Mutex<Vec<(&'static str, String)>>,
}

/// Mock transport for testing
pub struct MockTransport {
    config: MockConfig,
    log: Arc<MockLog>,
}

impl MockTransport {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            log: Arc::new(MockLog::default()),
        }
    }

    /// Every call succeeds
    pub fn success() -> Self {
        Self::new(MockConfig::default())
    }

    pub fn with_session(mut self, session: ApiResult<SessionTokens>) -> Self {
        self.config.session = session;
        self
    }

    pub fn with_refresh(mut self, refresh: ApiResult<SessionTokens>) -> Self {
        self.config.refresh = refresh;
        self
    }

    pub fn with_upload_failure(mut self, call: usize, error: ApiError) -> Self {
        self.config.upload_failures.insert(call, error);
        self
    }

    pub fn with_upload_delay(mut self, call: usize, delay: Duration) -> Self {
        self.config.upload_delays.insert(call, delay);
        self
    }

    pub fn with_record(mut self, record: ApiResult<CreateRecordResponse>) -> Self {
        self.config.record = record;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.config.delay = delay;
        self
    }

    pub fn create_session_calls(&self) -> usize {
        self.log.create_session_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_session_calls(&self) -> usize {
        self.log.refresh_session_calls.load(Ordering::SeqCst)
    }

    pub fn upload_blob_calls(&self) -> usize {
        self.log.upload_blob_calls.load(Ordering::SeqCst)
    }

    pub fn create_record_calls(&self) -> usize {
        self.log.create_record_calls.load(Ordering::SeqCst)
    }

    /// Uploaded payloads in the order the calls arrived
    pub fn uploads(&self) -> Vec<Vec<u8>> {
        lock(&self.log.uploads).clone()
    }

    /// Record requests in the order the calls arrived
    pub fn records(&self) -> Vec<CreateRecordRequest> {
        lock(&self.log.records).clone()
    }

    /// `(endpoint, token)` pairs for every authenticated call
    pub fn bearer_tokens(&self) -> Vec<(&'static str, String)> {
        lock(&self.log.bearer_tokens).clone()
    }

    async fn latency(&self, extra: Option<Duration>) {
        let total = self.config.delay + extra.unwrap_or_default();
        if !total.is_zero() {
            sleep(total).await;
        }
    }

    fn note_token(&self, endpoint: &'static str, token: &str) {
        lock(&self.log.bearer_tokens).push((endpoint, token.to_string()));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl ApiTransport for MockTransport {
    async fn create_session(&self, _identifier: &str, _secret: &str) -> ApiResult<SessionTokens> {
        self.log.create_session_calls.fetch_add(1, Ordering::SeqCst);
        self.latency(None).await;
        self.config.session.clone()
    }

    async fn refresh_session(&self, refresh_token: &str) -> ApiResult<SessionTokens> {
        self.log.refresh_session_calls.fetch_add(1, Ordering::SeqCst);
        self.note_token("refreshSession", refresh_token);
        self.latency(None).await;
        self.config.refresh.clone()
    }

    async fn upload_blob(&self, access_token: &str, bytes: Vec<u8>) -> ApiResult<BlobRef> {
        let call = self.log.upload_blob_calls.fetch_add(1, Ordering::SeqCst);
        self.note_token("uploadBlob", access_token);
        self.latency(self.config.upload_delays.get(&call).copied()).await;

        if let Some(error) = self.config.upload_failures.get(&call) {
            return Err(error.clone());
        }

        let size = bytes.len();
        lock(&self.log.uploads).push(bytes);
        Ok(BlobRef(json!({
            "$type": "blob",
            "ref": {"$link": format!("mock-blob-{}", call)},
            "mimeType": "image/jpeg",
            "size": size
        })))
    }

    async fn create_record(
        &self,
        access_token: &str,
        request: &CreateRecordRequest,
    ) -> ApiResult<CreateRecordResponse> {
        self.log.create_record_calls.fetch_add(1, Ordering::SeqCst);
        self.note_token("createRecord", access_token);
        lock(&self.log.records).push(request.clone());
        self.latency(None).await;
        self.config.record.clone()
    }

    fn name(&self) -> &str {
        &self.config.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_mock_success() {
        let transport = MockTransport::success();

        let session = transport.create_session("alice", "pw").await.unwrap();
        assert_eq!(session.did.as_deref(), Some(MOCK_DID));
        assert_eq!(transport.create_session_calls(), 1);

        let blob = transport.upload_blob("access-1", vec![1, 2, 3]).await.unwrap();
        assert_eq!(blob.0["size"], 3);
        assert_eq!(transport.uploads(), vec![vec![1, 2, 3]]);
        assert_eq!(
            transport.bearer_tokens(),
            vec![("uploadBlob", "access-1".to_string())]
        );
    }

    #[tokio::test]
    async fn test_upload_failure_by_call_number() {
        let transport = MockTransport::success().with_upload_failure(
            1,
            ApiError::Status {
                status: 500,
                error: None,
                message: None,
            },
        );

        assert!(transport.upload_blob("t", vec![0]).await.is_ok());
        assert!(transport.upload_blob("t", vec![1]).await.is_err());
        assert!(transport.upload_blob("t", vec![2]).await.is_ok());
        assert_eq!(transport.upload_blob_calls(), 3);
        assert_eq!(transport.uploads().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_with_delay() {
        let transport = MockTransport::success().with_delay(Duration::from_millis(30));

        let start = Instant::now();
        transport.refresh_session("refresh-1").await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_scripted_record_error() {
        let transport = MockTransport::success().with_record(Err(ApiError::MissingField("uri")));
        let request = CreateRecordRequest {
            repo: MOCK_DID.to_string(),
            collection: crate::transport::POST_COLLECTION.to_string(),
            record: crate::transport::FeedPost {
                record_type: crate::transport::POST_COLLECTION.to_string(),
                text: "hi".to_string(),
                created_at: "2024-01-01T00:00:00.000Z".to_string(),
                facets: vec![],
                embed: None,
            },
        };

        let result = transport.create_record("access-1", &request).await;
        assert_eq!(result, Err(ApiError::MissingField("uri")));
        assert_eq!(transport.records(), vec![request]);
    }
}
