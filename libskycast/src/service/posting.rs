//! The authenticated posting pipeline
//!
//! One submission runs validate → ensure session → encode and upload each
//! image → compose and annotate text → create the record. Every remote
//! failure is mapped to a [`SkycastError`] at the call site where it
//! happened; raw [`ApiError`]s never leave this module.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

use super::events::{Event, EventBus, SubmissionState};
use super::validation::ValidationService;
use crate::config::MediaConfig;
use crate::error::{ApiError, AuthError, Result, SkycastError};
use crate::facets::{annotate, compose_text};
use crate::media::{MediaAsset, MediaEncoder};
use crate::session::SessionStore;
use crate::transport::{ApiTransport, CreateRecordRequest};
use crate::types::{BlobRef, EmbeddedImage, PostRecord};

/// Knobs the pipeline reads on every submission
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub budget_bytes: usize,
    pub max_concurrent_uploads: usize,
    pub alt_text: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&MediaConfig::default())
    }
}

impl From<&MediaConfig> for PipelineSettings {
    fn from(config: &MediaConfig) -> Self {
        Self {
            budget_bytes: config.budget_bytes,
            max_concurrent_uploads: config.max_concurrent_uploads,
            alt_text: config.alt_text.clone(),
        }
    }
}

/// What the user composed
#[derive(Debug, Clone, Default)]
pub struct PostRequest {
    pub text: String,
    /// Template hashtags appended after the text, with or without `#`
    pub hashtags: Vec<String>,
    /// Attached images in display order
    pub images: Vec<MediaAsset>,
}

impl PostRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_hashtags<S: Into<String>>(mut self, hashtags: impl IntoIterator<Item = S>) -> Self {
        self.hashtags = hashtags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_image(mut self, image: MediaAsset) -> Self {
        self.images.push(image);
        self
    }
}

#[derive(Clone)]
pub struct PostingPipeline {
    session: Arc<SessionStore>,
    transport: Arc<dyn ApiTransport>,
    encoder: Arc<MediaEncoder>,
    validation: ValidationService,
    settings: PipelineSettings,
    event_bus: EventBus,
}

impl PostingPipeline {
    pub fn new(
        session: Arc<SessionStore>,
        transport: Arc<dyn ApiTransport>,
        validation: ValidationService,
        settings: PipelineSettings,
        event_bus: EventBus,
    ) -> Self {
        Self {
            session,
            transport,
            encoder: Arc::new(MediaEncoder::default()),
            validation,
            settings,
            event_bus,
        }
    }

    /// Replace the default encoder, e.g. with a shorter search plan
    pub fn with_encoder(mut self, encoder: MediaEncoder) -> Self {
        self.encoder = Arc::new(encoder);
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Submit a post and return the created record's URI
    ///
    /// # Errors
    ///
    /// - `InvalidInput` before any network call if validation fails
    /// - `Auth(Required)` if the session cannot be made valid, or the
    ///   server rejects the access token while creating the record
    /// - `Upload` on the first failed image upload; no record is created
    /// - `Post` / `Decoding` / `Network` for record creation failures
    pub async fn submit(&self, request: PostRequest) -> Result<String> {
        let submission_id = uuid::Uuid::new_v4().to_string();

        self.event_bus.emit(Event::SubmissionStarted {
            submission_id: submission_id.clone(),
            image_count: request.images.len(),
        });
        self.transition(&submission_id, SubmissionState::Idle);

        let result = self.run(&submission_id, request).await;

        match &result {
            Ok(uri) => {
                info!("Posted {} via {}", uri, self.transport.name());
                self.transition(&submission_id, SubmissionState::Succeeded);
                self.event_bus.emit(Event::SubmissionSucceeded {
                    submission_id,
                    uri: uri.clone(),
                });
            }
            Err(e) => {
                warn!(kind = %e.kind(), "Submission failed: {}", e);
                self.transition(&submission_id, SubmissionState::Failed);
                self.event_bus.emit(Event::SubmissionFailed {
                    submission_id,
                    kind: e.kind(),
                    error: e.to_string(),
                });
            }
        }

        result
    }

    async fn run(&self, submission_id: &str, request: PostRequest) -> Result<String> {
        let text = compose_text(&request.text, &request.hashtags);
        let report = self.validation.check(&text, request.images.len())?;
        for warning in &report.warnings {
            debug!("Validation warning: {}", warning);
        }

        if !self.session.is_authenticated() {
            self.transition(submission_id, SubmissionState::Authenticating);
            self.session
                .ensure_authenticated()
                .await
                .map_err(|e| AuthError::Required(e.to_string()))?;
        }
        let (access_token, account_id) = self
            .session
            .authorization()
            .ok_or_else(|| AuthError::Required("no active session".to_string()))?;

        let blobs = if request.images.is_empty() {
            Vec::new()
        } else {
            self.transition(submission_id, SubmissionState::UploadingMedia);
            self.encode_and_upload(submission_id, &access_token, request.images)
                .await?
        };

        self.transition(submission_id, SubmissionState::CreatingRecord);
        let annotations = annotate(&text).collect();
        let record = PostRecord {
            text,
            created_at: Utc::now(),
            annotations,
            images: blobs
                .into_iter()
                .map(|blob| EmbeddedImage {
                    blob,
                    alt: self.settings.alt_text.clone(),
                })
                .collect(),
        };

        let response = self
            .transport
            .create_record(
                &access_token,
                &CreateRecordRequest::for_post(account_id, &record),
            )
            .await
            .map_err(map_record_error)?;

        Ok(response.uri)
    }

    /// Encode and upload every image; blob refs come back in input order
    async fn encode_and_upload(
        &self,
        submission_id: &str,
        access_token: &str,
        images: Vec<MediaAsset>,
    ) -> Result<Vec<BlobRef>> {
        let concurrency = self.settings.max_concurrent_uploads.max(1);
        debug!(
            "Uploading {} images, {} at a time",
            images.len(),
            concurrency
        );

        stream::iter(images.into_iter().enumerate())
            .map(|(index, asset)| self.upload_one(submission_id, access_token, index, asset))
            .buffered(concurrency)
            .try_collect()
            .await
    }

    async fn upload_one(
        &self,
        submission_id: &str,
        access_token: &str,
        index: usize,
        asset: MediaAsset,
    ) -> Result<BlobRef> {
        let encoder = Arc::clone(&self.encoder);
        let budget = self.settings.budget_bytes;
        let blob = tokio::task::spawn_blocking(move || encoder.encode(&asset, budget))
            .await
            .map_err(|e| SkycastError::Encoding(format!("encoder task failed: {}", e)))??;

        if blob.exceeds_budget() {
            warn!(
                "Image {} is {} bytes, over the {} byte budget; uploading smallest encoding",
                index + 1,
                blob.size_bytes,
                blob.budget_bytes
            );
        }
        self.event_bus.emit(Event::MediaEncoded {
            submission_id: submission_id.to_string(),
            index,
            size_bytes: blob.size_bytes,
            quality: blob.quality,
            scale: blob.scale,
            within_budget: !blob.exceeds_budget(),
        });

        let blob_ref = self
            .transport
            .upload_blob(access_token, blob.bytes)
            .await
            .map_err(|e| SkycastError::Upload(format!("image {}: {}", index + 1, e)))?;

        debug!("Uploaded image {}", index + 1);
        self.event_bus.emit(Event::BlobUploaded {
            submission_id: submission_id.to_string(),
            index,
        });
        Ok(blob_ref)
    }

    fn transition(&self, submission_id: &str, state: SubmissionState) {
        debug!(submission = submission_id, ?state, "Submission state");
        self.event_bus.emit(Event::StateChanged {
            submission_id: submission_id.to_string(),
            state,
        });
    }
}

/// Map a failed `createRecord` call
fn map_record_error(error: ApiError) -> SkycastError {
    if error.is_auth_rejection() {
        return AuthError::Required(error.to_string()).into();
    }
    match error {
        ApiError::Network(message) => SkycastError::Network(message),
        ApiError::MissingField(field) => {
            SkycastError::Decoding(format!("createRecord response has no `{}`", field))
        }
        ApiError::Status { .. } | ApiError::Malformed(_) => SkycastError::Post(error.to_string()),
    }
}
