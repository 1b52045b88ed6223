//! Remote API abstraction
//!
//! [`ApiTransport`] covers the four XRPC calls the posting pipeline needs.
//! Implementations are stateless beyond the request they are given: tokens
//! are passed in by the caller on every call.
//!
//! Failures come back as [`ApiError`]; callers map them to pipeline error
//! kinds depending on which call failed, so the same HTTP 401 means
//! "rejected login" during `create_session` but "login required" during
//! `create_record`.
//!
//! # Examples
//!
//! ```no_run
//! use libskycast::config::ServiceConfig;
//! use libskycast::transport::{ApiTransport, http::HttpTransport};
//!
//! # async fn example() -> libskycast::Result<()> {
//! let transport = HttpTransport::new(&ServiceConfig::default())?;
//! match transport.create_session("alice.bsky.social", "app-password").await {
//!     Ok(tokens) => println!("logged in as {:?}", tokens.did),
//!     Err(e) => eprintln!("login failed: {}", e),
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::types::{Annotation, AnnotationKind, BlobRef, PostRecord};

pub mod http;

// Mock transport is available for all builds (not just tests) to support integration tests
pub mod mock;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

pub const CREATE_SESSION: &str = "com.atproto.server.createSession";
pub const REFRESH_SESSION: &str = "com.atproto.server.refreshSession";
pub const UPLOAD_BLOB: &str = "com.atproto.repo.uploadBlob";
pub const CREATE_RECORD: &str = "com.atproto.repo.createRecord";

/// Collection every post record is written to
pub const POST_COLLECTION: &str = "app.bsky.feed.post";

const TAG_FEATURE_TYPE: &str = "app.bsky.richtext.facet#tag";
const IMAGES_EMBED_TYPE: &str = "app.bsky.embed.images";

#[async_trait]
pub trait ApiTransport: Send + Sync {
    /// Exchange identifier and secret for a token pair
    async fn create_session(&self, identifier: &str, secret: &str) -> ApiResult<SessionTokens>;

    /// Exchange a refresh token for a new token pair
    async fn refresh_session(&self, refresh_token: &str) -> ApiResult<SessionTokens>;

    /// Upload raw encoded image bytes
    async fn upload_blob(&self, access_token: &str, bytes: Vec<u8>) -> ApiResult<BlobRef>;

    /// Write a record into the account's repository
    async fn create_record(
        &self,
        access_token: &str,
        request: &CreateRecordRequest,
    ) -> ApiResult<CreateRecordResponse>;

    /// Short name used in log lines
    fn name(&self) -> &str;
}

/// Token pair returned by both session endpoints
///
/// `did` is required by `createSession` and optional for `refreshSession`;
/// callers enforce that.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    #[serde(default)]
    pub did: Option<String>,
    #[serde(default)]
    pub handle: Option<String>,
    pub access_jwt: String,
    pub refresh_jwt: String,
}

impl std::fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokens")
            .field("did", &self.did)
            .field("handle", &self.handle)
            .field("access_jwt", &"[REDACTED]")
            .field("refresh_jwt", &"[REDACTED]")
            .finish()
    }
}

/// Body of `createSession`
#[derive(Serialize)]
pub(crate) struct CreateSessionBody<'a> {
    pub identifier: &'a str,
    pub password: &'a str,
}

/// Body of `createRecord`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRecordRequest {
    pub repo: String,
    pub collection: String,
    pub record: FeedPost,
}

impl CreateRecordRequest {
    /// Shape a post for the given repository (account DID)
    pub fn for_post(repo: impl Into<String>, post: &PostRecord) -> Self {
        Self {
            repo: repo.into(),
            collection: POST_COLLECTION.to_string(),
            record: FeedPost::from(post),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPost {
    #[serde(rename = "$type")]
    pub record_type: String,
    pub text: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub facets: Vec<Facet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed: Option<ImagesEmbed>,
}

impl From<&PostRecord> for FeedPost {
    fn from(post: &PostRecord) -> Self {
        let embed = if post.images.is_empty() {
            None
        } else {
            Some(ImagesEmbed {
                embed_type: IMAGES_EMBED_TYPE.to_string(),
                images: post
                    .images
                    .iter()
                    .map(|image| EmbeddedImageRef {
                        alt: image.alt.clone(),
                        image: image.blob.clone(),
                    })
                    .collect(),
            })
        };

        Self {
            record_type: POST_COLLECTION.to_string(),
            text: post.text.clone(),
            created_at: post.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            facets: post.annotations.iter().map(Facet::from).collect(),
            embed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facet {
    pub index: ByteSlice,
    pub features: Vec<FacetFeature>,
}

impl From<&Annotation> for Facet {
    fn from(annotation: &Annotation) -> Self {
        let feature = match annotation.kind {
            AnnotationKind::Tag => FacetFeature {
                feature_type: TAG_FEATURE_TYPE.to_string(),
                tag: annotation.value.clone(),
            },
        };
        Self {
            index: ByteSlice {
                byte_start: annotation.byte_start,
                byte_end: annotation.byte_end,
            },
            features: vec![feature],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByteSlice {
    pub byte_start: usize,
    pub byte_end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetFeature {
    #[serde(rename = "$type")]
    pub feature_type: String,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagesEmbed {
    #[serde(rename = "$type")]
    pub embed_type: String,
    pub images: Vec<EmbeddedImageRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedImageRef {
    pub alt: String,
    pub image: BlobRef,
}

/// Successful `createRecord` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRecordResponse {
    pub uri: String,
    #[serde(default)]
    pub cid: Option<String>,
}
