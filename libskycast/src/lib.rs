//! Skycast - authenticated posting for the AT Protocol
//!
//! This library logs a user in, shrinks photos under the blob size limit,
//! turns `#hashtags` into rich-text facets and publishes the post as one
//! logical submission over several XRPC calls.

pub mod config;
pub mod credentials;
pub mod error;
pub mod facets;
pub mod logging;
pub mod media;
pub mod service;
pub mod session;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use error::{AuthError, FailureKind, Result, SkycastError};
pub use media::{EncodedBlob, MediaAsset, MediaEncoder};
pub use service::posting::{PostRequest, PostingPipeline};
pub use service::SkycastService;
pub use session::SessionStore;
pub use types::{Annotation, Credentials, PostRecord};
