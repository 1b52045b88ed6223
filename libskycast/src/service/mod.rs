//! Service layer for Skycast
//!
//! `SkycastService` is the single entry point a UI shell holds on to. It wires
//! the transport, the session store and the posting pipeline together and
//! shares them between sub-services:
//!
//! - `SessionStore`: login, refresh, logout
//! - `PostingPipeline`: submit a post with images
//! - `ValidationService`: pre-flight checks for the composer
//! - `EventBus`: per-submission progress
//!
//! # Example
//!
//! ```no_run
//! use libskycast::media::MediaAsset;
//! use libskycast::service::SkycastService;
//! use libskycast::service::posting::PostRequest;
//!
//! # async fn example() -> libskycast::Result<()> {
//! let service = SkycastService::new()?;
//! service.session().login("alice.bsky.social", "app-password").await?;
//!
//! let photo = MediaAsset::from_bytes(&std::fs::read("sunset.png").unwrap())?;
//! let request = PostRequest::new("Sunset over the bay")
//!     .with_hashtags(["photography"])
//!     .with_image(photo);
//!
//! let uri = service.posting().submit(request).await?;
//! println!("Posted {}", uri);
//! # Ok(())
//! # }
//! ```

pub mod events;
pub mod posting;
pub mod validation;

use std::sync::Arc;

use tracing::debug;

use self::events::EventBus;
use self::posting::{PipelineSettings, PostingPipeline};
use self::validation::ValidationService;
use crate::config::Config;
use crate::credentials::{CredentialStore, FileCredentialStore};
use crate::session::SessionStore;
use crate::transport::http::HttpTransport;
use crate::transport::ApiTransport;
use crate::Result;

pub struct SkycastService {
    config: Arc<Config>,
    session: Arc<SessionStore>,
    posting: PostingPipeline,
    validation: ValidationService,
    event_bus: EventBus,
}

impl SkycastService {
    /// Create a service from the default configuration file
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or is invalid.
    pub fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config)
    }

    /// Create a service talking HTTP to the configured PDS, persisting the
    /// session to the configured credentials file
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let transport = Arc::new(HttpTransport::new(&config.service)?);
        let store = Arc::new(FileCredentialStore::new(config.credentials.expand_path()));
        Ok(Self::with_parts(config, transport, store))
    }

    /// Assemble a service from explicit parts
    ///
    /// Used by shells that bring their own credential storage, and by tests
    /// with a mock transport.
    pub fn with_parts(
        config: Config,
        transport: Arc<dyn ApiTransport>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        debug!(
            transport = transport.name(),
            backend = store.backend_name(),
            "Assembling service"
        );

        let config = Arc::new(config);
        let event_bus = EventBus::default();
        let session = Arc::new(SessionStore::open(Arc::clone(&transport), store));
        let validation = ValidationService::new(config.media.max_images);
        let posting = PostingPipeline::new(
            Arc::clone(&session),
            transport,
            validation.clone(),
            PipelineSettings::from(&config.media),
            event_bus.clone(),
        );

        Self {
            config,
            session,
            posting,
            validation,
            event_bus,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn posting(&self) -> &PostingPipeline {
        &self.posting
    }

    pub fn validation(&self) -> &ValidationService {
        &self.validation
    }

    /// Subscribe to submission progress events
    ///
    /// ```no_run
    /// use libskycast::service::SkycastService;
    ///
    /// # fn example() -> libskycast::Result<()> {
    /// let service = SkycastService::new()?;
    /// let mut events = service.subscribe();
    ///
    /// tokio::spawn(async move {
    ///     while let Ok(event) = events.recv().await {
    ///         println!("Event: {:?}", event);
    ///     }
    /// });
    /// # Ok(())
    /// # }
    /// ```
    pub fn subscribe(&self) -> events::EventReceiver {
        self.event_bus.subscribe()
    }
}
