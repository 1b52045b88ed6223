//! Session lifecycle: login, refresh, logout
//!
//! `SessionStore` exclusively owns the current [`Credentials`]. All mutation
//! goes through `login`, `refresh`, `import_credentials` and `clear`.
//!
//! Token exchanges are serialized: at most one login or refresh is in flight
//! per store, so two submissions that both find the session stale cannot race
//! to persist different token pairs. The in-memory credentials sit behind a
//! separate short-lived lock that is never held across an `.await`.

use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::credentials::CredentialStore;
use crate::error::{ApiError, AuthError, Result, SkycastError};
use crate::transport::{ApiTransport, SessionTokens};
use crate::types::Credentials;

pub struct SessionStore {
    transport: Arc<dyn ApiTransport>,
    store: Arc<dyn CredentialStore>,
    state: RwLock<Option<Credentials>>,
    exchange: Mutex<()>,
}

impl SessionStore {
    /// Create a store with no current session
    pub fn new(transport: Arc<dyn ApiTransport>, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            transport,
            store,
            state: RwLock::new(None),
            exchange: Mutex::new(()),
        }
    }

    /// Create a store and restore whatever session was persisted
    ///
    /// Unreadable persisted state is logged and ignored; the user simply has
    /// to log in again.
    pub fn open(transport: Arc<dyn ApiTransport>, store: Arc<dyn CredentialStore>) -> Self {
        let session = Self::new(transport, Arc::clone(&store));
        match store.load() {
            Ok(Some(credentials)) => {
                debug!(
                    backend = store.backend_name(),
                    "Restored session for {}", credentials.identifier
                );
                session.set_state(Some(credentials));
            }
            Ok(None) => {}
            Err(e) => warn!(
                backend = store.backend_name(),
                "Ignoring unreadable persisted session: {}", e
            ),
        }
        session
    }

    /// Log in with an identifier and secret
    ///
    /// On success the new credentials replace the current ones and are
    /// persisted. On failure the current credentials are untouched.
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<Credentials> {
        let _exchange = self.exchange.lock().await;

        debug!("Logging in as {}", identifier);
        let tokens = self
            .transport
            .create_session(identifier, secret)
            .await
            .map_err(map_exchange_error)?;

        let account_id = tokens
            .did
            .clone()
            .filter(|did| !did.is_empty())
            .ok_or_else(|| AuthError::MalformedResponse("session has no account id".into()))?;
        check_tokens(&tokens)?;

        let credentials = Credentials {
            identifier: identifier.to_string(),
            access_token: Some(tokens.access_jwt),
            refresh_token: Some(tokens.refresh_jwt),
            account_id: Some(account_id),
        };

        self.set_state(Some(credentials.clone()));
        self.persist(&credentials);
        info!("Logged in as {}", identifier);

        Ok(credentials)
    }

    /// Exchange the refresh token for a new token pair
    ///
    /// Fails with [`AuthError::NoSession`] without touching the network when
    /// no refresh token is held.
    pub async fn refresh(&self) -> Result<()> {
        let _exchange = self.exchange.lock().await;
        self.refresh_locked().await
    }

    /// Refresh only if the session is not currently usable
    ///
    /// A caller that waited behind another refresh sees its result and
    /// returns without a second exchange.
    pub async fn ensure_authenticated(&self) -> Result<()> {
        if self.is_authenticated() {
            return Ok(());
        }

        let _exchange = self.exchange.lock().await;
        if self.is_authenticated() {
            debug!("Session was refreshed while waiting");
            return Ok(());
        }
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> Result<()> {
        let refresh_token = self.read_state(|c| {
            c.filter(|c| c.has_refresh_token())
                .and_then(|c| c.refresh_token.clone())
        });
        let Some(refresh_token) = refresh_token else {
            return Err(AuthError::NoSession.into());
        };

        debug!("Refreshing session");
        let tokens = self
            .transport
            .refresh_session(&refresh_token)
            .await
            .map_err(map_exchange_error)?;
        check_tokens(&tokens)?;

        let updated = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let Some(credentials) = state.as_mut() else {
                // Cleared while the exchange was in flight
                return Err(AuthError::NoSession.into());
            };
            credentials.rotate_tokens(tokens.access_jwt, tokens.refresh_jwt);
            if let Some(did) = tokens.did.filter(|did| !did.is_empty()) {
                credentials.account_id = Some(did);
            }
            credentials.clone()
        };

        self.persist(&updated);
        info!("Session refreshed for {}", updated.identifier);
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.read_state(|c| c.is_some_and(Credentials::is_authenticated))
    }

    /// Drop in-memory and persisted credentials
    pub fn clear(&self) {
        if let Some(mut old) = self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            old.wipe();
        }
        if let Err(e) = self.store.clear() {
            warn!(
                backend = self.store.backend_name(),
                "Failed to clear persisted credentials: {}", e
            );
        }
        info!("Session cleared");
    }

    /// Snapshot of the current credentials for external persistence
    pub fn export_credentials(&self) -> Option<Credentials> {
        self.read_state(|c| c.cloned())
    }

    /// Adopt credentials restored by the caller's own storage
    pub fn import_credentials(&self, credentials: Credentials) {
        debug!("Imported session for {}", credentials.identifier);
        self.set_state(Some(credentials));
    }

    /// Access token and account id, when authenticated
    pub(crate) fn authorization(&self) -> Option<(String, String)> {
        self.read_state(|c| {
            c.filter(|c| c.is_authenticated()).and_then(|c| {
                Some((c.access_token.clone()?, c.account_id.clone()?))
            })
        })
    }

    fn read_state<T>(&self, f: impl FnOnce(Option<&Credentials>) -> T) -> T {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(state.as_ref())
    }

    fn set_state(&self, credentials: Option<Credentials>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = state.as_mut() {
            old.wipe();
        }
        *state = credentials;
    }

    fn persist(&self, credentials: &Credentials) {
        if let Err(e) = self.store.save(credentials) {
            warn!(
                backend = self.store.backend_name(),
                "Session is active but could not be persisted: {}", e
            );
        }
    }
}

fn check_tokens(tokens: &SessionTokens) -> Result<()> {
    if tokens.access_jwt.is_empty() || tokens.refresh_jwt.is_empty() {
        return Err(AuthError::MalformedResponse("session has an empty token".into()).into());
    }
    Ok(())
}

/// Map a failed login or refresh exchange
fn map_exchange_error(error: ApiError) -> SkycastError {
    match error {
        ApiError::Network(message) => SkycastError::Network(message),
        ApiError::Status { .. } => AuthError::Rejected(error.to_string()).into(),
        ApiError::Malformed(message) => AuthError::MalformedResponse(message).into(),
        ApiError::MissingField(field) => {
            AuthError::MalformedResponse(format!("missing `{}`", field)).into()
        }
    }
}
