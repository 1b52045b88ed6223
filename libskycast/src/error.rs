//! Error types for Skycast

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SkycastError>;

#[derive(Error, Debug)]
pub enum SkycastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Posting failed: {0}")]
    Post(String),

    #[error("Unexpected response: {0}")]
    Decoding(String),

    #[error("Image encoding failed: {0}")]
    Encoding(String),

    #[error("Credential storage error: {0}")]
    Credentials(#[from] CredentialError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl SkycastError {
    /// The tagged failure kind a UI shell renders a message from
    pub fn kind(&self) -> FailureKind {
        match self {
            SkycastError::Config(_) => FailureKind::Config,
            SkycastError::Auth(AuthError::Required(_)) => FailureKind::AuthRequired,
            SkycastError::Auth(_) => FailureKind::Auth,
            SkycastError::Network(_) => FailureKind::Network,
            SkycastError::Upload(_) => FailureKind::Upload,
            SkycastError::Post(_) => FailureKind::Post,
            SkycastError::Decoding(_) => FailureKind::Decoding,
            SkycastError::Encoding(_) => FailureKind::Encoding,
            SkycastError::Credentials(_) => FailureKind::Credentials,
            SkycastError::InvalidInput(_) => FailureKind::InvalidInput,
        }
    }

    /// Returns true when the caller should prompt for a fresh login
    pub fn requires_login(&self) -> bool {
        matches!(self, SkycastError::Auth(AuthError::Required(_)))
    }
}

/// Coarse failure classification exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Config,
    Auth,
    AuthRequired,
    Network,
    Upload,
    Post,
    Decoding,
    Encoding,
    Credentials,
    InvalidInput,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Config => "config",
            FailureKind::Auth => "auth",
            FailureKind::AuthRequired => "auth_required",
            FailureKind::Network => "network",
            FailureKind::Upload => "upload",
            FailureKind::Post => "post",
            FailureKind::Decoding => "decoding",
            FailureKind::Encoding => "encoding",
            FailureKind::Credentials => "credentials",
            FailureKind::InvalidInput => "invalid_input",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("credentials rejected: {0}")]
    Rejected(String),

    #[error("no session to refresh")]
    NoSession,

    #[error("login required: {0}")]
    Required(String),

    #[error("malformed session response: {0}")]
    MalformedResponse(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to (de)serialize credentials: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Refusing to use credential file '{}': it is a symbolic link", .0.display())]
    Symlink(PathBuf),
}

/// Failure of a single remote call, before it is mapped to a pipeline error kind
///
/// Transports return this; the session store and posting pipeline translate it
/// into a [`SkycastError`] according to which call failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// No response was received (connect, DNS, TLS, timeout)
    #[error("request failed: {0}")]
    Network(String),

    /// The server answered with a non-success status
    #[error("{}", format_status(*status, error.as_deref(), message.as_deref()))]
    Status {
        status: u16,
        error: Option<String>,
        message: Option<String>,
    },

    /// The body could not be decoded into the expected shape
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The body decoded but a required field was absent or empty
    #[error("response is missing `{0}`")]
    MissingField(&'static str),
}

/// XRPC error codes that mean the bearer token is no longer usable
const AUTH_ERROR_CODES: &[&str] = &[
    "ExpiredToken",
    "InvalidToken",
    "AuthenticationRequired",
    "AuthMissing",
];

impl ApiError {
    /// Whether the server rejected the request's credentials
    pub fn is_auth_rejection(&self) -> bool {
        match self {
            ApiError::Status { status, error, .. } => {
                matches!(status, 401 | 403)
                    || error
                        .as_deref()
                        .is_some_and(|code| AUTH_ERROR_CODES.contains(&code))
            }
            _ => false,
        }
    }
}

fn format_status(status: u16, error: Option<&str>, message: Option<&str>) -> String {
    match (error, message) {
        (Some(error), Some(message)) => format!("HTTP {}: {}: {}", status, error, message),
        (Some(error), None) => format!("HTTP {}: {}", status, error),
        (None, Some(message)) => format!("HTTP {}: {}", status, message),
        (None, None) => format!("HTTP {}", status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16, error: Option<&str>) -> ApiError {
        ApiError::Status {
            status,
            error: error.map(str::to_string),
            message: None,
        }
    }

    #[test]
    fn test_kind_auth_required() {
        let error = SkycastError::Auth(AuthError::Required("token expired".to_string()));
        assert_eq!(error.kind(), FailureKind::AuthRequired);
        assert!(error.requires_login());
    }

    #[test]
    fn test_kind_other_auth_errors() {
        let error = SkycastError::Auth(AuthError::NoSession);
        assert_eq!(error.kind(), FailureKind::Auth);
        assert!(!error.requires_login());
    }

    #[test]
    fn test_kind_per_variant() {
        assert_eq!(SkycastError::Upload("x".into()).kind(), FailureKind::Upload);
        assert_eq!(SkycastError::Post("x".into()).kind(), FailureKind::Post);
        assert_eq!(SkycastError::Decoding("x".into()).kind(), FailureKind::Decoding);
        assert_eq!(SkycastError::Network("x".into()).kind(), FailureKind::Network);
        assert_eq!(
            SkycastError::InvalidInput("x".into()).kind(),
            FailureKind::InvalidInput
        );
    }

    #[test]
    fn test_failure_kind_display() {
        assert_eq!(FailureKind::AuthRequired.to_string(), "auth_required");
        assert_eq!(FailureKind::Upload.to_string(), "upload");
    }

    #[test]
    fn test_error_message_formatting_auth() {
        let error = SkycastError::Auth(AuthError::Rejected("HTTP 401".to_string()));
        assert_eq!(
            error.to_string(),
            "Authentication error: credentials rejected: HTTP 401"
        );
    }

    #[test]
    fn test_error_message_formatting_config() {
        let error = SkycastError::Config(ConfigError::MissingField("service.base_url".into()));
        assert_eq!(
            error.to_string(),
            "Configuration error: Missing required field: service.base_url"
        );
    }

    #[test]
    fn test_status_display_includes_xrpc_error() {
        let error = ApiError::Status {
            status: 400,
            error: Some("InvalidRequest".to_string()),
            message: Some("bad record".to_string()),
        };
        assert_eq!(error.to_string(), "HTTP 400: InvalidRequest: bad record");
        assert_eq!(status(502, None).to_string(), "HTTP 502");
    }

    #[test]
    fn test_auth_rejection_by_status() {
        assert!(status(401, None).is_auth_rejection());
        assert!(status(403, None).is_auth_rejection());
        assert!(!status(500, None).is_auth_rejection());
    }

    #[test]
    fn test_auth_rejection_by_xrpc_code() {
        assert!(status(400, Some("ExpiredToken")).is_auth_rejection());
        assert!(status(400, Some("InvalidToken")).is_auth_rejection());
        assert!(!status(400, Some("InvalidRequest")).is_auth_rejection());
    }

    #[test]
    fn test_non_status_errors_are_not_auth_rejections() {
        assert!(!ApiError::Network("timeout".into()).is_auth_rejection());
        assert!(!ApiError::MissingField("uri").is_auth_rejection());
    }

    #[test]
    fn test_error_conversion_from_auth_error() {
        let error: SkycastError = AuthError::NoSession.into();
        match error {
            SkycastError::Auth(AuthError::NoSession) => {}
            _ => panic!("Expected SkycastError::Auth"),
        }
    }
}
