//! Core types for Skycast

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Session credentials for one account
///
/// This is the unit of persisted state. The login secret is never part of it.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    /// Handle or email used to log in
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Stable account identifier (DID)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

impl Credentials {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            ..Default::default()
        }
    }

    /// Holds iff both the access token and the account id are present and non-empty
    pub fn is_authenticated(&self) -> bool {
        non_empty(&self.access_token) && non_empty(&self.account_id)
    }

    pub fn has_refresh_token(&self) -> bool {
        non_empty(&self.refresh_token)
    }

    /// Replace both tokens after a refresh exchange
    pub fn rotate_tokens(&mut self, access_token: String, refresh_token: String) {
        self.access_token.zeroize();
        self.refresh_token.zeroize();
        self.access_token = Some(access_token);
        self.refresh_token = Some(refresh_token);
    }

    /// Overwrite token material in memory and drop it
    pub fn wipe(&mut self) {
        self.access_token.zeroize();
        self.refresh_token.zeroize();
        self.account_id = None;
    }
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("account_id", &self.account_id)
            .finish()
    }
}

/// Opaque server-issued handle to an uploaded blob
///
/// The JSON value is embedded verbatim in the record that references it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobRef(pub serde_json::Value);

/// Kind of rich-text annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    Tag,
}

/// A byte range over the UTF-8 post text carrying rich-text metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub byte_start: usize,
    pub byte_end: usize,
    pub kind: AnnotationKind,
    /// Display value, e.g. the tag name without `#`
    pub value: String,
}

impl Annotation {
    pub fn tag(byte_start: usize, byte_end: usize, value: impl Into<String>) -> Self {
        Self {
            byte_start,
            byte_end,
            kind: AnnotationKind::Tag,
            value: value.into(),
        }
    }
}

/// An uploaded image as it is embedded in a post
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedImage {
    pub blob: BlobRef,
    pub alt: String,
}

/// The post as it is sent to the server, built once per submission
#[derive(Debug, Clone, PartialEq)]
pub struct PostRecord {
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub annotations: Vec<Annotation>,
    pub images: Vec<EmbeddedImage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticated() -> Credentials {
        Credentials {
            identifier: "alice.example.com".to_string(),
            access_token: Some("access-secret".to_string()),
            refresh_token: Some("refresh-secret".to_string()),
            account_id: Some("did:plc:alice".to_string()),
        }
    }

    #[test]
    fn test_is_authenticated_requires_token_and_account() {
        assert!(authenticated().is_authenticated());

        let mut creds = authenticated();
        creds.account_id = None;
        assert!(!creds.is_authenticated());

        let mut creds = authenticated();
        creds.access_token = Some(String::new());
        assert!(!creds.is_authenticated());

        assert!(!Credentials::new("alice").is_authenticated());
    }

    #[test]
    fn test_refresh_token_alone_is_not_authenticated() {
        let creds = Credentials {
            refresh_token: Some("r".to_string()),
            ..Credentials::new("alice")
        };
        assert!(creds.has_refresh_token());
        assert!(!creds.is_authenticated());
    }

    #[test]
    fn test_rotate_tokens_replaces_both() {
        let mut creds = authenticated();
        creds.rotate_tokens("new-access".to_string(), "new-refresh".to_string());
        assert_eq!(creds.access_token.as_deref(), Some("new-access"));
        assert_eq!(creds.refresh_token.as_deref(), Some("new-refresh"));
        assert_eq!(creds.account_id.as_deref(), Some("did:plc:alice"));
    }

    #[test]
    fn test_wipe_drops_tokens() {
        let mut creds = authenticated();
        creds.wipe();
        assert_eq!(creds.access_token, None);
        assert_eq!(creds.refresh_token, None);
        assert!(!creds.is_authenticated());
        assert_eq!(creds.identifier, "alice.example.com");
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let debug = format!("{:?}", authenticated());
        assert!(!debug.contains("access-secret"));
        assert!(!debug.contains("refresh-secret"));
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains("did:plc:alice"));
    }

    #[test]
    fn test_credentials_serialization_skips_missing_tokens() {
        let json = serde_json::to_string(&Credentials::new("alice")).unwrap();
        assert_eq!(json, r#"{"identifier":"alice"}"#);

        let parsed: Credentials = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, Credentials::new("alice"));
    }

    #[test]
    fn test_blob_ref_is_transparent() {
        let value = serde_json::json!({"$type": "blob", "ref": {"$link": "bafk"}});
        let blob: BlobRef = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(serde_json::to_value(&blob).unwrap(), value);
    }
}
