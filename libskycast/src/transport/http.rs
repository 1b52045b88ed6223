//! XRPC over HTTPS, backed by reqwest

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::config::ServiceConfig;
use crate::error::{ApiError, ConfigError, Result};
use crate::transport::{
    ApiResult, ApiTransport, CreateRecordRequest, CreateRecordResponse, CreateSessionBody,
    SessionTokens, CREATE_RECORD, CREATE_SESSION, REFRESH_SESSION, UPLOAD_BLOB,
};
use crate::types::BlobRef;

/// Error body returned by XRPC endpoints on failure
#[derive(Debug, Default, Deserialize)]
struct XrpcErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct UploadBlobResponse {
    #[serde(default)]
    blob: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct RawCreateRecordResponse {
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    cid: Option<String>,
}

/// HTTP transport against one PDS base URL, e.g. `https://bsky.social/xrpc`
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(format!("skycast/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "service".to_string(),
                reason: format!("cannot build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, nsid: &str) -> String {
        format!("{}/{}", self.base_url, nsid)
    }

    /// Send the request and return the body of a 2xx response
    async fn send(&self, nsid: &str, request: RequestBuilder) -> ApiResult<Vec<u8>> {
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Network(format!("{}: {}", nsid, e)))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::Network(format!("{}: reading body: {}", nsid, e)))?;

        debug!(endpoint = nsid, status = status.as_u16(), "XRPC response");

        if !status.is_success() {
            return Err(status_error(status, &body));
        }
        Ok(body.to_vec())
    }
}

fn status_error(status: StatusCode, body: &[u8]) -> ApiError {
    let parsed: XrpcErrorBody = serde_json::from_slice(body).unwrap_or_default();
    ApiError::Status {
        status: status.as_u16(),
        error: parsed.error,
        message: parsed.message,
    }
}

fn decode<T: DeserializeOwned>(nsid: &str, body: &[u8]) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| ApiError::Malformed(format!("{}: {}", nsid, e)))
}

#[async_trait]
impl ApiTransport for HttpTransport {
    async fn create_session(&self, identifier: &str, secret: &str) -> ApiResult<SessionTokens> {
        debug!("Creating session for {}", identifier);
        let request = self
            .client
            .post(self.endpoint(CREATE_SESSION))
            .json(&CreateSessionBody {
                identifier,
                password: secret,
            });

        let body = self.send(CREATE_SESSION, request).await?;
        decode(CREATE_SESSION, &body)
    }

    async fn refresh_session(&self, refresh_token: &str) -> ApiResult<SessionTokens> {
        let request = self
            .client
            .post(self.endpoint(REFRESH_SESSION))
            .header(AUTHORIZATION, format!("Bearer {}", refresh_token));

        let body = self.send(REFRESH_SESSION, request).await?;
        decode(REFRESH_SESSION, &body)
    }

    async fn upload_blob(&self, access_token: &str, bytes: Vec<u8>) -> ApiResult<BlobRef> {
        debug!("Uploading blob of {} bytes", bytes.len());
        let request = self
            .client
            .post(self.endpoint(UPLOAD_BLOB))
            .header(AUTHORIZATION, format!("Bearer {}", access_token))
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(bytes);

        let body = self.send(UPLOAD_BLOB, request).await?;
        let response: UploadBlobResponse = decode(UPLOAD_BLOB, &body)?;
        match response.blob {
            Some(blob) if !blob.is_null() => Ok(BlobRef(blob)),
            _ => Err(ApiError::MissingField("blob")),
        }
    }

    async fn create_record(
        &self,
        access_token: &str,
        request: &CreateRecordRequest,
    ) -> ApiResult<CreateRecordResponse> {
        let http_request = self
            .client
            .post(self.endpoint(CREATE_RECORD))
            .header(AUTHORIZATION, format!("Bearer {}", access_token))
            .json(request);

        let body = self.send(CREATE_RECORD, http_request).await?;
        let response: RawCreateRecordResponse = decode(CREATE_RECORD, &body)?;
        match response.uri {
            Some(uri) if !uri.is_empty() => Ok(CreateRecordResponse {
                uri,
                cid: response.cid,
            }),
            _ => Err(ApiError::MissingField("uri")),
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_base_url() {
        let config = ServiceConfig {
            base_url: "https://pds.example.com/xrpc/".to_string(),
            timeout_secs: 5,
        };
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(transport.base_url(), "https://pds.example.com/xrpc");
        assert_eq!(
            transport.endpoint(CREATE_SESSION),
            "https://pds.example.com/xrpc/com.atproto.server.createSession"
        );
    }

    #[test]
    fn test_status_error_parses_xrpc_body() {
        let body = br#"{"error":"ExpiredToken","message":"Token has expired"}"#;
        let error = status_error(StatusCode::BAD_REQUEST, body);
        assert_eq!(
            error,
            ApiError::Status {
                status: 400,
                error: Some("ExpiredToken".to_string()),
                message: Some("Token has expired".to_string()),
            }
        );
        assert!(error.is_auth_rejection());
    }

    #[test]
    fn test_status_error_tolerates_non_json_body() {
        let error = status_error(StatusCode::BAD_GATEWAY, b"<html>bad gateway</html>");
        assert_eq!(
            error,
            ApiError::Status {
                status: 502,
                error: None,
                message: None,
            }
        );
    }

    #[test]
    fn test_decode_reports_malformed() {
        let result: ApiResult<SessionTokens> = decode(CREATE_SESSION, b"{\"did\": 1}");
        assert!(matches!(result, Err(ApiError::Malformed(_))));
    }
}
