//! HTTP transport abstraction.
//!
//! Every network call in the crate goes through [`HttpTransport`]:
//! - [`ReqwestTransport`] for real backends
//! - [`MockTransport`] for tests and offline runs

pub mod mock;
pub mod reqwest_transport;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{Result, SyncError};

pub use mock::{MockResponse, MockTransport};
pub use reqwest_transport::ReqwestTransport;

/// HTTP methods used by the staff API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

/// One part of a multipart upload
#[derive(Debug, Clone)]
pub enum MultipartField {
    Text { name: String, value: String },
    File {
        name: String,
        file_name: String,
        mime_type: String,
        bytes: Vec<u8>,
    },
}

/// Request body
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
    Multipart(Vec<MultipartField>),
}

/// Outgoing request
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    /// Bearer value without the `Bearer ` prefix
    pub bearer: Option<String>,
    pub csrf_token: Option<String>,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            bearer: None,
            csrf_token: None,
            body: RequestBody::Empty,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn with_bearer(mut self, bearer: Option<String>) -> Self {
        self.bearer = bearer;
        self
    }

    pub fn with_csrf(mut self, token: Option<String>) -> Self {
        self.csrf_token = token;
        self
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// Path component of the URL, used for logging and mock routing.
    pub fn path(&self) -> String {
        url::Url::parse(&self.url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| self.url.clone())
    }
}

/// Response as seen by the sync layer
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Error body shapes the backend is known to produce
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorDetail {
    /// Most specific human-readable message in the body.
    pub fn summary(&self) -> Option<String> {
        let detail = self.detail.as_ref().and_then(|d| match d {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        });
        detail
            .or_else(|| self.message.clone())
            .or_else(|| self.error.clone())
            .filter(|s| !s.trim().is_empty())
    }
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type: None,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        if self.body.is_empty() {
            return Ok(serde_json::from_str("null")?);
        }
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Parsed error body; an unparseable body degrades to the empty detail.
    pub fn error_detail(&self) -> ErrorDetail {
        serde_json::from_slice(&self.body).unwrap_or_default()
    }

    /// Map a non-success response to the error taxonomy.
    pub fn into_error(self) -> SyncError {
        if self.status == 401 {
            return SyncError::CredentialExpired;
        }
        let message = self
            .error_detail()
            .summary()
            .unwrap_or_else(|| format!("request failed with status {}", self.status));
        SyncError::Server {
            status: self.status,
            message,
        }
    }

    /// Pass success through, convert anything else to an error.
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(self.into_error())
        }
    }
}

/// Sends staff API requests
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send a request; only transport-level failures are errors.
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse>;
}
