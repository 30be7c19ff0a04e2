//! reqwest-backed transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, multipart, Client};
use tracing::debug;

use super::{ApiRequest, ApiResponse, HttpTransport, Method, MultipartField, RequestBody};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};

/// Header carrying the CSRF token
pub const CSRF_HEADER: &str = "X-CSRFToken";

/// HTTP transport over reqwest
///
/// Keeps a cookie store so session cookies travel with every request, the
/// way a browser sends credentials on cross-origin calls.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport with the configured timeout.
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| SyncError::Configuration(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, &request.url);
        if let Some(ref token) = request.bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(ref csrf) = request.csrf_token {
            builder = builder.header(CSRF_HEADER, csrf);
        }

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Form(fields) => builder.form(&fields),
            RequestBody::Multipart(fields) => builder.multipart(build_form(fields)?),
        };

        debug!(method = request.method.as_str(), url = %request.url, "Sending request");
        let response = builder.send().await?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();

        Ok(ApiResponse {
            status,
            content_type,
            body,
        })
    }
}

fn build_form(fields: Vec<MultipartField>) -> Result<multipart::Form> {
    let mut form = multipart::Form::new();
    for field in fields {
        form = match field {
            MultipartField::Text { name, value } => form.text(name, value),
            MultipartField::File {
                name,
                file_name,
                mime_type,
                bytes,
            } => {
                let part = multipart::Part::bytes(bytes)
                    .file_name(file_name)
                    .mime_str(&mime_type)?;
                form.part(name, part)
            }
        };
    }
    Ok(form)
}
