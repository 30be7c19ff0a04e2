//! HTTP client for the garden staff API

use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::fields::{FieldMap, PHOTO_FIELDS, SECTOR_FIELDS, SPECIES_FIELDS};
use super::models::*;
use crate::config::SyncConfig;
use crate::credential::{Credential, CredentialResolver};
use crate::endpoint::BaseUrl;
use crate::error::Result;
use crate::transport::{
    ApiRequest, ApiResponse, HttpTransport, Method, MultipartField, RequestBody,
};

/// Keys under which list endpoints sometimes wrap their items
const LIST_ENVELOPES: &[&str] = &["results", "items", "data"];

/// Client for the staff endpoints
///
/// The credential is resolved again for every request: the session
/// credential set with [`set_session_credential`](Self::set_session_credential)
/// wins, then cookies, then the persistent store.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use garden_sync::{GardenApiClient, ReqwestTransport, SyncConfig, NetworkContext, Protocol};
///
/// # async fn example() -> garden_sync::Result<()> {
/// let config = SyncConfig::from_env();
/// let base_url = config
///     .endpoint_resolver()
///     .resolve(&NetworkContext::new("localhost", Protocol::Http))?;
/// let transport = Arc::new(ReqwestTransport::new(&config)?);
///
/// let client = GardenApiClient::new(transport, base_url, config);
/// let species = client.list_species().await?;
/// # Ok(())
/// # }
/// ```
pub struct GardenApiClient {
    transport: Arc<dyn HttpTransport>,
    base_url: BaseUrl,
    credentials: CredentialResolver,
    session: RwLock<Option<Credential>>,
    config: SyncConfig,
}

impl GardenApiClient {
    /// Create a client with no cookie or persistent credential sources.
    pub fn new(transport: Arc<dyn HttpTransport>, base_url: BaseUrl, config: SyncConfig) -> Self {
        let credentials = CredentialResolver::new(&config);
        Self::with_credentials(transport, base_url, credentials, config)
    }

    pub fn with_credentials(
        transport: Arc<dyn HttpTransport>,
        base_url: BaseUrl,
        credentials: CredentialResolver,
        config: SyncConfig,
    ) -> Self {
        Self {
            transport,
            base_url,
            credentials,
            session: RwLock::new(None),
            config,
        }
    }

    pub fn base_url(&self) -> &BaseUrl {
        &self.base_url
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn transport(&self) -> Arc<dyn HttpTransport> {
        self.transport.clone()
    }

    /// Set or clear the credential held by the live session.
    pub fn set_session_credential(&self, credential: Option<Credential>) {
        let mut session = self.session.write().unwrap_or_else(|e| e.into_inner());
        *session = credential;
    }

    /// Credential that the next request will present.
    pub fn credential(&self) -> Option<Credential> {
        if self.config.auth_bypass {
            return None;
        }
        let session = self.session.read().unwrap_or_else(|e| e.into_inner());
        self.credentials.resolve(session.as_ref())
    }

    /// Build an authenticated request for an API path.
    pub fn request(&self, method: Method, path: &str) -> ApiRequest {
        ApiRequest::new(method, self.base_url.join(path))
            .with_bearer(self.credential().map(|c| c.value().to_string()))
            .with_csrf(self.credentials.csrf_token())
    }

    /// Send a request; non-success statuses are returned, not raised.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.transport.send(request).await
    }

    async fn send_checked(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.send(request).await?.error_for_status()
    }

    // ==================== Species ====================

    pub async fn list_species(&self) -> Result<Vec<Species>> {
        let response = self.send_checked(self.request(Method::Get, "/species/staff")).await?;
        decode_list(&response, &SPECIES_FIELDS)
    }

    pub async fn create_species(&self, draft: &SpeciesDraft) -> Result<Species> {
        let request = self
            .request(Method::Post, "/species/staff")
            .with_body(RequestBody::Json(serde_json::to_value(draft)?));
        let response = self.send_checked(request).await?;
        decode_one(&response, &SPECIES_FIELDS)
    }

    pub async fn update_species(&self, id: SpeciesId, draft: &SpeciesDraft) -> Result<Species> {
        let request = self
            .request(Method::Put, &format!("/species/staff/{}", id))
            .with_body(RequestBody::Json(serde_json::to_value(draft)?));
        let response = self.send_checked(request).await?;
        decode_one(&response, &SPECIES_FIELDS)
    }

    pub async fn delete_species(&self, id: SpeciesId) -> Result<()> {
        self.send_checked(self.request(Method::Delete, &format!("/species/staff/{}", id)))
            .await?;
        Ok(())
    }

    // ==================== Sectors ====================

    pub async fn list_sectors(&self) -> Result<Vec<Sector>> {
        let response = self.send_checked(self.request(Method::Get, "/sectors/staff")).await?;
        decode_list(&response, &SECTOR_FIELDS)
    }

    /// Update a sector's own fields. Species membership is written separately
    /// through the gated association client.
    pub async fn update_sector(&self, id: SectorId, update: &SectorUpdate) -> Result<()> {
        let request = self
            .request(Method::Put, &format!("/sectors/staff/{}", id))
            .with_body(RequestBody::Json(serde_json::to_value(update)?));
        self.send_checked(request).await?;
        Ok(())
    }

    // ==================== Photos ====================

    pub async fn list_photos(&self, entity: EntityType, entity_id: i64) -> Result<Vec<Photo>> {
        let path = format!("/photos/{}/{}", entity.as_path(), entity_id);
        let response = self.send_checked(self.request(Method::Get, &path)).await?;
        decode_list(&response, &PHOTO_FIELDS)
    }

    pub async fn upload_photo(
        &self,
        entity: EntityType,
        entity_id: i64,
        upload: PhotoUpload,
    ) -> Result<Photo> {
        let path = format!("/photos/{}/{}", entity.as_path(), entity_id);
        let fields = vec![
            MultipartField::File {
                name: "file".to_string(),
                file_name: upload.file_name,
                mime_type: upload.mime_type,
                bytes: upload.bytes,
            },
            MultipartField::Text {
                name: "is_cover".to_string(),
                value: upload.is_cover.to_string(),
            },
        ];
        let request = self
            .request(Method::Post, &path)
            .with_body(RequestBody::Multipart(fields));
        let response = self.send_checked(request).await?;
        decode_one(&response, &PHOTO_FIELDS)
    }

    pub async fn set_cover(&self, photo_id: PhotoId, is_cover: bool) -> Result<()> {
        let request = self
            .request(Method::Put, &format!("/photos/{}", photo_id))
            .with_body(RequestBody::Form(vec![(
                "is_cover".to_string(),
                is_cover.to_string(),
            )]));
        self.send_checked(request).await?;
        Ok(())
    }

    pub async fn delete_photo(&self, photo_id: PhotoId) -> Result<()> {
        self.send_checked(self.request(Method::Delete, &format!("/photos/{}", photo_id)))
            .await?;
        Ok(())
    }
}

fn decode_one<T: DeserializeOwned>(response: &ApiResponse, map: &FieldMap) -> Result<T> {
    let value: Value = response.json()?;
    Ok(serde_json::from_value(map.canonicalize(value))?)
}

fn decode_list<T: DeserializeOwned>(response: &ApiResponse, map: &FieldMap) -> Result<Vec<T>> {
    let value = match response.json::<Value>()? {
        Value::Object(mut envelope) => LIST_ENVELOPES
            .iter()
            .find_map(|key| envelope.remove(*key))
            .unwrap_or(Value::Array(Vec::new())),
        Value::Null => Value::Array(Vec::new()),
        other => other,
    };
    Ok(serde_json::from_value(map.canonicalize(value))?)
}
