//! Authenticated loading of protected images
//!
//! Protected resources live under a path prefix on the backend and need the
//! bearer credential, so they cannot be handed to a renderer as plain URLs.
//! [`ResourceLoader`] fetches them and turns the body into a local
//! [`BlobHandle`] (`blob:garden/<uuid>`), which must be released when the
//! consumer moves to another locator or goes away.
//!
//! Each loader tracks a generation counter. A response whose generation no
//! longer matches the loader's current one is dropped without creating a
//! handle.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::config::SyncConfig;
use crate::credential::Credential;
use crate::endpoint::BaseUrl;
use crate::error::SyncError;
use crate::transport::{ApiRequest, ApiResponse, HttpTransport};

/// Prefix of every handle URI minted by a [`BlobRegistry`]
pub const BLOB_URI_PREFIX: &str = "blob:garden/";

/// Why a protected resource failed to load
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// 401: the credential was rejected. Navigation is the caller's call.
    #[error("credential rejected while loading resource")]
    CredentialRejected,

    #[error("resource request failed with status {0}")]
    Http(u16),

    #[error("network error: {0}")]
    Network(String),
}

/// Binary payload behind a handle
#[derive(Debug, Clone)]
pub struct Blob {
    pub bytes: Arc<Vec<u8>>,
    pub content_type: Option<String>,
}

/// Handle accounting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandleStats {
    pub created: u64,
    pub released: u64,
}

impl HandleStats {
    pub fn live(&self) -> u64 {
        self.created - self.released
    }
}

#[derive(Default)]
struct RegistryInner {
    blobs: HashMap<String, Blob>,
    stats: HandleStats,
}

/// Process-wide store of local blob handles
#[derive(Clone, Default)]
pub struct BlobRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl BlobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `bytes` and mint an exclusively owned handle for them.
    pub fn create(&self, bytes: Vec<u8>, content_type: Option<String>) -> BlobHandle {
        let uri = format!("{}{}", BLOB_URI_PREFIX, uuid::Uuid::new_v4());
        let mut inner = self.lock();
        inner.blobs.insert(
            uri.clone(),
            Blob {
                bytes: Arc::new(bytes),
                content_type,
            },
        );
        inner.stats.created += 1;
        BlobHandle {
            uri,
            registry: self.clone(),
            released: false,
        }
    }

    /// Look up a live handle by URI.
    pub fn get(&self, uri: &str) -> Option<Blob> {
        self.lock().blobs.get(uri).cloned()
    }

    pub fn stats(&self) -> HandleStats {
        self.lock().stats
    }

    fn release(&self, uri: &str) {
        let mut inner = self.lock();
        if inner.blobs.remove(uri).is_some() {
            inner.stats.released += 1;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for BlobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobRegistry").field("stats", &self.stats()).finish()
    }
}

/// Exclusively owned local reference to a fetched blob
///
/// Released exactly once: explicitly through [`release`](Self::release) or
/// when dropped.
pub struct BlobHandle {
    uri: String,
    registry: BlobRegistry,
    released: bool,
}

impl BlobHandle {
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn blob(&self) -> Option<Blob> {
        self.registry.get(&self.uri)
    }

    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.registry.release(&self.uri);
        }
    }
}

impl Drop for BlobHandle {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl fmt::Debug for BlobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobHandle").field("uri", &self.uri).finish()
    }
}

/// How a locator is displayed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocatorKind {
    /// Must be fetched with the credential; holds the absolute URL
    Protected(String),
    /// Usable as-is
    Direct(String),
}

/// Classify a locator against the backend and its protected path prefix.
pub fn classify(locator: &str, base_url: &BaseUrl, protected_prefix: &str) -> LocatorKind {
    let prefix = format!("/{}", protected_prefix.trim_start_matches('/'));

    if let Ok(url) = Url::parse(locator) {
        let protected = Url::parse(base_url.as_str())
            .map(|base| {
                let base_path = base.path().trim_end_matches('/');
                url.scheme() == base.scheme()
                    && url.host_str() == base.host_str()
                    && url.port_or_known_default() == base.port_or_known_default()
                    && url.path().starts_with(&format!("{}{}", base_path, prefix))
            })
            .unwrap_or(false);
        return if protected {
            LocatorKind::Protected(locator.to_string())
        } else {
            LocatorKind::Direct(locator.to_string())
        };
    }

    let path = format!("/{}", locator.trim_start_matches('/'));
    if path.starts_with(&prefix) {
        LocatorKind::Protected(base_url.join(&path))
    } else {
        LocatorKind::Direct(locator.to_string())
    }
}

/// Load state of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceStatus {
    Pending,
    Ready,
    Failed,
}

/// A resource owned by one loader
#[derive(Debug)]
pub struct RemoteResource {
    pub locator: String,
    pub status: ResourceStatus,
    handle: Option<BlobHandle>,
    direct_url: Option<String>,
    error: Option<LoadError>,
}

impl RemoteResource {
    fn pending(locator: &str) -> Self {
        Self {
            locator: locator.to_string(),
            status: ResourceStatus::Pending,
            handle: None,
            direct_url: None,
            error: None,
        }
    }

    pub fn handle(&self) -> Option<&BlobHandle> {
        self.handle.as_ref()
    }

    /// What to hand the renderer: the handle URI or the direct URL.
    pub fn src(&self) -> Option<&str> {
        self.handle
            .as_ref()
            .map(BlobHandle::uri)
            .or(self.direct_url.as_deref())
    }

    fn view(&self) -> ResourceView {
        ResourceView {
            locator: self.locator.clone(),
            status: self.status,
            src: self.src().map(str::to_string),
            error: self.error.clone(),
        }
    }
}

/// Snapshot of a loader's current resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceView {
    pub locator: String,
    pub status: ResourceStatus,
    pub src: Option<String>,
    pub error: Option<LoadError>,
}

/// In-flight protected fetch
#[derive(Debug, Clone)]
pub struct LoadTicket {
    generation: u64,
    pub locator: String,
    pub request: ApiRequest,
}

/// Result of starting a load
#[derive(Debug, Clone)]
pub enum LoadStep {
    /// Nothing to fetch; the view is final
    Done(ResourceView),
    /// Fetch `ticket.request`, then call [`ResourceLoader::complete`]
    Fetch(LoadTicket),
}

type ErrorCallback = Arc<dyn Fn(&str, &LoadError) + Send + Sync>;

#[derive(Default)]
struct LoaderState {
    generation: u64,
    current: Option<RemoteResource>,
    torn_down: bool,
}

/// Loads protected images for a single consumer
pub struct ResourceLoader {
    transport: Arc<dyn HttpTransport>,
    registry: BlobRegistry,
    base_url: BaseUrl,
    protected_prefix: String,
    state: Mutex<LoaderState>,
    on_error: Option<ErrorCallback>,
}

impl ResourceLoader {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        registry: BlobRegistry,
        base_url: BaseUrl,
        config: &SyncConfig,
    ) -> Self {
        Self {
            transport,
            registry,
            base_url,
            protected_prefix: config.protected_prefix.clone(),
            state: Mutex::new(LoaderState::default()),
            on_error: None,
        }
    }

    /// Called with the locator and error whenever a load fails.
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &LoadError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// Current resource, if any.
    pub fn current(&self) -> Option<ResourceView> {
        self.lock().current.as_ref().map(RemoteResource::view)
    }

    /// Load `locator`, superseding whatever this loader held before.
    ///
    /// Returns `None` if another load or a teardown superseded this one
    /// before its response arrived.
    pub async fn load(&self, locator: &str, credential: Option<&Credential>) -> Option<ResourceView> {
        match self.begin(locator, credential) {
            LoadStep::Done(view) => Some(view),
            LoadStep::Fetch(ticket) => {
                let outcome = self.transport.send(ticket.request.clone()).await;
                self.complete(ticket, outcome)
            }
        }
    }

    /// Start a load: release the previous handle and classify the locator.
    pub fn begin(&self, locator: &str, credential: Option<&Credential>) -> LoadStep {
        let kind = classify(locator, &self.base_url, &self.protected_prefix);
        let mut state = self.lock();
        state.generation += 1;
        state.torn_down = false;
        // Dropping the previous resource releases its handle.
        state.current = None;

        match kind {
            LocatorKind::Direct(url) => {
                let resource = RemoteResource {
                    status: ResourceStatus::Ready,
                    direct_url: Some(url),
                    ..RemoteResource::pending(locator)
                };
                let view = resource.view();
                state.current = Some(resource);
                LoadStep::Done(view)
            }
            LocatorKind::Protected(url) => {
                state.current = Some(RemoteResource::pending(locator));
                let request = ApiRequest::get(url)
                    .with_bearer(credential.map(|c| c.value().to_string()));
                LoadStep::Fetch(LoadTicket {
                    generation: state.generation,
                    locator: locator.to_string(),
                    request,
                })
            }
        }
    }

    /// Apply a fetch outcome. Stale tickets are discarded and return `None`.
    pub fn complete(
        &self,
        ticket: LoadTicket,
        outcome: Result<ApiResponse, SyncError>,
    ) -> Option<ResourceView> {
        let (view, failure) = {
            let mut state = self.lock();
            if state.torn_down || ticket.generation != state.generation {
                debug!(locator = %ticket.locator, "Discarding superseded resource response");
                return None;
            }

            let resource = match outcome {
                Ok(response) if response.is_success() => {
                    let handle = self.registry.create(response.body, response.content_type);
                    RemoteResource {
                        status: ResourceStatus::Ready,
                        handle: Some(handle),
                        ..RemoteResource::pending(&ticket.locator)
                    }
                }
                Ok(response) => {
                    let error = if response.status == 401 {
                        LoadError::CredentialRejected
                    } else {
                        LoadError::Http(response.status)
                    };
                    failed(&ticket.locator, error)
                }
                Err(e) => failed(&ticket.locator, LoadError::Network(e.to_string())),
            };

            let view = resource.view();
            let failure = resource.error.clone();
            state.current = Some(resource);
            (view, failure)
        };

        if let Some(error) = failure {
            warn!(locator = %ticket.locator, error = %error, "Protected resource failed to load");
            if let Some(callback) = &self.on_error {
                callback(&ticket.locator, &error);
            }
        }
        Some(view)
    }

    /// Release the held handle and ignore any in-flight response.
    pub fn teardown(&self) {
        let mut state = self.lock();
        state.generation += 1;
        state.torn_down = true;
        state.current = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LoaderState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn failed(locator: &str, error: LoadError) -> RemoteResource {
    RemoteResource {
        status: ResourceStatus::Failed,
        error: Some(error),
        ..RemoteResource::pending(locator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockResponse, MockTransport, Method};

    fn base() -> BaseUrl {
        BaseUrl::new("https://api.jardinbotanico.org")
    }

    fn loader(mock: Arc<MockTransport>, registry: BlobRegistry) -> ResourceLoader {
        ResourceLoader::new(mock, registry, base(), &SyncConfig::default())
    }

    #[test]
    fn test_classify() {
        let prefix = "/photos/file/";
        assert_eq!(
            classify("https://api.jardinbotanico.org/photos/file/a.jpg", &base(), prefix),
            LocatorKind::Protected("https://api.jardinbotanico.org/photos/file/a.jpg".into())
        );
        assert_eq!(
            classify("https://cdn.example.org/photos/file/a.jpg", &base(), prefix),
            LocatorKind::Direct("https://cdn.example.org/photos/file/a.jpg".into())
        );
        assert_eq!(
            classify("/photos/file/b.jpg", &base(), prefix),
            LocatorKind::Protected("https://api.jardinbotanico.org/photos/file/b.jpg".into())
        );
        assert_eq!(
            classify("photos/file/b.jpg", &base(), prefix),
            LocatorKind::Protected("https://api.jardinbotanico.org/photos/file/b.jpg".into())
        );
        assert_eq!(
            classify("/static/logo.png", &base(), prefix),
            LocatorKind::Direct("/static/logo.png".into())
        );
    }

    #[test]
    fn test_classify_respects_base_path() {
        let base = BaseUrl::new("http://localhost:8000/api/");
        assert!(matches!(
            classify("http://localhost:8000/api/photos/file/x.png", &base, "/photos/file/"),
            LocatorKind::Protected(_)
        ));
        assert!(matches!(
            classify("http://localhost:8000/photos/file/x.png", &base, "/photos/file/"),
            LocatorKind::Direct(_)
        ));
    }

    #[test]
    fn test_handle_released_once() {
        let registry = BlobRegistry::new();
        let handle = registry.create(vec![1, 2, 3], Some("image/png".into()));
        assert!(handle.uri().starts_with(BLOB_URI_PREFIX));
        assert_eq!(handle.blob().unwrap().bytes.as_slice(), &[1, 2, 3]);

        handle.release();
        assert_eq!(registry.stats(), HandleStats { created: 1, released: 1 });
    }

    #[tokio::test]
    async fn test_protected_load_sends_credential() {
        let mock = Arc::new(MockTransport::new());
        mock.on(Method::Get, "/photos/file/a.jpg", MockResponse::bytes(200, vec![9, 9], "image/jpeg"));
        let registry = BlobRegistry::new();
        let loader = loader(mock.clone(), registry.clone());

        let credential = Credential::from_context("tok");
        let view = loader.load("/photos/file/a.jpg", Some(&credential)).await.unwrap();

        assert_eq!(view.status, ResourceStatus::Ready);
        let src = view.src.unwrap();
        assert!(src.starts_with(BLOB_URI_PREFIX));
        assert_eq!(registry.get(&src).unwrap().content_type.as_deref(), Some("image/jpeg"));
        assert_eq!(mock.requests()[0].bearer.as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn test_direct_locator_does_not_fetch() {
        let mock = Arc::new(MockTransport::new());
        let loader = loader(mock.clone(), BlobRegistry::new());

        let view = loader.load("https://cdn.example.org/x.jpg", None).await.unwrap();
        assert_eq!(view.status, ResourceStatus::Ready);
        assert_eq!(view.src.as_deref(), Some("https://cdn.example.org/x.jpg"));
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn test_unauthorized_reported_through_callback() {
        let mock = Arc::new(MockTransport::new());
        mock.on(Method::Get, "/photos/file/a.jpg", MockResponse::status(401));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let loader = loader(mock, BlobRegistry::new()).on_error(move |locator, error| {
            sink.lock().unwrap().push((locator.to_string(), error.clone()));
        });

        let view = loader.load("/photos/file/a.jpg", None).await.unwrap();
        assert_eq!(view.status, ResourceStatus::Failed);
        assert_eq!(view.src, None);
        assert_eq!(view.error, Some(LoadError::CredentialRejected));
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[("/photos/file/a.jpg".to_string(), LoadError::CredentialRejected)]
        );
    }

    #[test]
    fn test_stale_ticket_discarded() {
        let registry = BlobRegistry::new();
        let loader = loader(Arc::new(MockTransport::new()), registry.clone());

        let LoadStep::Fetch(first) = loader.begin("/photos/file/a.jpg", None) else {
            panic!("expected fetch");
        };
        let LoadStep::Fetch(second) = loader.begin("/photos/file/b.jpg", None) else {
            panic!("expected fetch");
        };

        assert!(loader
            .complete(first, Ok(ApiResponse::new(200, vec![1])))
            .is_none());
        assert_eq!(loader.current().unwrap().locator, "/photos/file/b.jpg");
        assert_eq!(loader.current().unwrap().status, ResourceStatus::Pending);

        let view = loader.complete(second, Ok(ApiResponse::new(200, vec![2]))).unwrap();
        assert_eq!(view.locator, "/photos/file/b.jpg");
        assert_eq!(registry.stats().created, 1);
    }

    #[test]
    fn test_teardown_drops_in_flight_and_releases() {
        let registry = BlobRegistry::new();
        let loader = loader(Arc::new(MockTransport::new()), registry.clone());

        let LoadStep::Fetch(ticket) = loader.begin("/photos/file/a.jpg", None) else {
            panic!("expected fetch");
        };
        loader.complete(ticket, Ok(ApiResponse::new(200, vec![1]))).unwrap();
        assert_eq!(registry.stats().live(), 1);

        let LoadStep::Fetch(ticket) = loader.begin("/photos/file/b.jpg", None) else {
            panic!("expected fetch");
        };
        assert_eq!(registry.stats().live(), 0);

        loader.teardown();
        assert!(loader.complete(ticket, Ok(ApiResponse::new(200, vec![2]))).is_none());
        assert_eq!(registry.stats(), HandleStats { created: 1, released: 1 });
        assert!(loader.current().is_none());
    }
}
