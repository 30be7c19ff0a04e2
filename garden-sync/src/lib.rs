//! Garden Sync - staff console data layer for the botanical garden API
//!
//! Everything the console needs to talk to the backend without assuming the
//! backend is on the same version:
//!
//! - **Endpoint resolution**: pick the API base URL from where the console runs
//! - **Credentials**: bearer token from the session, cookies or a local store
//! - **Protected resources**: fetch authenticated images into local blob handles
//! - **Association sync**: sector ↔ species writes gated on endpoint availability
//!
//! ```no_run
//! use std::sync::Arc;
//! use garden_sync::{
//!     AssociationSession, AssociationSyncClient, AvailabilityStore, GardenApiClient,
//!     NetworkContext, ReqwestTransport, SectorId, SyncConfig,
//! };
//!
//! # async fn example() -> garden_sync::Result<()> {
//! let config = SyncConfig::from_env();
//! let base_url = config.endpoint_resolver().resolve(&NetworkContext::detached())?;
//! let transport = Arc::new(ReqwestTransport::new(&config)?);
//! let api = Arc::new(GardenApiClient::new(transport, base_url, config));
//!
//! let sync = AssociationSyncClient::new(api, Arc::new(AvailabilityStore::new()));
//! let session = AssociationSession::new();
//! sync.fetch_associations(&session, SectorId(3)).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod credential;
pub mod endpoint;
pub mod error;
pub mod resource;
pub mod sync;
pub mod transport;

pub use api::{
    EntityType, GardenApiClient, Photo, PhotoId, PhotoUpload, Sector, SectorId, SectorUpdate,
    Species, SpeciesDraft, SpeciesId,
};
pub use config::SyncConfig;
pub use credential::{
    CookieSource, Credential, CredentialResolver, CredentialSource, FileStore, KeyValueStore, MemoryStore,
    StaticCookies,
};
pub use endpoint::{BaseUrl, EndpointResolver, Location, NetworkContext, Protocol, Resolution};
pub use error::{Result, SyncError};
pub use resource::{BlobHandle, BlobRegistry, LoadError, ResourceLoader, ResourceStatus, ResourceView};
pub use sync::{
    AssociationSession, AssociationSet, AssociationSyncClient, AvailabilityStore,
    EndpointAvailability, FetchOutcome, SaveReport, SecondarySync, SyncStatus,
};
pub use transport::{
    ApiRequest, ApiResponse, HttpTransport, Method, MockResponse, MockTransport, RequestBody,
    ReqwestTransport,
};
