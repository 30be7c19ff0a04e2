//! Sector ↔ species association sync
//!
//! - [`gate`]: per-session availability of endpoints the backend may lack
//! - [`state`]: the consumer's association set and its transitions
//! - [`client`]: reads and writes that degrade to local state on a 405

pub mod client;
pub mod gate;
pub mod state;

pub use client::{AssociationSyncClient, FetchOutcome, SaveReport, SecondarySync, LOCAL_ONLY_NOTICE};
pub use gate::{AvailabilityStore, EndpointAvailability, SECTOR_SPECIES_ENDPOINT};
pub use state::{
    transition, AssociationEvent, AssociationSession, AssociationSet, AssociationState,
    RequestToken, SyncStatus,
};
