//! Gated client for sector ↔ species associations
//!
//! The association endpoints may be missing on the deployed backend. A 405
//! from either of them means "not deployed yet": the gate flips to
//! `Unavailable`, the user's selection is kept in memory as `LocalOnly`, and
//! no further calls are made for the rest of the session. Any other write
//! failure is a real failure and is returned to the caller.
//!
//! Failed reads are not retried; the state shows `Unknown` until the
//! consumer asks again.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use super::gate::{AvailabilityStore, EndpointAvailability, SECTOR_SPECIES_ENDPOINT};
use super::state::{AssociationEvent, AssociationSession};
use crate::api::{member_ids, GardenApiClient, SectorId, SectorUpdate, SpeciesId};
use crate::error::{Result, SyncError};
use crate::transport::{Method, RequestBody};

/// Shown when the primary save worked but the species set stayed local
pub const LOCAL_ONLY_NOTICE: &str =
    "Sector saved. Species assignments are kept locally until the server supports saving them.";

/// Result of a read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Server set applied
    Synced(BTreeSet<SpeciesId>),
    /// Gate is closed; no request was sent
    Skipped,
    /// Endpoint missing (405); gate closed now
    VersionSkew,
    /// Read failed; local members kept, status `Unknown`
    Failed(String),
    /// Answer arrived after the consumer moved on and was dropped
    Superseded,
}

/// What happened to the association write after the primary save
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecondarySync {
    Synced,
    LocalOnly { notice: String },
}

/// Outcome of a save; returned only when the primary save succeeded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub owner_id: SectorId,
    pub associations: SecondarySync,
}

impl SaveReport {
    fn local_only(owner_id: SectorId) -> Self {
        Self {
            owner_id,
            associations: SecondarySync::LocalOnly {
                notice: LOCAL_ONLY_NOTICE.to_string(),
            },
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.associations, SecondarySync::LocalOnly { .. })
    }
}

/// Feature-gated association client
pub struct AssociationSyncClient {
    api: Arc<GardenApiClient>,
    gates: Arc<AvailabilityStore>,
}

impl AssociationSyncClient {
    pub fn new(api: Arc<GardenApiClient>, gates: Arc<AvailabilityStore>) -> Self {
        Self { api, gates }
    }

    pub fn availability(&self) -> EndpointAvailability {
        self.gates.get(SECTOR_SPECIES_ENDPOINT)
    }

    /// Read the species set of `owner` into `session`.
    ///
    /// Selects `owner` in the session first. With the gate closed this is a
    /// no-op that leaves the in-memory set untouched.
    pub async fn fetch_associations(
        &self,
        session: &AssociationSession,
        owner: SectorId,
    ) -> Result<FetchOutcome> {
        let token = session.token_for(owner);

        if self.availability() == EndpointAvailability::Unavailable {
            debug!(owner = %owner, "Association endpoint gated, skipping read");
            return Ok(FetchOutcome::Skipped);
        }

        let request = self.api.request(Method::Get, &association_path(owner));
        let response = match self.api.send(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(owner = %owner, error = %e, "Association read failed");
                session.dispatch(AssociationEvent::FetchFailed { token });
                return Ok(FetchOutcome::Failed(e.to_string()));
            }
        };

        if response.status == 405 {
            self.gates
                .record(SECTOR_SPECIES_ENDPOINT, EndpointAvailability::Unavailable);
            session.dispatch(AssociationEvent::FetchSkewed { token });
            return Ok(FetchOutcome::VersionSkew);
        }

        if !response.is_success() {
            session.dispatch(AssociationEvent::FetchFailed { token });
            return match response.into_error() {
                SyncError::CredentialExpired => Err(SyncError::CredentialExpired),
                e => {
                    warn!(owner = %owner, error = %e, "Association read failed");
                    Ok(FetchOutcome::Failed(e.to_string()))
                }
            };
        }

        let members = match response.json().map(member_ids) {
            Ok(Ok(members)) => members,
            Ok(Err(e)) => {
                session.dispatch(AssociationEvent::FetchFailed { token });
                return Err(SyncError::Json(e));
            }
            Err(e) => {
                session.dispatch(AssociationEvent::FetchFailed { token });
                return Err(e);
            }
        };

        self.gates
            .record(SECTOR_SPECIES_ENDPOINT, EndpointAvailability::Available);
        let applied = session.dispatch(AssociationEvent::FetchSucceeded {
            token,
            members: members.clone(),
        });
        if applied {
            Ok(FetchOutcome::Synced(members))
        } else {
            Ok(FetchOutcome::Superseded)
        }
    }

    /// Write the species set of `owner` after its primary save succeeded.
    ///
    /// A closed gate or a 405 keeps `members` as `LocalOnly` and still
    /// reports success; any other failure is returned as an error.
    pub async fn save_associations(
        &self,
        session: &AssociationSession,
        owner: SectorId,
        members: BTreeSet<SpeciesId>,
    ) -> Result<SaveReport> {
        let token = session.token_for(owner);

        if self.availability() == EndpointAvailability::Unavailable {
            debug!(owner = %owner, "Association endpoint gated, keeping selection locally");
            session.dispatch(AssociationEvent::SaveLocalOnly { token, members });
            return Ok(SaveReport::local_only(owner));
        }

        let body = json!({ "especie_ids": members.iter().map(|id| id.0).collect::<Vec<_>>() });
        let request = self
            .api
            .request(Method::Put, &association_path(owner))
            .with_body(RequestBody::Json(body));
        let response = self.api.send(request).await?;

        if response.status == 405 {
            self.gates
                .record(SECTOR_SPECIES_ENDPOINT, EndpointAvailability::Unavailable);
            session.dispatch(AssociationEvent::SaveLocalOnly { token, members });
            return Ok(SaveReport::local_only(owner));
        }

        response.error_for_status()?;
        self.gates
            .record(SECTOR_SPECIES_ENDPOINT, EndpointAvailability::Available);
        session.dispatch(AssociationEvent::SaveSynced { token, members });
        Ok(SaveReport {
            owner_id: owner,
            associations: SecondarySync::Synced,
        })
    }

    /// Save a sector's fields, then its species set.
    ///
    /// A failed primary save stops before the association write.
    pub async fn save_sector(
        &self,
        session: &AssociationSession,
        owner: SectorId,
        update: &SectorUpdate,
        members: BTreeSet<SpeciesId>,
    ) -> Result<SaveReport> {
        self.api.update_sector(owner, update).await?;
        self.save_associations(session, owner, members).await
    }
}

fn association_path(owner: SectorId) -> String {
    format!("/sectors/staff/{}/species", owner)
}
