//! Association state machine
//!
//! The consumer's view of one sector's species set. Every change goes
//! through [`transition`], a pure `(state, event) -> state` function;
//! [`AssociationSession`] is the single dispatcher around it.
//!
//! Network results carry the [`RequestToken`] captured when the request was
//! issued. Results whose token does not match the current selection are
//! ignored, so a late answer for sector A never lands on sector B.
//!
//! Sets saved as `LocalOnly` are kept per sector for the whole session, so
//! returning to a sector restores the selection the backend could not store.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::{SectorId, SpeciesId};

/// Persistence status of an association set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncStatus {
    /// Matches what the server reported or accepted
    Synced,
    /// User intent that the backend cannot persist yet
    LocalOnly,
    /// Not confirmed either way
    Unknown,
}

/// Species assigned to a sector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationSet {
    pub owner_id: SectorId,
    pub member_ids: BTreeSet<SpeciesId>,
    pub sync_status: SyncStatus,
}

impl AssociationSet {
    pub fn empty(owner_id: SectorId) -> Self {
        Self {
            owner_id,
            member_ids: BTreeSet::new(),
            sync_status: SyncStatus::Unknown,
        }
    }
}

/// Identity of a request, captured at issue time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestToken {
    pub owner: SectorId,
    generation: u64,
}

/// Inputs to the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociationEvent {
    /// The consumer switched to another sector
    Select(SectorId),
    /// The user changed the selection of species
    Edit(BTreeSet<SpeciesId>),
    /// Read returned the server's set
    FetchSucceeded {
        token: RequestToken,
        members: BTreeSet<SpeciesId>,
    },
    /// Read hit a missing endpoint; nothing changes
    FetchSkewed { token: RequestToken },
    /// Read failed for another reason
    FetchFailed { token: RequestToken },
    /// Write accepted by the server
    SaveSynced {
        token: RequestToken,
        members: BTreeSet<SpeciesId>,
    },
    /// Write could not reach a backend that supports it
    SaveLocalOnly {
        token: RequestToken,
        members: BTreeSet<SpeciesId>,
    },
}

impl AssociationEvent {
    fn token(&self) -> Option<RequestToken> {
        match self {
            AssociationEvent::Select(_) | AssociationEvent::Edit(_) => None,
            AssociationEvent::FetchSucceeded { token, .. }
            | AssociationEvent::FetchSkewed { token }
            | AssociationEvent::FetchFailed { token }
            | AssociationEvent::SaveSynced { token, .. }
            | AssociationEvent::SaveLocalOnly { token, .. } => Some(*token),
        }
    }
}

/// Consumer-owned association state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssociationState {
    generation: u64,
    set: Option<AssociationSet>,
    local_only: BTreeMap<SectorId, AssociationSet>,
}

impl AssociationState {
    /// Set for the selected sector, if one is selected.
    pub fn set(&self) -> Option<&AssociationSet> {
        self.set.as_ref()
    }

    /// Unpersisted set kept for `owner`, if any.
    pub fn local_only(&self, owner: SectorId) -> Option<&AssociationSet> {
        self.local_only.get(&owner)
    }

    pub fn selected(&self) -> Option<SectorId> {
        self.set.as_ref().map(|s| s.owner_id)
    }

    /// Token for a request issued now, if a sector is selected.
    pub fn token(&self) -> Option<RequestToken> {
        self.selected().map(|owner| RequestToken {
            owner,
            generation: self.generation,
        })
    }

    /// Whether `event` would be applied (false for stale results).
    pub fn accepts(&self, event: &AssociationEvent) -> bool {
        match (event, event.token()) {
            (AssociationEvent::Edit(_), _) => self.set.is_some(),
            (_, Some(token)) => self.token() == Some(token),
            (_, None) => true,
        }
    }
}

/// Apply one event.
pub fn transition(state: AssociationState, event: AssociationEvent) -> AssociationState {
    if !state.accepts(&event) {
        return state;
    }

    let AssociationState {
        generation,
        set,
        mut local_only,
    } = state;
    match event {
        AssociationEvent::Select(owner) => {
            if set.as_ref().map(|s| s.owner_id) == Some(owner) {
                AssociationState { generation, set, local_only }
            } else {
                let restored = local_only
                    .get(&owner)
                    .cloned()
                    .unwrap_or_else(|| AssociationSet::empty(owner));
                AssociationState {
                    generation: generation + 1,
                    set: Some(restored),
                    local_only,
                }
            }
        }
        AssociationEvent::Edit(members) => AssociationState {
            generation,
            set: set.map(|s| AssociationSet { member_ids: members, ..s }),
            local_only,
        },
        AssociationEvent::FetchSucceeded { token, members }
        | AssociationEvent::SaveSynced { token, members } => {
            local_only.remove(&token.owner);
            AssociationState {
                generation,
                set: set.map(|s| AssociationSet {
                    member_ids: members,
                    sync_status: SyncStatus::Synced,
                    ..s
                }),
                local_only,
            }
        }
        AssociationEvent::FetchSkewed { .. } => AssociationState { generation, set, local_only },
        AssociationEvent::FetchFailed { .. } => AssociationState {
            generation,
            set: set.map(|s| AssociationSet {
                sync_status: SyncStatus::Unknown,
                ..s
            }),
            local_only,
        },
        AssociationEvent::SaveLocalOnly { token, members } => {
            let saved = AssociationSet {
                owner_id: token.owner,
                member_ids: members,
                sync_status: SyncStatus::LocalOnly,
            };
            local_only.insert(token.owner, saved.clone());
            AssociationState {
                generation,
                set: Some(saved),
                local_only,
            }
        }
    }
}

/// Dispatcher around [`AssociationState`]
#[derive(Debug, Default)]
pub struct AssociationSession {
    state: Mutex<AssociationState>,
}

impl AssociationSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `event`; returns whether it was accepted.
    pub fn dispatch(&self, event: AssociationEvent) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let accepted = state.accepts(&event);
        if !accepted {
            debug!(event = ?event, "Ignoring association result for a superseded selection");
            return false;
        }
        let current = std::mem::take(&mut *state);
        *state = transition(current, event);
        true
    }

    pub fn select(&self, owner: SectorId) {
        self.dispatch(AssociationEvent::Select(owner));
    }

    pub fn edit(&self, members: impl IntoIterator<Item = SpeciesId>) -> bool {
        self.dispatch(AssociationEvent::Edit(members.into_iter().collect()))
    }

    pub fn snapshot(&self) -> AssociationState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn current(&self) -> Option<AssociationSet> {
        self.snapshot().set
    }

    /// Select `owner` if needed and capture a token for a request about it.
    pub fn token_for(&self, owner: SectorId) -> RequestToken {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let current = std::mem::take(&mut *state);
        *state = transition(current, AssociationEvent::Select(owner));
        RequestToken {
            owner,
            generation: state.generation,
        }
    }
}
