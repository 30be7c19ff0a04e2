//! Feature gates for endpoints the backend may not expose yet
//!
//! The console and the API deploy independently. A gate records what we
//! have learned about one logical endpoint during this session so a known
//! missing endpoint is not probed again.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Logical name of the sector ↔ species association endpoint
pub const SECTOR_SPECIES_ENDPOINT: &str = "sector-species-association";

/// What is known about an endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointAvailability {
    #[default]
    Unknown,
    Available,
    Unavailable,
}

impl EndpointAvailability {
    /// Next state after observing `observed`. A gate never returns to `Unknown`.
    pub fn after(self, observed: EndpointAvailability) -> EndpointAvailability {
        match observed {
            EndpointAvailability::Unknown => self,
            known => known,
        }
    }
}

/// Session-scoped gate store, keyed by logical endpoint name
///
/// Create one per session and share it; tests get isolation by building
/// their own. Only the sync client records observations.
#[derive(Debug, Default)]
pub struct AvailabilityStore {
    gates: RwLock<HashMap<String, EndpointAvailability>>,
}

impl AvailabilityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, endpoint: &str) -> EndpointAvailability {
        self.gates
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(endpoint)
            .copied()
            .unwrap_or_default()
    }

    /// All gates that have left `Unknown`.
    pub fn snapshot(&self) -> HashMap<String, EndpointAvailability> {
        self.gates.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn record(&self, endpoint: &str, observed: EndpointAvailability) -> EndpointAvailability {
        let mut gates = self.gates.write().unwrap_or_else(|e| e.into_inner());
        let previous = gates.get(endpoint).copied().unwrap_or_default();
        let next = previous.after(observed);
        if next != previous {
            match next {
                EndpointAvailability::Unavailable => {
                    warn!(endpoint, "Endpoint not available on this backend, gating further calls")
                }
                EndpointAvailability::Available => info!(endpoint, "Endpoint available"),
                EndpointAvailability::Unknown => {}
            }
        }
        if next != EndpointAvailability::Unknown {
            gates.insert(endpoint.to_string(), next);
        }
        next
    }
}
