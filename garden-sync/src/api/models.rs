//! Canonical staff API models
//!
//! These are the shapes the rest of the crate sees. Wire bodies are run
//! through the field maps in [`super::fields`] before they land here.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::SyncConfig;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Accept numeric ids and numeric strings.
            pub fn from_json(value: &serde_json::Value) -> Option<Self> {
                match value {
                    serde_json::Value::Number(n) => n.as_i64().map(Self),
                    serde_json::Value::String(s) => s.trim().parse().ok().map(Self),
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

entity_id!(
    /// Species identifier
    SpeciesId
);
entity_id!(
    /// Sector identifier
    SectorId
);
entity_id!(
    /// Photo identifier
    PhotoId
);

/// Species record as listed for staff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Species {
    pub id: SpeciesId,
    #[serde(default)]
    pub common_name: String,
    #[serde(default)]
    pub scientific_name: Option<String>,
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
}

/// Fields sent when creating or updating a species
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeciesDraft {
    pub nombre_comun: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nombre_cientifico: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub familia: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descripcion: Option<String>,
}

/// Garden sector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sector {
    pub id: SectorId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

/// Sector fields sent on update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectorUpdate {
    pub nombre: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descripcion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ubicacion: Option<String>,
}

/// Entity a photo belongs to
///
/// Serialized with the same spelling the photo endpoints use in their path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    #[serde(rename = "especie", alias = "species")]
    Species,
    Sector,
    Home,
}

impl EntityType {
    /// Path segment used by `/photos/{entityType}/{entityId}`
    pub fn as_path(self) -> &'static str {
        match self {
            EntityType::Species => "especie",
            EntityType::Sector => "sector",
            EntityType::Home => "home",
        }
    }
}

/// Stored photo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub id: PhotoId,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub storage_key: Option<String>,
    #[serde(default)]
    pub is_cover: bool,
}

impl Photo {
    /// URL to display this photo.
    ///
    /// The photo's own URL wins; otherwise the storage key is joined onto the
    /// public storage base URL when one is configured.
    pub fn display_url(&self, config: &SyncConfig) -> Option<String> {
        if let Some(url) = self.url.as_ref().filter(|u| !u.is_empty()) {
            return Some(url.clone());
        }
        let key = self.storage_key.as_ref()?;
        let base = config.storage_public_url.as_ref()?;
        Some(format!(
            "{}/{}",
            base.trim_end_matches('/'),
            key.trim_start_matches('/')
        ))
    }
}

/// New photo to upload
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub is_cover: bool,
}
