//! Typed staff API client
//!
//! Wire bodies are canonicalized through [`fields`] and decoded into
//! [`models`]; [`GardenApiClient`] covers the species, sector and photo
//! endpoints.

pub mod client;
pub mod fields;
pub mod models;

pub use client::GardenApiClient;
pub use fields::{member_ids, FieldMap};
pub use models::{
    EntityType, Photo, PhotoId, PhotoUpload, SectorId, Sector, SectorUpdate, Species,
    SpeciesDraft, SpeciesId,
};
