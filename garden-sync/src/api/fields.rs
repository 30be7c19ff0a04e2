//! Field mapping at the API boundary
//!
//! The backend schema has drifted over time: the same value shows up as
//! `nombre_comun`, `nombre_común` or `common_name` depending on the
//! endpoint and deployment. Each table below lists a canonical field and
//! the spellings accepted for it. Bodies are canonicalized once here and
//! nothing past this module looks at alternate spellings.

use std::collections::BTreeSet;

use serde::de::Error as _;
use serde_json::{Map, Value};

use super::models::SpeciesId;

/// Canonical field name with its accepted aliases
pub type FieldAliases = (&'static str, &'static [&'static str]);

/// Alias table for one model
#[derive(Debug, Clone, Copy)]
pub struct FieldMap {
    fields: &'static [FieldAliases],
}

impl FieldMap {
    pub const fn new(fields: &'static [FieldAliases]) -> Self {
        Self { fields }
    }

    /// Rename aliases to canonical names.
    ///
    /// A canonical key already present is kept; otherwise the first alias
    /// found (in table order) is moved into place. Arrays are mapped
    /// element-wise, scalars pass through.
    pub fn canonicalize(&self, value: Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(self.canonicalize_object(map)),
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|v| self.canonicalize(v)).collect())
            }
            other => other,
        }
    }

    fn canonicalize_object(&self, mut map: Map<String, Value>) -> Map<String, Value> {
        for (canonical, aliases) in self.fields {
            if map.get(*canonical).is_some_and(|v| !v.is_null()) {
                continue;
            }
            let found = aliases
                .iter()
                .find_map(|alias| map.remove(*alias).filter(|v| !v.is_null()));
            if let Some(v) = found {
                map.insert((*canonical).to_string(), v);
            }
        }
        map
    }
}

pub const SPECIES_FIELDS: FieldMap = FieldMap::new(&[
    ("id", &["id_especie", "especie_id", "especieId"]),
    ("common_name", &["nombre_comun", "nombre_común", "nombreComun", "nombre"]),
    ("scientific_name", &["nombre_cientifico", "nombre_científico", "nombreCientifico"]),
    ("family", &["familia"]),
    ("description", &["descripcion", "descripción"]),
    ("cover_url", &["foto_portada", "imagen", "image_url", "cover"]),
]);

pub const SECTOR_FIELDS: FieldMap = FieldMap::new(&[
    ("id", &["id_sector", "sector_id", "sectorId"]),
    ("name", &["nombre"]),
    ("description", &["descripcion", "descripción"]),
    ("location", &["ubicacion", "ubicación"]),
]);

pub const PHOTO_FIELDS: FieldMap = FieldMap::new(&[
    ("id", &["id_foto", "foto_id"]),
    ("url", &["file_url", "imagen_url", "public_url"]),
    ("storage_key", &["key", "path", "ruta"]),
    ("is_cover", &["es_portada", "isCover", "portada"]),
]);

pub const ASSOCIATION_FIELDS: FieldMap =
    FieldMap::new(&[("id", &["id_especie", "especie_id", "especieId", "species_id"])]);

/// Keys under which association bodies wrap their member list
const ASSOCIATION_ENVELOPES: &[&str] = &["especie_ids", "especies", "species", "items", "results"];

/// Extract species ids from an association body.
///
/// Accepts `[{"id": 3}, ...]`, `[3, 4]`, or an object wrapping either
/// under one of the known envelope keys.
pub fn member_ids(body: Value) -> Result<BTreeSet<SpeciesId>, serde_json::Error> {
    match body {
        Value::Array(items) => items.into_iter().map(member_id).collect(),
        Value::Object(mut map) => {
            let inner = ASSOCIATION_ENVELOPES
                .iter()
                .find_map(|key| map.remove(*key))
                .ok_or_else(|| serde_json::Error::custom("association body has no member list"))?;
            member_ids(inner)
        }
        Value::Null => Ok(BTreeSet::new()),
        other => Err(serde_json::Error::custom(format!(
            "unexpected association body: {}",
            other
        ))),
    }
}

fn member_id(item: Value) -> Result<SpeciesId, serde_json::Error> {
    let raw = match ASSOCIATION_FIELDS.canonicalize(item) {
        Value::Object(mut map) => map
            .remove("id")
            .ok_or_else(|| serde_json::Error::custom("association entry without id"))?,
        scalar => scalar,
    };
    SpeciesId::from_json(&raw)
        .ok_or_else(|| serde_json::Error::custom(format!("invalid species id: {}", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_alias_renamed() {
        let value = SPECIES_FIELDS.canonicalize(json!({
            "id_especie": 7,
            "nombre_común": "Ceibo",
            "nombre_cientifico": "Erythrina crista-galli"
        }));
        assert_eq!(value["id"], 7);
        assert_eq!(value["common_name"], "Ceibo");
        assert_eq!(value["scientific_name"], "Erythrina crista-galli");
        assert!(value.get("nombre_común").is_none());
    }

    #[test]
    fn test_canonical_key_wins() {
        let value = SPECIES_FIELDS.canonicalize(json!({
            "common_name": "Jacarandá",
            "nombre_comun": "stale"
        }));
        assert_eq!(value["common_name"], "Jacarandá");
    }

    #[test]
    fn test_null_canonical_is_filled_from_alias() {
        let value = SECTOR_FIELDS.canonicalize(json!({ "name": null, "nombre": "Rosaleda" }));
        assert_eq!(value["name"], "Rosaleda");
    }

    #[test]
    fn test_first_alias_in_table_order() {
        let value = SPECIES_FIELDS.canonicalize(json!({
            "nombre": "generic",
            "nombre_comun": "specific"
        }));
        assert_eq!(value["common_name"], "specific");
    }

    #[test]
    fn test_member_ids_shapes() {
        let expected: BTreeSet<SpeciesId> = [SpeciesId(3), SpeciesId(4)].into_iter().collect();

        assert_eq!(member_ids(json!([{"id": 3}, {"id": 4}])).unwrap(), expected);
        assert_eq!(member_ids(json!([4, 3, 3])).unwrap(), expected);
        assert_eq!(member_ids(json!({"especie_ids": [3, 4]})).unwrap(), expected);
        assert_eq!(member_ids(json!({"especies": [{"id_especie": "3"}, {"id": 4}]})).unwrap(), expected);
        assert!(member_ids(json!([])).unwrap().is_empty());
    }

    #[test]
    fn test_member_ids_rejects_garbage() {
        assert!(member_ids(json!({"unrelated": true})).is_err());
        assert!(member_ids(json!([{"name": "no id"}])).is_err());
        assert!(member_ids(json!("text")).is_err());
    }
}
