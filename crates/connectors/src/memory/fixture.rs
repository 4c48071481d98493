use crate::{
    error::ConnectorError,
    memory::{eval::MemoryRow, store::MemoryStore},
};
use model::core::value::Value;
use serde_json::Value as JsonValue;
use std::path::Path;

/// Collections loaded from a JSON document of the form
/// `{"collections": {"articles": [{...}], ...}}` or just the inner map.
#[derive(Debug, Default)]
pub struct Fixture {
    collections: Vec<(String, Vec<MemoryRow>)>,
}

impl Fixture {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConnectorError> {
        let raw = std::fs::read_to_string(path)?;
        let document: JsonValue = serde_json::from_str(&raw)?;
        match document {
            JsonValue::Object(mut map) if map.contains_key("collections") => {
                Self::from_collections(map.remove("collections").unwrap_or(JsonValue::Null))
            }
            other => Self::from_collections(other),
        }
    }

    pub fn from_collections(collections: JsonValue) -> Result<Self, ConnectorError> {
        let JsonValue::Object(map) = collections else {
            return Err(ConnectorError::Fixture(
                "expected an object of collections".to_string(),
            ));
        };

        let mut fixture = Fixture::default();
        for (name, rows) in map {
            let JsonValue::Array(rows) = rows else {
                return Err(ConnectorError::Fixture(format!(
                    "collection '{name}' is not an array"
                )));
            };
            let rows = rows
                .into_iter()
                .map(|row| match row {
                    JsonValue::Object(fields) => Ok(fields
                        .into_iter()
                        .map(|(field, value)| (field, Value::from(value)))
                        .collect::<MemoryRow>()),
                    _ => Err(ConnectorError::Fixture(format!(
                        "collection '{name}' holds a non-object row"
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            fixture.collections.push((name, rows));
        }
        Ok(fixture)
    }

    pub fn into_store(self) -> MemoryStore {
        self.collections
            .into_iter()
            .fold(MemoryStore::new(), |store, (name, rows)| {
                store.with_collection(name, rows)
            })
    }
}
