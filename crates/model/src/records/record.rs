//! Nested output objects built from flat rows.

use crate::core::value::Value;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

/// One slot of a reassembled object.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Value(Value),
    /// Cardinality-one nesting; `None` when nothing is related.
    Object(Option<Record>),
    /// Cardinality-many nesting.
    List(Vec<Record>),
    /// The caller may not see this field on this row. Rendered as null and
    /// never filled in by a merge.
    Withheld,
}

/// A reassembled object. Requested fields keep their request order; keys
/// fetched only for stitching live apart in `stitch` and never reach the
/// client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<(String, Entry)>,
    stitch: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, entry: Entry) {
        self.entries.push((key.into(), entry));
    }

    pub fn with(mut self, key: impl Into<String>, entry: Entry) -> Self {
        self.push(key, entry);
        self
    }

    pub fn set_stitch(&mut self, field: impl Into<String>, value: Value) {
        self.stitch.insert(field.into(), value);
    }

    pub fn entries(&self) -> &[(String, Entry)] {
        &self.entries
    }

    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, e)| e)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Entry> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, e)| e)
    }

    pub fn stitch(&self) -> &BTreeMap<String, Value> {
        &self.stitch
    }

    /// Value of a collection field used for matching: stitch columns first,
    /// then a requested scalar of the same name.
    pub fn key_value(&self, field: &str) -> Value {
        if let Some(value) = self.stitch.get(field) {
            return value.clone();
        }
        match self.get(field) {
            Some(Entry::Value(value)) => value.clone(),
            _ => Value::Null,
        }
    }

    pub fn key_values(&self, fields: &[String]) -> Vec<Value> {
        fields.iter().map(|f| self.key_value(f)).collect()
    }

    /// Drops every stitching value, recursively.
    pub fn strip_stitching(&mut self) {
        self.stitch.clear();
        for (_, entry) in self.entries.iter_mut() {
            match entry {
                Entry::Object(Some(inner)) => inner.strip_stitching(),
                Entry::List(items) => items.iter_mut().for_each(Record::strip_stitching),
                _ => {}
            }
        }
    }

    /// The client-visible JSON object. Stitching values are never rendered.
    pub fn to_json(&self) -> JsonValue {
        let mut map = Map::with_capacity(self.entries.len());
        for (key, entry) in &self.entries {
            let value = match entry {
                Entry::Value(v) => v.to_json(),
                Entry::Object(Some(inner)) => inner.to_json(),
                Entry::Object(None) | Entry::Withheld => JsonValue::Null,
                Entry::List(items) => JsonValue::Array(items.iter().map(Record::to_json).collect()),
            };
            map.insert(key.clone(), value);
        }
        JsonValue::Object(map)
    }
}

/// Mutable references to every record found by following `path` through
/// cardinality-one entries. An empty path yields the records themselves.
pub fn records_at_path<'a>(records: &'a mut [Record], path: &[String]) -> Vec<&'a mut Record> {
    let mut out = Vec::new();
    collect_at_path(records, path, &mut out);
    out
}

fn collect_at_path<'a>(records: &'a mut [Record], path: &[String], out: &mut Vec<&'a mut Record>) {
    let Some((head, rest)) = path.split_first() else {
        out.extend(records.iter_mut());
        return;
    };
    for record in records.iter_mut() {
        if let Some(Entry::Object(Some(inner))) = record.get_mut(head) {
            collect_at_path(std::slice::from_mut(inner), rest, out);
        }
    }
}

/// Read-only counterpart of [`records_at_path`].
pub fn records_at_path_ref<'a>(records: &'a [Record], path: &[String]) -> Vec<&'a Record> {
    let Some((head, rest)) = path.split_first() else {
        return records.iter().collect();
    };
    records
        .iter()
        .filter_map(|record| match record.get(head) {
            Some(Entry::Object(Some(inner))) => Some(inner),
            _ => None,
        })
        .flat_map(|inner| records_at_path_ref(std::slice::from_ref(inner), rest))
        .collect()
}
