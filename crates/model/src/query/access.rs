//! Resolved access rules for the collections touched by one compiled query.

use crate::{core::identifiers::CollectionRef, query::filter::Filter};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Whether a field's value may be exposed for a given row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Always,
    Never,
    When(Filter),
}

/// Row filters and field visibility for one collection and action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionAccess {
    Denied,
    Granted {
        /// Every filter is ANDed with the user filter.
        #[serde(default)]
        filters: Vec<Filter>,
        /// Fields absent from the map are always visible.
        #[serde(default)]
        fields: BTreeMap<String, Visibility>,
    },
}

impl CollectionAccess {
    pub fn unrestricted() -> Self {
        CollectionAccess::Granted {
            filters: Vec::new(),
            fields: BTreeMap::new(),
        }
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, CollectionAccess::Denied)
    }

    pub fn filters(&self) -> &[Filter] {
        match self {
            CollectionAccess::Granted { filters, .. } => filters,
            CollectionAccess::Denied => &[],
        }
    }

    pub fn visibility(&self, field: &str) -> Visibility {
        match self {
            CollectionAccess::Granted { fields, .. } => fields.get(field).cloned().unwrap_or_default(),
            CollectionAccess::Denied => Visibility::Never,
        }
    }
}

/// Access for every collection a compilation may touch. Collections that
/// were never resolved are denied.
#[derive(Debug, Clone, Default)]
pub struct AccessMap {
    unrestricted: bool,
    entries: HashMap<CollectionRef, CollectionAccess>,
}

impl AccessMap {
    /// Administrative access: nothing is filtered or hidden.
    pub fn unrestricted() -> Self {
        Self {
            unrestricted: true,
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, collection: CollectionRef, access: CollectionAccess) {
        self.entries.insert(collection, access);
    }

    pub fn with(mut self, collection: CollectionRef, access: CollectionAccess) -> Self {
        self.insert(collection, access);
        self
    }

    pub fn is_unrestricted(&self) -> bool {
        self.unrestricted
    }

    pub fn get(&self, collection: &CollectionRef) -> CollectionAccess {
        if self.unrestricted {
            return CollectionAccess::unrestricted();
        }
        self.entries
            .get(collection)
            .cloned()
            .unwrap_or(CollectionAccess::Denied)
    }

    pub fn contains(&self, collection: &CollectionRef) -> bool {
        self.unrestricted || self.entries.contains_key(collection)
    }
}
