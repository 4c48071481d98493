use crate::{
    core::identifiers::CollectionRef,
    query::{field::FieldNode, modifiers::QueryModifiers},
};
use serde::{Deserialize, Serialize};

/// One top-level read as handed over by the request parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub store: String,
    pub collection: String,
    pub fields: Vec<FieldNode>,
    #[serde(default)]
    pub query: QueryModifiers,
    /// Return the first object (or null) instead of a list.
    #[serde(default)]
    pub single: bool,
}

impl QueryRequest {
    pub fn new(store: impl Into<String>, collection: impl Into<String>, fields: Vec<FieldNode>) -> Self {
        Self {
            store: store.into(),
            collection: collection.into(),
            fields,
            query: QueryModifiers::default(),
            single: false,
        }
    }

    pub fn with_query(mut self, query: QueryModifiers) -> Self {
        self.query = query;
        self
    }

    pub fn single(mut self) -> Self {
        self.single = true;
        self
    }

    pub fn target(&self) -> CollectionRef {
        CollectionRef::new(&self.store, &self.collection)
    }
}
