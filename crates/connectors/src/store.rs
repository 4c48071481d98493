use crate::error::DbError;
use async_trait::async_trait;
use model::{
    core::{identifiers::CollectionRef, value::Value},
    records::row::RowData,
};
use planner::{
    compile::CompiledQuery,
    query::{ast::select::Select, dialect::Dialect},
};
use std::{collections::HashMap, fmt, sync::Arc};

/// One compiled select handed to a store.
#[derive(Debug, Clone)]
pub struct FetchRowsRequest {
    pub collection: CollectionRef,
    pub select: Select,
    pub parameters: Vec<Value>,
}

impl From<&CompiledQuery> for FetchRowsRequest {
    fn from(query: &CompiledQuery) -> Self {
        Self {
            collection: query.target.clone(),
            select: query.select.clone(),
            parameters: query.parameters.clone(),
        }
    }
}

/// A relational store able to run compiled selects. Rows come back with
/// columns named by their select alias.
#[async_trait]
pub trait Store: Send + Sync {
    fn dialect(&self) -> &dyn Dialect;

    async fn fetch_rows(&self, request: FetchRowsRequest) -> Result<Vec<RowData>, DbError>;
}

/// Stores by name. Shared read-only by every level of one traversal.
#[derive(Clone, Default)]
pub struct StoreRegistry {
    stores: HashMap<String, Arc<dyn Store>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, store: Arc<dyn Store>) {
        self.stores.insert(name.into(), store);
    }

    pub fn with(mut self, name: impl Into<String>, store: Arc<dyn Store>) -> Self {
        self.register(name, store);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Store>> {
        self.stores.get(name).cloned()
    }
}

impl fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("stores", &self.stores.keys().collect::<Vec<_>>())
            .finish()
    }
}
