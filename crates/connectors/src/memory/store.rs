use crate::{
    error::{ConnectorError, DbError},
    memory::{
        eval::{Evaluator, MemoryRow},
        fixture::Fixture,
    },
    store::{FetchRowsRequest, Store},
};
use async_trait::async_trait;
use model::records::row::RowData;
use planner::query::{
    dialect::{Dialect, Postgres},
    renderer::render_with,
};
use serde_json::Value as JsonValue;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use tracing::debug;

/// One select as seen by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedQuery {
    pub collection: String,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// A store over rows held in memory. Evaluates compiled selects directly and
/// records every select it receives.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<HashMap<String, Vec<MemoryRow>>>,
    issued: Arc<Mutex<Vec<IssuedQuery>>>,
    dialect: Postgres,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(mut self, name: impl Into<String>, rows: Vec<MemoryRow>) -> Self {
        Arc::make_mut(&mut self.tables).insert(name.into(), rows);
        self
    }

    /// Builds a store from `{"<collection>": [{...}, ...], ...}`.
    pub fn from_json(collections: JsonValue) -> Result<Self, ConnectorError> {
        Ok(Fixture::from_collections(collections)?.into_store())
    }

    pub async fn issued(&self) -> Vec<IssuedQuery> {
        self.issued.lock().await.clone()
    }

    pub async fn issued_for(&self, collection: &str) -> Vec<IssuedQuery> {
        self.issued
            .lock()
            .await
            .iter()
            .filter(|query| query.collection == collection)
            .cloned()
            .collect()
    }

    pub async fn clear_issued(&self) {
        self.issued.lock().await.clear();
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn fetch_rows(&self, request: FetchRowsRequest) -> Result<Vec<RowData>, DbError> {
        let evaluator = Evaluator::new(&self.tables, &request.parameters);
        let window = evaluator.window(&request.select)?;
        self.issued.lock().await.push(IssuedQuery {
            collection: request.collection.collection.clone(),
            limit: window.limit,
            offset: window.offset,
        });

        let (sql, _) = render_with(&self.dialect, &request.parameters, &request.select);
        debug!(collection = %request.collection, %sql, "Evaluating in memory");
        evaluator.run(&request.select, &request.collection.collection)
    }
}
