use crate::{
    error::{ConnectorError, DbError},
    sql::{
        postgres::{params::PgParamStore, utils::connect_client},
        row::DbRow,
    },
    store::{FetchRowsRequest, Store},
};
use async_trait::async_trait;
use model::records::row::RowData;
use planner::query::{
    dialect::{Dialect, Postgres},
    renderer::render_with,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_postgres::Client;
use tracing::debug;

#[derive(Clone)]
pub struct PgStore {
    client: Arc<RwLock<Client>>,
    dialect: Postgres,
}

impl PgStore {
    pub async fn connect(url: &str) -> Result<Self, ConnectorError> {
        let client = Arc::new(RwLock::new(connect_client(url).await?));
        Ok(PgStore {
            client,
            dialect: Postgres,
        })
    }
}

#[async_trait]
impl Store for PgStore {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn fetch_rows(&self, request: FetchRowsRequest) -> Result<Vec<RowData>, DbError> {
        let (sql, params) = render_with(&self.dialect, &request.parameters, &request.select);
        debug!(collection = %request.collection, %sql, params = params.len(), "Fetching rows");

        let bindings = PgParamStore::from_values(params);
        let client = self.client.read().await;
        let rows = client.query(&sql, &bindings.as_refs()).await?;
        rows.iter()
            .map(|row| DbRow::PostgresRow(row).to_row_data(&request.collection.collection))
            .collect()
    }
}
