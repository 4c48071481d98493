use crate::{
    error::{ConnectorError, DbError},
    sql::{mysql::params::MySqlParamStore, row::DbRow},
    store::{FetchRowsRequest, Store},
};
use async_trait::async_trait;
use model::records::row::RowData;
use mysql_async::{Opts, Pool, Row, prelude::Queryable};
use planner::query::{
    dialect::{Dialect, MySql},
    renderer::render_with,
};
use tracing::debug;

#[derive(Clone)]
pub struct MySqlStore {
    pool: Pool,
    dialect: MySql,
}

impl MySqlStore {
    pub fn connect(url: &str) -> Result<Self, ConnectorError> {
        let opts = Opts::from_url(url).map_err(|e| ConnectorError::InvalidUrl(e.to_string()))?;
        Ok(MySqlStore {
            pool: Pool::new(opts),
            dialect: MySql,
        })
    }

    pub async fn disconnect(self) -> Result<(), DbError> {
        self.pool.disconnect().await?;
        Ok(())
    }
}

#[async_trait]
impl Store for MySqlStore {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn fetch_rows(&self, request: FetchRowsRequest) -> Result<Vec<RowData>, DbError> {
        let (sql, params) = render_with(&self.dialect, &request.parameters, &request.select);
        debug!(collection = %request.collection, %sql, params = params.len(), "Fetching rows");

        let bindings = MySqlParamStore::from_values(&params);
        let mut conn = self.pool.get_conn().await?;
        let rows: Vec<Row> = conn.exec(sql, bindings.params()).await?;
        rows.iter()
            .map(|row| DbRow::MySqlRow(row).to_row_data(&request.collection.collection))
            .collect()
    }
}
