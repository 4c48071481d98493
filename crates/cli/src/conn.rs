use crate::error::CliError;
use connectors::{
    memory::fixture::Fixture,
    sql::{mysql::store::MySqlStore, postgres::store::PgStore},
    store::Store,
};
use std::{str::FromStr, sync::Arc};
use tracing::info;

/// Store backends reachable by URL.
#[derive(Debug, PartialEq, Eq)]
pub enum ConnectionKind {
    MySql,
    Postgres,
}

impl FromStr for ConnectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(ConnectionKind::MySql),
            "pg" | "postgres" | "postgresql" => Ok(ConnectionKind::Postgres),
            other => Err(format!("Unknown connection kind: {other}")),
        }
    }
}

impl ConnectionKind {
    pub fn from_url(url: &str) -> Result<Self, CliError> {
        let scheme = url
            .split_once("://")
            .map(|(scheme, _)| scheme)
            .ok_or_else(|| CliError::UnsupportedUrl(url.to_string()))?;
        scheme
            .parse()
            .map_err(|_| CliError::UnsupportedUrl(url.to_string()))
    }
}

pub async fn open_url(url: &str) -> Result<Arc<dyn Store>, CliError> {
    let kind = ConnectionKind::from_url(url)?;
    info!("Connecting to {kind:?} store");
    let store: Arc<dyn Store> = match kind {
        ConnectionKind::Postgres => Arc::new(PgStore::connect(url).await?),
        ConnectionKind::MySql => Arc::new(MySqlStore::connect(url)?),
    };
    Ok(store)
}

pub fn open_fixture(path: &str) -> Result<Arc<dyn Store>, CliError> {
    info!("Serving fixture {path} from memory");
    Ok(Arc::new(Fixture::from_path(path)?.into_store()))
}
