use crate::error::ConnectorError;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_postgres::{Client, Config, Connection, NoTls, config::SslMode, tls::TlsStream};
use tracing::{debug, error, warn};

const APPLICATION_NAME: &str = "nestql";

/// Opens one client for `url`, honouring its `sslmode`. `prefer` falls back
/// to a plain connection when the TLS handshake fails.
pub(crate) async fn connect_client(url: &str) -> Result<Client, ConnectorError> {
    let mut config = url
        .parse::<Config>()
        .map_err(|e| ConnectorError::InvalidUrl(e.to_string()))?;
    if config.get_application_name().is_none() {
        config.application_name(APPLICATION_NAME);
    }

    let client = match config.get_ssl_mode() {
        SslMode::Disable => plain(&config).await?,
        SslMode::Prefer => match encrypted(&config).await {
            Ok(client) => client,
            Err(error) => {
                warn!(%error, "Postgres TLS handshake failed, retrying without TLS");
                plain(&config).await?
            }
        },
        _ => encrypted(&config).await?,
    };
    debug!(hosts = ?config.get_hosts(), dbname = ?config.get_dbname(), "Connected to Postgres");
    Ok(client)
}

async fn encrypted(config: &Config) -> Result<Client, ConnectorError> {
    let tls = MakeTlsConnector::new(TlsConnector::builder().build()?);
    let (client, connection) = config.connect(tls).await?;
    drive(connection);
    Ok(client)
}

async fn plain(config: &Config) -> Result<Client, ConnectorError> {
    let (client, connection) = config.connect(NoTls).await?;
    drive(connection);
    Ok(client)
}

/// The connection future performs the socket I/O; it runs until the client
/// is dropped.
fn drive<S, T>(connection: Connection<S, T>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    T: TlsStream + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            error!(%err, "Postgres connection error");
        }
    });
}
