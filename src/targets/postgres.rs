use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use secrecy::ExposeSecret;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_postgres::config::SslMode;
use tokio_postgres::{Client, Config};
use tracing::{debug, info, warn};

use crate::descriptor::ConnectParams;
use crate::error::DriverError;
use crate::targets::target::{Connector, Session};

const APPLICATION_NAME: &str = "pam-pg-connector";
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

impl From<tokio_postgres::Error> for DriverError {
    /// Carries the whole cause chain. The driver's own message names only the error
    /// kind ("db error"); the server's text lives in its source.
    fn from(e: tokio_postgres::Error) -> Self {
        DriverError::Database(format!("{:#}", anyhow::Error::from(e)))
    }
}

/// PostgreSQL connector over tokio-postgres, one connection per session
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresConnector;

impl PostgresConnector {
    pub fn new() -> Self {
        Self
    }

    /// Build the driver configuration for a session
    pub(crate) fn build_config(params: &ConnectParams) -> Config {
        let mut config = Config::new();
        config
            .host(params.hostname.as_str())
            .port(params.port)
            .user(params.user.as_str())
            .password(params.password.expose_secret())
            .connect_timeout(params.connect_timeout())
            .application_name(APPLICATION_NAME)
            .ssl_mode(if params.use_tls {
                SslMode::Require
            } else {
                SslMode::Disable
            });

        // Without a dbname the server uses the login user's name
        if !params.database.is_empty() {
            config.dbname(params.database.as_str());
        }

        config
    }

    /// TLS connector that accepts any certificate and host name
    fn tls_connector() -> Result<MakeTlsConnector, DriverError> {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
            .map_err(|e| DriverError::Other(format!("Failed to create TLS connector: {}", e)))?;

        Ok(MakeTlsConnector::new(connector))
    }
}

#[async_trait::async_trait]
impl Connector for PostgresConnector {
    async fn connect(&self, params: &ConnectParams) -> Result<Box<dyn Session>, DriverError> {
        info!("Connecting to PostgreSQL at {} as {}", params.address(), params.user);
        debug!("Connection properties: {:?}", params.properties());

        let config = Self::build_config(params);
        let tls = Self::tls_connector()?;

        let (client, connection) = tokio::time::timeout(params.login_timeout(), config.connect(tls))
            .await
            .map_err(|_| {
                DriverError::Other(format!(
                    "Login to {} timed out after {}s",
                    params.address(),
                    params.login_timeout_secs
                ))
            })??;

        // Spawn connection handler
        let connection = tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("PostgreSQL connection error: {}", e);
            }
        });

        Ok(Box::new(PostgresSession { client, connection }))
    }

    fn connector_type(&self) -> &'static str {
        "postgres"
    }
}

struct PostgresSession {
    client: Client,
    connection: JoinHandle<()>,
}

#[async_trait::async_trait]
impl Session for PostgresSession {
    async fn execute_in_transaction(&mut self, statement: &str) -> Result<(), DriverError> {
        // Dropping an uncommitted transaction rolls it back
        let transaction = self.client.transaction().await?;
        transaction.batch_execute(statement).await?;
        transaction.commit().await?;
        Ok(())
    }

    async fn close(self: Box<Self>) {
        let PostgresSession {
            client,
            mut connection,
        } = *self;

        // The connection task ends once the client is gone
        drop(client);
        if tokio::time::timeout(CLOSE_TIMEOUT, &mut connection).await.is_err() {
            warn!("PostgreSQL connection did not close in time, aborting it");
            connection.abort();
        }
    }
}
