use crate::amqp::configuration::RabbitMqSettings;
use crate::amqp::tls::TlsContext;
use crate::amqp::transport::Transport;
use crate::consumers::{ConfigurationError, ConnectError};
use lapin::{
    tcp::AMQPUriTcpExt,
    uri::{AMQPScheme, AMQPUri},
    ConnectionProperties,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
/// All the information required to connect to a RabbitMq broker.
///
/// Building a `ConnectionFactory` performs no network I/O.
pub struct ConnectionFactory {
    uri: AMQPUri,
    /// The timeout observed when trying to connect to RabbitMq.
    connection_timeout: Duration,
    /// TLS configuration for the connection to RabbitMq.
    /// If `None`, the connection will not be encrypted.
    tls: Option<Arc<TlsContext>>,
}

impl ConnectionFactory {
    /// Create a new connection factory from settings.
    ///
    /// If `settings` carry TLS material, the client bundle and the trust store are loaded
    /// here and turned into a [`TlsContext`].
    ///
    /// A connection timeout can be (optionally) specified in `settings`.
    /// If the connection timeout is left unspecified, it will be defaulted to 10 seconds.
    pub fn new_from_config(settings: &RabbitMqSettings) -> Result<Self, ConfigurationError> {
        let tls = settings
            .tls
            .as_ref()
            .map(TlsContext::from_settings)
            .transpose()?;
        let connection_timeout = settings
            .connection_timeout()
            .unwrap_or(DEFAULT_CONNECTION_TIMEOUT);
        Ok(Self {
            uri: settings.amqp_uri(),
            connection_timeout,
            tls: tls.map(Arc::new),
        })
    }

    pub fn host(&self) -> &str {
        &self.uri.authority.host
    }

    pub fn port(&self) -> u16 {
        self.uri.authority.port
    }

    pub fn username(&self) -> &str {
        &self.uri.authority.userinfo.username
    }

    pub fn virtual_host(&self) -> &str {
        &self.uri.vhost
    }

    /// Whether connections will be encrypted.
    pub fn uses_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Create a new connection to a RabbitMq broker.
    ///
    /// It establishes an encrypted connection if `self.tls` is `Some`.
    /// It establishes an unencrypted connection if `self.tls` is `None`.
    #[tracing::instrument(
        name = "rabbitmq_connect",
        skip(self),
        fields(host = %self.host(), port = self.port(), vhost = %self.virtual_host())
    )]
    pub async fn new_connection(&self) -> Result<lapin::Connection, ConnectError> {
        let properties =
            ConnectionProperties::default().with_executor(tokio_executor_trait::Tokio::current());
        let connection = timeout(self.connection_timeout, async {
            match &self.tls {
                None => self.connect_without_tls(properties).await,
                Some(tls) => self.connect_with_tls(properties, Arc::clone(tls)).await,
            }
        })
        .await
        .map_err(|_| ConnectError::Timeout(self.connection_timeout))??;
        // Register a callback to log connection errors.
        connection.on_error(|e| {
            warn!("RabbitMQ broken connection: {:?}", e);
        });
        Ok(connection)
    }

    /// Establish a new unencrypted connection to a RabbitMq broker.
    async fn connect_without_tls(
        &self,
        properties: ConnectionProperties,
    ) -> Result<lapin::Connection, lapin::Error> {
        lapin::Connection::connect_uri(self.uri.clone(), properties).await
    }

    /// Establish a new TLS connection to a RabbitMq broker.
    ///
    /// The broker certificate must be issued for the configured host.
    async fn connect_with_tls(
        &self,
        properties: ConnectionProperties,
        tls: Arc<TlsContext>,
    ) -> Result<lapin::Connection, lapin::Error> {
        lapin::Connection::connector(
            self.uri.clone(),
            Box::new(move |uri| {
                // First establish a plain TCP connection using the AMQP protocol
                let mut amqp_uri = uri.clone();
                amqp_uri.scheme = AMQPScheme::AMQP;
                let domain = amqp_uri.authority.host.clone();
                amqp_uri
                    .connect()
                    // Then perform the mutual TLS handshake
                    .and_then(|tcp| tcp.into_native_tls(tls.connector(), &domain))
            }),
            properties,
        )
        .await
    }
}

#[async_trait::async_trait]
impl Transport for ConnectionFactory {
    type Connection = lapin::Connection;

    async fn new_connection(&self) -> Result<lapin::Connection, ConnectError> {
        ConnectionFactory::new_connection(self).await
    }
}
