use crate::amqp::configuration::SessionSettings;
use crate::amqp::properties::Properties;
use crate::amqp::transport::{Deliveries, Transport, TransportChannel, TransportConnection};
use crate::amqp::ConnectionFactory;
use crate::consumers::{
    AckError, CloseError, ConfigurationError, ConnectError, DeliveryError, MessageDelivery,
    ShutdownError,
};
use futures_util::{Future, StreamExt};
use shutdown_handler::ShutdownHandler;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

type ChannelOf<T> = <<T as Transport>::Connection as TransportConnection>::Channel;

/// Where a [`BrokerSession`] is in its lifecycle.
///
/// A session only ever moves forward: `Configured` → `Connected` → `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Configuration succeeded, nothing is open yet.
    Configured,
    /// A connection, a channel and a consumer are live.
    Connected,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configured => write!(f, "configured"),
            Self::Connected => write!(f, "connected"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// The handles owned by a connected session. They exist together or not at all.
struct Live<T: Transport> {
    connection: T::Connection,
    channel: ChannelOf<T>,
    deliveries: Deliveries,
    auto_ack: bool,
}

enum State<T: Transport> {
    Configured,
    Connected(Live<T>),
    Closed,
}

/// A consumer session bound to a single queue of a RabbitMq broker.
///
/// # Lifecycle
///
/// 1. Build the session from a properties source with [`BrokerSession::from_properties_file`]
///    or [`BrokerSession::from_properties_reader`]. No network activity happens at this stage,
///    but TLS material is loaded and validated if `SSL=1`.
/// 2. [`connect`](BrokerSession::connect) opens one connection, one channel and registers
///    one consumer on the configured queue.
/// 3. Pull messages one at a time with [`next_delivery`](BrokerSession::next_delivery) and
///    confirm them with [`acknowledge`](BrokerSession::acknowledge).
/// 4. [`close`](BrokerSession::close) releases the channel and the connection.
///
/// A session cannot be reconnected: once closed, build a new one.
/// Nothing is retried on your behalf - every failure is returned to the caller.
///
/// # Concurrency
///
/// Operations take `&mut self`: a session is driven by a single task. Run several sessions if
/// you need to consume concurrently; they share nothing.
pub struct BrokerSession<T: Transport = ConnectionFactory> {
    settings: SessionSettings,
    transport: T,
    state: State<T>,
}

impl BrokerSession<ConnectionFactory> {
    /// Configure a session from a properties file.
    ///
    /// An empty path is treated as a missing source.
    pub fn from_properties_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(ConfigurationError::MissingSource);
        }
        let file = std::fs::File::open(path).map_err(|source| ConfigurationError::Unreadable {
            location: path.display().to_string(),
            source,
        })?;
        Self::from_properties_reader(file)
    }

    /// Configure a session from an already open properties source.
    pub fn from_properties_reader(reader: impl Read) -> Result<Self, ConfigurationError> {
        let properties =
            Properties::load(reader).map_err(|source| ConfigurationError::Unreadable {
                location: "<reader>".into(),
                source,
            })?;
        Self::from_properties(&properties)
    }

    pub fn from_properties(properties: &Properties) -> Result<Self, ConfigurationError> {
        Self::from_settings(SessionSettings::from_properties(properties)?)
    }

    /// Configure a session from already resolved settings.
    pub fn from_settings(settings: SessionSettings) -> Result<Self, ConfigurationError> {
        let factory = ConnectionFactory::new_from_config(&settings.rabbit_mq)?;
        tracing::info!(
            queue_name = %settings.queue_name,
            host = %factory.host(),
            port = factory.port(),
            vhost = %factory.virtual_host(),
            tls = factory.uses_tls(),
            "RabbitMQ session configured"
        );
        Ok(Self::with_transport(settings, factory))
    }
}

impl<T: Transport> BrokerSession<T> {
    /// Assemble a session on top of a custom [`Transport`].
    ///
    /// `settings` still provide the queue name, prefetch and the values returned by the
    /// accessors; how connections are opened is entirely up to `transport`.
    pub fn with_transport(settings: SessionSettings, transport: T) -> Self {
        Self {
            settings,
            transport,
            state: State::Configured,
        }
    }

    pub fn state(&self) -> SessionState {
        match self.state {
            State::Configured => SessionState::Configured,
            State::Connected(_) => SessionState::Connected,
            State::Closed => SessionState::Closed,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn queue_name(&self) -> &str {
        &self.settings.queue_name
    }

    pub fn host(&self) -> &str {
        &self.settings.rabbit_mq.uri
    }

    pub fn port(&self) -> u16 {
        self.settings.rabbit_mq.port
    }

    pub fn username(&self) -> &str {
        &self.settings.rabbit_mq.username
    }

    pub fn virtual_host(&self) -> &str {
        &self.settings.rabbit_mq.vhost
    }

    /// Open a connection and a channel, then start consuming from the configured queue.
    ///
    /// With `auto_ack` set to `true` the broker considers messages acknowledged as soon as
    /// they are delivered and [`acknowledge`](Self::acknowledge) must not be used.
    ///
    /// Failures are returned as they come from the broker client. Nothing is rolled back:
    /// discard the session if `connect` fails.
    #[tracing::instrument(skip(self), name = "session_connect", fields(queue_name = %self.settings.queue_name))]
    pub async fn connect(&mut self, auto_ack: bool) -> Result<(), ConnectError> {
        if !matches!(self.state, State::Configured) {
            return Err(ConnectError::InvalidState(self.state()));
        }

        let connection = self.transport.new_connection().await?;
        let channel = connection.create_channel().await?;
        if let Some(prefetch_count) = self.settings.prefetch_count {
            channel.basic_qos(prefetch_count).await?;
        }
        let consumer_tag = Uuid::new_v4().to_string();
        let deliveries = channel
            .basic_consume(&self.settings.queue_name, &consumer_tag, auto_ack)
            .await?;

        tracing::info!(%consumer_tag, auto_ack, "Consuming from RabbitMQ queue");
        self.state = State::Connected(Live {
            connection,
            channel,
            deliveries,
            auto_ack,
        });
        Ok(())
    }

    /// Wait for the next message on the consumer.
    ///
    /// There is no timeout: the returned future completes only when a message arrives or the
    /// consumer stops. Dropping the future does not lose any message.
    pub async fn next_delivery(&mut self) -> Result<MessageDelivery, DeliveryError> {
        self.next_delivery_until(futures_util::future::pending()).await
    }

    /// Wait for the next message on the consumer, giving up with [`DeliveryError::Cancelled`]
    /// as soon as `cancel` completes.
    ///
    /// Cancellation is checked first: if `cancel` is already complete no message is taken
    /// from the consumer.
    pub async fn next_delivery_until(
        &mut self,
        cancel: impl Future<Output = ()>,
    ) -> Result<MessageDelivery, DeliveryError> {
        let state = self.state();
        let live = match &mut self.state {
            State::Connected(live) => live,
            _ => return Err(DeliveryError::InvalidState(state)),
        };

        tokio::pin!(cancel);
        let delivery = tokio::select! {
            biased;

            _ = &mut cancel => {
                tracing::debug!("Waiting for the next delivery was cancelled");
                return Err(DeliveryError::Cancelled);
            }

            delivery = live.deliveries.next() => delivery,
        };

        match delivery {
            Some(Ok(delivery)) => {
                tracing::debug!(delivery_tag = delivery.delivery_tag(), "Received delivery");
                Ok(delivery)
            }
            Some(Err(e)) => {
                tracing::error!("Consumer error: {}", e);
                Err(DeliveryError::Broker(e))
            }
            None => Err(DeliveryError::ConsumerClosed),
        }
    }

    /// Like [`next_delivery_until`](Self::next_delivery_until), interrupted by a
    /// [`ShutdownHandler`] signal.
    pub async fn next_delivery_until_shutdown(
        &mut self,
        shutdown: &Arc<ShutdownHandler>,
    ) -> Result<MessageDelivery, DeliveryError> {
        self.next_delivery_until(shutdown.wait_for_signal()).await
    }

    /// Positively acknowledge `delivery`, and only `delivery`.
    ///
    /// The delivery tag is sent as is: acknowledging the same delivery twice is left to the
    /// broker to judge (RabbitMq closes the channel).
    pub async fn acknowledge(&mut self, delivery: &MessageDelivery) -> Result<(), AckError> {
        let live = match &self.state {
            State::Connected(live) => live,
            _ => return Err(AckError::InvalidState(self.state())),
        };
        if live.auto_ack {
            tracing::warn!(
                delivery_tag = delivery.delivery_tag(),
                "Acknowledging a delivery on a session consuming in auto-ack mode"
            );
        }
        live.channel.basic_ack(delivery.delivery_tag()).await?;
        tracing::debug!(delivery_tag = delivery.delivery_tag(), "Acknowledged delivery");
        Ok(())
    }

    /// Close the channel, then the connection.
    ///
    /// Closing the connection is attempted even if closing the channel failed. All failures
    /// are collected, in that order, into a [`ShutdownError`].
    /// The session is closed afterwards, whatever the outcome.
    #[tracing::instrument(skip(self), name = "session_close")]
    pub async fn close(&mut self) -> Result<(), CloseError> {
        let live = match std::mem::replace(&mut self.state, State::Closed) {
            State::Connected(live) => live,
            State::Configured => return Ok(()),
            State::Closed => return Err(CloseError::AlreadyClosed),
        };
        let Live {
            connection,
            channel,
            deliveries,
            ..
        } = live;
        drop(deliveries);

        let mut failures = Vec::new();
        if let Err(e) = channel.close().await {
            tracing::warn!("Failed to close the RabbitMQ channel: {}", e);
            failures.push(format!("There was an error while trying to close the channel: {e}"));
        }
        if let Err(e) = connection.close().await {
            tracing::warn!("Failed to close the RabbitMQ connection: {}", e);
            failures.push(format!(
                "There was an error while trying to close the connection: {e}"
            ));
        }

        if failures.is_empty() {
            tracing::info!("RabbitMQ session closed");
            Ok(())
        } else {
            Err(ShutdownError { failures }.into())
        }
    }
}
