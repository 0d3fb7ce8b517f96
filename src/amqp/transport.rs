use crate::consumers::{ConnectError, MessageDelivery};
use amq_protocol_types::{DeliveryTag, FieldTable};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicQosOptions};

/// Reply code sent to the broker on a graceful close.
const REPLY_SUCCESS: u16 = 200;

/// The deliveries pushed by the broker to a registered consumer.
pub type Deliveries = BoxStream<'static, Result<MessageDelivery, lapin::Error>>;

/// `Transport` defines an interface for types that are capable of opening connections to
/// a RabbitMq broker.
///
/// [`ConnectionFactory`](crate::amqp::ConnectionFactory) is the production implementation,
/// backed by [`lapin`].
/// A [`BrokerSession`](crate::consumers::BrokerSession) only ever interacts with the broker
/// through this trait and the two below.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    type Connection: TransportConnection;

    /// Open a new network connection.
    async fn new_connection(&self) -> Result<Self::Connection, ConnectError>;
}

/// An open connection to the broker.
#[async_trait::async_trait]
pub trait TransportConnection: Send + Sync + 'static {
    type Channel: TransportChannel;

    async fn create_channel(&self) -> Result<Self::Channel, lapin::Error>;

    async fn close(&self) -> Result<(), lapin::Error>;
}

/// A channel multiplexed on top of a [`TransportConnection`].
#[async_trait::async_trait]
pub trait TransportChannel: Send + Sync + 'static {
    /// Limit the number of unacknowledged deliveries in flight for this channel's consumers.
    async fn basic_qos(&self, prefetch_count: u16) -> Result<(), lapin::Error>;

    /// Register a consumer on `queue_name`.
    ///
    /// With `auto_ack` set, the broker considers each message acknowledged as soon as it is sent.
    async fn basic_consume(
        &self,
        queue_name: &str,
        consumer_tag: &str,
        auto_ack: bool,
    ) -> Result<Deliveries, lapin::Error>;

    /// Positively acknowledge a single delivery.
    async fn basic_ack(&self, delivery_tag: DeliveryTag) -> Result<(), lapin::Error>;

    async fn close(&self) -> Result<(), lapin::Error>;
}

#[async_trait::async_trait]
impl TransportConnection for lapin::Connection {
    type Channel = lapin::Channel;

    async fn create_channel(&self) -> Result<lapin::Channel, lapin::Error> {
        lapin::Connection::create_channel(self).await
    }

    async fn close(&self) -> Result<(), lapin::Error> {
        lapin::Connection::close(self, REPLY_SUCCESS, "OK").await
    }
}

#[async_trait::async_trait]
impl TransportChannel for lapin::Channel {
    async fn basic_qos(&self, prefetch_count: u16) -> Result<(), lapin::Error> {
        lapin::Channel::basic_qos(self, prefetch_count, BasicQosOptions { global: false }).await
    }

    async fn basic_consume(
        &self,
        queue_name: &str,
        consumer_tag: &str,
        auto_ack: bool,
    ) -> Result<Deliveries, lapin::Error> {
        let consumer = lapin::Channel::basic_consume(
            self,
            queue_name,
            consumer_tag,
            BasicConsumeOptions {
                no_ack: auto_ack,
                ..BasicConsumeOptions::default()
            },
            FieldTable::default(),
        )
        .await?;
        Ok(consumer
            .map(|delivery| delivery.map(MessageDelivery::from))
            .boxed())
    }

    async fn basic_ack(&self, delivery_tag: DeliveryTag) -> Result<(), lapin::Error> {
        lapin::Channel::basic_ack(self, delivery_tag, BasicAckOptions { multiple: false }).await
    }

    async fn close(&self) -> Result<(), lapin::Error> {
        lapin::Channel::close(self, REPLY_SUCCESS, "OK").await
    }
}
