use crate::helpers::{settings, Failures, FakeBroker, QUEUE_NAME};
use carrot_pull::amqp::configuration::keys;
use carrot_pull::consumers::{
    AckError, BrokerSession, ConnectError, DeliveryError, MessageDelivery, SessionState,
};

#[tokio::test]
async fn connect_registers_a_single_consumer_on_the_configured_queue() {
    // Arrange
    let broker = FakeBroker::new();
    let mut session = broker.session();

    // Act
    session.connect(false).await.unwrap();

    // Assert
    assert_eq!(session.state(), SessionState::Connected);
    let log = broker.log();
    assert_eq!(log.connections_opened, 1);
    assert_eq!(log.consumers, vec![(QUEUE_NAME.to_owned(), false)]);
    assert!(log.prefetch_counts.is_empty());
}

#[tokio::test]
async fn auto_ack_mode_is_forwarded_to_the_consumer_registration() {
    let broker = FakeBroker::new();
    let mut session = broker.session();

    session.connect(true).await.unwrap();

    assert_eq!(broker.log().consumers, vec![(QUEUE_NAME.to_owned(), true)]);
}

#[tokio::test]
async fn prefetch_count_is_applied_when_configured() {
    let broker = FakeBroker::new();
    let mut session =
        BrokerSession::with_transport(settings(&[(keys::PREFETCH_COUNT, "16")]), broker.clone());

    session.connect(false).await.unwrap();

    assert_eq!(broker.log().prefetch_counts, vec![16]);
}

#[tokio::test]
async fn deliveries_carry_the_payload_and_the_broker_assigned_tag() {
    // Arrange
    let broker = FakeBroker::new();
    let mut session = broker.session();
    session.connect(false).await.unwrap();
    let first_tag = broker.publish(b"first");
    let second_tag = broker.publish(b"second");

    // Act
    let first = session.next_delivery().await.unwrap();
    let second = session.next_delivery().await.unwrap();

    // Assert
    assert_eq!(first, MessageDelivery::new(b"first".to_vec(), first_tag));
    assert_eq!(second.payload(), b"second");
    assert_eq!(second.delivery_tag(), second_tag);
    assert!(second.delivery_tag() > first.delivery_tag());
}

#[tokio::test]
async fn acknowledging_a_delivery_sends_its_tag_on_the_channel() {
    // Arrange
    let broker = FakeBroker::new();
    let mut session = broker.session();
    session.connect(false).await.unwrap();
    let tag = broker.publish(b"payload");
    let delivery = session.next_delivery().await.unwrap();

    // Act
    session.acknowledge(&delivery).await.unwrap();

    // Assert
    assert_eq!(broker.log().acks, vec![tag]);
}

#[tokio::test]
async fn acknowledging_the_same_delivery_twice_is_not_deduplicated() {
    let broker = FakeBroker::new();
    let mut session = broker.session();
    session.connect(false).await.unwrap();
    let tag = broker.publish(b"payload");
    let delivery = session.next_delivery().await.unwrap();

    session.acknowledge(&delivery).await.unwrap();
    session.acknowledge(&delivery).await.unwrap();

    assert_eq!(broker.log().acks, vec![tag, tag]);
}

#[tokio::test]
async fn acknowledging_in_auto_ack_mode_still_reaches_the_channel() {
    let broker = FakeBroker::new();
    let mut session = broker.session();
    session.connect(true).await.unwrap();
    let tag = broker.publish(b"payload");
    let delivery = session.next_delivery().await.unwrap();

    session.acknowledge(&delivery).await.unwrap();

    assert_eq!(broker.log().acks, vec![tag]);
}

#[tokio::test]
async fn ack_failures_are_returned_and_not_retried() {
    let broker = FakeBroker::failing(Failures {
        ack: true,
        ..Failures::default()
    });
    let mut session = broker.session();
    session.connect(false).await.unwrap();
    broker.publish(b"payload");
    let delivery = session.next_delivery().await.unwrap();

    let error = session.acknowledge(&delivery).await.unwrap_err();

    assert!(matches!(error, AckError::Io(lapin::Error::IOError(_))));
    assert!(broker.log().acks.is_empty());
    assert_eq!(session.state(), SessionState::Connected);
}

#[tokio::test]
async fn connection_failures_are_returned_unwrapped() {
    let broker = FakeBroker::failing(Failures {
        connect: true,
        ..Failures::default()
    });
    let mut session = broker.session();

    let error = session.connect(false).await.unwrap_err();

    assert!(matches!(
        error,
        ConnectError::Connectivity(lapin::Error::IOError(_))
    ));
    assert_eq!(error.to_string(), crate::helpers::io_error("connection refused").to_string());
    assert_eq!(session.state(), SessionState::Configured);
    assert!(broker.log().consumers.is_empty());
}

#[tokio::test]
async fn connecting_twice_fails_fast() {
    let broker = FakeBroker::new();
    let mut session = broker.session();
    session.connect(false).await.unwrap();

    let error = session.connect(false).await.unwrap_err();

    assert!(matches!(
        error,
        ConnectError::InvalidState(SessionState::Connected)
    ));
    assert_eq!(broker.log().connections_opened, 1);
}

#[tokio::test]
async fn deliveries_and_acks_require_a_connected_session() {
    let broker = FakeBroker::new();
    let mut session = broker.session();
    let delivery = MessageDelivery::new(b"payload".to_vec(), 1);

    let next = session.next_delivery().await.unwrap_err();
    let ack = session.acknowledge(&delivery).await.unwrap_err();

    assert!(matches!(
        next,
        DeliveryError::InvalidState(SessionState::Configured)
    ));
    assert!(matches!(
        ack,
        AckError::InvalidState(SessionState::Configured)
    ));
}

#[tokio::test]
async fn a_cancelled_consumer_stops_the_delivery_loop() {
    let broker = FakeBroker::new();
    let mut session = broker.session();
    session.connect(false).await.unwrap();
    broker.publish(b"last message");
    broker.cancel_consumer();

    let last = session.next_delivery().await.unwrap();
    let error = session.next_delivery().await.unwrap_err();

    assert_eq!(last.into_payload(), b"last message".to_vec());
    assert!(matches!(error, DeliveryError::ConsumerClosed));
}

#[tokio::test]
async fn accessors_report_the_effective_connection_parameters() {
    let broker = FakeBroker::new();
    let session = BrokerSession::with_transport(
        settings(&[
            (keys::HOST, "rabbit.internal"),
            (keys::VHOST, "payments"),
        ]),
        broker,
    );

    assert_eq!(session.host(), "rabbit.internal");
    assert_eq!(session.port(), 5672);
    assert_eq!(session.username(), "guest");
    assert_eq!(session.virtual_host(), "payments");
    assert_eq!(session.queue_name(), QUEUE_NAME);
}
