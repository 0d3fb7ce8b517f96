use carrot_pull::consumers::{BrokerSession, DeliveryError};
use shutdown_handler::ShutdownHandler;

/// Pull messages from the queue named in `rabbitmq.properties` (or the file passed as first
/// argument) until SIGTERM, acknowledging each of them.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "rabbitmq.properties".into());

    // Configuration performs no network I/O, but loads TLS material if `SSL=1`.
    let mut session = BrokerSession::from_properties_file(path)?;
    println!(
        "Connecting to {}:{} (vhost {}) as {}",
        session.host(),
        session.port(),
        session.virtual_host(),
        session.username()
    );

    // Manual acknowledgements: every delivery must be confirmed explicitly.
    session.connect(false).await?;
    let shutdown = ShutdownHandler::sigterm()?;

    loop {
        match session.next_delivery_until_shutdown(&shutdown).await {
            Ok(delivery) => {
                println!(
                    "({:>3}) Received [{}]",
                    delivery.delivery_tag(),
                    String::from_utf8_lossy(delivery.payload())
                );
                session.acknowledge(&delivery).await?;
            }
            Err(DeliveryError::Cancelled) => break,
            Err(e) => {
                session.close().await?;
                return Err(e.into());
            }
        }
    }

    // Both the channel and the connection are closed, even if one of them fails.
    session.close().await?;
    Ok(())
}
