//! `carrot-pull` opens a single consumer session against a RabbitMq broker, built on top of
//! [`lapin`], and hands messages to the caller one at a time.
//!
//! [`BrokerSession`](crate::consumers::BrokerSession) is the starting point: it is configured
//! from a `.properties` source, optionally secured with mutual TLS, and exposes a
//! connect → pull → acknowledge → close lifecycle.
//!
//! ```rust,no_run
//! use carrot_pull::consumers::BrokerSession;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = BrokerSession::from_properties_file("rabbitmq.properties")?;
//!     session.connect(false).await?;
//!
//!     let delivery = session.next_delivery().await?;
//!     println!("Received {} bytes", delivery.payload().len());
//!     session.acknowledge(&delivery).await?;
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Examples
//!
//! Check the `demos` directory to see the library in action.

pub mod amqp;
pub mod consumers;
