//! Helpers for connecting to a rabbitmq broker

pub mod configuration;
mod factory;
pub mod properties;
pub mod tls;
pub mod transport;

pub use factory::ConnectionFactory;
pub use lapin::{Channel, Connection};

pub use lapin::types;
