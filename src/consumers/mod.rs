//! A pull-based consumer session: deliveries are requested one by one by the caller and
//! acknowledged explicitly.

mod delivery;
mod error;
mod session;

pub use delivery::MessageDelivery;
pub use error::{AckError, CloseError, ConfigurationError, ConnectError, DeliveryError, ShutdownError};
pub use session::{BrokerSession, SessionState};
