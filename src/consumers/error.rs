use crate::consumers::SessionState;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// The session could not be configured.
///
/// Raised before any network activity: the properties source is missing or unreadable,
/// a required property is absent or malformed, or the TLS material cannot be loaded.
#[derive(thiserror::Error, Debug)]
pub enum ConfigurationError {
    #[error("No properties source was specified")]
    MissingSource,
    #[error("Failed to read the properties source `{location}`")]
    Unreadable {
        location: String,
        #[source]
        source: std::io::Error,
    },
    #[error("The required property `{0}` is missing")]
    MissingKey(&'static str),
    #[error("The property `{key}` has an invalid value `{value}`")]
    InvalidValue {
        key: &'static str,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("Failed to read the {what} at `{}`", .path.display())]
    TlsMaterialUnreadable {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to load the {what}")]
    Tls {
        what: &'static str,
        #[source]
        source: native_tls::Error,
    },
    #[error("Failed to open the PKCS#12 {what}")]
    Pkcs12 {
        what: &'static str,
        #[source]
        source: openssl::error::ErrorStack,
    },
    #[error("The trust store at `{}` does not contain any certificate", .0.display())]
    EmptyTrustStore(PathBuf),
    /// Java-proprietary keystores must be converted to PKCS#12 or PEM first.
    #[error("The trust store at `{}` is a {format} keystore, which is not supported", .path.display())]
    UnsupportedTrustStore { format: &'static str, path: PathBuf },
}

/// The session failed to open its connection, channel or consumer.
#[derive(thiserror::Error, Debug)]
pub enum ConnectError {
    #[error(transparent)]
    Connectivity(#[from] lapin::Error),
    #[error("Timed out after {0:?} while connecting to RabbitMq")]
    Timeout(Duration),
    #[error("A session can only connect once it is configured, but it is {0}")]
    InvalidState(SessionState),
}

/// No delivery could be retrieved.
#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    /// The wait was interrupted before a message arrived.
    #[error("Waiting for the next delivery was cancelled")]
    Cancelled,
    /// The broker cancelled the consumer or the channel went away.
    #[error("The consumer stopped receiving deliveries")]
    ConsumerClosed,
    #[error("The consumer failed while waiting for the next delivery")]
    Broker(#[source] lapin::Error),
    #[error("Deliveries can only be retrieved from a connected session, but it is {0}")]
    InvalidState(SessionState),
}

/// A delivery could not be acknowledged.
#[derive(thiserror::Error, Debug)]
pub enum AckError {
    #[error(transparent)]
    Io(#[from] lapin::Error),
    #[error("Deliveries can only be acknowledged on a connected session, but it is {0}")]
    InvalidState(SessionState),
}

/// Closing the channel, the connection, or both failed.
///
/// Each failure is reported on its own line, channel first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownError {
    pub failures: Vec<String>,
}

impl std::error::Error for ShutdownError {}

impl fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.failures.join("\n"))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CloseError {
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
    #[error("The session is already closed")]
    AlreadyClosed,
}
