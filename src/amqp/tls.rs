//! Mutual TLS: the client presents its own certificate and validates the broker against
//! a dedicated trust store.
use crate::amqp::configuration::RabbitMqTlsSettings;
use crate::consumers::ConfigurationError;
use lapin::tcp::NativeTlsConnector;
use native_tls::{Certificate, Identity, Protocol};
use openssl::error::ErrorStack;
use openssl::pkcs12::Pkcs12;
use std::path::Path;

const PEM_CERTIFICATE_END: &str = "-----END CERTIFICATE-----";
const JKS_MAGIC: [u8; 4] = [0xFE, 0xED, 0xFE, 0xED];
const JCEKS_MAGIC: [u8; 4] = [0xCE, 0xCE, 0xCE, 0xCE];

/// A TLS connector configured for mutual authentication.
///
/// Built once from the client bundle and the trust store, then only ever read.
#[derive(Clone)]
pub struct TlsContext {
    connector: NativeTlsConnector,
}

impl TlsContext {
    /// Load the client identity and the trust store described by `settings`.
    ///
    /// The client bundle is loaded first, then the trust store. The broker certificate is
    /// validated against the trust store only: the platform's built-in roots are disabled.
    /// The strongest protocol version supported by both peers is negotiated, TLS 1.2 at least.
    pub fn from_settings(settings: &RabbitMqTlsSettings) -> Result<Self, ConfigurationError> {
        let identity = load_client_identity(
            &settings.client_key_cert,
            settings.client_key_passphrase.expose_secret(),
        )?;
        let trust_passphrase = settings
            .trust_keystore_passphrase
            .as_ref()
            .map(|passphrase| passphrase.expose_secret().as_str())
            .unwrap_or_default();
        let trusted = load_trust_store(&settings.trust_keystore, trust_passphrase)?;

        let mut builder = NativeTlsConnector::builder();
        builder
            .identity(identity)
            .disable_built_in_roots(true)
            .min_protocol_version(Some(Protocol::Tlsv12));
        for certificate in trusted {
            builder.add_root_certificate(certificate);
        }
        let connector = builder.build().map_err(|source| ConfigurationError::Tls {
            what: "TLS context",
            source,
        })?;
        Ok(Self { connector })
    }

    pub fn connector(&self) -> &NativeTlsConnector {
        &self.connector
    }
}

fn read_material(what: &'static str, path: &Path) -> Result<Vec<u8>, ConfigurationError> {
    std::fs::read(path).map_err(|source| ConfigurationError::TlsMaterialUnreadable {
        what,
        path: path.to_owned(),
        source,
    })
}

fn load_client_identity(path: &Path, passphrase: &str) -> Result<Identity, ConfigurationError> {
    let what = "client certificate bundle";
    let der = read_material(what, path)?;
    Identity::from_pkcs12(&der, passphrase).map_err(|source| ConfigurationError::Tls { what, source })
}

/// Collect the trusted roots stored at `path`.
///
/// Accepted formats, in detection order: a PEM bundle, a PKCS#12 store opened with
/// `passphrase`, a single DER certificate. Java-proprietary keystores are rejected.
fn load_trust_store(path: &Path, passphrase: &str) -> Result<Vec<Certificate>, ConfigurationError> {
    let what = "trust store";
    let raw = read_material(what, path)?;
    let to_error = |source: native_tls::Error| ConfigurationError::Tls { what, source };

    let certificates = match std::str::from_utf8(&raw) {
        Ok(text) if text.contains("-----BEGIN") => text
            .split_inclusive(PEM_CERTIFICATE_END)
            .filter(|block| block.contains(PEM_CERTIFICATE_END))
            .map(|block| Certificate::from_pem(block.trim().as_bytes()).map_err(to_error))
            .collect::<Result<Vec<_>, _>>()?,
        _ => {
            if let Some(format) = java_keystore_format(&raw) {
                return Err(ConfigurationError::UnsupportedTrustStore {
                    format,
                    path: path.to_owned(),
                });
            }
            match Pkcs12::from_der(&raw) {
                Ok(store) => pkcs12_certificates(&store, passphrase)
                    .map_err(|source| ConfigurationError::Pkcs12 { what, source })?
                    .iter()
                    .map(|der| Certificate::from_der(der).map_err(to_error))
                    .collect::<Result<Vec<_>, _>>()?,
                Err(_) => vec![Certificate::from_der(&raw).map_err(to_error)?],
            }
        }
    };

    if certificates.is_empty() {
        return Err(ConfigurationError::EmptyTrustStore(path.to_owned()));
    }
    Ok(certificates)
}

fn java_keystore_format(raw: &[u8]) -> Option<&'static str> {
    if raw.starts_with(&JKS_MAGIC) {
        Some("JKS")
    } else if raw.starts_with(&JCEKS_MAGIC) {
        Some("JCEKS")
    } else {
        None
    }
}

/// DER encoding of every certificate in the store, with or without a matching key.
fn pkcs12_certificates(store: &Pkcs12, passphrase: &str) -> Result<Vec<Vec<u8>>, ErrorStack> {
    let parsed = store.parse2(passphrase)?;
    parsed
        .cert
        .into_iter()
        .chain(parsed.ca.into_iter().flatten())
        .map(|certificate| certificate.to_der())
        .collect()
}
