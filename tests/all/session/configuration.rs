use carrot_pull::consumers::{BrokerSession, ConfigurationError, SessionState};
use std::io::Write;

fn properties_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn an_empty_path_is_a_missing_source() {
    let error = BrokerSession::from_properties_file("").err().unwrap();

    assert!(matches!(error, ConfigurationError::MissingSource));
}

#[test]
fn an_unreadable_file_is_a_configuration_error() {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("missing.properties");

    let error = BrokerSession::from_properties_file(&path).err().unwrap();

    assert!(matches!(error, ConfigurationError::Unreadable { .. }));
    assert!(error.to_string().contains("missing.properties"));
}

#[test]
fn a_source_without_queue_name_is_rejected() {
    let file = properties_file("host=rabbit.internal\nport=5671\n");

    let error = BrokerSession::from_properties_file(file.path()).err().unwrap();

    assert!(matches!(error, ConfigurationError::MissingKey("queueName")));
}

#[test]
fn a_plain_text_session_is_configured_from_a_file() {
    // Arrange
    let file = properties_file(
        "# broker parameters\n\
         queueName=orders\n\
         host=rabbit.internal\n\
         port=5671\n\
         username=consumer\n\
         password=s3cret\n\
         vhost=payments\n",
    );

    // Act
    let session = BrokerSession::from_properties_file(file.path()).unwrap();

    // Assert
    assert_eq!(session.state(), SessionState::Configured);
    assert_eq!(session.queue_name(), "orders");
    assert_eq!(session.host(), "rabbit.internal");
    assert_eq!(session.port(), 5671);
    assert_eq!(session.username(), "consumer");
    assert_eq!(session.virtual_host(), "payments");
}

#[test]
fn defaults_apply_when_only_the_queue_is_given() {
    let session = BrokerSession::from_properties_reader("queueName=orders\n".as_bytes()).unwrap();

    assert_eq!(session.host(), "localhost");
    assert_eq!(session.port(), 5672);
    assert_eq!(session.username(), "guest");
    assert_eq!(session.virtual_host(), "/");
}

#[test]
fn tls_paths_are_validated_before_any_material_is_loaded() {
    // The trust store does not exist: reaching it would yield a different error.
    let source = "queueName=orders\nSSL=1\ntrustKeystore=/nonexistent/trust.pem\n";

    let error = BrokerSession::from_properties_reader(source.as_bytes())
        .err()
        .unwrap();

    assert!(matches!(error, ConfigurationError::MissingKey("clientKeyCert")));
}

#[test]
fn a_missing_trust_store_path_is_rejected() {
    let source = "queueName=orders\nSSL=1\nclientKeyCert=/nonexistent/client.p12\n";

    let error = BrokerSession::from_properties_reader(source.as_bytes())
        .err()
        .unwrap();

    assert!(matches!(error, ConfigurationError::MissingKey("trustKeystore")));
}

#[test]
fn unreadable_tls_material_fails_configuration() {
    let directory = tempfile::tempdir().unwrap();
    let source = format!(
        "queueName=orders\nSSL=1\nclientKeyCert={}\ntrustKeystore={}\n",
        directory.path().join("client.p12").display(),
        directory.path().join("trust.pem").display(),
    );

    let error = BrokerSession::from_properties_reader(source.as_bytes())
        .err()
        .unwrap();

    assert!(matches!(
        error,
        ConfigurationError::TlsMaterialUnreadable { .. }
    ));
}

#[test]
fn a_corrupt_client_bundle_fails_configuration_with_its_cause() {
    let client = properties_file("not a PKCS#12 bundle");
    let source = format!(
        "queueName=orders\nSSL=1\nclientKeyCert={}\nclientKeyPassphrase=changeit\ntrustKeystore=/nonexistent/trust.pem\n",
        client.path().display(),
    );

    let error = BrokerSession::from_properties_reader(source.as_bytes())
        .err()
        .unwrap();

    assert!(matches!(error, ConfigurationError::Tls { .. }));
    assert!(std::error::Error::source(&error).is_some());
}

#[test]
fn a_mutual_tls_session_is_configured_from_pkcs12_material() {
    // Arrange
    let fixtures = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
    let source = format!(
        "queueName=orders\nSSL=1\n\
         clientKeyCert={}\nclientKeyPassphrase=changeit\n\
         trustKeystore={}\ntrustKeystorePassphrase=changeit\n",
        fixtures.join("client.p12").display(),
        fixtures.join("trust.p12").display(),
    );

    // Act
    let session = BrokerSession::from_properties_reader(source.as_bytes()).unwrap();

    // Assert
    assert_eq!(session.state(), SessionState::Configured);
    assert_eq!(session.queue_name(), "orders");
}
