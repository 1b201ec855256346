use mathink::config::{ConfigError, SessionConfig, DEFAULT_HOST};

#[test]
fn missing_credentials_fail_validation() {
    let err = SessionConfig::new("", "secret").validate().unwrap_err();
    assert!(matches!(err, ConfigError::MissingCredential(_)));

    let err = SessionConfig::new("app-key", "   ").validate().unwrap_err();
    assert!(matches!(err, ConfigError::MissingCredential(_)));
}

#[test]
fn zero_tunables_fail_validation() {
    let mut config = SessionConfig::new("app-key", "secret");
    config.max_ping_lost = 0;
    let err = config.validate().unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { name: "max_ping_lost", .. }));

    let mut config = SessionConfig::new("app-key", "secret");
    config.max_chunk_bytes = 0;
    assert!(config.validate().is_err());

    let mut config = SessionConfig::new("app-key", "secret");
    config.ping_interval = std::time::Duration::ZERO;
    assert!(config.validate().is_err());
}

#[test]
fn defaults_are_valid_and_point_at_the_service() {
    let config = SessionConfig::new("app-key", "secret");
    assert!(config.validate().is_ok());
    assert_eq!(config.host, DEFAULT_HOST);
    assert_eq!(
        config.endpoint_url(),
        "wss://cloud.myscript.com/api/v4.0/iink/document?applicationKey=app-key"
    );
}

// Environment manipulation lives in a single test to avoid races between
// parallel test threads.
#[test]
fn from_env_reads_credentials_and_overrides() {
    unsafe {
        std::env::set_var("MATHINK_APPLICATION_KEY", "env-app-key");
        std::env::set_var("MATHINK_HMAC_KEY", "env-hmac-key");
        std::env::set_var("MATHINK_HOST", "recognition.example.net");
    }
    let config = SessionConfig::from_env().expect("credentials are set");
    assert_eq!(config.application_key, "env-app-key");
    assert_eq!(config.hmac_key, "env-hmac-key");
    assert_eq!(config.host, "recognition.example.net");

    unsafe {
        std::env::remove_var("MATHINK_APPLICATION_KEY");
    }
    let err = SessionConfig::from_env().unwrap_err();
    assert!(matches!(err, ConfigError::MissingCredential("MATHINK_APPLICATION_KEY")));

    unsafe {
        std::env::remove_var("MATHINK_HMAC_KEY");
        std::env::remove_var("MATHINK_HOST");
    }
}
