// Error types for configuration management

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration key not found: {0}")]
    KeyNotFound(String),

    #[error("Configuration value [{0}] is not an array")]
    NotAnArray(String),

    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Environment variable error: {0}")]
    EnvError(#[from] std::env::VarError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

impl From<ConfigError> for emberfuse_core::Error {
    fn from(err: ConfigError) -> Self {
        emberfuse_core::Error::Bootstrap(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converts_to_bootstrap_error() {
        let err: emberfuse_core::Error = ConfigError::KeyNotFound("services".into()).into();
        assert!(matches!(err, emberfuse_core::Error::Bootstrap(_)));
        assert_eq!(
            err.to_string(),
            "Bootstrap error: Configuration key not found: services"
        );
    }
}
