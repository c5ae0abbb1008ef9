// Configuration management for the Emberfuse framework

pub mod bootstrap;
pub mod env;
pub mod error;
pub mod loader;
pub mod repository;

pub use bootstrap::{
    CONFIG_KEY, LOG_GUARD_KEY, LOG_KEY, LoadConfiguration, LoadEnvironmentVariables, LoadLogging,
    LoadServices, SERVICES_KEY, config_repository, default_bootstrappers,
};
pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use repository::Repository;
