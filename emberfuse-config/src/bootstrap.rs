//! Bootstrappers run by the kernel before the first request.
//!
//! The usual order is environment, configuration, logging and services, as
//! returned by [`default_bootstrappers`].

use crate::env::EnvLoader;
use crate::loader::ConfigLoader;
use crate::repository::Repository;
use emberfuse_core::logging::{LogConfig, LogFormat, LogLevel, LogOutput, debug, info};
use emberfuse_core::{
    Application, Bootstrapper, Container, DEFAULT_ENVIRONMENT, Error, ServiceProvider, Value,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Container identifier of the configuration [`Repository`].
pub const CONFIG_KEY: &str = "config";

/// Configuration key listing service provider identifiers.
pub const SERVICES_KEY: &str = "services";

/// Container identifier of the [`LogConfig`] registered by [`LoadLogging`].
pub const LOG_KEY: &str = "log";

/// Container identifier holding the log writer's flush guard.
pub const LOG_GUARD_KEY: &str = "log.guard";

/// The shared configuration repository registered by [`LoadConfiguration`].
pub fn config_repository(container: &Container) -> Result<Arc<Repository>, Error> {
    container.make_as::<Repository>(CONFIG_KEY)
}

/// Loads `<base>/.env` and registers the `env` instance.
#[derive(Debug, Clone)]
pub struct LoadEnvironmentVariables {
    file: String,
    env_var: String,
}

impl LoadEnvironmentVariables {
    pub fn new() -> Self {
        Self {
            file: ".env".to_string(),
            env_var: "APP_ENV".to_string(),
        }
    }

    /// Read a different file under the base path.
    pub fn file(mut self, file: impl Into<String>) -> Self {
        self.file = file.into();
        self
    }

    /// Take the environment name from a different variable.
    pub fn env_var(mut self, env_var: impl Into<String>) -> Self {
        self.env_var = env_var.into();
        self
    }
}

impl Default for LoadEnvironmentVariables {
    fn default() -> Self {
        Self::new()
    }
}

impl Bootstrapper for LoadEnvironmentVariables {
    fn bootstrap(&self, app: &Application) -> Result<(), Error> {
        EnvLoader::load_dotenv(app.path(&self.file))?;

        let env = EnvLoader::new().load_var_or(&self.env_var, DEFAULT_ENVIRONMENT);
        info!(environment = %env, "Environment loaded");
        app.container().instance("env", Value::new(env));
        Ok(())
    }

    fn name(&self) -> &str {
        "LoadEnvironmentVariables"
    }
}

/// Loads every file in `<base>/config` into the shared `config` repository.
#[derive(Debug, Clone, Default)]
pub struct LoadConfiguration;

impl Bootstrapper for LoadConfiguration {
    fn bootstrap(&self, app: &Application) -> Result<(), Error> {
        let items = ConfigLoader::load_directory(app.path("config"))?;
        let repository = Repository::from_map(items);
        debug!(keys = ?repository.keys(), "Configuration loaded");

        app.container().instance(CONFIG_KEY, Value::new(repository));
        Ok(())
    }

    fn name(&self) -> &str {
        "LoadConfiguration"
    }
}

/// Writes application logs to `<path.logs>/app.log`.
///
/// `logging.level`, `logging.format` and `logging.file` override the
/// defaults when configured. A subscriber installed earlier by the host
/// program is left in place.
#[derive(Debug, Clone, Default)]
pub struct LoadLogging;

impl LoadLogging {
    fn log_config(app: &Application) -> Result<(LogConfig, String), Error> {
        let mut log = LogConfig::new();
        let mut file = "app.log".to_string();

        if !app.container().has(CONFIG_KEY) {
            return Ok((log, file));
        }
        let config = config_repository(app.container())?;

        if let Some(level) = optional_string(&config, "logging.level")? {
            let level = LogLevel::parse(&level)
                .ok_or_else(|| Error::Bootstrap(format!("Unknown log level [{level}]")))?;
            log = log.level(level);
        }
        if let Some(format) = optional_string(&config, "logging.format")? {
            let format = LogFormat::parse(&format)
                .ok_or_else(|| Error::Bootstrap(format!("Unknown log format [{format}]")))?;
            log = log.format(format);
        }
        if let Some(name) = optional_string(&config, "logging.file")? {
            file = name;
        }

        Ok((log, file))
    }
}

fn optional_string(config: &Repository, key: &str) -> Result<Option<String>, Error> {
    match config.value(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(_) => Ok(Some(config.get(key)?)),
    }
}

impl Bootstrapper for LoadLogging {
    fn bootstrap(&self, app: &Application) -> Result<(), Error> {
        let (log, file) = Self::log_config(app)?;

        let logs = app.container().make_as::<PathBuf>("path.logs")?;
        std::fs::create_dir_all(logs.as_path())?;
        let path = logs.join(&file);

        let log = log.output(LogOutput::File(path.to_string_lossy().into_owned()));
        match log.clone().try_init()? {
            Some(guard) => {
                app.container().instance(LOG_GUARD_KEY, Value::new(guard));
                info!(file = %path.display(), "Logging to file");
            }
            None => debug!("Global subscriber already installed, keeping it"),
        }

        app.container().instance(LOG_KEY, Value::new(log));
        Ok(())
    }

    fn name(&self) -> &str {
        "LoadLogging"
    }
}

/// Registers the service providers listed under `services`.
///
/// Each entry is a container identifier resolving to an
/// `Arc<dyn ServiceProvider>`. A missing or null `services` key means no
/// providers; any other value must be a list of strings.
#[derive(Debug, Clone, Default)]
pub struct LoadServices;

impl Bootstrapper for LoadServices {
    fn bootstrap(&self, app: &Application) -> Result<(), Error> {
        let config = config_repository(app.container())?;
        let services: Vec<String> = match config.value(SERVICES_KEY) {
            None | Some(serde_json::Value::Null) => Vec::new(),
            Some(_) => config.get(SERVICES_KEY)?,
        };

        for id in &services {
            let service = app.container().make_as::<Arc<dyn ServiceProvider>>(id)?;
            app.register_service(service.as_ref().clone())?;
            debug!(service = %id, "Service registered");
        }

        info!(service_count = services.len(), "Services loaded");
        Ok(())
    }

    fn name(&self) -> &str {
        "LoadServices"
    }
}

/// Environment, configuration, logging and services, in that order.
pub fn default_bootstrappers() -> Vec<Arc<dyn Bootstrapper>> {
    vec![
        Arc::new(LoadEnvironmentVariables::new()),
        Arc::new(LoadConfiguration),
        Arc::new(LoadLogging),
        Arc::new(LoadServices),
    ]
}
