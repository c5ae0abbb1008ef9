// Environment variable loading

use crate::{ConfigError, Result};
use emberfuse_core::logging::debug;
use serde_json::{Map, Value};
use std::env;
use std::path::Path;

/// Reads process environment variables, optionally scoped by a prefix.
#[derive(Debug, Clone, Default)]
pub struct EnvLoader {
    prefix: Option<String>,
}

impl EnvLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only variables named `<PREFIX>_...` are visible, with the prefix
    /// stripped.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    /// Load a `.env` file into the process environment.
    ///
    /// Variables that are already set keep their value. Returns `false`
    /// when the file does not exist.
    pub fn load_dotenv(path: impl AsRef<Path>) -> Result<bool> {
        let path = path.as_ref();
        if !path.is_file() {
            return Ok(false);
        }

        dotenvy::from_path(path).map_err(|e| {
            ConfigError::LoadError(format!("Failed to load {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "Loaded environment file");
        Ok(true)
    }

    /// Every visible variable, keyed by lower-cased name.
    pub fn load(&self) -> Map<String, Value> {
        env::vars()
            .filter_map(|(key, value)| {
                let key = match &self.prefix {
                    Some(prefix) => key.strip_prefix(prefix.as_str())?.strip_prefix('_')?.to_string(),
                    None => key,
                };
                Some((key.to_lowercase(), Value::String(value)))
            })
            .collect()
    }

    /// Load one variable; the name is upper-cased and prefixed.
    pub fn load_var(&self, key: &str) -> Result<String> {
        env::var(self.full_key(key)).map_err(ConfigError::EnvError)
    }

    pub fn load_var_or(&self, key: &str, default: &str) -> String {
        self.load_var(key).unwrap_or_else(|_| default.to_string())
    }

    fn full_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix, key.to_uppercase()),
            None => key.to_uppercase(),
        }
    }
}
