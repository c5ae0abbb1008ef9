// Configuration file loaders

use crate::{ConfigError, Result};
use emberfuse_core::logging::{debug, trace};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    Json,
    Toml,
    Env,
}

impl FileFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(FileFormat::Json),
            "toml" => Some(FileFormat::Toml),
            "env" => Some(FileFormat::Env),
            _ => None,
        }
    }

    fn of(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

/// Configuration file loader
pub struct ConfigLoader {
    format: FileFormat,
}

impl ConfigLoader {
    pub fn new(format: FileFormat) -> Self {
        Self { format }
    }

    /// Pick the format from the file extension.
    pub fn auto(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        FileFormat::of(path).map(Self::new).ok_or_else(|| {
            ConfigError::LoadError(format!("Unsupported configuration file: {}", path.display()))
        })
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Value> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::LoadError(format!("Failed to read {}: {e}", path.display()))
        })?;

        self.parse(&content)
    }

    /// Parse configuration from string
    pub fn parse(&self, content: &str) -> Result<Value> {
        match self.format {
            FileFormat::Json => serde_json::from_str(content)
                .map_err(|e| ConfigError::ParseError(format!("JSON parse error: {e}"))),
            FileFormat::Toml => {
                let value: toml::Table = toml::from_str(content)
                    .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {e}")))?;
                serde_json::to_value(value)
                    .map_err(|e| ConfigError::SerializationError(e.to_string()))
            }
            FileFormat::Env => parse_env(content),
        }
    }

    /// Load every supported file in `dir`, one top-level key per file stem.
    ///
    /// Files are read in name order, so `app.toml` is shadowed by a later
    /// `app.json`. A missing directory yields no items.
    pub fn load_directory(dir: impl AsRef<Path>) -> Result<Map<String, Value>> {
        let dir = dir.as_ref();
        let mut items = Map::new();
        if !dir.is_dir() {
            trace!(dir = %dir.display(), "No configuration directory");
            return Ok(items);
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && FileFormat::of(&path).is_some() {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            let Some(key) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let value = Self::auto(&path)?.load_file(&path)?;
            debug!(file = %path.display(), key, "Loaded configuration file");
            items.insert(key.to_string(), value);
        }

        Ok(items)
    }
}

/// `.env` syntax as `dotenvy` reads it: `export`, quoting, escapes and
/// `${VAR}` substitution.
fn parse_env(content: &str) -> Result<Value> {
    let mut map = Map::new();

    for item in dotenvy::from_read_iter(content.as_bytes()) {
        let (key, value) =
            item.map_err(|e| ConfigError::ParseError(format!(".env parse error: {e}")))?;
        map.insert(key, Value::String(value));
    }

    Ok(Value::Object(map))
}
