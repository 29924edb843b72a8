use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::{JsonSchema, Schema};
use crate::error::SchemaError;

impl JsonSchema {
    /// Load `<dir>/<name>.json`.
    pub fn load(name: &str, dir: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let dir = dir.as_ref();
        let path = dir.join(format!("{name}.json"));
        if !path.is_file() {
            return Err(not_found(name, dir));
        }
        Self::from_json_file(path)
    }

    /// Load `<dir>/<name>.yml`, falling back to `<dir>/<name>.yaml`.
    pub fn load_yaml(name: &str, dir: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let dir = dir.as_ref();
        match yaml_path(name, dir) {
            Some(path) => Self::from_yaml_file(path),
            None => Err(not_found(name, dir)),
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let text = read(path)?;
        let document: Value = serde_json::from_str(&text).map_err(|source| SchemaError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded JSON schema");
        JsonSchema::new(document)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let text = read(path)?;
        let document: Value = serde_yaml::from_str(&text).map_err(|source| SchemaError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded YAML schema");
        JsonSchema::new(document)
    }
}

/// Load the schema called `name` from `dir`, trying `.json`, `.yml` and
/// `.yaml` in that order.
pub fn load_schema(name: &str, dir: impl AsRef<Path>) -> Result<Schema, SchemaError> {
    let dir = dir.as_ref();
    let json = dir.join(format!("{name}.json"));
    if json.is_file() {
        return JsonSchema::from_json_file(json).map(Schema::from);
    }
    match yaml_path(name, dir) {
        Some(path) => JsonSchema::from_yaml_file(path).map(Schema::from),
        None => Err(not_found(name, dir)),
    }
}

fn yaml_path(name: &str, dir: &Path) -> Option<PathBuf> {
    ["yml", "yaml"]
        .iter()
        .map(|ext| dir.join(format!("{name}.{ext}")))
        .find(|p| p.is_file())
}

fn read(path: &Path) -> Result<String, SchemaError> {
    fs::read_to_string(path).map_err(|source| SchemaError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn not_found(name: &str, dir: &Path) -> SchemaError {
    SchemaError::NotFound {
        name: name.to_string(),
        dir: dir.to_path_buf(),
    }
}
