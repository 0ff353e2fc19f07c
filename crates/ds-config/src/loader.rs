//! Reading and writing JSON config files.

use serde_json::Value;
use std::fs;
use std::path::Path;

use ds_types::{ConfigError, DsResult, NodePath};

/// Read a JSON document.
pub fn load_json<P: AsRef<Path>>(path: P) -> DsResult<Value> {
    let path = path.as_ref();
    tracing::info!("Loading JSON from: {}", path.display());
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Read a macros file; it must hold a mapping (or `null`).
pub fn load_macros<P: AsRef<Path>>(path: P) -> DsResult<Value> {
    let value = load_json(path)?;
    match value {
        Value::Object(_) | Value::Null => Ok(value),
        other => Err(ConfigError::InvalidNode {
            path: NodePath::root(),
            message: format!("macros file must hold a mapping, got {other}"),
        }
        .into()),
    }
}

/// Load an optional macros file, defaulting to no macros.
pub fn load_optional_macros<P: AsRef<Path>>(path: Option<P>) -> DsResult<Value> {
    match path {
        Some(path) => load_macros(path),
        None => Ok(Value::Null),
    }
}

/// Write `value` as pretty-printed JSON.
pub fn save_json<P: AsRef<Path>>(path: P, value: &Value) -> DsResult<()> {
    let path = path.as_ref();
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    tracing::info!("Wrote JSON to: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ds_types::DsError;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = json!({"type": "jobs.Echo", "message": "$params:lr"});

        save_json(&path, &config).unwrap();
        assert_eq!(load_json(&path).unwrap(), config);
    }

    #[test]
    fn macros_file_must_be_a_mapping() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("macros.json");
        fs::write(&path, "[1, 2, 3]").unwrap();

        assert!(matches!(load_macros(&path), Err(DsError::Config(_))));
        assert_eq!(load_optional_macros::<&Path>(None).unwrap(), Value::Null);
    }

    #[test]
    fn missing_and_malformed_files() {
        let dir = tempdir().unwrap();
        assert!(matches!(load_json(dir.path().join("nope.json")), Err(DsError::Io(_))));

        let path = dir.path().join("bad.json");
        fs::write(&path, "{\"type\": ").unwrap();
        assert!(matches!(load_json(&path), Err(DsError::Serialization(_))));
    }
}
