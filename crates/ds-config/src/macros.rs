//! Built-in macros.
//!
//! A macro is a pure function from its arguments to a parameter mapping. The
//! resolver calls it at most once per resolution pass, so dynamic macros
//! (anything reading the clock) give one consistent value per pass.

use anyhow::bail;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};
use serde_json::{Map, Value};
use std::fmt::Write;

use crate::object::Arguments;
use crate::registry::Registry;

pub const DATETIME: &str = "macros.DateTime";
pub const PATHS: &str = "macros.Paths";

const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

pub fn register_builtin_macros(registry: &mut Registry) {
    registry
        .register_macro(DATETIME, |args| datetime_params(args, Local::now()))
        .register_macro(PATHS, |args| paths_params(args, Local::now()));
}

/// Format `now` with a strftime string taken from config.
fn format_time(now: &DateTime<Local>, format: &str) -> anyhow::Result<String> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        bail!("invalid timestamp format '{}'", format);
    }
    let mut out = String::new();
    if write!(out, "{}", now.format(format)).is_err() {
        bail!("cannot format time with '{}'", format);
    }
    Ok(out)
}

/// Calendar fields of `now`.
///
/// `now` is formatted with `format` (default `%Y-%m-%d-%H-%M-%S`); the
/// other fields are zero-padded strings, `timestamp` is Unix seconds.
fn datetime_params(args: &Arguments, now: DateTime<Local>) -> anyhow::Result<Map<String, Value>> {
    args.expect_only(&["format"])?;
    let format: String = args.value_or("format", DEFAULT_TIMESTAMP_FORMAT.to_string())?;

    let mut params = Map::new();
    params.insert("now".into(), Value::from(format_time(&now, &format)?));
    params.insert("year".into(), Value::from(now.format("%Y").to_string()));
    params.insert("month".into(), Value::from(now.format("%m").to_string()));
    params.insert("day".into(), Value::from(now.format("%d").to_string()));
    params.insert("hour".into(), Value::from(now.format("%H").to_string()));
    params.insert("minute".into(), Value::from(now.format("%M").to_string()));
    params.insert("timestamp".into(), Value::from(now.timestamp()));
    Ok(params)
}

/// Output directories for one run.
///
/// `path_root` is `root/<timestamp>` (or `root` with `"timestamp": false`);
/// each entry of `subdirs` adds `path_<subdir>` below it. Paths are joined
/// with `/` so URIs such as `hdfs://` roots survive unchanged.
fn paths_params(args: &Arguments, now: DateTime<Local>) -> anyhow::Result<Map<String, Value>> {
    args.expect_only(&["root", "subdirs", "timestamp", "timestamp_format"])?;
    let root: String = args.value("root")?;
    let subdirs: Vec<String> = args.value_or("subdirs", Vec::new())?;
    let timestamped: bool = args.value_or("timestamp", true)?;
    let format: String = args.value_or("timestamp_format", DEFAULT_TIMESTAMP_FORMAT.to_string())?;

    let root = root.trim_end_matches('/');
    let path_root = if timestamped {
        format!("{}/{}", root, format_time(&now, &format)?)
    } else {
        root.to_string()
    };

    let mut params = Map::new();
    for subdir in &subdirs {
        let subdir = subdir.trim_matches('/');
        anyhow::ensure!(!subdir.is_empty(), "empty subdir in '{}'", PATHS);
        params.insert(
            format!("path_{}", subdir.replace('/', "_")),
            Value::from(format!("{path_root}/{subdir}")),
        );
    }
    params.insert("path_root".into(), Value::from(path_root));
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2020, 3, 7, 9, 5, 0).unwrap()
    }

    fn args(value: Value) -> Arguments {
        match value {
            Value::Object(map) => Arguments::from_json(PATHS, map),
            _ => unreachable!(),
        }
    }

    #[test]
    fn datetime_fields_are_padded() {
        let params = datetime_params(&args(json!({})), fixed_now()).unwrap();
        assert_eq!(params["now"], json!("2020-03-07-09-05-00"));
        assert_eq!(params["month"], json!("03"));
        assert_eq!(params["day"], json!("07"));
        assert_eq!(params["hour"], json!("09"));
        assert_eq!(params["minute"], json!("05"));
        assert!(params["timestamp"].is_i64());
    }

    #[test]
    fn datetime_custom_format() {
        let params = datetime_params(&args(json!({"format": "%Y%m%d"})), fixed_now()).unwrap();
        assert_eq!(params["now"], json!("20200307"));
    }

    #[test]
    fn paths_are_timestamped() {
        let params = paths_params(
            &args(json!({"root": "hdfs://models/run/", "subdirs": ["model", "predictions/best"]})),
            fixed_now(),
        )
        .unwrap();

        assert_eq!(params["path_root"], json!("hdfs://models/run/2020-03-07-09-05-00"));
        assert_eq!(params["path_model"], json!("hdfs://models/run/2020-03-07-09-05-00/model"));
        assert_eq!(
            params["path_predictions_best"],
            json!("hdfs://models/run/2020-03-07-09-05-00/predictions/best")
        );
    }

    #[test]
    fn paths_without_timestamp() {
        let params = paths_params(
            &args(json!({"root": "/tmp/run", "timestamp": false, "subdirs": ["logs"]})),
            fixed_now(),
        )
        .unwrap();
        assert_eq!(params["path_root"], json!("/tmp/run"));
        assert_eq!(params["path_logs"], json!("/tmp/run/logs"));
    }

    #[test]
    fn paths_require_root() {
        let err = paths_params(&args(json!({"subdirs": []})), fixed_now()).unwrap_err();
        assert!(err.to_string().contains("root"));
    }

    #[test]
    fn unknown_format_specifier_is_an_error() {
        let err = paths_params(&args(json!({"root": "/r", "timestamp_format": "%Q"})), fixed_now())
            .unwrap_err();
        assert!(err.to_string().contains("%Q"));
        assert!(datetime_params(&args(json!({"format": "%Y-%Q"})), fixed_now()).is_err());
    }

    #[test]
    fn bad_format_fails_resolution() {
        let registry = Registry::with_builtin_macros();
        let mut diagnostics = ds_types::Diagnostics::new();
        let err = crate::parse_config(
            &json!({"p": "$paths:path_root"}),
            &json!({"paths": {"type": "macros.Paths", "root": "/r", "timestamp_format": "%Q"}}),
            &registry,
            &mut diagnostics,
        )
        .unwrap_err();
        assert!(err.to_string().contains("timestamp format"));
    }

    #[test]
    fn paths_reject_unknown_arguments() {
        assert!(paths_params(&args(json!({"root": "/tmp", "rot": 1})), fixed_now()).is_err());
    }
}
