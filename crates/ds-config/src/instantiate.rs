//! Instantiation of resolved config trees.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use ds_types::{ConfigError, DsError, DsResult, NodePath};

use crate::object::{Arguments, Object, Partial};
use crate::reference::{EvalMode, KEY_EVAL, KEY_POSITIONAL, KEY_TYPE};
use crate::registry::Registry;

/// Instantiate every typed node of `node`, leaves first.
///
/// Macro references are not substituted here; run `parse_config` first.
pub fn from_config(node: &Value, registry: &Registry) -> DsResult<Object> {
    build(registry, node, &NodePath::root())
}

fn build(registry: &Registry, node: &Value, path: &NodePath) -> DsResult<Object> {
    match node {
        Value::Array(items) => {
            let built = items
                .iter()
                .enumerate()
                .map(|(i, item)| build(registry, item, &path.index(i)))
                .collect::<DsResult<Vec<_>>>()?;
            Ok(collapse_list(built))
        }
        Value::Object(map) if map.contains_key(KEY_TYPE) => build_typed(registry, map, path),
        Value::Object(map) => {
            let mut built = BTreeMap::new();
            for (key, value) in map {
                built.insert(key.clone(), build(registry, value, &path.key(key))?);
            }
            Ok(collapse_map(map, built))
        }
        _ => Ok(Object::Value(node.clone())),
    }
}

fn build_typed(registry: &Registry, map: &Map<String, Value>, path: &NodePath) -> DsResult<Object> {
    let mode = EvalMode::from_value(map.get(KEY_EVAL)).map_err(|message| ConfigError::InvalidNode {
        path: path.key(KEY_EVAL),
        message,
    })?;

    if mode == EvalMode::Skip {
        let mut raw = map.clone();
        raw.remove(KEY_EVAL);
        return Ok(Object::Value(Value::Object(raw)));
    }

    let type_name = type_name(map, path)?;
    let factory = registry
        .entity(type_name)
        .cloned()
        .ok_or_else(|| ConfigError::UnknownType {
            type_name: type_name.to_string(),
            path: path.clone(),
        })?;

    let args = build_arguments(registry, type_name, map, path)?;

    match mode {
        EvalMode::Partial => Ok(Object::Partial(Partial::new(path.clone(), factory, args))),
        _ => {
            let instance = factory(args).map_err(|e| {
                DsError::from(ConfigError::Construction {
                    type_name: type_name.to_string(),
                    path: path.clone(),
                    message: format!("{e:#}"),
                })
            })?;
            tracing::debug!("Instantiated {} at {}", type_name, path);
            Ok(Object::Instance(instance))
        }
    }
}

fn type_name<'m>(map: &'m Map<String, Value>, path: &NodePath) -> DsResult<&'m str> {
    match map.get(KEY_TYPE) {
        Some(Value::String(s)) => Ok(s.as_str()),
        other => Err(ConfigError::InvalidNode {
            path: path.key(KEY_TYPE),
            message: format!("type must be a string, got {}", other.unwrap_or(&Value::Null)),
        }
        .into()),
    }
}

/// Build the arguments of a typed node: `"*"` gives positional arguments,
/// every other key except `"type"` and `"eval"` a keyword argument.
pub(crate) fn build_arguments(
    registry: &Registry,
    type_name: &str,
    map: &Map<String, Value>,
    path: &NodePath,
) -> DsResult<Arguments> {
    let positional = match map.get(KEY_POSITIONAL) {
        None => Vec::new(),
        Some(Value::Array(items)) => {
            let star = path.key(KEY_POSITIONAL);
            items
                .iter()
                .enumerate()
                .map(|(i, item)| build(registry, item, &star.index(i)))
                .collect::<DsResult<Vec<_>>>()?
        }
        Some(other) => {
            return Err(ConfigError::InvalidNode {
                path: path.key(KEY_POSITIONAL),
                message: format!("positional arguments must be a list, got {other}"),
            }
            .into())
        }
    };

    let mut named = BTreeMap::new();
    for (key, value) in map {
        if key == KEY_TYPE || key == KEY_EVAL || key == KEY_POSITIONAL {
            continue;
        }
        named.insert(key.clone(), build(registry, value, &path.key(key))?);
    }

    Ok(Arguments::new(type_name, positional, named))
}

fn collapse_list(items: Vec<Object>) -> Object {
    if items.iter().all(|item| matches!(item, Object::Value(_))) {
        Object::Value(Value::Array(
            items.into_iter().filter_map(Object::into_value).collect(),
        ))
    } else {
        Object::List(items)
    }
}

fn collapse_map(original: &Map<String, Value>, built: BTreeMap<String, Object>) -> Object {
    if built.values().all(|item| matches!(item, Object::Value(_))) {
        // Rebuild from the original to keep key order.
        let mut out = Map::with_capacity(original.len());
        let mut built = built;
        for key in original.keys() {
            if let Some(Object::Value(v)) = built.remove(key) {
                out.insert(key.clone(), v);
            }
        }
        Object::Value(Value::Object(out))
    } else {
        Object::Map(built)
    }
}
