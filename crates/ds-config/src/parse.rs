//! Macro resolution and reference substitution.

use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

use ds_types::{ConfigError, DiagnosticKind, Diagnostics, DsError, DsResult, NodePath};

use crate::instantiate::build_arguments;
use crate::reference::{is_skipped, MacroRef, KEY_EVAL, KEY_TYPE, REF_MACROS, REF_SELF};
use crate::registry::Registry;

/// State of one resolution pass.
///
/// Holds private copies of the config and macro templates, the memoized
/// value of every macro evaluated so far and the set of dereferenced
/// `(macro, param)` pairs. A new context must be built for every pass so
/// dynamic macros are re-evaluated.
pub struct ResolutionContext<'a> {
    registry: &'a Registry,
    config: Value,
    declared: Map<String, Value>,
    resolved: HashMap<String, Map<String, Value>>,
    in_progress: Vec<String>,
    used: HashSet<(String, String)>,
    forwarded: bool,
}

impl<'a> ResolutionContext<'a> {
    pub fn new(registry: &'a Registry, config: &Value, macros: &Value) -> DsResult<Self> {
        let declared = match macros {
            Value::Null => Map::new(),
            Value::Object(map) => map.clone(),
            other => {
                return Err(ConfigError::InvalidNode {
                    path: NodePath::root(),
                    message: format!("macros must be a mapping, got {other}"),
                }
                .into())
            }
        };
        Ok(Self {
            registry,
            config: config.clone(),
            declared,
            resolved: HashMap::new(),
            in_progress: Vec::new(),
            used: HashSet::new(),
            forwarded: false,
        })
    }

    /// Evaluate every declared macro, in declaration order.
    pub fn resolve_macros(&mut self) -> DsResult<()> {
        let names: Vec<String> = self.declared.keys().cloned().collect();
        for name in names {
            self.ensure_macro(&name)?;
        }
        Ok(())
    }

    /// Resolve macros then substitute every reference in the config.
    pub fn resolve(&mut self) -> DsResult<Value> {
        self.resolve_macros()?;
        let config = self.config.clone();
        self.substitute(&config, &NodePath::root())
    }

    /// Parameters of an evaluated macro.
    pub fn macro_values(&self, name: &str) -> Option<&Map<String, Value>> {
        self.resolved.get(name)
    }

    pub fn is_used(&self, macro_name: &str, param: &str) -> bool {
        self.used
            .contains(&(macro_name.to_string(), param.to_string()))
    }

    /// Report every evaluated macro parameter that was never dereferenced.
    ///
    /// Nothing is reported once the macro set was forwarded through
    /// `@macros`: its consumer resolves the references in a later pass.
    pub fn report_unused(&self, diagnostics: &mut Diagnostics) {
        if self.forwarded {
            return;
        }
        for name in self.declared.keys() {
            let Some(params) = self.resolved.get(name) else {
                continue;
            };
            for param in params.keys() {
                if !self.is_used(name, param) {
                    diagnostics.push(DiagnosticKind::UnusedMacroParameter {
                        macro_name: name.clone(),
                        param: param.clone(),
                    });
                }
            }
        }
    }

    fn substitute(&mut self, node: &Value, path: &NodePath) -> DsResult<Value> {
        match node {
            Value::String(s) if s == REF_SELF => Ok(self.self_reference()),
            Value::String(s) if s == REF_MACROS => {
                self.forwarded = true;
                Ok(self.macros_reference())
            }
            Value::String(s) => match MacroRef::parse(s) {
                Some(reference) => self.lookup(&reference, path),
                None => Ok(node.clone()),
            },
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.substitute(item, &path.index(i)))
                .collect::<DsResult<Vec<_>>>()
                .map(Value::Array),
            Value::Object(_) if is_skipped(node) => Ok(node.clone()),
            Value::Object(map) => self.substitute_map(map, path).map(Value::Object),
            _ => Ok(node.clone()),
        }
    }

    fn substitute_map(&mut self, map: &Map<String, Value>, path: &NodePath) -> DsResult<Map<String, Value>> {
        let mut out = Map::with_capacity(map.len());
        for (key, value) in map {
            out.insert(key.clone(), self.substitute(value, &path.key(key))?);
        }
        Ok(out)
    }

    fn lookup(&mut self, reference: &MacroRef, path: &NodePath) -> DsResult<Value> {
        if !self.declared.contains_key(&reference.macro_name) {
            return Err(ConfigError::UndeclaredMacro {
                name: reference.macro_name.clone(),
                path: path.clone(),
            }
            .into());
        }
        self.ensure_macro(&reference.macro_name)?;

        let value = self
            .resolved
            .get(&reference.macro_name)
            .and_then(|params| params.get(&reference.param))
            .cloned()
            .ok_or_else(|| ConfigError::UndeclaredParameter {
                macro_name: reference.macro_name.clone(),
                param: reference.param.clone(),
                path: path.clone(),
            })?;

        self.used
            .insert((reference.macro_name.clone(), reference.param.clone()));
        Ok(value)
    }

    fn ensure_macro(&mut self, name: &str) -> DsResult<()> {
        if self.resolved.contains_key(name) {
            return Ok(());
        }
        if let Some(pos) = self.in_progress.iter().position(|n| n == name) {
            let mut chain = self.in_progress[pos..].to_vec();
            chain.push(name.to_string());
            return Err(ConfigError::CyclicMacro {
                chain: chain.join(" -> "),
            }
            .into());
        }

        let raw = self.declared.get(name).cloned().unwrap_or(Value::Null);
        self.in_progress.push(name.to_string());
        let evaluated = self.evaluate_macro(name, raw);
        self.in_progress.pop();

        let params = evaluated?;
        tracing::debug!("Resolved macro '{}' ({} parameters)", name, params.len());
        self.resolved.insert(name.to_string(), params);
        Ok(())
    }

    fn evaluate_macro(&mut self, name: &str, raw: Value) -> DsResult<Map<String, Value>> {
        let path = NodePath::named(name);
        let mut map = match raw {
            Value::Object(map) => map,
            other => {
                return Err(ConfigError::InvalidMacro {
                    name: name.to_string(),
                    message: format!("expected a mapping or a typed node, got {other}"),
                }
                .into())
            }
        };

        if !map.contains_key(KEY_TYPE) {
            return self.substitute_map(&map, &path);
        }

        // A typed macro is always evaluated, whatever its eval mode.
        map.remove(KEY_EVAL);
        let substituted = self.substitute_map(&map, &path)?;

        let type_name = match substituted.get(KEY_TYPE) {
            Some(Value::String(s)) => s.clone(),
            other => {
                return Err(ConfigError::InvalidNode {
                    path: path.key(KEY_TYPE),
                    message: format!("type must be a string, got {}", other.unwrap_or(&Value::Null)),
                }
                .into())
            }
        };
        let factory = self
            .registry
            .macro_factory(&type_name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownType {
                type_name: type_name.clone(),
                path: path.clone(),
            })?;

        let args = build_arguments(self.registry, &type_name, &substituted, &path)?;
        factory(&args).map_err(|e| {
            DsError::from(ConfigError::Construction {
                type_name,
                path,
                message: format!("{e:#}"),
            })
        })
    }

    fn self_reference(&self) -> Value {
        mark_skipped(self.config.clone())
    }

    fn macros_reference(&self) -> Value {
        Value::Object(
            self.declared
                .iter()
                .map(|(name, value)| (name.clone(), mark_skipped(value.clone())))
                .collect(),
        )
    }
}

/// Mark a typed node so it stays plain config through instantiation.
fn mark_skipped(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key(KEY_TYPE) => {
            map.insert(KEY_EVAL.to_string(), Value::from("skip"));
            Value::Object(map)
        }
        other => other,
    }
}

/// Substitute every macro reference in `config`.
///
/// Unused macro parameters are reported to `diagnostics`; they never fail
/// the pass.
pub fn parse_config(
    config: &Value,
    macros: &Value,
    registry: &Registry,
    diagnostics: &mut Diagnostics,
) -> DsResult<Value> {
    let mut ctx = ResolutionContext::new(registry, config, macros)?;
    let resolved = ctx.resolve()?;
    ctx.report_unused(diagnostics);
    Ok(resolved)
}
