//! Reserved keys and reference strings of the config format.

use std::fmt;

/// Key naming the entity a mapping is built from.
pub const KEY_TYPE: &str = "type";
/// Key selecting how a typed node is evaluated.
pub const KEY_EVAL: &str = "eval";
/// Key holding positional arguments of a typed node.
pub const KEY_POSITIONAL: &str = "*";

/// Replaced by the raw top-level config.
pub const REF_SELF: &str = "@self";
/// Replaced by the raw macro set.
pub const REF_MACROS: &str = "@macros";

const MACRO_PREFIX: char = '$';
const MACRO_SEPARATOR: char = ':';

/// A `$macro:param` placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MacroRef {
    pub macro_name: String,
    pub param: String,
}

impl MacroRef {
    /// Parse a whole string as a macro reference.
    ///
    /// Returns `None` for anything that is not exactly `$<macro>:<param>`
    /// with both parts non-empty.
    pub fn parse(s: &str) -> Option<Self> {
        let body = s.strip_prefix(MACRO_PREFIX)?;
        let (macro_name, param) = body.split_once(MACRO_SEPARATOR)?;
        if macro_name.is_empty() || param.is_empty() {
            return None;
        }
        Some(Self {
            macro_name: macro_name.to_string(),
            param: param.to_string(),
        })
    }
}

impl fmt::Display for MacroRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{MACRO_PREFIX}{}{MACRO_SEPARATOR}{}", self.macro_name, self.param)
    }
}

/// Evaluation mode of a typed node (`"eval"` key).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    /// Build the entity now.
    Call,
    /// Bind the arguments, build later.
    Partial,
    /// Leave the node as plain config.
    Skip,
}

impl EvalMode {
    pub fn from_value(value: Option<&serde_json::Value>) -> Result<Self, String> {
        match value {
            None => Ok(Self::Call),
            Some(serde_json::Value::Null) => Ok(Self::Skip),
            Some(serde_json::Value::String(s)) => match s.as_str() {
                "call" => Ok(Self::Call),
                "partial" => Ok(Self::Partial),
                "skip" => Ok(Self::Skip),
                other => Err(format!("unknown eval mode '{other}'")),
            },
            Some(other) => Err(format!("eval must be a string or null, got {other}")),
        }
    }
}

/// True when `value` is a typed node that must be kept verbatim.
pub fn is_skipped(value: &serde_json::Value) -> bool {
    match value.as_object() {
        Some(map) if map.contains_key(KEY_TYPE) => {
            matches!(EvalMode::from_value(map.get(KEY_EVAL)), Ok(EvalMode::Skip))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_macro_reference() {
        let r = MacroRef::parse("$params:learning_rate").unwrap();
        assert_eq!(r.macro_name, "params");
        assert_eq!(r.param, "learning_rate");
        assert_eq!(r.to_string(), "$params:learning_rate");
    }

    #[test]
    fn param_may_contain_separator() {
        let r = MacroRef::parse("$paths:hdfs://root").unwrap();
        assert_eq!(r.macro_name, "paths");
        assert_eq!(r.param, "hdfs://root");
    }

    #[test]
    fn rejects_non_references() {
        for s in ["params:lr", "$params", "$:lr", "$params:", "cost $5:00 later", ""] {
            assert!(MacroRef::parse(s).is_none(), "{s} parsed as a reference");
        }
    }

    #[test]
    fn eval_modes() {
        assert_eq!(EvalMode::from_value(None), Ok(EvalMode::Call));
        assert_eq!(EvalMode::from_value(Some(&json!(null))), Ok(EvalMode::Skip));
        assert_eq!(EvalMode::from_value(Some(&json!("partial"))), Ok(EvalMode::Partial));
        assert!(EvalMode::from_value(Some(&json!("later"))).is_err());
        assert!(EvalMode::from_value(Some(&json!(1))).is_err());
    }

    #[test]
    fn skipped_only_for_typed_nodes() {
        assert!(is_skipped(&json!({"type": "A", "eval": "skip"})));
        assert!(is_skipped(&json!({"type": "A", "eval": null})));
        assert!(!is_skipped(&json!({"eval": "skip"})));
        assert!(!is_skipped(&json!({"type": "A"})));
    }
}
