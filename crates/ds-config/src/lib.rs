//! # ds-config
//!
//! Declarative config resolution for DeepSweep.
//!
//! A config is a JSON tree whose mappings may carry a `"type"` key naming an
//! entity in a [`Registry`]. String leaves of the form `$macro:param` are
//! replaced by values from a macro set before the tree is instantiated leaves
//! first.

pub mod instantiate;
pub mod job;
pub mod loader;
pub mod macros;
mod object;
mod parse;
pub mod reference;
mod registry;

pub use instantiate::from_config;
pub use job::{Job, JobContext, JobReport};
pub use loader::{load_json, load_macros, load_optional_macros, save_json};
pub use object::{Arguments, Instance, Object, Partial};
pub use parse::{parse_config, ResolutionContext};
pub use reference::{EvalMode, MacroRef};
pub use registry::{Factory, MacroFactory, Registry};

use ds_types::{Diagnostics, DsResult};
use serde_json::Value;

/// Substitute macros in `config` then instantiate it.
pub fn resolve(
    config: &Value,
    macros: &Value,
    registry: &Registry,
    diagnostics: &mut Diagnostics,
) -> DsResult<Object> {
    let parsed = parse_config(config, macros, registry, diagnostics)?;
    from_config(&parsed, registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq)]
    struct X {
        rate: f64,
    }

    #[derive(Debug, PartialEq)]
    struct Wrapper {
        inner: std::sync::Arc<X>,
        tag: String,
    }

    fn registry() -> Registry {
        let mut registry = Registry::with_builtin_macros();
        registry
            .register("X", |args| Ok(X { rate: args.value("rate")? }))
            .register("Wrapper", |args| {
                Ok(Wrapper {
                    inner: args.instance::<X>("inner")?,
                    tag: args.value("tag")?,
                })
            });
        registry
    }

    #[test]
    fn end_to_end_macro_substitution_and_instantiation() {
        let registry = registry();
        let mut diagnostics = Diagnostics::new();
        let config = json!({"type": "X", "rate": "$params:lr"});
        let macros = json!({"params": {"lr": 0.01}});

        let parsed = parse_config(&config, &macros, &registry, &mut diagnostics).unwrap();
        assert_eq!(parsed, json!({"type": "X", "rate": 0.01}));

        let built = resolve(&config, &macros, &registry, &mut diagnostics).unwrap();
        assert_eq!(*built.downcast::<X>().unwrap(), X { rate: 0.01 });
    }

    #[test]
    fn empty_macros_match_direct_instantiation() {
        let registry = registry();
        let config = json!({"type": "Wrapper", "tag": "t", "inner": {"type": "X", "rate": 2.0}});

        let mut diagnostics = Diagnostics::new();
        let resolved = resolve(&config, &Value::Null, &registry, &mut diagnostics).unwrap();
        let direct = from_config(&config, &registry).unwrap();

        assert_eq!(
            *resolved.downcast::<Wrapper>().unwrap(),
            *direct.downcast::<Wrapper>().unwrap()
        );
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn unused_parameter_does_not_block_instantiation() {
        let registry = registry();
        let mut diagnostics = Diagnostics::new();
        let built = resolve(
            &json!({"type": "X", "rate": "$params:lr"}),
            &json!({"params": {"lr": 0.5, "dropout": 0.1}}),
            &registry,
            &mut diagnostics,
        )
        .unwrap();

        assert_eq!(built.downcast::<X>().unwrap().rate, 0.5);
        assert_eq!(
            diagnostics.unused_macro_parameters(),
            vec![("params".to_string(), "dropout".to_string())]
        );
    }

    #[test]
    fn dynamic_paths_are_shared_within_a_pass() {
        let registry = registry();
        let mut diagnostics = Diagnostics::new();
        let parsed = parse_config(
            &json!({"save": "$paths:path_model", "export": {"to": "$paths:path_model"}}),
            &json!({"paths": {"type": "macros.Paths", "root": "/runs", "subdirs": ["model"]}}),
            &registry,
            &mut diagnostics,
        )
        .unwrap();

        assert_eq!(parsed["save"], parsed["export"]["to"]);
        assert!(parsed["save"].as_str().unwrap().starts_with("/runs/"));
    }
}
