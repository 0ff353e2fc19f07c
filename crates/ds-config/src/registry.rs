//! Explicit name → factory registry backing `"type"` dispatch.

use serde_json::{Map, Value};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::job::Job;
use crate::macros;
use crate::object::{Arguments, Instance};

/// Builds an entity from resolved arguments.
pub type Factory = Arc<dyn Fn(Arguments) -> anyhow::Result<Instance> + Send + Sync>;

/// Produces a macro's parameter mapping.
pub type MacroFactory = Arc<dyn Fn(&Arguments) -> anyhow::Result<Map<String, Value>> + Send + Sync>;

/// Entities and macros addressable from config by name.
///
/// Populated once at startup and then shared read-only by every resolution
/// pass.
#[derive(Clone, Default)]
pub struct Registry {
    entities: HashMap<String, Factory>,
    macros: HashMap<String, MacroFactory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in macros.
    pub fn with_builtin_macros() -> Self {
        let mut registry = Self::new();
        macros::register_builtin_macros(&mut registry);
        registry
    }

    pub fn register<T, F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        T: Any + Send + Sync,
        F: Fn(Arguments) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let type_name = name.to_string();
        self.insert_entity(
            name,
            Arc::new(move |args: Arguments| factory(args).map(|value| Instance::new(type_name.clone(), value))),
        )
    }

    pub fn register_job<J, F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        J: Job + 'static,
        F: Fn(Arguments) -> anyhow::Result<J> + Send + Sync + 'static,
    {
        let type_name = name.to_string();
        self.insert_entity(
            name,
            Arc::new(move |args: Arguments| factory(args).map(|job| Instance::from_job(type_name.clone(), job))),
        )
    }

    pub fn register_macro<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn(&Arguments) -> anyhow::Result<Map<String, Value>> + Send + Sync + 'static,
    {
        if self.macros.insert(name.to_string(), Arc::new(factory)).is_some() {
            tracing::debug!("Replaced macro registration: {}", name);
        }
        self
    }

    fn insert_entity(&mut self, name: &str, factory: Factory) -> &mut Self {
        if self.entities.insert(name.to_string(), factory).is_some() {
            tracing::debug!("Replaced entity registration: {}", name);
        }
        self
    }

    pub fn entity(&self, name: &str) -> Option<&Factory> {
        self.entities.get(name)
    }

    pub fn macro_factory(&self, name: &str) -> Option<&MacroFactory> {
        self.macros.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name) || self.macros.contains_key(name)
    }

    pub fn entity_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entities.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn macro_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.macros.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("entities", &self.entity_names())
            .field("macros", &self.macro_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobContext, JobReport};
    use ds_types::Diagnostics;

    struct Noop;

    impl Job for Noop {
        fn run(&self, _ctx: &mut JobContext<'_>) -> anyhow::Result<JobReport> {
            Ok(JobReport::new().with_metric("ran", 1.0))
        }
    }

    #[test]
    fn registers_entities_jobs_and_macros() {
        let mut registry = Registry::new();
        registry
            .register("numbers.Double", |args| Ok(args.value::<i64>("x")? * 2))
            .register_job("jobs.Noop", |_args| Ok(Noop))
            .register_macro("macros.Const", |_args| {
                let mut map = Map::new();
                map.insert("answer".into(), Value::from(42));
                Ok(map)
            });

        assert_eq!(registry.entity_names(), vec!["jobs.Noop", "numbers.Double"]);
        assert_eq!(registry.macro_names(), vec!["macros.Const"]);
        assert!(registry.contains("macros.Const"));
        assert!(!registry.contains("macros.Missing"));

        let mut named = Map::new();
        named.insert("x".into(), Value::from(21));
        let factory = registry.entity("numbers.Double").unwrap();
        let instance = factory(Arguments::from_json("numbers.Double", named)).unwrap();
        assert_eq!(instance.type_name(), "numbers.Double");
        assert_eq!(instance.downcast_ref::<i64>(), Some(&42));

        let job = registry.entity("jobs.Noop").unwrap()(Arguments::default()).unwrap();
        let mut diagnostics = Diagnostics::new();
        let report = job
            .as_job()
            .unwrap()
            .run(&mut JobContext::new(&registry, &mut diagnostics))
            .unwrap();
        assert_eq!(report.metric("ran"), Some(1.0));
    }

    #[test]
    fn builtin_macros_are_registered() {
        let registry = Registry::with_builtin_macros();
        assert!(registry.macro_factory(macros::DATETIME).is_some());
        assert!(registry.macro_factory(macros::PATHS).is_some());
    }
}
