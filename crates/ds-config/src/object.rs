//! Values produced by instantiating a config tree.

use anyhow::{anyhow, bail, Context};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use ds_types::{ConfigError, DsError, DsResult, NodePath};

use crate::job::Job;
use crate::reference::{KEY_EVAL, KEY_TYPE};
use crate::registry::Factory;

/// A node of an instantiated config tree.
///
/// Subtrees without any typed node stay as plain JSON in `Value`, so a
/// config with no entities instantiates to itself.
#[derive(Debug, Clone)]
pub enum Object {
    Value(Value),
    List(Vec<Object>),
    Map(BTreeMap<String, Object>),
    Instance(Instance),
    Partial(Partial),
}

impl Object {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            Self::Instance(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_partial(&self) -> Option<&Partial> {
        match self {
            Self::Partial(p) => Some(p),
            _ => None,
        }
    }

    /// Downcast a built entity to its concrete type.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.as_instance().and_then(|i| i.downcast::<T>())
    }

    pub fn as_job(&self) -> Option<Arc<dyn Job>> {
        self.as_instance().and_then(Instance::as_job)
    }

    /// JSON rendering; entities show up as `{"type": name}`.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Value(v) => v.clone(),
            Self::List(items) => Value::Array(items.iter().map(Object::to_json).collect()),
            Self::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Self::Instance(i) => serde_json::json!({ KEY_TYPE: i.type_name() }),
            Self::Partial(p) => serde_json::json!({ KEY_TYPE: p.type_name(), KEY_EVAL: "partial" }),
        }
    }
}

/// A built entity.
#[derive(Clone)]
pub struct Instance {
    type_name: String,
    inner: Arc<dyn Any + Send + Sync>,
}

struct JobEntity(Arc<dyn Job>);

impl Instance {
    pub fn new<T: Any + Send + Sync>(type_name: impl Into<String>, value: T) -> Self {
        Self {
            type_name: type_name.into(),
            inner: Arc::new(value),
        }
    }

    pub fn from_job<J: Job + 'static>(type_name: impl Into<String>, job: J) -> Self {
        let job: Arc<dyn Job> = Arc::new(job);
        Self::new(type_name, JobEntity(job))
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.inner.clone().downcast::<T>().ok()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn as_job(&self) -> Option<Arc<dyn Job>> {
        self.inner
            .downcast_ref::<JobEntity>()
            .map(|entity| Arc::clone(&entity.0))
    }

    pub fn is_job(&self) -> bool {
        self.inner.is::<JobEntity>()
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type_name", &self.type_name)
            .field("job", &self.is_job())
            .finish()
    }
}

/// A typed node evaluated with `"eval": "partial"`: arguments are bound,
/// construction happens on `call`.
#[derive(Clone)]
pub struct Partial {
    path: NodePath,
    factory: Factory,
    args: Arguments,
}

impl Partial {
    pub(crate) fn new(path: NodePath, factory: Factory, args: Arguments) -> Self {
        Self {
            path,
            factory,
            args,
        }
    }

    pub fn type_name(&self) -> &str {
        self.args.type_name()
    }

    pub fn bound(&self) -> &Arguments {
        &self.args
    }

    /// Build the entity. `extra` arguments override bound ones.
    pub fn call(&self, extra: BTreeMap<String, Object>) -> DsResult<Instance> {
        let mut args = self.args.clone();
        args.named.extend(extra);
        (self.factory)(args).map_err(|e| {
            DsError::from(ConfigError::Construction {
                type_name: self.type_name().to_string(),
                path: self.path.clone(),
                message: format!("{e:#}"),
            })
        })
    }
}

impl fmt::Debug for Partial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Partial")
            .field("path", &self.path.to_string())
            .field("args", &self.args)
            .finish()
    }
}

/// Resolved arguments handed to a factory.
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    type_name: String,
    positional: Vec<Object>,
    named: BTreeMap<String, Object>,
}

impl Arguments {
    pub fn new(
        type_name: impl Into<String>,
        positional: Vec<Object>,
        named: BTreeMap<String, Object>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            positional,
            named,
        }
    }

    /// Arguments built from plain JSON keyword values.
    pub fn from_json(type_name: impl Into<String>, named: serde_json::Map<String, Value>) -> Self {
        Self::new(
            type_name,
            Vec::new(),
            named.into_iter().map(|(k, v)| (k, Object::Value(v))).collect(),
        )
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn positional(&self) -> &[Object] {
        &self.positional
    }

    pub fn named(&self) -> &BTreeMap<String, Object> {
        &self.named
    }

    pub fn get(&self, name: &str) -> Option<&Object> {
        self.named.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.named.contains_key(name)
    }

    /// Required plain-data argument.
    pub fn value<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<T> {
        self.optional(name)?
            .ok_or_else(|| anyhow!("missing argument '{}' for '{}'", name, self.type_name))
    }

    /// Optional plain-data argument; absent and `null` both give `None`.
    pub fn optional<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<Option<T>> {
        match self.named.get(name) {
            None | Some(Object::Value(Value::Null)) => Ok(None),
            Some(Object::Value(v)) => serde_json::from_value(v.clone())
                .map(Some)
                .with_context(|| format!("argument '{}' of '{}'", name, self.type_name)),
            Some(_) => bail!(
                "argument '{}' of '{}' holds built entities, expected plain data",
                name,
                self.type_name
            ),
        }
    }

    pub fn value_or<T: DeserializeOwned>(&self, name: &str, default: T) -> anyhow::Result<T> {
        Ok(self.optional(name)?.unwrap_or(default))
    }

    /// Required built entity of concrete type `T`.
    pub fn instance<T: Any + Send + Sync>(&self, name: &str) -> anyhow::Result<Arc<T>> {
        let object = self
            .named
            .get(name)
            .ok_or_else(|| anyhow!("missing argument '{}' for '{}'", name, self.type_name))?;
        object.downcast::<T>().ok_or_else(|| {
            anyhow!(
                "argument '{}' of '{}' is not a {}",
                name,
                self.type_name,
                std::any::type_name::<T>()
            )
        })
    }

    /// Required job argument.
    pub fn job(&self, name: &str) -> anyhow::Result<Arc<dyn Job>> {
        let object = self
            .named
            .get(name)
            .ok_or_else(|| anyhow!("missing argument '{}' for '{}'", name, self.type_name))?;
        object
            .as_job()
            .ok_or_else(|| anyhow!("argument '{}' of '{}' is not a job", name, self.type_name))
    }

    /// Required list of jobs.
    pub fn jobs(&self, name: &str) -> anyhow::Result<Vec<Arc<dyn Job>>> {
        match self.named.get(name) {
            Some(Object::List(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    item.as_job().ok_or_else(|| {
                        anyhow!("item {} of '{}' for '{}' is not a job", i, name, self.type_name)
                    })
                })
                .collect(),
            Some(Object::Value(Value::Array(items))) if items.is_empty() => Ok(Vec::new()),
            Some(_) => bail!("argument '{}' of '{}' must be a list of jobs", name, self.type_name),
            None => bail!("missing argument '{}' for '{}'", name, self.type_name),
        }
    }

    /// Reject keyword arguments outside `allowed`.
    pub fn expect_only(&self, allowed: &[&str]) -> anyhow::Result<()> {
        let unexpected: Vec<&str> = self
            .named
            .keys()
            .map(String::as_str)
            .filter(|k| !allowed.contains(k))
            .collect();
        if unexpected.is_empty() {
            Ok(())
        } else {
            bail!(
                "unexpected argument(s) {:?} for '{}'",
                unexpected,
                self.type_name
            )
        }
    }
}
