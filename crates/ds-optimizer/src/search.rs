//! Search space definitions.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use ds_types::{DsResult, SamplingError};

/// A single parameter dimension in the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Parameter name as referenced from config (e.g. `$params:batch_size`).
    pub name: String,
    /// The kind of search range.
    pub kind: ParameterKind,
}

/// Describes how a parameter is sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParameterKind {
    /// Continuous uniform range [low, high].
    FloatRange { low: f64, high: f64 },
    /// Integer range [low, high] inclusive.
    IntRange { low: i64, high: i64 },
    /// Log-uniform range (sampled in log-space then exponentiated).
    LogUniform { low: f64, high: f64 },
    /// Categorical choices.
    Choice { values: Vec<Value> },
}

impl ParameterKind {
    /// Number of distinct values, `None` for continuous ranges.
    pub fn cardinality(&self) -> Option<usize> {
        match self {
            Self::IntRange { low, high } => high
                .checked_sub(*low)
                .and_then(|d| usize::try_from(d).ok())
                .and_then(|d| d.checked_add(1)),
            Self::Choice { values } => Some(values.len()),
            Self::FloatRange { .. } | Self::LogUniform { .. } => None,
        }
    }

    pub fn is_finite(&self) -> bool {
        matches!(self, Self::IntRange { .. } | Self::Choice { .. })
    }

    /// The `index`-th value of a finite dimension.
    fn value_at(&self, index: usize) -> ParameterValue {
        match self {
            Self::IntRange { low, .. } => ParameterValue::Int(low + index as i64),
            Self::Choice { values } => ParameterValue::from(values[index].clone()),
            Self::FloatRange { low, .. } | Self::LogUniform { low, .. } => ParameterValue::Float(*low),
        }
    }

    /// Draw one value independently.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> ParameterValue {
        match self {
            Self::FloatRange { low, high } => ParameterValue::Float(rng.random_range(*low..=*high)),
            Self::IntRange { low, high } => ParameterValue::Int(rng.random_range(*low..=*high)),
            Self::LogUniform { low, high } => {
                let log_val: f64 = rng.random_range(low.ln()..=high.ln());
                ParameterValue::Float(log_val.exp())
            }
            Self::Choice { values } => {
                let idx = rng.random_range(0..values.len());
                ParameterValue::from(values[idx].clone())
            }
        }
    }

    fn validate(&self, name: &str) -> Result<(), SamplingError> {
        let invalid_range = |low: String, high: String| SamplingError::InvalidRange {
            param: name.to_string(),
            low,
            high,
        };
        match self {
            Self::Choice { values } if values.is_empty() => Err(SamplingError::EmptyChoice {
                param: name.to_string(),
            }),
            Self::IntRange { low, high } if low > high => {
                Err(invalid_range(low.to_string(), high.to_string()))
            }
            Self::FloatRange { low, high } if !(low <= high) || !low.is_finite() || !high.is_finite() => {
                Err(invalid_range(low.to_string(), high.to_string()))
            }
            Self::LogUniform { low, high } if *low <= 0.0 || *high <= 0.0 => {
                Err(SamplingError::NonPositiveLogBound {
                    param: name.to_string(),
                })
            }
            Self::LogUniform { low, high } if !(low <= high) || !high.is_finite() => {
                Err(invalid_range(low.to_string(), high.to_string()))
            }
            _ => Ok(()),
        }
    }
}

/// A concrete parameter value produced by a sampler.
///
/// JSON integers and floats always become `Int` and `Float`, both when a
/// choice is sampled and when deserializing, so a value reads back as the
/// variant it was written from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged, from = "Value")]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    Json(Value),
}

impl ParameterValue {
    pub fn to_json(&self) -> Value {
        match self {
            Self::Int(v) => Value::from(*v),
            Self::Float(v) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Json(v) => v.clone(),
        }
    }
}

impl From<Value> for ParameterValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(v), _) => Self::Int(v),
                (None, Some(v)) if n.is_f64() => Self::Float(v),
                // Integers past i64 keep their exact JSON form.
                _ => Self::Json(Value::Number(n)),
            },
            other => Self::Json(other),
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

/// One sampled assignment: parameter name to a single value.
pub type ParameterSet = BTreeMap<String, ParameterValue>;

/// JSON mapping of a parameter set, as merged into a macro set.
pub fn parameter_set_to_json(params: &ParameterSet) -> serde_json::Map<String, Value> {
    params
        .iter()
        .map(|(name, value)| (name.clone(), value.to_json()))
        .collect()
}

/// The full search space: an ordered list of parameter definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub parameters: Vec<ParameterDef>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GridEntry {
    Values(Vec<Value>),
    Kind(ParameterKind),
}

impl SearchSpace {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    /// Parse a parameter grid.
    ///
    /// Each entry is either a list of candidate values or a range such as
    /// `{"kind": "log_uniform", "low": 1e-4, "high": 1e-1}`. Declaration
    /// order is kept.
    pub fn from_grid(grid: &Value) -> DsResult<Self> {
        let map = grid.as_object().ok_or_else(|| SamplingError::InvalidGrid {
            message: format!("expected a mapping of parameter names, got {grid}"),
        })?;

        let mut space = Self::new();
        for (name, entry) in map {
            let kind = match serde_json::from_value::<GridEntry>(entry.clone()) {
                Ok(GridEntry::Values(values)) => ParameterKind::Choice { values },
                Ok(GridEntry::Kind(kind)) => kind,
                Err(_) => {
                    return Err(SamplingError::InvalidGrid {
                        message: format!(
                            "parameter '{name}' must be a list of values or a range, got {entry}"
                        ),
                    }
                    .into())
                }
            };
            space.parameters.push(ParameterDef {
                name: name.clone(),
                kind,
            });
        }
        space.validate()?;
        Ok(space)
    }

    pub fn add_float(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::FloatRange { low, high },
        });
        self
    }

    pub fn add_int(mut self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::IntRange { low, high },
        });
        self
    }

    pub fn add_log_uniform(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::LogUniform { low, high },
        });
        self
    }

    pub fn add_choice(mut self, name: impl Into<String>, values: Vec<Value>) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::Choice { values },
        });
        self
    }

    /// Check every dimension and reject duplicate names.
    pub fn validate(&self) -> Result<(), SamplingError> {
        for (i, param) in self.parameters.iter().enumerate() {
            if self.parameters[..i].iter().any(|p| p.name == param.name) {
                return Err(SamplingError::InvalidGrid {
                    message: format!("parameter '{}' is declared twice", param.name),
                });
            }
            param.kind.validate(&param.name)?;
        }
        Ok(())
    }

    pub fn is_finite(&self) -> bool {
        self.parameters.iter().all(|p| p.kind.is_finite())
    }

    /// Total number of grid points (returns `None` if any parameter is
    /// continuous or the product overflows).
    pub fn grid_size(&self) -> Option<usize> {
        let mut total: usize = 1;
        for param in &self.parameters {
            total = total.checked_mul(param.kind.cardinality()?)?;
        }
        Some(total)
    }

    /// The `index`-th point of the cross product of a finite space, in
    /// declaration order with the last parameter varying fastest.
    pub fn point_at(&self, mut index: usize) -> ParameterSet {
        let mut params = ParameterSet::new();
        for param in self.parameters.iter().rev() {
            let size = param.kind.cardinality().unwrap_or(1).max(1);
            params.insert(param.name.clone(), param.kind.value_at(index % size));
            index /= size;
        }
        params
    }

    /// One independent draw per parameter.
    pub fn sample_one<R: Rng>(&self, rng: &mut R) -> ParameterSet {
        self.parameters
            .iter()
            .map(|param| (param.name.clone(), param.kind.sample(rng)))
            .collect()
    }
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self::new()
    }
}
