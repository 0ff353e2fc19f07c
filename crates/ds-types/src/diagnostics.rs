//! Structured diagnostics channel.
//!
//! The resolver, sampler and tuner report non-fatal conditions here instead of
//! only logging them, so callers (and tests) can inspect them as data. Every
//! record is also mirrored to `tracing` at the matching level.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// A declared macro parameter was never dereferenced in the config.
    UnusedMacroParameter { macro_name: String, param: String },
    /// Finite grid sampled as random permutations of its cross product.
    SamplingWithoutReplacement { total: usize },
    /// Grid sampled independently per parameter.
    SamplingWithReplacement { reason: String },
    /// Number of distinct parameter sets drawn out of the cross product.
    SampledParameters { sampled: usize, total: usize },
    /// A sampler was built without a seed; this one was drawn for it.
    GeneratedSeed { seed: u64 },
    /// A sampled parameter macro replaced a base macro of the same name.
    MacroOverridden { macro_name: String },
    /// One sweep iteration failed and the sweep carried on.
    TrialFailed { trial_number: usize, error: String },
}

impl DiagnosticKind {
    pub fn severity(&self) -> Severity {
        match self {
            Self::UnusedMacroParameter { .. }
            | Self::MacroOverridden { .. }
            | Self::TrialFailed { .. } => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnusedMacroParameter { macro_name, param } => {
                write!(f, "macro parameter not used: {macro_name}:{param}")
            }
            Self::SamplingWithoutReplacement { total } => {
                write!(f, "sampling with no replacement (total of {total} parameter sets)")
            }
            Self::SamplingWithReplacement { reason } => {
                write!(f, "sampling with replacement ({reason})")
            }
            Self::SampledParameters { sampled, total } => {
                write!(f, "Sampled {sampled} parameters from a total of {total}")
            }
            Self::GeneratedSeed { seed } => write!(f, "no seed given, using seed {seed}"),
            Self::MacroOverridden { macro_name } => {
                write!(f, "sampled parameters override base macro '{macro_name}'")
            }
            Self::TrialFailed {
                trial_number,
                error,
            } => write!(f, "trial {trial_number} failed: {error}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
}

/// Ordered collection of diagnostics for one operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic and emit it as a log line.
    pub fn push(&mut self, kind: DiagnosticKind) {
        let severity = kind.severity();
        let message = kind.to_string();
        match severity {
            Severity::Warning => tracing::warn!("{}", message),
            Severity::Info => tracing::info!("{}", message),
        }
        self.entries.push(Diagnostic {
            severity,
            kind,
            message,
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    /// `(macro, param)` pairs reported as unused, in report order.
    pub fn unused_macro_parameters(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .filter_map(|d| match &d.kind {
                DiagnosticKind::UnusedMacroParameter { macro_name, param } => {
                    Some((macro_name.clone(), param.clone()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn contains(&self, predicate: impl Fn(&DiagnosticKind) -> bool) -> bool {
        self.entries.iter().any(|d| predicate(&d.kind))
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_records_severity_and_message() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.push(DiagnosticKind::UnusedMacroParameter {
            macro_name: "params".into(),
            param: "lr".into(),
        });
        diagnostics.push(DiagnosticKind::SampledParameters {
            sampled: 4,
            total: 4,
        });

        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics.warnings().count(), 1);

        let messages: Vec<_> = diagnostics.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages[0], "macro parameter not used: params:lr");
        assert_eq!(messages[1], "Sampled 4 parameters from a total of 4");
    }

    #[test]
    fn unused_macro_parameters_filters_other_kinds() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.push(DiagnosticKind::SamplingWithoutReplacement { total: 6 });
        diagnostics.push(DiagnosticKind::UnusedMacroParameter {
            macro_name: "paths".into(),
            param: "path_logs".into(),
        });

        assert_eq!(
            diagnostics.unused_macro_parameters(),
            vec![("paths".to_string(), "path_logs".to_string())]
        );
        assert!(diagnostics.contains(|k| matches!(k, DiagnosticKind::SamplingWithoutReplacement { total: 6 })));
    }
}
