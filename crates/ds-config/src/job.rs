//! Runnable entities.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use ds_types::Diagnostics;

use crate::registry::Registry;

/// Everything a job may need while running.
pub struct JobContext<'a> {
    pub registry: &'a Registry,
    pub diagnostics: &'a mut Diagnostics,
}

impl<'a> JobContext<'a> {
    pub fn new(registry: &'a Registry, diagnostics: &'a mut Diagnostics) -> Self {
        Self {
            registry,
            diagnostics,
        }
    }
}

/// Metrics reported by a finished job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub metrics: BTreeMap<String, f64>,
}

impl JobReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    /// Merge `other` into `self`; later values win.
    pub fn merge(&mut self, other: JobReport) {
        self.metrics.extend(other.metrics);
    }
}

/// An entity built from config that can be run.
pub trait Job: Send + Sync {
    fn run(&self, ctx: &mut JobContext<'_>) -> anyhow::Result<JobReport>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_merge_overrides() {
        let mut first = JobReport::new().with_metric("loss", 0.5).with_metric("auc", 0.7);
        let second = JobReport::new().with_metric("loss", 0.3);
        first.merge(second);

        assert_eq!(first.metric("loss"), Some(0.3));
        assert_eq!(first.metric("auc"), Some(0.7));
        assert_eq!(first.metric("recall"), None);
    }
}
