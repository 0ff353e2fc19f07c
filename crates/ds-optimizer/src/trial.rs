//! Trial tracking and sweep run management.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::search::ParameterSet;

/// Unique sweep identifier.
pub type SweepId = Uuid;

/// Whether we are maximizing or minimizing the objective.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveDirection {
    Maximize,
    #[default]
    Minimize,
}

/// What the sweep does when a trial fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the failure and move on to the next trial.
    #[default]
    Continue,
    /// Stop the sweep and return the error.
    Abort,
}

/// Settings shared by every trial of a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    pub id: SweepId,
    pub name: String,

    /// Metric read from each trial report to rank trials. Without one no
    /// best trial is tracked.
    pub objective_metric: Option<String>,

    pub direction: ObjectiveDirection,

    pub on_failure: FailurePolicy,

    pub created_at: DateTime<Utc>,
}

impl SweepConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            objective_metric: None,
            direction: ObjectiveDirection::default(),
            on_failure: FailurePolicy::default(),
            created_at: Utc::now(),
        }
    }

    pub fn with_objective(mut self, metric: &str, direction: ObjectiveDirection) -> Self {
        self.objective_metric = Some(metric.to_string());
        self.direction = direction;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self::new("sweep")
    }
}

/// Lifecycle state for a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Outcome of a sweep: every trial plus aggregate counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub id: SweepId,
    pub config: SweepConfig,
    pub state: SweepState,
    pub trials_completed: usize,
    pub trials_failed: usize,
    pub best_trial: Option<TrialResult>,
    pub trials: Vec<Trial>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl SweepReport {
    pub fn new(config: SweepConfig) -> Self {
        Self {
            id: config.id,
            config,
            state: SweepState::Pending,
            trials_completed: 0,
            trials_failed: 0,
            best_trial: None,
            trials: Vec::new(),
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = SweepState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        self.state = SweepState::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = SweepState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    /// Store a finished trial, updating counts and the best result.
    pub fn record(&mut self, trial: Trial) {
        match trial.status {
            TrialStatus::Completed => self.trials_completed += 1,
            TrialStatus::Failed => self.trials_failed += 1,
            TrialStatus::Pending | TrialStatus::Running => {}
        }
        if let Some(result) = &trial.result {
            self.update_best(result);
        }
        self.trials.push(trial);
    }

    /// Update the best trial if `result` improves on the current best.
    /// Results without an objective value are never ranked.
    pub fn update_best(&mut self, result: &TrialResult) {
        let Some(objective) = result.objective else {
            return;
        };
        let dominated = match self.best_trial.as_ref().and_then(|best| best.objective) {
            None => true,
            Some(current_best) => match self.config.direction {
                ObjectiveDirection::Maximize => objective > current_best,
                ObjectiveDirection::Minimize => objective < current_best,
            },
        };
        if dominated {
            self.best_trial = Some(result.clone());
        }
    }

    pub fn failed_trials(&self) -> impl Iterator<Item = &Trial> {
        self.trials.iter().filter(|t| t.status == TrialStatus::Failed)
    }
}

// ---------------------------------------------------------------------------
// Individual trial
// ---------------------------------------------------------------------------

/// A single trial (one sampled parameter set run through the job).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub id: Uuid,
    pub sweep_id: SweepId,
    pub trial_number: usize,
    pub parameters: ParameterSet,
    pub status: TrialStatus,
    pub result: Option<TrialResult>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Trial {
    pub fn new(sweep_id: SweepId, trial_number: usize, parameters: ParameterSet) -> Self {
        Self {
            id: Uuid::new_v4(),
            sweep_id,
            trial_number,
            parameters,
            status: TrialStatus::Pending,
            result: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = TrialStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self, result: TrialResult) {
        self.status = TrialStatus::Completed;
        self.finished_at = Some(Utc::now());
        self.result = Some(result);
    }

    pub fn mark_failed(&mut self, error: String) {
        self.status = TrialStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    /// Wall-clock time between start and finish, in milliseconds.
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Result of a single trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_id: Uuid,
    /// Value of the sweep's objective metric, if configured and reported.
    pub objective: Option<f64>,
    pub metrics: BTreeMap<String, f64>,
    pub parameters: ParameterSet,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::ParameterValue;

    fn result(objective: Option<f64>) -> TrialResult {
        TrialResult {
            trial_id: Uuid::new_v4(),
            objective,
            metrics: BTreeMap::new(),
            parameters: ParameterSet::new(),
        }
    }

    #[test]
    fn sweep_lifecycle() {
        let mut report = SweepReport::new(SweepConfig::new("lifecycle"));

        assert_eq!(report.state, SweepState::Pending);
        assert!(report.started_at.is_none());

        report.mark_running();
        assert_eq!(report.state, SweepState::Running);
        assert!(report.started_at.is_some());

        report.mark_completed();
        assert_eq!(report.state, SweepState::Completed);
        assert!(report.finished_at.is_some());
    }

    #[test]
    fn best_trial_tracking_minimize() {
        let config = SweepConfig::new("min").with_objective("loss", ObjectiveDirection::Minimize);
        let mut report = SweepReport::new(config);

        report.update_best(&result(Some(0.15)));
        assert_eq!(report.best_trial.as_ref().unwrap().objective, Some(0.15));

        report.update_best(&result(Some(0.05)));
        assert_eq!(report.best_trial.as_ref().unwrap().objective, Some(0.05));

        // Worse result should not replace
        report.update_best(&result(Some(0.5)));
        assert_eq!(report.best_trial.as_ref().unwrap().objective, Some(0.05));
    }

    #[test]
    fn best_trial_tracking_maximize() {
        let config = SweepConfig::new("max").with_objective("auc", ObjectiveDirection::Maximize);
        let mut report = SweepReport::new(config);

        report.update_best(&result(Some(0.7)));
        report.update_best(&result(Some(0.9)));
        report.update_best(&result(Some(0.8)));
        assert_eq!(report.best_trial.as_ref().unwrap().objective, Some(0.9));
    }

    #[test]
    fn results_without_objective_are_not_ranked() {
        let mut report = SweepReport::new(SweepConfig::default());
        report.update_best(&result(None));
        assert!(report.best_trial.is_none());
    }

    #[test]
    fn record_counts_outcomes() {
        let mut report = SweepReport::new(SweepConfig::new("counts"));
        let sweep_id = report.id;

        let mut ok = Trial::new(sweep_id, 0, ParameterSet::new());
        ok.mark_running();
        ok.mark_completed(result(Some(1.0)));
        report.record(ok);

        let mut bad = Trial::new(sweep_id, 1, ParameterSet::new());
        bad.mark_running();
        bad.mark_failed("boom".into());
        report.record(bad);

        assert_eq!(report.trials_completed, 1);
        assert_eq!(report.trials_failed, 1);
        assert_eq!(report.trials.len(), 2);
        assert_eq!(report.failed_trials().map(|t| t.trial_number).collect::<Vec<_>>(), vec![1]);
        assert_eq!(report.best_trial.as_ref().unwrap().objective, Some(1.0));
    }

    #[test]
    fn trial_lifecycle() {
        let mut params = ParameterSet::new();
        params.insert("batch_size".into(), ParameterValue::Int(32));

        let mut trial = Trial::new(Uuid::new_v4(), 1, params.clone());
        assert_eq!(trial.status, TrialStatus::Pending);
        assert!(trial.duration_ms().is_none());

        trial.mark_running();
        assert_eq!(trial.status, TrialStatus::Running);

        let outcome = TrialResult {
            trial_id: trial.id,
            objective: Some(0.3),
            metrics: BTreeMap::from([("loss".to_string(), 0.3)]),
            parameters: params,
        };
        trial.mark_completed(outcome);
        assert_eq!(trial.status, TrialStatus::Completed);
        assert!(trial.duration_ms().unwrap() >= 0);
        assert_eq!(trial.result.as_ref().unwrap().metrics["loss"], 0.3);
    }

    #[test]
    fn config_defaults() {
        let config = SweepConfig::default();
        assert_eq!(config.direction, ObjectiveDirection::Minimize);
        assert_eq!(config.on_failure, FailurePolicy::Continue);
        assert!(config.objective_metric.is_none());

        let policy: FailurePolicy = serde_json::from_str("\"abort\"").unwrap();
        assert_eq!(policy, FailurePolicy::Abort);
    }
}
