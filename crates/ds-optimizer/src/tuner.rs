//! Sweeps: run one job per sampled parameter set.

use serde_json::{Map, Value};
use uuid::Uuid;

use ds_config::reference::KEY_TYPE;
use ds_config::{parse_config, resolve, Instance, Job, JobContext, JobReport, Registry};
use ds_types::{ConfigError, DiagnosticKind, Diagnostics, DsError, DsResult, JobError, NodePath};

use crate::launcher::{ClusterConfig, JobDescriptor, LaunchPlan};
use crate::sampler::ParamsSampler;
use crate::search::{parameter_set_to_json, ParameterSet};
use crate::trial::{FailurePolicy, SweepConfig, SweepReport, SweepState, Trial, TrialResult};

/// Default name of the macro holding the sampled parameters.
pub const DEFAULT_PARAMS_MACRO: &str = "params";

/// Runs a job template once per parameter set drawn from a sampler.
///
/// The job config and base macros are templates: every trial resolves its
/// own copy, so dynamic macros are evaluated again for each trial.
#[derive(Debug, Clone)]
pub struct Tuner {
    job: Value,
    macros: Value,
    sampler: ParamsSampler,
    params_macro: String,
    config: SweepConfig,
}

impl Tuner {
    pub fn new(job: Value, sampler: ParamsSampler) -> Self {
        Self {
            job,
            macros: Value::Null,
            sampler,
            params_macro: DEFAULT_PARAMS_MACRO.to_string(),
            config: SweepConfig::default(),
        }
    }

    pub fn with_macros(mut self, macros: Value) -> Self {
        self.macros = macros;
        self
    }

    pub fn with_params_macro(mut self, name: impl Into<String>) -> Self {
        self.params_macro = name.into();
        self
    }

    pub fn with_config(mut self, config: SweepConfig) -> Self {
        self.config = config;
        self
    }

    pub fn job(&self) -> &Value {
        &self.job
    }

    pub fn sampler(&self) -> &ParamsSampler {
        &self.sampler
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Run every trial in sequence.
    ///
    /// With [`FailurePolicy::Continue`] a failed trial is recorded and the
    /// sweep moves on. With [`FailurePolicy::Abort`] the first failure stops
    /// the sweep and the partial report comes back in [`SweepState::Failed`].
    /// Errors are returned only when the sweep cannot start.
    pub fn sweep(&self, registry: &Registry, diagnostics: &mut Diagnostics) -> DsResult<SweepReport> {
        let base = self.base_macros(diagnostics)?;
        let mut report = SweepReport::new(self.config.clone());
        report.mark_running();
        tracing::info!(
            "Starting sweep '{}' ({}) with {} trials",
            self.config.name,
            report.id,
            self.sampler.len()
        );

        for (trial_number, params) in self.sampler.samples(diagnostics).enumerate() {
            let mut trial = Trial::new(report.id, trial_number, params);
            trial.mark_running();
            tracing::info!("Trial {}: {}", trial_number, describe(&trial.parameters));

            let macros = self.trial_macros(&base, &trial.parameters);
            match self.run_trial(registry, &macros, diagnostics) {
                Ok(job_report) => {
                    let objective = self
                        .config
                        .objective_metric
                        .as_deref()
                        .and_then(|metric| job_report.metric(metric));
                    let result = TrialResult {
                        trial_id: trial.id,
                        objective,
                        metrics: job_report.metrics,
                        parameters: trial.parameters.clone(),
                    };
                    trial.mark_completed(result);
                }
                Err(e) => {
                    let message = e.to_string();
                    trial.mark_failed(message.clone());
                    if self.config.on_failure == FailurePolicy::Abort {
                        report.record(trial);
                        report.mark_failed(message);
                        tracing::error!("Sweep '{}' aborted at trial {}", self.config.name, trial_number);
                        return Ok(report);
                    }
                    diagnostics.push(DiagnosticKind::TrialFailed {
                        trial_number,
                        error: message,
                    });
                }
            }
            report.record(trial);
        }

        report.mark_completed();
        tracing::info!(
            "Sweep '{}' finished: {} completed, {} failed",
            self.config.name,
            report.trials_completed,
            report.trials_failed
        );
        Ok(report)
    }

    /// Resolve one job config per sampled set without instantiating any of
    /// them.
    pub fn plan(
        &self,
        registry: &Registry,
        cluster: ClusterConfig,
        diagnostics: &mut Diagnostics,
    ) -> DsResult<LaunchPlan> {
        let base = self.base_macros(diagnostics)?;
        let mut jobs = Vec::with_capacity(self.sampler.len());
        for (trial_number, params) in self.sampler.samples(diagnostics).enumerate() {
            let macros = self.trial_macros(&base, &params);
            let config = parse_config(&self.job, &macros, registry, diagnostics)?;
            jobs.push(JobDescriptor {
                job_id: Uuid::new_v4(),
                sweep_id: self.config.id,
                trial_number,
                parameters: params,
                config,
                resources: cluster.worker_resources.clone(),
            });
        }
        tracing::info!("Planned {} jobs for sweep '{}'", jobs.len(), self.config.name);
        Ok(LaunchPlan::new(self.config.id, cluster, jobs))
    }

    /// The base macro set, checked once per sweep.
    fn base_macros(&self, diagnostics: &mut Diagnostics) -> DsResult<Map<String, Value>> {
        let base = match &self.macros {
            Value::Null => Map::new(),
            Value::Object(map) => map.clone(),
            other => {
                return Err(ConfigError::InvalidNode {
                    path: NodePath::named("macros"),
                    message: format!("macros must be a mapping, got {other}"),
                }
                .into())
            }
        };
        if base.contains_key(&self.params_macro) {
            diagnostics.push(DiagnosticKind::MacroOverridden {
                macro_name: self.params_macro.clone(),
            });
        }
        Ok(base)
    }

    /// A fresh macro set for one trial: the base plus the sampled set.
    fn trial_macros(&self, base: &Map<String, Value>, params: &ParameterSet) -> Value {
        let mut macros = base.clone();
        macros.insert(
            self.params_macro.clone(),
            Value::Object(parameter_set_to_json(params)),
        );
        Value::Object(macros)
    }

    fn run_trial(
        &self,
        registry: &Registry,
        macros: &Value,
        diagnostics: &mut Diagnostics,
    ) -> DsResult<JobReport> {
        let object = resolve(&self.job, macros, registry, diagnostics)?;
        let instance = object.as_instance().ok_or_else(|| ConfigError::NotAJob {
            type_name: describe_object(&self.job),
        })?;
        let job = instance.as_job().ok_or_else(|| ConfigError::NotAJob {
            type_name: instance.type_name().to_string(),
        })?;
        run_job(instance, job.as_ref(), registry, diagnostics)
    }
}

fn run_job(
    instance: &Instance,
    job: &dyn Job,
    registry: &Registry,
    diagnostics: &mut Diagnostics,
) -> DsResult<JobReport> {
    let mut ctx = JobContext::new(registry, diagnostics);
    job.run(&mut ctx).map_err(|e| {
        DsError::from(JobError::Failed {
            type_name: instance.type_name().to_string(),
            message: format!("{e:#}"),
        })
    })
}

fn describe(params: &ParameterSet) -> String {
    params
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_object(config: &Value) -> String {
    config
        .get(KEY_TYPE)
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| "<untyped config>".to_string())
}

impl Job for Tuner {
    fn run(&self, ctx: &mut JobContext<'_>) -> anyhow::Result<JobReport> {
        let report = self.sweep(ctx.registry, ctx.diagnostics)?;
        if report.state == SweepState::Failed {
            let trial_number = report.trials.last().map_or(0, |t| t.trial_number);
            return Err(DsError::from(JobError::TrialFailed {
                trial_number,
                message: report.error.unwrap_or_default(),
            })
            .into());
        }
        let mut out = JobReport::new()
            .with_metric("trials_completed", report.trials_completed as f64)
            .with_metric("trials_failed", report.trials_failed as f64);
        if let (Some(metric), Some(best)) = (&self.config.objective_metric, &report.best_trial) {
            if let Some(objective) = best.objective {
                out = out.with_metric(format!("best_{metric}"), objective);
            }
        }
        Ok(out)
    }
}
