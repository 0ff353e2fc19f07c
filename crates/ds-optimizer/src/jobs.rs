//! Built-in entities addressable from config.

use anyhow::{bail, Context};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use ds_config::{Arguments, Job, JobContext, JobReport, Registry};

use crate::sampler::ParamsSampler;
use crate::search::SearchSpace;
use crate::trial::{FailurePolicy, ObjectiveDirection, SweepConfig};
use crate::tuner::{Tuner, DEFAULT_PARAMS_MACRO};

pub const PIPELINE: &str = "jobs.Pipeline";
pub const ECHO: &str = "jobs.Echo";
pub const PARAMS_SAMPLER: &str = "optimizer.ParamsSampler";
pub const PARAMS_TUNER: &str = "optimizer.ParamsTuner";

/// Runs its jobs in order and merges their metrics.
pub struct Pipeline {
    jobs: Vec<Arc<dyn Job>>,
}

impl Pipeline {
    pub fn new(jobs: Vec<Arc<dyn Job>>) -> Self {
        Self { jobs }
    }
}

impl Job for Pipeline {
    fn run(&self, ctx: &mut JobContext<'_>) -> anyhow::Result<JobReport> {
        let mut report = JobReport::new();
        for (i, job) in self.jobs.iter().enumerate() {
            tracing::debug!("Pipeline step {}/{}", i + 1, self.jobs.len());
            let step = job
                .run(ctx)
                .with_context(|| format!("pipeline step {i}"))?;
            report.merge(step);
        }
        Ok(report)
    }
}

/// Logs a message and reports fixed metrics.
pub struct Echo {
    message: String,
    metrics: BTreeMap<String, f64>,
}

impl Job for Echo {
    fn run(&self, _ctx: &mut JobContext<'_>) -> anyhow::Result<JobReport> {
        tracing::info!("{}", self.message);
        Ok(JobReport {
            metrics: self.metrics.clone(),
        })
    }
}

fn params_sampler(args: &Arguments) -> anyhow::Result<ParamsSampler> {
    args.expect_only(&["param_grid", "n_iter", "seed", "repeat"])?;
    let grid: Value = args.value("param_grid")?;
    let space = SearchSpace::from_grid(&grid)?;
    let seed = args.optional::<u64>("seed")?;
    let sampler = match args.optional::<usize>("n_iter")? {
        Some(n_iter) => ParamsSampler::random(space, n_iter, seed)?,
        None if seed.is_some() => {
            bail!("'seed' only applies to random sampling; set 'n_iter' or drop the seed")
        }
        None => ParamsSampler::grid(space, args.value_or("repeat", 1)?)?,
    };
    Ok(sampler)
}

fn params_tuner(args: &Arguments) -> anyhow::Result<Tuner> {
    args.expect_only(&[
        "job",
        "macros",
        "sampler",
        "params_macro",
        "on_failure",
        "objective",
        "direction",
        "name",
    ])?;
    let job: Value = args
        .value("job")
        .context("the tuned job must be a config node marked \"eval\": \"skip\"")?;
    let sampler = args.instance::<ParamsSampler>("sampler")?;

    let mut config = SweepConfig::new(args.value_or("name", "sweep".to_string())?)
        .with_failure_policy(args.value_or("on_failure", FailurePolicy::default())?);
    if let Some(objective) = args.optional::<String>("objective")? {
        let direction = args.value_or("direction", ObjectiveDirection::default())?;
        config = config.with_objective(&objective, direction);
    }

    Ok(Tuner::new(job, sampler.as_ref().clone())
        .with_macros(args.value_or("macros", Value::Null)?)
        .with_params_macro(args.value_or("params_macro", DEFAULT_PARAMS_MACRO.to_string())?)
        .with_config(config))
}

/// Register the built-in jobs and the sampler.
pub fn register_builtins(registry: &mut Registry) {
    registry
        .register_job(PIPELINE, |args| Ok(Pipeline::new(args.jobs("jobs")?)))
        .register_job(ECHO, |args| {
            Ok(Echo {
                message: args.value_or("message", String::new())?,
                metrics: args.value_or("metrics", BTreeMap::new())?,
            })
        })
        .register(PARAMS_SAMPLER, |args| params_sampler(&args))
        .register_job(PARAMS_TUNER, |args| params_tuner(&args));
}

/// Registry with the built-in macros and entities.
pub fn builtin_registry() -> Registry {
    let mut registry = Registry::with_builtin_macros();
    register_builtins(&mut registry);
    registry
}
