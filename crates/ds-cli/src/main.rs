use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use ds_config::{load_json, load_optional_macros, parse_config, resolve, save_json, Job, JobContext};
use ds_optimizer::{
    builtin_registry, parameter_set_to_json, ClusterConfig, ParamsSampler, SearchSpace, Tuner,
};
use ds_types::Diagnostics;

#[derive(Parser)]
#[command(name = "deepsweep", version, about = "Resolve, run and sweep declarative job configs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a config with every macro reference substituted
    Resolve {
        #[arg(long, value_name = "PATH")]
        config: PathBuf,
        #[arg(long, value_name = "PATH", env = "DEEPSWEEP_MACROS")]
        macros: Option<PathBuf>,
    },
    /// Resolve, instantiate and run a job
    Run {
        #[arg(long, value_name = "PATH")]
        config: PathBuf,
        #[arg(long, value_name = "PATH", env = "DEEPSWEEP_MACROS")]
        macros: Option<PathBuf>,
    },
    /// Print sampled parameter sets as JSON lines
    Sample {
        #[command(flatten)]
        sampling: SamplingArgs,
    },
    /// Resolve one job config per sampled set into a launch plan
    Plan {
        #[arg(long, value_name = "PATH")]
        config: PathBuf,
        #[arg(long, value_name = "PATH", env = "DEEPSWEEP_MACROS")]
        macros: Option<PathBuf>,
        #[command(flatten)]
        sampling: SamplingArgs,
        /// Cluster settings; defaults apply to missing fields
        #[arg(long, value_name = "PATH")]
        cluster: Option<PathBuf>,
        /// Write the plan here instead of stdout
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct SamplingArgs {
    /// Parameter grid file
    #[arg(long, value_name = "PATH")]
    grid: PathBuf,
    /// Number of random draws; omit to enumerate the whole grid
    #[arg(long, value_name = "INT")]
    n_iter: Option<usize>,
    /// Seed for random draws; rejected without --n-iter
    #[arg(long, value_name = "INT", env = "DEEPSWEEP_SEED")]
    seed: Option<u64>,
    /// Grid passes when --n-iter is omitted
    #[arg(long, value_name = "INT", default_value_t = 1)]
    repeat: usize,
}

impl SamplingArgs {
    fn sampler(&self) -> anyhow::Result<ParamsSampler> {
        if self.n_iter.is_none() && self.seed.is_some() {
            bail!("--seed only applies to random sampling; pass --n-iter or unset the seed");
        }
        let space = SearchSpace::from_grid(&load_json(&self.grid)?)?;
        let sampler = match self.n_iter {
            Some(n_iter) => ParamsSampler::random(space, n_iter, self.seed)?,
            None => ParamsSampler::grid(space, self.repeat)?,
        };
        Ok(sampler)
    }
}

fn init_logging() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env("DEEPSWEEP_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install logger: {e}"))
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_cluster(path: Option<&Path>) -> anyhow::Result<ClusterConfig> {
    match path {
        Some(path) => {
            let value = load_json(path)?;
            serde_json::from_value(value).with_context(|| format!("cluster file {}", path.display()))
        }
        None => Ok(ClusterConfig::default()),
    }
}

fn main() -> anyhow::Result<()> {
    init_logging()?;
    let cli = Cli::parse();
    let registry = builtin_registry();
    let mut diagnostics = Diagnostics::new();

    match cli.command {
        Command::Resolve { config, macros } => {
            let config = load_json(&config)?;
            let macros = load_optional_macros(macros.as_ref())?;
            let parsed = parse_config(&config, &macros, &registry, &mut diagnostics)?;
            print_json(&parsed)?;
        }
        Command::Run { config, macros } => {
            let config = load_json(&config)?;
            let macros = load_optional_macros(macros.as_ref())?;
            let object = resolve(&config, &macros, &registry, &mut diagnostics)?;
            let job = object
                .as_job()
                .ok_or_else(|| anyhow!("config does not describe a job"))?;
            let report = job.run(&mut JobContext::new(&registry, &mut diagnostics))?;
            print_json(&serde_json::to_value(&report)?)?;
        }
        Command::Sample { sampling } => {
            for params in sampling.sampler()?.samples(&mut diagnostics) {
                println!("{}", Value::Object(parameter_set_to_json(&params)));
            }
        }
        Command::Plan {
            config,
            macros,
            sampling,
            cluster,
            output,
        } => {
            let tuner = Tuner::new(load_json(&config)?, sampling.sampler()?)
                .with_macros(load_optional_macros(macros.as_ref())?);
            let cluster = load_cluster(cluster.as_deref())?;
            let plan = tuner.plan(&registry, cluster, &mut diagnostics)?;
            let plan = serde_json::to_value(&plan)?;
            match output {
                Some(path) => save_json(path, &plan)?,
                None => print_json(&plan)?,
            }
        }
    }

    let warnings = diagnostics.warnings().count();
    if warnings > 0 {
        tracing::warn!("{} diagnostics ({} warnings)", diagnostics.len(), warnings);
    } else {
        tracing::debug!("{} diagnostics", diagnostics.len());
    }
    Ok(())
}
