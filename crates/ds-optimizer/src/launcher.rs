//! Serializable job descriptors for an external cluster launcher.
//!
//! A [`LaunchPlan`] holds one fully resolved job config per sampled parameter
//! set. Nothing here talks to a cluster: the plan is written as JSON and
//! consumed by whatever launcher the deployment uses.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::search::ParameterSet;
use crate::trial::SweepId;

/// Where and how the launcher should run the jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Scheduler address, interpreted by the launcher.
    pub address: String,

    /// Namespace or queue for this sweep.
    pub namespace: String,

    pub runtime_env: Option<RuntimeEnv>,

    /// Resource requirements per worker.
    pub worker_resources: WorkerResources,

    /// Maximum number of jobs running at once.
    pub max_concurrent_jobs: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            address: "local".to_string(),
            namespace: "deepsweep".to_string(),
            runtime_env: None,
            worker_resources: WorkerResources::default(),
            max_concurrent_jobs: 4,
        }
    }
}

/// Environment prepared on every worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeEnv {
    /// Working directory uploaded to the cluster.
    pub working_dir: Option<String>,
    pub env_vars: BTreeMap<String, String>,
}

/// Resource requirements for a single worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerResources {
    /// Number of CPUs per worker (fractional ok).
    pub num_cpus: f64,
    /// Number of GPUs per worker (0 = no GPU).
    pub num_gpus: f64,
    /// Memory in bytes (0 = no limit).
    pub memory_bytes: u64,
    pub custom: BTreeMap<String, f64>,
}

impl Default for WorkerResources {
    fn default() -> Self {
        Self {
            num_cpus: 1.0,
            num_gpus: 0.0,
            memory_bytes: 0,
            custom: BTreeMap::new(),
        }
    }
}

/// One resolved job ready to dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub job_id: Uuid,
    pub sweep_id: SweepId,
    /// Trial sequence number (0-indexed).
    pub trial_number: usize,
    /// The sampled set this job was resolved with.
    pub parameters: ParameterSet,
    /// The job config with every macro reference substituted.
    pub config: serde_json::Value,
    pub resources: WorkerResources,
}

/// Every job of a sweep plus the cluster to run them on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchPlan {
    pub sweep_id: SweepId,
    /// Number of workers to request.
    pub num_workers: usize,
    pub jobs: Vec<JobDescriptor>,
    pub cluster: ClusterConfig,
}

impl LaunchPlan {
    pub fn new(sweep_id: SweepId, cluster: ClusterConfig, jobs: Vec<JobDescriptor>) -> Self {
        let num_workers = cluster.max_concurrent_jobs.min(jobs.len());
        Self {
            sweep_id,
            num_workers,
            jobs,
            cluster,
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::ParameterValue;
    use serde_json::json;

    fn descriptor(sweep_id: SweepId, trial_number: usize) -> JobDescriptor {
        JobDescriptor {
            job_id: Uuid::new_v4(),
            sweep_id,
            trial_number,
            parameters: ParameterSet::from([("lr".to_string(), ParameterValue::Float(0.01))]),
            config: json!({"type": "jobs.Echo", "message": "lr=0.01"}),
            resources: WorkerResources::default(),
        }
    }

    #[test]
    fn default_cluster_config() {
        let config = ClusterConfig::default();
        assert_eq!(config.namespace, "deepsweep");
        assert_eq!(config.max_concurrent_jobs, 4);
        assert_eq!(config.worker_resources.num_gpus, 0.0);
    }

    #[test]
    fn workers_capped_at_job_count() {
        let mut cluster = ClusterConfig::default();
        cluster.max_concurrent_jobs = 10;
        let sweep_id = Uuid::new_v4();

        let jobs: Vec<JobDescriptor> = (0..3).map(|i| descriptor(sweep_id, i)).collect();
        let plan = LaunchPlan::new(sweep_id, cluster, jobs);
        assert_eq!(plan.num_workers, 3);
        assert_eq!(plan.len(), 3);
    }

    #[test]
    fn partial_cluster_file_uses_defaults() {
        let cluster: ClusterConfig = serde_json::from_value(json!({
            "address": "ray://head:10001",
            "worker_resources": {"num_gpus": 1.0}
        }))
        .unwrap();

        assert_eq!(cluster.address, "ray://head:10001");
        assert_eq!(cluster.namespace, "deepsweep");
        assert_eq!(cluster.worker_resources.num_gpus, 1.0);
        assert_eq!(cluster.worker_resources.num_cpus, 1.0);
    }

    #[test]
    fn sampled_choices_round_trip_through_plan_json() {
        let sweep_id = Uuid::new_v4();
        let mut job = descriptor(sweep_id, 0);
        job.parameters
            .insert("batch_size".to_string(), ParameterValue::from(json!(8)));
        job.parameters
            .insert("optimizer".to_string(), ParameterValue::from(json!("adam")));
        let plan = LaunchPlan::new(sweep_id, ClusterConfig::default(), vec![job]);

        let text = serde_json::to_string(&plan).unwrap();
        let back: LaunchPlan = serde_json::from_str(&text).unwrap();
        assert_eq!(back, plan);
        assert_eq!(back.jobs[0].parameters["batch_size"], ParameterValue::Int(8));
    }

    #[test]
    fn plan_json_keeps_resolved_configs() {
        let sweep_id = Uuid::new_v4();
        let plan = LaunchPlan::new(sweep_id, ClusterConfig::default(), vec![descriptor(sweep_id, 0)]);

        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["jobs"][0]["config"]["message"], "lr=0.01");
        assert_eq!(json["jobs"][0]["parameters"]["lr"], 0.01);

        let back: LaunchPlan = serde_json::from_value(json).unwrap();
        assert_eq!(back, plan);
    }
}
