//! # ds-optimizer
//!
//! Parameter sweeps for DeepSweep.
//!
//! Provides search space definitions, seeded samplers, the tuner that runs a
//! job template once per sampled set, trial tracking, and serializable launch
//! plans for external cluster launchers.

pub mod jobs;
mod launcher;
mod sampler;
mod search;
mod trial;
mod tuner;

pub use jobs::{builtin_registry, register_builtins, Echo, Pipeline};
pub use launcher::{ClusterConfig, JobDescriptor, LaunchPlan, RuntimeEnv, WorkerResources};
pub use sampler::{ParamsSampler, Samples, SamplingMode, MAX_ENUMERABLE_GRID};
pub use search::{
    parameter_set_to_json, ParameterDef, ParameterKind, ParameterSet, ParameterValue, SearchSpace,
};
pub use trial::{
    FailurePolicy, ObjectiveDirection, SweepConfig, SweepId, SweepReport, SweepState, Trial,
    TrialResult, TrialStatus,
};
pub use tuner::{Tuner, DEFAULT_PARAMS_MACRO};
