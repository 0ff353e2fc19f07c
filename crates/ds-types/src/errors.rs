use thiserror::Error;

use crate::path::NodePath;

/// Main error type for DeepSweep
#[derive(Error, Debug)]
pub enum DsError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Sampling error: {0}")]
    Sampling(#[from] SamplingError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Config resolution errors. Every variant that concerns a node carries the
/// path of that node in the config tree.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unknown type '{type_name}' at {path}")]
    UnknownType { type_name: String, path: NodePath },

    #[error("Undeclared macro '{name}' referenced at {path}")]
    UndeclaredMacro { name: String, path: NodePath },

    #[error("Macro '{macro_name}' has no parameter '{param}' (referenced at {path})")]
    UndeclaredParameter {
        macro_name: String,
        param: String,
        path: NodePath,
    },

    #[error("Cyclic macro dependency: {chain}")]
    CyclicMacro { chain: String },

    #[error("Invalid macro '{name}': {message}")]
    InvalidMacro { name: String, message: String },

    #[error("Invalid node at {path}: {message}")]
    InvalidNode { path: NodePath, message: String },

    #[error("Failed to construct '{type_name}' at {path}: {message}")]
    Construction {
        type_name: String,
        path: NodePath,
        message: String,
    },

    #[error("Entity '{type_name}' is not a job")]
    NotAJob { type_name: String },
}

/// Parameter grid and sampler errors
#[derive(Error, Debug)]
pub enum SamplingError {
    #[error("Parameter '{param}' has no candidate values")]
    EmptyChoice { param: String },

    #[error("Parameter '{param}' has an invalid range: low {low} is above high {high}")]
    InvalidRange { param: String, low: String, high: String },

    #[error("Parameter '{param}' needs strictly positive log-uniform bounds")]
    NonPositiveLogBound { param: String },

    #[error("Invalid parameter grid: {message}")]
    InvalidGrid { message: String },
}

/// Job execution errors
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Job '{type_name}' failed: {message}")]
    Failed { type_name: String, message: String },

    #[error("Trial {trial_number} failed: {message}")]
    TrialFailed { trial_number: usize, message: String },
}

/// Result type alias for DeepSweep operations
pub type DsResult<T> = Result<T, DsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_path() {
        let path = NodePath::root().key("optimizer").index(1);
        let error = ConfigError::UnknownType {
            type_name: "optim.Adam".to_string(),
            path,
        };

        let text = error.to_string();
        assert!(text.contains("optim.Adam"));
        assert!(text.contains("optimizer[1]"));
    }

    #[test]
    fn test_error_conversion() {
        let config_error = ConfigError::UndeclaredMacro {
            name: "params".to_string(),
            path: NodePath::root(),
        };
        let ds_error: DsError = config_error.into();

        match ds_error {
            DsError::Config(ConfigError::UndeclaredMacro { name, .. }) => assert_eq!(name, "params"),
            _ => panic!("Expected Config error"),
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "macros.json");
        let ds_error = DsError::from(io);
        assert!(matches!(ds_error, DsError::Io(_)));
        assert!(ds_error.to_string().starts_with("IO error: "));
    }
}
