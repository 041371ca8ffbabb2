use thiserror::Error;

use crate::types::OperationClass;

/// Policy table defects. These abort startup (or a reload); they are never
/// produced by per-request evaluation.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("Unknown policy kind: {0}")]
    UnknownKind(String),

    #[error("Duplicate policy for role '{role}' on '{resource}' ({class})")]
    DuplicatePolicy {
        role: String,
        resource: String,
        class: OperationClass,
    },

    #[error("Policy '{policy}' for role '{role}' on '{resource}' requires owner_field")]
    MissingOwnerField {
        policy: String,
        role: String,
        resource: String,
    },

    #[error("Owner field '{field}' is not a known field of '{resource}'")]
    UnknownOwnerField { field: String, resource: String },

    #[error("Policy '{policy}' for role '{role}' on '{resource}' requires minimum_role")]
    MissingMinimumRole {
        policy: String,
        role: String,
        resource: String,
    },

    #[error("Policy entry must name at least one resource")]
    EmptyResourceList,

    #[error("Failed to read policy file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse policy file: {0}")]
    Parse(#[from] serde_yaml::Error),
}
