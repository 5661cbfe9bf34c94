use thiserror::Error;

/// Missing or unusable provisioning configuration. Fatal: partial
/// provisioning is considered unsafe, so the run aborts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no model hub token supplied (set --hub-token or HF_TOKEN, or pass --allow-anonymous)")]
    MissingHubToken,

    #[error("invalid model catalog entry: {0}")]
    InvalidCatalogEntry(String),

    #[error("model catalog is empty")]
    EmptyCatalog,
}

/// The placement planner could not satisfy the catalog under the policy.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlacementError {
    #[error("insufficient resources: {constraint}")]
    InsufficientResources { constraint: String },

    #[error("nothing to place: model catalog is empty")]
    EmptyCatalog,
}

impl PlacementError {
    pub fn insufficient(constraint: impl Into<String>) -> Self {
        Self::InsufficientResources {
            constraint: constraint.into(),
        }
    }
}

/// An artifact fetch failed. Fatal per-model: the run aborts rather than
/// silently skipping a model.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("failed to list files for {repo_id}: {reason}")]
    ListFailed { repo_id: String, reason: String },

    #[error("no files matching quantization {quantization} in {repo_id}")]
    NoMatchingFiles {
        repo_id: String,
        quantization: String,
    },

    #[error("failed to download {filename} from {repo_id}: {reason}")]
    FetchFailed {
        repo_id: String,
        filename: String,
        reason: String,
    },

    #[error("io error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
