//! Error types for the distributed pipeline.

/// Errors surfaced by configuration loading and the distributed run.
///
/// Communication errors are never retried: the run stops and the error is
/// returned to the caller.
#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    /// Configuration file could not be read
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path that was read
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid JSON for `SimulationConfig`
    #[error("failed to parse config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// Configuration parsed but failed validation
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Shared communication state is unusable (a rank panicked mid-exchange)
    #[error("communication failure on rank {rank}: {reason}")]
    Communication {
        /// Rank that observed the failure
        rank: usize,
        /// What went wrong
        reason: String,
    },

    /// A rank thread panicked
    #[error("rank {0} thread panicked")]
    RankPanicked(usize),
}

/// Result alias for the orchestrator.
pub type SolverResult<T> = Result<T, SolverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SolverError::Communication {
            rank: 3,
            reason: "halo board poisoned".to_string(),
        };
        assert!(err.to_string().contains("rank 3"));
        assert!(SolverError::Config("ranks must be at least 1".to_string())
            .to_string()
            .contains("ranks"));
    }
}
