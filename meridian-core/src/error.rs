//! Error types.
//!
//! The propagation engine itself has no failure modes: combinator functions
//! are expected to be total. These errors cover structural misuse of the
//! dependency graph and invalid configuration.

use thiserror::Error;

use crate::graph::NodeId;

/// Structural errors raised by the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The node was never registered, or has already been released.
    #[error("node {0} is not registered in the dependency graph")]
    UnknownNode(NodeId),

    /// Adding the edge would make `dependent` (transitively) depend on itself.
    #[error("subscribing {dependent} to {upstream} would close a dependency cycle")]
    Cycle { upstream: NodeId, dependent: NodeId },
}

/// Errors raised while loading a [`RuntimeConfig`](crate::RuntimeConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse runtime configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid runtime configuration: {0}")]
    Invalid(&'static str),
}

/// Fatal runtime conditions. These are reported by panicking, since `write`
/// has no error channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// Observers kept issuing writes for more rounds than allowed.
    #[error("observers kept writing after {rounds} propagation rounds; feedback loop suspected")]
    FeedbackLoop { rounds: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_names_both_nodes() {
        let err = GraphError::Cycle {
            upstream: NodeId::from(3),
            dependent: NodeId::from(7),
        };
        assert_eq!(
            err.to_string(),
            "subscribing n7 to n3 would close a dependency cycle"
        );
    }

    #[test]
    fn config_parse_error_wraps_serde() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = ConfigError::from(source);
        assert!(err.to_string().starts_with("failed to parse runtime configuration"));
    }
}
