use crate::cluster::{ClusterClient, ClusterError};
use crate::controller::clock::Clock;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StepError {
    #[error("{kind} {name} not found in namespace {namespace}")]
    NotFound {
        kind: &'static str,
        name: String,
        namespace: String,
    },

    /// Deadline passed while the resource was still settling
    #[error("timed out waiting for {what}; last observed state [{last_state}]")]
    TimedOut { what: String, last_state: String },

    /// The resource itself reported a final, unsuccessful state
    #[error("{what} finished with status [{phase}]")]
    TerminalFailure { what: String, phase: String },

    #[error("build {build} completed but the deployments it triggers did not pick up the new image")]
    ImageNotPropagated { build: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

impl StepError {
    pub fn not_found(kind: &'static str, name: &str, namespace: &str) -> Self {
        StepError::NotFound {
            kind,
            name: name.to_string(),
            namespace: namespace.to_string(),
        }
    }
}

/// Everything a pipeline step needs to talk to the cluster
pub struct Context {
    pub client: Arc<dyn ClusterClient>,
    pub clock: Arc<dyn Clock>,
    /// URL of the pipeline run invoking the step, annotated onto objects it touches
    pub build_url: Option<String>,
}

impl Context {
    pub fn new(client: Arc<dyn ClusterClient>, clock: Arc<dyn Clock>) -> Self {
        Context {
            client,
            clock,
            build_url: None,
        }
    }

    pub fn with_build_url(mut self, build_url: Option<String>) -> Self {
        self.build_url = build_url.filter(|url| !url.trim().is_empty());
        self
    }

    /// Context over an in-memory cluster and virtual time
    #[cfg(test)]
    pub fn new_mock(
        client: Arc<crate::cluster::mock::MockClusterClient>,
        clock: Arc<crate::controller::clock::MockClock>,
    ) -> Self {
        Context::new(client, clock)
    }
}
