//! Cluster API access used by the pipeline steps
//!
//! Follows the same trait-based pattern as the rest of the crate's seams:
//! - `ClusterClient` trait for abstraction
//! - `KubeClusterClient` talking to a real API server through `kube::Api`
//! - `MockClusterClient` (tests only) serving scripted object states from memory

mod api;
#[cfg(test)]
pub mod mock;

pub use api::KubeClusterClient;

use crate::crd::{Build, BuildConfig, DeploymentConfig, ImageStream};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ReplicationController, Service};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    /// Optimistic-concurrency failure: the object changed since it was read
    #[error("conflict updating {kind} {name}: {message}")]
    Conflict {
        kind: String,
        name: String,
        message: String,
    },

    #[error("API server rejected {kind} {name} (HTTP {code}): {message}")]
    Api {
        kind: String,
        name: String,
        code: u16,
        message: String,
    },

    /// Socket, TLS or decoding failure below the API layer
    #[error("transport error: {0}")]
    Transport(String),
}

impl ClusterError {
    /// Whether re-reading the object and trying again may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ClusterError::Conflict { .. } | ClusterError::Transport(_) => true,
            ClusterError::Api { code, .. } => *code >= 500 || *code == 429,
            ClusterError::NotFound { .. } => false,
        }
    }
}

/// Typed get/list/replace against the cluster, keyed by (kind, name, namespace)
///
/// `get_*` methods return `Ok(None)` when the object does not exist.
/// `replace_*` methods are optimistic-concurrency updates: replacing a stale
/// object fails with `ClusterError::Conflict`.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn get_build(&self, name: &str, namespace: &str) -> Result<Option<Build>, ClusterError>;

    async fn list_builds(&self, namespace: &str) -> Result<Vec<Build>, ClusterError>;

    async fn replace_build(&self, build: &Build) -> Result<Build, ClusterError>;

    async fn get_build_config(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<BuildConfig>, ClusterError>;

    async fn get_deployment_config(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<DeploymentConfig>, ClusterError>;

    async fn list_deployment_configs(
        &self,
        namespace: &str,
    ) -> Result<Vec<DeploymentConfig>, ClusterError>;

    async fn replace_deployment_config(
        &self,
        dc: &DeploymentConfig,
    ) -> Result<DeploymentConfig, ClusterError>;

    async fn get_replication_controller(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<ReplicationController>, ClusterError>;

    async fn replace_replication_controller(
        &self,
        rc: &ReplicationController,
    ) -> Result<ReplicationController, ClusterError>;

    async fn get_image_stream(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<ImageStream>, ClusterError>;

    async fn get_service(&self, name: &str, namespace: &str)
        -> Result<Option<Service>, ClusterError>;
}
