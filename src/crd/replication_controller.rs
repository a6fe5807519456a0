//! Deployment-generation view over core ReplicationControllers
//!
//! OpenShift records rollout bookkeeping for each DeploymentConfig generation
//! as annotations on the ReplicationController it creates. This module reads
//! and writes those annotations.

use super::deployment_config::DeploymentConfig;
use k8s_openapi::api::core::v1::{ReplicationController, ReplicationControllerSpec};
use std::fmt;

/// JSON snapshot of the DeploymentConfig the generation was created from
pub const ENCODED_DEPLOYMENT_CONFIG_ANNOTATION: &str = "openshift.io/encoded-deployment-config";
pub const DEPLOYMENT_PHASE_ANNOTATION: &str = "openshift.io/deployment.phase";
pub const DEPLOYMENT_CANCELLED_ANNOTATION: &str = "openshift.io/deployment.cancelled";
pub const DEPLOYMENT_STATUS_REASON_ANNOTATION: &str = "openshift.io/deployment.status-reason";

/// Status reason written when a rollout is cancelled on request
pub const DEPLOYMENT_CANCELLED_BY_USER: &str = "cancelled by the user";

/// Phase of a deployment generation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeploymentPhase {
    New,
    Pending,
    Running,
    Complete,
    Failed,
    /// Only meaningful to the cancel path, which treats it as already final
    Cancelled,
    Unknown(String),
}

impl DeploymentPhase {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "new" => DeploymentPhase::New,
            "pending" => DeploymentPhase::Pending,
            "running" => DeploymentPhase::Running,
            "complete" => DeploymentPhase::Complete,
            "failed" => DeploymentPhase::Failed,
            "cancelled" => DeploymentPhase::Cancelled,
            _ => DeploymentPhase::Unknown(value.to_string()),
        }
    }

    /// Complete and Failed are final
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentPhase::Complete | DeploymentPhase::Failed)
    }
}

impl fmt::Display for DeploymentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeploymentPhase::New => "New",
            DeploymentPhase::Pending => "Pending",
            DeploymentPhase::Running => "Running",
            DeploymentPhase::Complete => "Complete",
            DeploymentPhase::Failed => "Failed",
            DeploymentPhase::Cancelled => "Cancelled",
            DeploymentPhase::Unknown(other) => other.as_str(),
        };
        f.write_str(name)
    }
}

/// Accessors for the rollout state carried by a ReplicationController
pub trait DeploymentGeneration {
    fn annotation(&self, key: &str) -> Option<&str>;
    fn set_annotation(&mut self, key: &str, value: &str);
    fn current_replicas(&self) -> i32;
    fn desired_replicas(&self) -> i32;
    fn set_desired_replicas(&mut self, replicas: i32);

    fn deployment_phase(&self) -> Option<DeploymentPhase> {
        self.annotation(DEPLOYMENT_PHASE_ANNOTATION)
            .map(DeploymentPhase::parse)
    }

    fn is_cancelled(&self) -> bool {
        self.annotation(DEPLOYMENT_CANCELLED_ANNOTATION)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }

    /// Decode the DeploymentConfig snapshot this generation was created from
    ///
    /// Returns `Ok(None)` when the annotation is missing or blank.
    fn encoded_deployment_config(&self) -> Result<Option<DeploymentConfig>, serde_json::Error> {
        match self.annotation(ENCODED_DEPLOYMENT_CONFIG_ANNOTATION) {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(raw).map(Some),
            _ => Ok(None),
        }
    }
}

impl DeploymentGeneration for ReplicationController {
    fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(key))
            .map(String::as_str)
    }

    fn set_annotation(&mut self, key: &str, value: &str) {
        self.metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert(key.to_string(), value.to_string());
    }

    fn current_replicas(&self) -> i32 {
        self.status.as_ref().map(|s| s.replicas).unwrap_or(0)
    }

    fn desired_replicas(&self) -> i32 {
        self.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0)
    }

    fn set_desired_replicas(&mut self, replicas: i32) {
        self.spec
            .get_or_insert_with(ReplicationControllerSpec::default)
            .replicas = Some(replicas);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ReplicationControllerStatus;
    use kube::api::ObjectMeta;

    fn rc_with_annotations(pairs: &[(&str, &str)]) -> ReplicationController {
        ReplicationController {
            metadata: ObjectMeta {
                name: Some("web-2".to_string()),
                annotations: Some(
                    pairs
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            spec: Some(ReplicationControllerSpec {
                replicas: Some(1),
                ..Default::default()
            }),
            status: Some(ReplicationControllerStatus {
                replicas: 1,
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_deployment_phase_terminal_classification() {
        for phase in ["Complete", "Failed"] {
            assert!(DeploymentPhase::parse(phase).is_terminal());
        }
        for phase in ["New", "Pending", "Running", "Cancelled"] {
            assert!(!DeploymentPhase::parse(phase).is_terminal());
        }
    }

    #[test]
    fn test_deployment_phase_read_from_annotation() {
        let rc = rc_with_annotations(&[(DEPLOYMENT_PHASE_ANNOTATION, "running")]);
        assert_eq!(rc.deployment_phase(), Some(DeploymentPhase::Running));

        let rc = rc_with_annotations(&[]);
        assert_eq!(rc.deployment_phase(), None);
    }

    #[test]
    fn test_set_desired_replicas() {
        let mut rc = rc_with_annotations(&[]);
        rc.set_desired_replicas(3);

        assert_eq!(rc.desired_replicas(), 3);
        assert_eq!(rc.current_replicas(), 1);
    }

    #[test]
    fn test_cancelled_annotation() {
        let mut rc = rc_with_annotations(&[]);
        assert!(!rc.is_cancelled());

        rc.set_annotation(DEPLOYMENT_CANCELLED_ANNOTATION, "true");
        assert!(rc.is_cancelled());
    }

    #[test]
    fn test_encoded_deployment_config_missing_or_blank() {
        let rc = rc_with_annotations(&[]);
        assert!(rc.encoded_deployment_config().unwrap().is_none());

        let rc = rc_with_annotations(&[(ENCODED_DEPLOYMENT_CONFIG_ANNOTATION, "  ")]);
        assert!(rc.encoded_deployment_config().unwrap().is_none());
    }

    #[test]
    fn test_encoded_deployment_config_decodes_snapshot() {
        let snapshot = serde_json::json!({
            "kind": "DeploymentConfig",
            "apiVersion": "v1",
            "metadata": {"name": "web"},
            "spec": {
                "replicas": 1,
                "triggers": [{
                    "type": "ImageChange",
                    "imageChangeParams": {
                        "from": {"kind": "ImageStreamTag", "name": "web:latest"},
                        "lastTriggeredImage": "web@sha256:old"
                    }
                }]
            },
            "status": {"latestVersion": 1}
        })
        .to_string();
        let rc = rc_with_annotations(&[(ENCODED_DEPLOYMENT_CONFIG_ANNOTATION, &snapshot)]);

        let dc = rc.encoded_deployment_config().unwrap().unwrap();
        assert_eq!(dc.image_hex_id("web:latest"), Some("web@sha256:old"));
    }

    #[test]
    fn test_encoded_deployment_config_rejects_garbage() {
        let rc = rc_with_annotations(&[(ENCODED_DEPLOYMENT_CONFIG_ANNOTATION, "{not json")]);
        assert!(rc.encoded_deployment_config().is_err());
    }
}
