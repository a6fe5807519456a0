use super::build::ImageReference;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// DeploymentConfig drives rollouts through numbered ReplicationController generations
///
/// Bumping `status.latestVersion` asks the cluster to roll out generation
/// `latestVersion`, materialized as ReplicationController `<name>-<latestVersion>`.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "apps.openshift.io",
    version = "v1",
    kind = "DeploymentConfig",
    namespaced,
    status = "DeploymentConfigStatus",
    printcolumn = r#"{"name":"Revision", "type":"integer", "jsonPath":".status.latestVersion"}"#,
    printcolumn = r#"{"name":"Desired", "type":"integer", "jsonPath":".spec.replicas"}"#
)]
pub struct DeploymentConfigSpec {
    /// Number of desired pods
    #[serde(default)]
    pub replicas: i32,

    /// Triggers that start a new rollout (config change, image change)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<DeploymentTriggerPolicy>,

    /// Fields this crate does not model (template, selector, strategy, ...)
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
pub struct DeploymentTriggerPolicy {
    /// "ImageChange" or "ConfigChange"
    #[serde(rename = "type")]
    pub trigger_type: String,

    #[serde(rename = "imageChangeParams", skip_serializing_if = "Option::is_none")]
    pub image_change_params: Option<ImageChangeParams>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
pub struct ImageChangeParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub automatic: Option<bool>,

    #[serde(rename = "containerNames", default, skip_serializing_if = "Vec::is_empty")]
    pub container_names: Vec<String>,

    /// Image stream tag being watched
    pub from: ImageReference,

    /// Image (pull spec with hex digest) that last fired this trigger
    #[serde(rename = "lastTriggeredImage", skip_serializing_if = "Option::is_none")]
    pub last_triggered_image: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
pub struct DeploymentConfigStatus {
    /// Monotonic rollout counter
    #[serde(rename = "latestVersion", default)]
    pub latest_version: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Why the latest rollout happened
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<DeploymentDetails>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
pub struct DeploymentDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<DeploymentCause>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
pub struct DeploymentCause {
    #[serde(rename = "type")]
    pub cause_type: String,

    #[serde(rename = "imageTrigger", skip_serializing_if = "Option::is_none")]
    pub image_trigger: Option<DeploymentCauseImageTrigger>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
pub struct DeploymentCauseImageTrigger {
    pub from: ImageReference,
}

impl DeploymentConfig {
    pub fn latest_version(&self) -> i64 {
        self.status.as_ref().map(|s| s.latest_version).unwrap_or(0)
    }

    /// Increment `latestVersion`, returning the new value
    pub fn bump_version(&mut self) -> i64 {
        let status = self.status.get_or_insert_with(DeploymentConfigStatus::default);
        status.latest_version += 1;
        status.latest_version
    }

    pub fn desired_replicas(&self) -> i32 {
        self.spec.replicas
    }

    /// Name of the ReplicationController backing generation `version`
    pub fn replication_controller_name(&self, version: i64) -> String {
        format!("{}-{}", self.name_any(), version)
    }

    /// Whether the cluster has recorded any cause for the latest rollout
    pub fn have_triggers_fired(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.details.as_ref())
            .is_some_and(|d| !d.causes.is_empty())
    }

    /// Whether an image-change cause for `image_tag` started the latest rollout
    pub fn did_image_trigger(&self, image_tag: &str) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.details.as_ref())
            .is_some_and(|d| {
                d.causes.iter().any(|c| {
                    c.image_trigger
                        .as_ref()
                        .is_some_and(|t| t.from.name == image_tag)
                })
            })
    }

    /// Image hex ID the trigger watching `image_tag` last fired with
    ///
    /// `None` when no trigger references the tag, or it has never fired.
    pub fn image_hex_id(&self, image_tag: &str) -> Option<&str> {
        self.spec
            .triggers
            .iter()
            .filter_map(|t| t.image_change_params.as_ref())
            .find(|p| p.from.name == image_tag)
            .and_then(|p| p.last_triggered_image.as_deref())
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "deployment_config_test.rs"]
mod tests;
