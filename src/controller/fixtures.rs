//! Builders for cluster objects used across controller tests

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::crd::build::{BuildConfigSpec, BuildOutput, BuildSpec, BuildStatus};
use crate::crd::deployment_config::{
    DeploymentCause, DeploymentCauseImageTrigger, DeploymentConfigSpec, DeploymentConfigStatus,
    DeploymentDetails, DeploymentTriggerPolicy, ImageChangeParams,
};
use crate::crd::replication_controller::{
    DEPLOYMENT_PHASE_ANNOTATION, ENCODED_DEPLOYMENT_CONFIG_ANNOTATION,
};
use crate::crd::{Build, BuildConfig, DeploymentConfig, ImageReference};
use k8s_openapi::api::core::v1::{
    ReplicationController, ReplicationControllerSpec, ReplicationControllerStatus,
};
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

pub const NAMESPACE: &str = "myproject";

pub fn build(name: &str, phase: &str) -> Build {
    let mut build = Build::new(name, BuildSpec::default());
    build.metadata.namespace = Some(NAMESPACE.to_string());
    build.status = Some(BuildStatus {
        phase: Some(phase.to_string()),
        ..Default::default()
    });
    build
}

pub fn build_config(name: &str, output_tag: Option<&str>) -> BuildConfig {
    let mut bc = BuildConfig::new(
        name,
        BuildConfigSpec {
            output: output_tag.map(|tag| BuildOutput {
                to: Some(ImageReference::image_stream_tag(tag)),
                ..Default::default()
            }),
            ..Default::default()
        },
    );
    bc.metadata.namespace = Some(NAMESPACE.to_string());
    bc
}

pub fn deployment_config(name: &str, replicas: i32, latest_version: i64) -> DeploymentConfig {
    let mut dc = DeploymentConfig::new(
        name,
        DeploymentConfigSpec {
            replicas,
            ..Default::default()
        },
    );
    dc.metadata.namespace = Some(NAMESPACE.to_string());
    dc.status = Some(DeploymentConfigStatus {
        latest_version,
        ..Default::default()
    });
    dc
}

/// Add an image-change trigger on `tag` that last fired with `hex_id`
pub fn with_image_trigger(mut dc: DeploymentConfig, tag: &str, hex_id: Option<&str>) -> DeploymentConfig {
    dc.spec.triggers.push(DeploymentTriggerPolicy {
        trigger_type: "ImageChange".to_string(),
        image_change_params: Some(ImageChangeParams {
            automatic: Some(true),
            container_names: vec![dc.metadata.name.clone().unwrap_or_default()],
            from: ImageReference::image_stream_tag(tag),
            last_triggered_image: hex_id.map(str::to_string),
        }),
    });
    dc
}

/// Record that the latest rollout was caused by an image change on `tag`
pub fn with_fired_cause(mut dc: DeploymentConfig, tag: &str) -> DeploymentConfig {
    let status = dc.status.get_or_insert_with(DeploymentConfigStatus::default);
    status.details = Some(DeploymentDetails {
        message: None,
        causes: vec![DeploymentCause {
            cause_type: "ImageChange".to_string(),
            image_trigger: Some(DeploymentCauseImageTrigger {
                from: ImageReference::image_stream_tag(tag),
            }),
        }],
    });
    dc
}

pub fn replication_controller(
    name: &str,
    phase: Option<&str>,
    current: i32,
    desired: i32,
) -> ReplicationController {
    let mut annotations = BTreeMap::new();
    if let Some(phase) = phase {
        annotations.insert(DEPLOYMENT_PHASE_ANNOTATION.to_string(), phase.to_string());
    }
    ReplicationController {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            annotations: Some(annotations),
            ..Default::default()
        },
        spec: Some(ReplicationControllerSpec {
            replicas: Some(desired),
            ..Default::default()
        }),
        status: Some(ReplicationControllerStatus {
            replicas: current,
            ..Default::default()
        }),
    }
}

/// Embed `dc` as the generation's DeploymentConfig snapshot
pub fn with_snapshot(mut rc: ReplicationController, dc: &DeploymentConfig) -> ReplicationController {
    rc.metadata.annotations.get_or_insert_with(BTreeMap::new).insert(
        ENCODED_DEPLOYMENT_CONFIG_ANNOTATION.to_string(),
        serde_json::to_string(dc).unwrap(),
    );
    rc
}
