//! Convergence predicates over fetched deployment generations

use crate::crd::{DeploymentGeneration, DeploymentPhase};
use k8s_openapi::api::core::v1::ReplicationController;
use kube::ResourceExt;

/// Whether a generation has finished rolling out at the expected size
///
/// True iff the phase is Complete and, when `check_count` is set, the
/// current replica count equals `desired`.
pub fn scaled_appropriately(
    phase: Option<&DeploymentPhase>,
    current: i32,
    desired: i32,
    check_count: bool,
) -> bool {
    matches!(phase, Some(DeploymentPhase::Complete)) && (!check_count || current == desired)
}

pub fn is_scaled_appropriately(rc: &ReplicationController, check_count: bool, desired: i32) -> bool {
    scaled_appropriately(
        rc.deployment_phase().as_ref(),
        rc.current_replicas(),
        desired,
        check_count,
    )
}

/// One-line summary used in progress logs and timeout reports
pub fn describe_generation(rc: &ReplicationController) -> String {
    let phase = rc
        .deployment_phase()
        .map(|p| p.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "{} phase {} replicas {}/{}",
        rc.name_any(),
        phase,
        rc.current_replicas(),
        rc.desired_replicas()
    )
}
