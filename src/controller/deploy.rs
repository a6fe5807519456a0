//! Rolling out, verifying and cancelling DeploymentConfig generations

use super::annotate::{annotate_if_configured, retry_with_refetch, AnnotationTarget};
use super::poll::{poll_until, Attempt, PollOutcome, FAST_POLL_INTERVAL, SLOW_POLL_INTERVAL};
use super::state::{describe_generation, is_scaled_appropriately};
use super::step::{Context, StepError};
use crate::cluster::ClusterError;
use crate::crd::replication_controller::{
    DEPLOYMENT_CANCELLED_ANNOTATION, DEPLOYMENT_CANCELLED_BY_USER,
    DEPLOYMENT_STATUS_REASON_ANNOTATION,
};
use crate::crd::{DeploymentGeneration, DeploymentPhase};
use std::cell::{Cell, RefCell};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Start a new rollout of `name` and wait for it to complete
///
/// Bumps `latestVersion` exactly once per call, then follows the generation it
/// created every 10s. A DeploymentConfig that does not exist yet is waited for.
/// A Failed generation ends the wait immediately.
pub async fn deploy(
    ctx: &Context,
    name: &str,
    namespace: &str,
    deadline: Instant,
) -> Result<(), StepError> {
    info!(deployment_config = %name, namespace = %namespace, "Starting deployment");

    let client = ctx.client.as_ref();
    let bumped = Cell::new(false);
    let last_state = RefCell::new(String::from("no config"));
    let (bumped, last) = (&bumped, &last_state);

    let outcome = poll_until(
        ctx.clock.as_ref(),
        deadline,
        SLOW_POLL_INTERVAL,
        move || async move {
            let mut dc = match client.get_deployment_config(name, namespace).await {
                Ok(Some(dc)) => dc,
                Ok(None) => return Attempt::Pending,
                Err(e) => {
                    debug!(error = %e, deployment_config = %name, "Fetch failed, retrying");
                    return Attempt::Pending;
                }
            };

            if !bumped.get() {
                let version = dc.bump_version();
                if let Err(e) = client.replace_deployment_config(&dc).await {
                    warn!(error = %e, deployment_config = %name, "Failed to bump latestVersion, retrying");
                    return Attempt::Pending;
                }
                bumped.set(true);
                info!(deployment_config = %name, version = version, "Bumped latestVersion");
                annotate_if_configured(ctx, AnnotationTarget::DeploymentConfig(name), namespace).await;
            }

            let rc_name = dc.replication_controller_name(dc.latest_version());
            let rc = match client.get_replication_controller(&rc_name, namespace).await {
                Ok(Some(rc)) => rc,
                Ok(None) => {
                    *last.borrow_mut() = format!("{rc_name} not created yet");
                    return Attempt::Pending;
                }
                Err(e) => {
                    debug!(error = %e, replication_controller = %rc_name, "Fetch failed, retrying");
                    return Attempt::Pending;
                }
            };

            let state = describe_generation(&rc);
            debug!(state = %state, "Observed deployment generation");
            *last.borrow_mut() = state.clone();
            match rc.deployment_phase() {
                Some(DeploymentPhase::Complete) => Attempt::Ready(rc_name),
                Some(DeploymentPhase::Failed) => Attempt::Failed(state),
                _ => Attempt::Pending,
            }
        },
    )
    .await;

    let what = format!("deployment {name}");
    match outcome {
        PollOutcome::Ready(rc_name) => {
            info!(replication_controller = %rc_name, "Deployment completed");
            Ok(())
        }
        PollOutcome::Failed(phase) => Err(StepError::TerminalFailure { what, phase }),
        PollOutcome::TimedOut => Err(StepError::TimedOut {
            what,
            last_state: last_state.into_inner(),
        }),
    }
}

/// Wait for the latest generation of `name` to settle, without changing anything
///
/// The target replica count is `replicas` when given, otherwise the
/// DeploymentConfig's own `spec.replicas`. Re-reads everything every second.
pub async fn verify_deployment(
    ctx: &Context,
    name: &str,
    namespace: &str,
    replicas: Option<i32>,
    check_count: bool,
    deadline: Instant,
) -> Result<(), StepError> {
    info!(
        deployment_config = %name,
        namespace = %namespace,
        replicas = ?replicas,
        check_count = check_count,
        "Verifying deployment"
    );

    let client = ctx.client.as_ref();
    let last_state = RefCell::new(String::from("no config"));
    let last = &last_state;

    let outcome = poll_until(
        ctx.clock.as_ref(),
        deadline,
        FAST_POLL_INTERVAL,
        move || async move {
            let dc = match client.get_deployment_config(name, namespace).await {
                Ok(Some(dc)) => dc,
                Ok(None) => return Attempt::Pending,
                Err(e) => {
                    debug!(error = %e, deployment_config = %name, "Fetch failed, retrying");
                    return Attempt::Pending;
                }
            };

            let version = dc.latest_version();
            if version < 1 {
                *last.borrow_mut() = "no deployment yet".to_string();
                return Attempt::Pending;
            }
            let rc_name = dc.replication_controller_name(version);
            let rc = match client.get_replication_controller(&rc_name, namespace).await {
                Ok(Some(rc)) => rc,
                Ok(None) => {
                    *last.borrow_mut() = format!("{rc_name} not created yet");
                    return Attempt::Pending;
                }
                Err(e) => {
                    debug!(error = %e, replication_controller = %rc_name, "Fetch failed, retrying");
                    return Attempt::Pending;
                }
            };

            let state = describe_generation(&rc);
            *last.borrow_mut() = state.clone();
            let desired = replicas.unwrap_or_else(|| dc.desired_replicas());
            if rc.deployment_phase() == Some(DeploymentPhase::Failed) {
                Attempt::Failed(state)
            } else if is_scaled_appropriately(&rc, check_count, desired) {
                Attempt::Ready(state)
            } else {
                Attempt::Pending
            }
        },
    )
    .await;

    let what = format!("deployment {name}");
    match outcome {
        PollOutcome::Ready(state) => {
            info!(state = %state, "Deployment verified");
            Ok(())
        }
        PollOutcome::Failed(phase) => Err(StepError::TerminalFailure { what, phase }),
        PollOutcome::TimedOut => Err(StepError::TimedOut {
            what,
            last_state: last_state.into_inner(),
        }),
    }
}

/// Whether a generation is past the point where cancelling means anything
fn is_settled(phase: Option<&DeploymentPhase>, cancelled: bool) -> bool {
    cancelled || phase.is_some_and(|p| p.is_terminal() || *p == DeploymentPhase::Cancelled)
}

/// Cancel the in-flight rollout of `name`
///
/// Returns `Ok(true)` when the latest generation was marked cancelled and
/// `Ok(false)` when there was nothing to cancel. The cancellation is an
/// annotation update, retried with a fresh read on conflicts.
pub async fn cancel_deployment(
    ctx: &Context,
    name: &str,
    namespace: &str,
) -> Result<bool, StepError> {
    let dc = ctx
        .client
        .get_deployment_config(name, namespace)
        .await?
        .ok_or_else(|| StepError::not_found("DeploymentConfig", name, namespace))?;

    let version = dc.latest_version();
    if version < 1 {
        info!(deployment_config = %name, "DeploymentConfig has never been deployed, nothing to cancel");
        return Ok(false);
    }

    let rc_name = dc.replication_controller_name(version);
    let rc = ctx
        .client
        .get_replication_controller(&rc_name, namespace)
        .await?
        .ok_or_else(|| StepError::not_found("ReplicationController", &rc_name, namespace))?;
    if is_settled(rc.deployment_phase().as_ref(), rc.is_cancelled()) {
        info!(state = %describe_generation(&rc), "Deployment already finished, nothing to cancel");
        return Ok(false);
    }

    let client = ctx.client.as_ref();
    let rc_ref = rc_name.as_str();
    let cancelled = retry_with_refetch(ctx.clock.as_ref(), rc_ref, move || async move {
        let mut rc = client
            .get_replication_controller(rc_ref, namespace)
            .await?
            .ok_or_else(|| ClusterError::NotFound {
                kind: "ReplicationController".to_string(),
                name: rc_ref.to_string(),
            })?;
        if is_settled(rc.deployment_phase().as_ref(), rc.is_cancelled()) {
            return Ok(false);
        }
        rc.set_annotation(DEPLOYMENT_CANCELLED_ANNOTATION, "true");
        rc.set_annotation(DEPLOYMENT_STATUS_REASON_ANNOTATION, DEPLOYMENT_CANCELLED_BY_USER);
        client.replace_replication_controller(&rc).await?;
        Ok(true)
    })
    .await?;

    if cancelled {
        info!(replication_controller = %rc_name, "Cancelled deployment");
    } else {
        info!(replication_controller = %rc_name, "Deployment finished before it could be cancelled");
    }
    Ok(cancelled)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "deploy_test.rs"]
mod tests;
