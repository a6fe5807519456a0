//! Did a build's image actually reach the deployments that watch it?
//!
//! A build finishing is not the same as its image being rolled out. For every
//! DeploymentConfig with an image-change trigger on the build's output tag,
//! this compares the image hex ID of the latest generation against the one
//! recorded in the previous generation's DeploymentConfig snapshot. The
//! snapshot stored on the ReplicationController is used rather than the live
//! DeploymentConfig, so a trigger firing mid-check cannot skew the comparison.
//!
//! All checks are read-only and answer `bool`. Missing evidence is never
//! reported as a change.

use super::poll::{poll_until, Attempt, PollOutcome, SLOW_POLL_INTERVAL};
use super::step::Context;
use crate::crd::{DeploymentConfig, DeploymentGeneration};
use kube::ResourceExt;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Share of the remaining wait spent waiting for triggers to fire
///
/// Trigger firing is quick compared to a full rollout, so it only gets a third.
const TRIGGER_WAIT_DIVISOR: u32 = 3;

/// Wait for `dc`'s triggers to fire, then return it if one fired for `image_tag`
///
/// Polls every 10s for up to a third of the time left before `deadline`.
/// The returned DeploymentConfig is the one observed after firing, so its
/// generation and trigger image reflect the rollout the trigger started.
/// A DeploymentConfig whose triggers never fire is reported as not triggered.
pub async fn does_trigger(
    ctx: &Context,
    dc: &DeploymentConfig,
    namespace: &str,
    image_tag: &str,
    deadline: Instant,
) -> Option<DeploymentConfig> {
    let name = dc.name_any();
    let now = ctx.clock.now();
    let budget = deadline.saturating_duration_since(now) / TRIGGER_WAIT_DIVISOR;
    let trigger_deadline = now + budget;

    if dc.have_triggers_fired() {
        return dc.did_image_trigger(image_tag).then(|| dc.clone());
    }

    let client = ctx.client.as_ref();
    let name_ref = name.as_str();
    let outcome = poll_until(
        ctx.clock.as_ref(),
        trigger_deadline,
        SLOW_POLL_INTERVAL,
        move || async move {
            match client.get_deployment_config(name_ref, namespace).await {
                Ok(Some(fresh)) if fresh.have_triggers_fired() => Attempt::Ready(fresh),
                Ok(Some(_)) => Attempt::Pending,
                Ok(None) => Attempt::Failed(()),
                Err(e) => {
                    debug!(error = %e, deployment_config = %name_ref, "Fetch failed, retrying");
                    Attempt::Pending
                }
            }
        },
    )
    .await;

    match outcome {
        PollOutcome::Ready(fresh) => fresh.did_image_trigger(image_tag).then_some(fresh),
        PollOutcome::Failed(()) => {
            warn!(deployment_config = %name, "DeploymentConfig disappeared while waiting for triggers");
            None
        }
        PollOutcome::TimedOut => {
            debug!(deployment_config = %name, "Triggers did not fire before the deadline");
            None
        }
    }
}

/// Whether generation `latest_version` runs a different image than the one before it
///
/// Generation 1 has nothing to regress from and always passes. Otherwise the
/// previous generation's ReplicationController, its DeploymentConfig snapshot,
/// and the snapshot's hex ID for `image_tag` must all be present; if any is
/// missing the answer is `false`.
pub async fn did_image_change_from_previous_version(
    ctx: &Context,
    latest_version: i64,
    deployment_config: &str,
    namespace: &str,
    latest_image_hex_id: &str,
    image_tag: &str,
) -> bool {
    let previous_version = latest_version - 1;
    if previous_version < 1 {
        return true;
    }

    let rc_name = format!("{deployment_config}-{previous_version}");
    let previous_rc = match ctx
        .client
        .get_replication_controller(&rc_name, namespace)
        .await
    {
        Ok(Some(rc)) => rc,
        Ok(None) => {
            warn!(replication_controller = %rc_name, "Could not obtain previous replication controller");
            return false;
        }
        Err(e) => {
            warn!(error = %e, replication_controller = %rc_name, "Could not obtain previous replication controller");
            return false;
        }
    };

    let snapshot = match previous_rc.encoded_deployment_config() {
        Ok(Some(dc)) => dc,
        Ok(None) => {
            warn!(replication_controller = %rc_name, "Associated DeploymentConfig missing from previous replication controller");
            return false;
        }
        Err(e) => {
            warn!(error = %e, replication_controller = %rc_name, "Associated DeploymentConfig on previous replication controller is unreadable");
            return false;
        }
    };

    let Some(previous_image_hex_id) = snapshot.image_hex_id(image_tag) else {
        warn!(
            replication_controller = %rc_name,
            image = %image_tag,
            "Could not obtain hex image ID for previous deployment"
        );
        return false;
    };

    let changed = latest_image_hex_id != previous_image_hex_id;
    info!(
        deployment_config = %deployment_config,
        latest_version = latest_version,
        latest_image = %latest_image_hex_id,
        previous_image = %previous_image_hex_id,
        changed = changed,
        "Compared image across generations"
    );
    changed
}

/// Whether every deployment triggered by `build_config`'s output picked up the new image
///
/// Vacuously true when the build produces no image or the namespace has no
/// DeploymentConfigs. DeploymentConfigs whose triggers do not fire for the
/// image, or that do not reference it at all, are left out of the check.
pub async fn did_all_images_change_if_needed(
    ctx: &Context,
    build_config: &str,
    namespace: &str,
    deadline: Instant,
) -> bool {
    let bc = match ctx.client.get_build_config(build_config, namespace).await {
        Ok(Some(bc)) => bc,
        Ok(None) => {
            warn!(build_config = %build_config, "BuildConfig not found");
            return false;
        }
        Err(e) => {
            warn!(error = %e, build_config = %build_config, "Could not fetch BuildConfig");
            return false;
        }
    };

    let Some(image_tag) = bc.output_image_tag() else {
        info!(build_config = %build_config, "Build produces no image, nothing to verify");
        return true;
    };

    let dcs = match ctx.client.list_deployment_configs(namespace).await {
        Ok(dcs) => dcs,
        Err(e) => {
            warn!(error = %e, namespace = %namespace, "Could not list DeploymentConfigs");
            return false;
        }
    };
    if dcs.is_empty() {
        info!(namespace = %namespace, "No DeploymentConfigs in namespace, nothing to verify");
        return true;
    }

    for listed in &dcs {
        let Some(dc) = does_trigger(ctx, listed, namespace, image_tag, deadline).await else {
            continue;
        };

        let name = dc.name_any();
        let Some(latest_image_hex_id) = dc.image_hex_id(image_tag) else {
            info!(deployment_config = %name, image = %image_tag, "DeploymentConfig did not have a reference to the image");
            continue;
        };

        if !did_image_change_from_previous_version(
            ctx,
            dc.latest_version(),
            &name,
            namespace,
            latest_image_hex_id,
            image_tag,
        )
        .await
        {
            warn!(
                deployment_config = %name,
                image = %image_tag,
                "Deployment was triggered but did not pick up the new image"
            );
            return false;
        }
    }

    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "causality_test.rs"]
mod tests;
