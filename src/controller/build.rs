//! Waiting on builds, and cancelling them

use super::annotate::{annotate_if_configured, AnnotationTarget};
use super::causality::did_all_images_change_if_needed;
use super::poll::{poll_until, Attempt, PollOutcome, FAST_POLL_INTERVAL};
use super::step::{Context, StepError};
use crate::crd::BuildPhase;
use kube::ResourceExt;
use std::cell::RefCell;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Wait for build `build_name` to finish, then optionally check its image reached
/// the deployments that watch it
///
/// Polls the build phase every second. A build ending in any terminal phase
/// other than Complete fails straight away. With `check_deployments` set, a
/// Complete build whose image did not propagate fails with
/// [`StepError::ImageNotPropagated`].
pub async fn verify_build(
    ctx: &Context,
    build_config: &str,
    build_name: &str,
    namespace: &str,
    deadline: Instant,
    check_deployments: bool,
) -> Result<(), StepError> {
    info!(build = %build_name, namespace = %namespace, "Waiting for build to finish");

    let client = ctx.client.as_ref();
    let last_phase = RefCell::new(String::from("not found"));
    let last = &last_phase;

    let outcome = poll_until(
        ctx.clock.as_ref(),
        deadline,
        FAST_POLL_INTERVAL,
        move || async move {
            let build = match client.get_build(build_name, namespace).await {
                Ok(Some(build)) => build,
                Ok(None) => return Attempt::Pending,
                Err(e) => {
                    debug!(error = %e, build = %build_name, "Fetch failed, retrying");
                    return Attempt::Pending;
                }
            };
            let Some(phase) = build.phase() else {
                return Attempt::Pending;
            };
            *last.borrow_mut() = phase.to_string();
            match phase {
                BuildPhase::Complete => Attempt::Ready(()),
                phase if phase.is_terminal() => Attempt::Failed(phase),
                _ => Attempt::Pending,
            }
        },
    )
    .await;

    let what = format!("build {build_name}");
    match outcome {
        PollOutcome::Ready(()) => {}
        PollOutcome::Failed(phase) => {
            return Err(StepError::TerminalFailure {
                what,
                phase: phase.to_string(),
            })
        }
        PollOutcome::TimedOut => {
            return Err(StepError::TimedOut {
                what,
                last_state: last_phase.into_inner(),
            })
        }
    }

    info!(build = %build_name, "Build completed");
    annotate_if_configured(ctx, AnnotationTarget::Build(build_name), namespace).await;

    if !check_deployments {
        return Ok(());
    }

    if did_all_images_change_if_needed(ctx, build_config, namespace, deadline).await {
        info!(build = %build_name, "Triggered deployments picked up the new image");
        Ok(())
    } else {
        Err(StepError::ImageNotPropagated {
            build: build_name.to_string(),
        })
    }
}

/// Cancel every unfinished build in `namespace`, returning how many were cancelled
///
/// Builds of every BuildConfig are swept, so orphaned builds go too. A failure
/// to cancel one build is logged and the sweep moves on; failing to list the
/// builds at all fails the step.
pub async fn cancel_builds(ctx: &Context, namespace: &str) -> Result<usize, StepError> {
    let builds = ctx.client.list_builds(namespace).await?;
    let mut cancelled = 0;

    for listed in builds.iter().filter(|b| !b.is_terminal()) {
        let name = listed.name_any();

        let mut build = match ctx.client.get_build(&name, namespace).await {
            Ok(Some(build)) => build,
            Ok(None) => {
                debug!(build = %name, "Build disappeared before it could be cancelled");
                continue;
            }
            Err(e) => {
                warn!(error = %e, build = %name, "Failed to re-read build, skipping");
                continue;
            }
        };
        if build.is_terminal() {
            continue;
        }

        build.request_cancel();
        match ctx.client.replace_build(&build).await {
            Ok(_) => {
                info!(build = %name, "Cancelled build");
                cancelled += 1;
            }
            Err(e) => warn!(error = %e, build = %name, "Failed to cancel build, continuing"),
        }
    }

    info!(namespace = %namespace, cancelled = cancelled, "Build cancellation sweep finished");
    Ok(cancelled)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "build_test.rs"]
mod tests;
