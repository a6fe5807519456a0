//! Scaling the latest generation of a DeploymentConfig

use super::annotate::{annotate_if_configured, AnnotationTarget};
use super::poll::{poll_until, Attempt, PollOutcome, SLOW_POLL_INTERVAL};
use super::state::{describe_generation, is_scaled_appropriately};
use super::step::{Context, StepError};
use crate::crd::DeploymentGeneration;
use kube::ResourceExt;
use std::cell::RefCell;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Parse a replica count parameter
///
/// Blank means "not given". Anything else must be a non-negative integer.
pub fn parse_replicas(value: &str) -> Result<Option<i32>, StepError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    match value.parse::<i32>() {
        Ok(n) if n >= 0 => Ok(Some(n)),
        _ => Err(StepError::InvalidArgument(format!(
            "replica count must be a non-negative integer, got {value:?}"
        ))),
    }
}

/// Scale the latest generation of `name` to `replicas` and wait for it to settle
///
/// Every 10s: re-read the DeploymentConfig and its latest ReplicationController,
/// set the desired count if it differs, and check whether the generation is
/// Complete (and, with `verify_count`, running exactly `replicas` pods).
/// Scaling to zero a DeploymentConfig with no generation is a no-op.
pub async fn scale(
    ctx: &Context,
    name: &str,
    namespace: &str,
    replicas: i32,
    verify_count: bool,
    deadline: Instant,
) -> Result<(), StepError> {
    if replicas < 0 {
        return Err(StepError::InvalidArgument(format!(
            "replica count must be non-negative, got {replicas}"
        )));
    }
    info!(deployment_config = %name, namespace = %namespace, replicas = replicas, "Scaling deployment");

    let client = ctx.client.as_ref();
    let last_state = RefCell::new(String::from("no replication controller"));
    let last = &last_state;

    let outcome = poll_until(
        ctx.clock.as_ref(),
        deadline,
        SLOW_POLL_INTERVAL,
        move || async move {
            let dc = match client.get_deployment_config(name, namespace).await {
                Ok(Some(dc)) => dc,
                Ok(None) => {
                    return Attempt::Failed(StepError::not_found("DeploymentConfig", name, namespace))
                }
                Err(e) => {
                    debug!(error = %e, deployment_config = %name, "Fetch failed, retrying");
                    return Attempt::Pending;
                }
            };

            let version = dc.latest_version();
            let rc = if version > 0 {
                let rc_name = dc.replication_controller_name(version);
                match client.get_replication_controller(&rc_name, namespace).await {
                    Ok(rc) => rc,
                    Err(e) => {
                        debug!(error = %e, replication_controller = %rc_name, "Fetch failed, retrying");
                        return Attempt::Pending;
                    }
                }
            } else {
                None
            };

            let Some(mut rc) = rc else {
                if replicas == 0 {
                    return Attempt::Ready(None);
                }
                return Attempt::Pending;
            };

            if rc.desired_replicas() != replicas {
                rc.set_desired_replicas(replicas);
                match client.replace_replication_controller(&rc).await {
                    Ok(_) => info!(replication_controller = %rc.name_any(), replicas = replicas, "Requested replica count"),
                    Err(e) => {
                        warn!(error = %e, replication_controller = %rc.name_any(), "Failed to set replica count, retrying")
                    }
                }
            }

            *last.borrow_mut() = describe_generation(&rc);
            if is_scaled_appropriately(&rc, verify_count, replicas) {
                Attempt::Ready(Some(rc.name_any()))
            } else {
                Attempt::Pending
            }
        },
    )
    .await;

    match outcome {
        PollOutcome::Ready(Some(rc_name)) => {
            info!(replication_controller = %rc_name, replicas = replicas, "Scaled deployment");
            annotate_if_configured(ctx, AnnotationTarget::ReplicationController(&rc_name), namespace)
                .await;
            Ok(())
        }
        PollOutcome::Ready(None) => {
            info!(deployment_config = %name, "No deployment to scale down, nothing to do");
            Ok(())
        }
        PollOutcome::Failed(err) => Err(err),
        PollOutcome::TimedOut => Err(StepError::TimedOut {
            what: format!("deployment {name} to scale to {replicas} replicas"),
            last_state: last_state.into_inner(),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::cluster::mock::MockClusterClient;
    use crate::controller::clock::{Clock, MockClock};
    use crate::controller::fixtures::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn setup() -> (Arc<MockClusterClient>, Arc<MockClock>, Context) {
        let client = Arc::new(MockClusterClient::new());
        let clock = Arc::new(MockClock::new());
        let ctx = Context::new_mock(client.clone(), clock.clone());
        (client, clock, ctx)
    }

    #[test]
    fn test_parse_replicas() {
        assert_eq!(parse_replicas("3").unwrap(), Some(3));
        assert_eq!(parse_replicas(" 0 ").unwrap(), Some(0));
        assert_eq!(parse_replicas("").unwrap(), None);
        assert!(parse_replicas("-1").is_err());
        assert!(parse_replicas("three").is_err());
    }

    #[tokio::test]
    async fn test_scale_to_zero_without_generation_is_noop() {
        let (client, clock, ctx) = setup();
        client.add_deployment_config(deployment_config("web", 1, 0));
        let deadline = clock.deadline_after(Duration::from_secs(180));

        scale(&ctx, "web", NAMESPACE, 0, true, deadline).await.unwrap();

        assert_eq!(clock.elapsed(), Duration::ZERO);
        assert!(client.replaced_replication_controllers().is_empty());
    }

    #[tokio::test]
    async fn test_scale_to_zero_with_missing_generation_is_noop() {
        let (client, clock, ctx) = setup();
        // Generation 2 was deleted out from under the config.
        client.add_deployment_config(deployment_config("web", 1, 2));
        let deadline = clock.deadline_after(Duration::from_secs(180));

        scale(&ctx, "web", NAMESPACE, 0, false, deadline).await.unwrap();

        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_scale_up_waits_for_pods() {
        let (client, clock, ctx) = setup();
        client.add_deployment_config(deployment_config("web", 1, 2));
        client.add_replication_controller(replication_controller("web-2", Some("Running"), 1, 1));
        client.add_replication_controller(replication_controller("web-2", Some("Complete"), 2, 3));
        client.add_replication_controller(replication_controller("web-2", Some("Complete"), 3, 3));
        let deadline = clock.deadline_after(Duration::from_secs(180));

        scale(&ctx, "web", NAMESPACE, 3, true, deadline).await.unwrap();

        let replaced = client.replaced_replication_controllers();
        assert_eq!(replaced.len(), 1);
        assert_eq!(replaced[0].desired_replicas(), 3);
        assert_eq!(clock.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_scale_times_out_when_pods_never_arrive() {
        let (client, clock, ctx) = setup();
        client.add_deployment_config(deployment_config("web", 1, 2));
        client.add_replication_controller(replication_controller("web-2", Some("Complete"), 1, 1));
        let deadline = clock.deadline_after(Duration::from_secs(60));

        let result = scale(&ctx, "web", NAMESPACE, 3, true, deadline).await;

        match result {
            Err(StepError::TimedOut { last_state, .. }) => {
                assert_eq!(last_state, "web-2 phase Complete replicas 1/3")
            }
            other => panic!("expected TimedOut, got {other:?}"),
        }
        assert!(clock.elapsed() >= Duration::from_secs(60));
        // Desired count is written once, then left alone.
        assert_eq!(client.replaced_replication_controllers().len(), 1);
    }

    #[tokio::test]
    async fn test_scale_without_count_check_only_needs_complete() {
        let (client, clock, ctx) = setup();
        client.add_deployment_config(deployment_config("web", 1, 2));
        client.add_replication_controller(replication_controller("web-2", Some("Complete"), 1, 1));
        let deadline = clock.deadline_after(Duration::from_secs(60));

        scale(&ctx, "web", NAMESPACE, 3, false, deadline).await.unwrap();
    }

    #[tokio::test]
    async fn test_scale_missing_config_fails_immediately() {
        let (_client, clock, ctx) = setup();
        let deadline = clock.deadline_after(Duration::from_secs(60));

        let result = scale(&ctx, "web", NAMESPACE, 1, false, deadline).await;

        assert!(matches!(result, Err(StepError::NotFound { .. })));
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_scale_rejects_negative_count() {
        let (_client, clock, ctx) = setup();
        let deadline = clock.deadline_after(Duration::from_secs(60));

        let result = scale(&ctx, "web", NAMESPACE, -1, false, deadline).await;

        assert!(matches!(result, Err(StepError::InvalidArgument(_))));
    }
}
