//! Optimistic-concurrency-safe single-field updates
//!
//! The canonical update idiom for this crate: re-read the object to pick up
//! the latest `resourceVersion`, change one thing, replace it, and try again a
//! few seconds later if the cluster raced us.

use super::clock::Clock;
use super::step::{Context, StepError};
use crate::cluster::ClusterError;
use kube::{Resource, ResourceExt};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Annotation linking an object to the pipeline run that touched it
pub const BUILD_URL_ANNOTATION: &str = "openshift.io/jenkins-build-uri";

pub const REFETCH_ATTEMPTS: u32 = 3;
pub const REFETCH_DELAY: Duration = Duration::from_secs(3);

/// Run a fetch-modify-replace `attempt` up to `REFETCH_ATTEMPTS` times
///
/// Retries only errors where a fresh read can help (conflicts, transport and
/// server errors), sleeping `REFETCH_DELAY` in between. Anything else is
/// returned on first sight.
pub async fn retry_with_refetch<T, F, Fut>(
    clock: &dyn Clock,
    what: &str,
    mut attempt: F,
) -> Result<T, ClusterError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClusterError>>,
{
    let mut tries = 0;
    loop {
        tries += 1;
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && tries < REFETCH_ATTEMPTS => {
                warn!(error = %e, attempt = tries, target = %what, "Update failed, re-reading and retrying");
                clock.sleep(REFETCH_DELAY).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Object that can carry the build URL annotation
#[derive(Clone, Copy, Debug)]
pub enum AnnotationTarget<'a> {
    Build(&'a str),
    DeploymentConfig(&'a str),
    ReplicationController(&'a str),
}

impl fmt::Display for AnnotationTarget<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnnotationTarget::Build(name) => write!(f, "Build {name}"),
            AnnotationTarget::DeploymentConfig(name) => write!(f, "DeploymentConfig {name}"),
            AnnotationTarget::ReplicationController(name) => {
                write!(f, "ReplicationController {name}")
            }
        }
    }
}

fn stamp<K: Resource>(obj: &mut K, url: &str) {
    obj.annotations_mut()
        .insert(BUILD_URL_ANNOTATION.to_string(), url.to_string());
}

fn gone(kind: &str, name: &str) -> ClusterError {
    ClusterError::NotFound {
        kind: kind.to_string(),
        name: name.to_string(),
    }
}

/// Annotate `target` with the pipeline run URL
pub async fn annotate_with_build_url(
    ctx: &Context,
    target: AnnotationTarget<'_>,
    namespace: &str,
    url: &str,
) -> Result<(), StepError> {
    let client = ctx.client.as_ref();
    let what = target.to_string();

    retry_with_refetch(ctx.clock.as_ref(), &what, move || async move {
        match target {
            AnnotationTarget::Build(name) => {
                let mut build = client
                    .get_build(name, namespace)
                    .await?
                    .ok_or_else(|| gone("Build", name))?;
                stamp(&mut build, url);
                client.replace_build(&build).await.map(|_| ())
            }
            AnnotationTarget::DeploymentConfig(name) => {
                let mut dc = client
                    .get_deployment_config(name, namespace)
                    .await?
                    .ok_or_else(|| gone("DeploymentConfig", name))?;
                stamp(&mut dc, url);
                client.replace_deployment_config(&dc).await.map(|_| ())
            }
            AnnotationTarget::ReplicationController(name) => {
                let mut rc = client
                    .get_replication_controller(name, namespace)
                    .await?
                    .ok_or_else(|| gone("ReplicationController", name))?;
                stamp(&mut rc, url);
                client.replace_replication_controller(&rc).await.map(|_| ())
            }
        }
    })
    .await?;

    info!(target = %what, url = %url, "Annotated with build URL");
    Ok(())
}

/// Annotate `target` when the context knows its pipeline run URL
///
/// Failure is logged and swallowed: the annotation is bookkeeping, not part
/// of the step's outcome.
pub async fn annotate_if_configured(ctx: &Context, target: AnnotationTarget<'_>, namespace: &str) {
    let Some(url) = ctx.build_url.as_deref() else {
        return;
    };
    if let Err(e) = annotate_with_build_url(ctx, target, namespace, url).await {
        warn!(error = %e, target = %target, "Failed to annotate with build URL");
    }
}
