mod cli;

use anyhow::Context as _;
use clap::Parser;
use cli::{Cli, Commands};
use shiftstep::cluster::KubeClusterClient;
use shiftstep::config::{ClusterSettings, Overrides, WaitKind, ENV_BUILD_URL, SERVICE_ACCOUNT_DIR};
use shiftstep::controller::{
    cancel_builds, cancel_deployment, deploy, parse_replicas, scale, verify_build,
    verify_deployment, verify_service, Clock, Context, ImageStreamPoller,
    ImageStreamRevisionState, PollingResult, SystemClock,
};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let step = cli.command.step_name();
    let result = run(cli).await;
    if let Err(e) = &result {
        error!(error = %format!("{e:#}"), step = %step, "Step failed");
    }
    println!("{}", report_line(step, &result));
    exit_code(&result)
}

/// Final line a pipeline log shows for the step
fn report_line(step: &str, result: &anyhow::Result<()>) -> String {
    match result {
        Ok(()) => format!("Exiting \"{step}\" successfully."),
        Err(e) => format!("Exiting \"{step}\" unsuccessfully; {e:#}"),
    }
}

/// Any failure aborts the calling pipeline stage
fn exit_code(result: &anyhow::Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}

/// Resolve a required name parameter, which may be a `$VAR` reference
fn required(overrides: &Overrides, what: &str, value: &str) -> anyhow::Result<String> {
    overrides
        .resolve(Some(value))
        .with_context(|| format!("{what} is required (got {value:?})"))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let overrides = Overrides::from_env();
    let settings = ClusterSettings::resolve(
        &cli.cluster.params(),
        &overrides,
        Path::new(SERVICE_ACCOUNT_DIR),
    )?;
    let client = settings.client().await?;

    let build_url = overrides
        .resolve(cli.build_url.as_deref())
        .or_else(|| overrides.get(ENV_BUILD_URL).map(str::to_string));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ctx = Context::new(Arc::new(KubeClusterClient::new(client)), clock.clone())
        .with_build_url(build_url);
    let namespace = settings.namespace.as_str();

    match cli.command {
        Commands::VerifyBuild {
            build_config,
            build_id,
            check_deployments,
            wait_ms,
        } => {
            let build_config = required(&overrides, "build config", &build_config)?;
            let build_id = required(&overrides, "build ID", &build_id)?;
            let wait = overrides.wait(WaitKind::BuildVerify, wait_ms.as_deref())?;
            let deadline = clock.deadline_after(wait);
            verify_build(&ctx, &build_config, &build_id, namespace, deadline, check_deployments)
                .await?;
        }
        Commands::Deploy {
            deployment_config,
            wait_ms,
        } => {
            let name = required(&overrides, "deployment config", &deployment_config)?;
            let wait = overrides.wait(WaitKind::Deploy, wait_ms.as_deref())?;
            deploy(&ctx, &name, namespace, clock.deadline_after(wait)).await?;
        }
        Commands::VerifyDeployment {
            deployment_config,
            replicas,
            verify_replica_count,
            wait_ms,
        } => {
            let name = required(&overrides, "deployment config", &deployment_config)?;
            let replicas = match overrides.resolve(replicas.as_deref()) {
                Some(value) => parse_replicas(&value)?,
                None => None,
            };
            let wait = overrides.wait(WaitKind::DeployVerify, wait_ms.as_deref())?;
            verify_deployment(
                &ctx,
                &name,
                namespace,
                replicas,
                verify_replica_count,
                clock.deadline_after(wait),
            )
            .await?;
        }
        Commands::Scale {
            deployment_config,
            replicas,
            verify_replica_count,
            wait_ms,
        } => {
            let name = required(&overrides, "deployment config", &deployment_config)?;
            let replicas = parse_replicas(&required(&overrides, "replica count", &replicas)?)?
                .context("replica count is required")?;
            let wait = overrides.wait(WaitKind::Scale, wait_ms.as_deref())?;
            scale(
                &ctx,
                &name,
                namespace,
                replicas,
                verify_replica_count,
                clock.deadline_after(wait),
            )
            .await?;
        }
        Commands::CancelBuilds => {
            let cancelled = cancel_builds(&ctx, namespace).await?;
            info!(cancelled = cancelled, namespace = %namespace, "Cancelled builds");
        }
        Commands::CancelDeployment { deployment_config } => {
            let name = required(&overrides, "deployment config", &deployment_config)?;
            cancel_deployment(&ctx, &name, namespace).await?;
        }
        Commands::VerifyService { service, wait_ms } => {
            let name = required(&overrides, "service", &service)?;
            let wait = overrides.wait(WaitKind::ServiceVerify, wait_ms.as_deref())?;
            verify_service(&ctx, &name, namespace, clock.deadline_after(wait)).await?;
        }
        Commands::ImageRevision {
            stream,
            tag,
            baseline,
        } => {
            let stream = required(&overrides, "image stream", &stream)?;
            let tag = required(&overrides, "tag", &tag)?;
            let baseline = overrides
                .resolve(baseline.as_deref())
                .map(|id| ImageStreamRevisionState::from_image_id(Some(&id)))
                .transpose()?;

            let poller = ImageStreamPoller::new(stream, tag, namespace);
            let (result, revision) = poller
                .compare_remote_revision(&ctx, baseline.as_ref())
                .await?;
            let changed = match result {
                PollingResult::Significant => "changed",
                PollingResult::NoChanges => "unchanged",
            };
            match revision {
                Some(revision) => println!("{revision} {changed}"),
                None => println!("none {changed}"),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "main_test.rs"]
mod tests;
