//! Service liveness by dialing its cluster IP

use super::poll::{poll_until, Attempt, PollOutcome, FAST_POLL_INTERVAL};
use super::step::{Context, StepError};
use k8s_openapi::api::core::v1::Service;
use std::cell::RefCell;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Upper bound on a single connection attempt
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// `clusterIP:port` of the service's first port
fn dial_target(service: &Service, name: &str) -> Result<SocketAddr, StepError> {
    let spec = service
        .spec
        .as_ref()
        .ok_or_else(|| StepError::InvalidArgument(format!("service {name} has no spec")))?;
    let ip = spec
        .cluster_ip
        .as_deref()
        .filter(|ip| !ip.is_empty() && *ip != "None")
        .ok_or_else(|| StepError::InvalidArgument(format!("service {name} has no cluster IP")))?;
    let port = spec
        .ports
        .as_ref()
        .and_then(|ports| ports.first())
        .map(|p| p.port)
        .ok_or_else(|| StepError::InvalidArgument(format!("service {name} exposes no ports")))?;

    format!("{ip}:{port}")
        .parse()
        .map_err(|e| StepError::InvalidArgument(format!("service {name} address: {e}")))
}

/// Wait until service `name` accepts TCP connections
pub async fn verify_service(
    ctx: &Context,
    name: &str,
    namespace: &str,
    deadline: Instant,
) -> Result<(), StepError> {
    let service = ctx
        .client
        .get_service(name, namespace)
        .await?
        .ok_or_else(|| StepError::not_found("Service", name, namespace))?;
    let addr = dial_target(&service, name)?;
    info!(service = %name, address = %addr, "Dialing service");

    let last_error = RefCell::new(String::from("no connection attempted"));
    let last = &last_error;

    let outcome: PollOutcome<(), ()> = poll_until(
        ctx.clock.as_ref(),
        deadline,
        FAST_POLL_INTERVAL,
        move || async move {
            match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
                Ok(Ok(_stream)) => Attempt::Ready(()),
                Ok(Err(e)) => {
                    debug!(error = %e, address = %addr, "Connection failed, retrying");
                    *last.borrow_mut() = e.to_string();
                    Attempt::Pending
                }
                Err(_) => {
                    *last.borrow_mut() = format!("connect timed out after {CONNECT_TIMEOUT:?}");
                    Attempt::Pending
                }
            }
        },
    )
    .await;

    match outcome {
        PollOutcome::Ready(()) => {
            info!(service = %name, address = %addr, "Service is accepting connections");
            Ok(())
        }
        PollOutcome::Failed(()) | PollOutcome::TimedOut => Err(StepError::TimedOut {
            what: format!("service {name} at {addr}"),
            last_state: last_error.into_inner(),
        }),
    }
}
