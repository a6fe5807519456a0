//! Step parameters, wait defaults and cluster connection settings
//!
//! Every step parameter may be a literal or a reference to an environment
//! variable (`$NAME` or `${NAME}`). Resolution order is always: explicit
//! literal, then resolved reference, then the global default.

use std::collections::HashMap;
use std::fmt;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Where the platform mounts the pod's service account credentials
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

pub const ENV_API_URL: &str = "SHIFTSTEP_API_URL";
pub const ENV_NAMESPACE: &str = "SHIFTSTEP_NAMESPACE";
pub const ENV_AUTH_TOKEN: &str = "SHIFTSTEP_AUTH_TOKEN";
pub const ENV_BUILD_URL: &str = "BUILD_URL";

const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid wait for {operation}: {value:?} is not a number of milliseconds")]
    InvalidWait {
        operation: WaitKind,
        value: String,
    },

    #[error("invalid API URL {url}: {reason}")]
    InvalidApiUrl { url: String, reason: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificate found in CA PEM")]
    InvalidCertificate,

    #[error("failed to infer cluster configuration: {0}")]
    Infer(#[from] kube::config::InferConfigError),

    #[error("failed to create cluster client: {0}")]
    Client(#[from] kube::Error),
}

/// Operations with a bounded wait
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitKind {
    BuildVerify,
    Deploy,
    DeployVerify,
    Scale,
    ServiceVerify,
}

impl WaitKind {
    pub fn default_wait(self) -> Duration {
        let ms = match self {
            WaitKind::BuildVerify => 60_000,
            WaitKind::Deploy => 60_000,
            WaitKind::DeployVerify => 180_000,
            WaitKind::Scale => 180_000,
            WaitKind::ServiceVerify => 60_000,
        };
        Duration::from_millis(ms)
    }

    /// Environment variable overriding the global default
    pub fn env_key(self) -> &'static str {
        match self {
            WaitKind::BuildVerify => "SHIFTSTEP_BUILD_VERIFY_WAIT_MS",
            WaitKind::Deploy => "SHIFTSTEP_DEPLOY_WAIT_MS",
            WaitKind::DeployVerify => "SHIFTSTEP_DEPLOY_VERIFY_WAIT_MS",
            WaitKind::Scale => "SHIFTSTEP_SCALE_WAIT_MS",
            WaitKind::ServiceVerify => "SHIFTSTEP_SERVICE_VERIFY_WAIT_MS",
        }
    }
}

impl fmt::Display for WaitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WaitKind::BuildVerify => "build verify",
            WaitKind::Deploy => "deploy",
            WaitKind::DeployVerify => "deploy verify",
            WaitKind::Scale => "scale",
            WaitKind::ServiceVerify => "service verify",
        };
        f.write_str(name)
    }
}

/// Key/value map step parameters are resolved against
///
/// The process environment in production, a plain map in tests.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    vars: HashMap<String, String>,
}

impl Overrides {
    pub fn from_env() -> Self {
        Overrides {
            vars: std::env::vars().collect(),
        }
    }

    pub fn from_map(vars: HashMap<String, String>) -> Self {
        Overrides { vars }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Resolve a step parameter
    ///
    /// Blank parameters and references to unset variables resolve to `None`.
    pub fn resolve(&self, param: Option<&str>) -> Option<String> {
        let param = param.map(str::trim).filter(|p| !p.is_empty())?;
        match reference_name(param) {
            Some(name) => {
                let value = self.get(name).map(|v| v.trim().to_string());
                debug!(reference = %param, resolved = value.is_some(), "Resolved parameter reference");
                value
            }
            None => Some(param.to_string()),
        }
    }

    /// Wait for `kind`: the parameter if given, else the global default
    pub fn wait(&self, kind: WaitKind, param: Option<&str>) -> Result<Duration, ConfigError> {
        let raw = match self.resolve(param) {
            Some(value) => value,
            None => match self.get(kind.env_key()) {
                Some(value) => value.trim().to_string(),
                None => return Ok(kind.default_wait()),
            },
        };
        raw.parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::InvalidWait {
                operation: kind,
                value: raw,
            })
    }
}

/// Variable name of a `$NAME` or `${NAME}` reference
fn reference_name(param: &str) -> Option<&str> {
    let rest = param.strip_prefix('$')?;
    let name = match rest.strip_prefix('{') {
        Some(braced) => braced.strip_suffix('}')?,
        None => rest,
    };
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then_some(name)
}

/// Cluster connection parameters as given on the command line
#[derive(Clone, Debug, Default)]
pub struct ClusterParams {
    pub api_url: Option<String>,
    pub namespace: Option<String>,
    pub token: Option<String>,
    pub ca_cert: Option<String>,
    pub skip_tls_verify: bool,
}

/// Fully resolved connection settings
#[derive(Clone, Debug)]
pub struct ClusterSettings {
    pub api_url: Option<String>,
    pub namespace: String,
    pub token: Option<String>,
    pub ca_pem: Option<String>,
    pub skip_tls_verify: bool,
}

impl ClusterSettings {
    /// Resolve `params` against `overrides` and the service account mounted at `sa_dir`
    pub fn resolve(
        params: &ClusterParams,
        overrides: &Overrides,
        sa_dir: &Path,
    ) -> Result<Self, ConfigError> {
        let api_url = overrides
            .resolve(params.api_url.as_deref())
            .or_else(|| overrides.get(ENV_API_URL).map(str::to_string));

        let namespace = match overrides
            .resolve(params.namespace.as_deref())
            .or_else(|| overrides.get(ENV_NAMESPACE).map(str::to_string))
        {
            Some(ns) => ns,
            None => read_optional(&sa_dir.join("namespace"))?
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
        };

        let token = match overrides.resolve(params.token.as_deref()) {
            Some(token) => Some(token),
            None => match overrides.get(ENV_AUTH_TOKEN) {
                Some(value) => Some(token_from_env(value)?),
                None => read_optional(&sa_dir.join("token"))?,
            },
        };

        let ca_pem = match overrides.resolve(params.ca_cert.as_deref()) {
            Some(pem) => Some(pem),
            None => read_optional(&sa_dir.join("ca.crt"))?,
        };

        Ok(ClusterSettings {
            api_url,
            namespace,
            token,
            ca_pem,
            skip_tls_verify: params.skip_tls_verify,
        })
    }

    /// Client configuration for these settings
    ///
    /// Without an API URL the configuration is inferred (in-cluster or
    /// kubeconfig) and only the resolved overrides are applied on top.
    pub async fn kube_config(&self) -> Result<kube::Config, ConfigError> {
        let mut config = match self.api_url.as_deref() {
            Some(url) => kube::Config::new(parse_api_url(url)?),
            None => kube::Config::infer().await?,
        };

        config.default_namespace = self.namespace.clone();
        if let Some(token) = &self.token {
            config.auth_info.token = Some(token.clone().into());
        }
        if let Some(pem) = &self.ca_pem {
            config.root_cert = Some(parse_ca_bundle(pem)?);
        }
        if self.skip_tls_verify {
            config.accept_invalid_certs = true;
        }
        Ok(config)
    }

    pub async fn client(&self) -> Result<kube::Client, ConfigError> {
        let _ = rustls::crypto::ring::default_provider().install_default();

        let config = self.kube_config().await?;
        info!(
            cluster = %config.cluster_url,
            namespace = %self.namespace,
            skip_tls_verify = self.skip_tls_verify,
            "Connecting to cluster"
        );
        Ok(kube::Client::try_from(config)?)
    }
}

fn parse_api_url<U>(url: &str) -> Result<U, ConfigError>
where
    U: FromStr,
    U::Err: fmt::Display,
{
    url.parse::<U>().map_err(|e| ConfigError::InvalidApiUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

/// `SHIFTSTEP_AUTH_TOKEN` names a token file when such a file exists, else it is the token
fn token_from_env(value: &str) -> Result<String, ConfigError> {
    let path = Path::new(value.trim());
    if path.is_file() {
        read_optional(path).map(|token| token.unwrap_or_default())
    } else {
        Ok(value.trim().to_string())
    }
}

/// Trimmed contents of `path`, `None` if it does not exist or is blank
fn read_optional(path: &Path) -> Result<Option<String>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let contents = contents.trim();
            Ok((!contents.is_empty()).then(|| contents.to_string()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// DER certificates from a PEM bundle
pub fn parse_ca_bundle(pem: &str) -> Result<Vec<Vec<u8>>, ConfigError> {
    let certs: Vec<Vec<u8>> = rustls_pemfile::certs(&mut BufReader::new(pem.as_bytes()))
        .filter_map(|r| r.ok())
        .map(|der| der.as_ref().to_vec())
        .collect();

    if certs.is_empty() {
        return Err(ConfigError::InvalidCertificate);
    }
    Ok(certs)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "config_test.rs"]
mod tests;
