use clap::{Args, Parser, Subcommand};
use shiftstep::config::ClusterParams;

#[derive(Parser)]
#[command(name = "shiftstep")]
#[command(about = "Pipeline steps that trigger and verify OpenShift builds and deployments")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    /// URL of the pipeline run, annotated onto objects the step changes
    #[arg(long, global = true)]
    pub build_url: Option<String>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Cluster connection; each value may be a literal or a `$VAR` reference
#[derive(Args)]
pub struct ClusterArgs {
    /// API server URL (default: in-cluster or kubeconfig)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    #[arg(short, long, global = true)]
    pub namespace: Option<String>,

    /// Bearer token
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// PEM-encoded CA certificate to trust
    #[arg(long, global = true)]
    pub ca_cert: Option<String>,

    /// Accept any server certificate and hostname
    #[arg(long, global = true)]
    pub skip_tls_verify: bool,
}

impl ClusterArgs {
    pub fn params(&self) -> ClusterParams {
        ClusterParams {
            api_url: self.api_url.clone(),
            namespace: self.namespace.clone(),
            token: self.token.clone(),
            ca_cert: self.ca_cert.clone(),
            skip_tls_verify: self.skip_tls_verify,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Wait for a build to complete, optionally checking its image was deployed
    VerifyBuild {
        build_config: String,
        build_id: String,

        /// Also require every deployment triggered by the build's image to pick it up
        #[arg(long)]
        check_deployments: bool,

        #[arg(long)]
        wait_ms: Option<String>,
    },

    /// Start a new rollout of a deployment config and wait for it
    Deploy {
        deployment_config: String,

        #[arg(long)]
        wait_ms: Option<String>,
    },

    /// Wait for the latest rollout of a deployment config to settle
    VerifyDeployment {
        deployment_config: String,

        /// Expected replicas (default: the deployment config's own count)
        #[arg(long)]
        replicas: Option<String>,

        #[arg(long)]
        verify_replica_count: bool,

        #[arg(long)]
        wait_ms: Option<String>,
    },

    /// Scale the latest rollout of a deployment config
    Scale {
        deployment_config: String,
        replicas: String,

        #[arg(long)]
        verify_replica_count: bool,

        #[arg(long)]
        wait_ms: Option<String>,
    },

    /// Cancel every unfinished build in the namespace
    CancelBuilds,

    /// Cancel the in-flight rollout of a deployment config
    CancelDeployment { deployment_config: String },

    /// Wait for a service to accept TCP connections
    VerifyService {
        service: String,

        #[arg(long)]
        wait_ms: Option<String>,
    },

    /// Print the image behind an image stream tag, and whether it changed
    ImageRevision {
        stream: String,

        #[arg(default_value = "latest")]
        tag: String,

        /// Previously seen image ID
        #[arg(long)]
        baseline: Option<String>,
    },
}

impl Commands {
    /// Name used in the final "Exiting ..." report line
    pub fn step_name(&self) -> &'static str {
        match self {
            Commands::VerifyBuild { .. } => "Verify OpenShift Build",
            Commands::Deploy { .. } => "Trigger OpenShift Deployment",
            Commands::VerifyDeployment { .. } => "Verify OpenShift Deployment",
            Commands::Scale { .. } => "Scale OpenShift Deployment",
            Commands::CancelBuilds => "Cancel OpenShift Builds",
            Commands::CancelDeployment { .. } => "Cancel OpenShift Deployment",
            Commands::VerifyService { .. } => "Verify OpenShift Service",
            Commands::ImageRevision { .. } => "OpenShift ImageStream Revision",
        }
    }
}
