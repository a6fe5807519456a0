use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single run of a BuildConfig
///
/// Owned by the cluster. This crate only reads it, except for requesting
/// cancellation through `status.cancelled`.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "build.openshift.io",
    version = "v1",
    kind = "Build",
    namespaced,
    status = "BuildStatus"
)]
pub struct BuildSpec {
    /// Where the build pushes its result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<BuildOutput>,

    /// Fields this crate does not model, kept so a replace does not drop them
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
pub struct BuildStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Set to request cancellation of a running build
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// BuildConfig describes how builds are produced and where images go
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "build.openshift.io",
    version = "v1",
    kind = "BuildConfig",
    namespaced
)]
pub struct BuildConfigSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<BuildOutput>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
pub struct BuildOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<ImageReference>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Reference to an image, usually an `ImageStreamTag` such as `app:latest`
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct ImageReference {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,

    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ImageReference {
    /// Reference to an ImageStreamTag in the same namespace
    pub fn image_stream_tag(name: impl Into<String>) -> Self {
        ImageReference {
            kind: "ImageStreamTag".to_string(),
            name: name.into(),
            namespace: None,
        }
    }
}

/// Lifecycle phase of a Build
///
/// Parsed case-insensitively; anything unrecognized is kept verbatim and
/// treated as still in progress.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildPhase {
    New,
    Pending,
    Running,
    Complete,
    Failed,
    Error,
    Cancelled,
    Unknown(String),
}

impl BuildPhase {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "new" => BuildPhase::New,
            "pending" => BuildPhase::Pending,
            "running" => BuildPhase::Running,
            "complete" => BuildPhase::Complete,
            "failed" => BuildPhase::Failed,
            "error" => BuildPhase::Error,
            "cancelled" => BuildPhase::Cancelled,
            _ => BuildPhase::Unknown(value.to_string()),
        }
    }

    /// Complete, Failed, Error and Cancelled are final
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BuildPhase::Complete | BuildPhase::Failed | BuildPhase::Error | BuildPhase::Cancelled
        )
    }
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildPhase::New => "New",
            BuildPhase::Pending => "Pending",
            BuildPhase::Running => "Running",
            BuildPhase::Complete => "Complete",
            BuildPhase::Failed => "Failed",
            BuildPhase::Error => "Error",
            BuildPhase::Cancelled => "Cancelled",
            BuildPhase::Unknown(other) => other.as_str(),
        };
        f.write_str(name)
    }
}

impl Build {
    /// Current phase, `None` until the cluster has reported one
    pub fn phase(&self) -> Option<BuildPhase> {
        self.status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .map(BuildPhase::parse)
    }

    pub fn is_terminal(&self) -> bool {
        self.phase().is_some_and(|p| p.is_terminal())
    }

    /// Ask the cluster to cancel this build on the next replace
    pub fn request_cancel(&mut self) {
        self.status.get_or_insert_with(BuildStatus::default).cancelled = Some(true);
    }
}

impl BuildConfig {
    /// Image tag this config pushes to (e.g. `app:latest`), if it produces an image
    pub fn output_image_tag(&self) -> Option<&str> {
        self.spec
            .output
            .as_ref()
            .and_then(|o| o.to.as_ref())
            .map(|to| to.name.as_str())
            .filter(|name| !name.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_phase_terminal_classification() {
        let terminal = ["Complete", "Failed", "Error", "Cancelled"];
        let active = ["New", "Pending", "Running"];

        for phase in terminal {
            assert!(BuildPhase::parse(phase).is_terminal(), "{phase} should be terminal");
        }
        for phase in active {
            assert!(!BuildPhase::parse(phase).is_terminal(), "{phase} should not be terminal");
        }
    }

    #[test]
    fn test_build_phase_parse_is_case_insensitive() {
        assert_eq!(BuildPhase::parse("complete"), BuildPhase::Complete);
        assert_eq!(BuildPhase::parse("CANCELLED"), BuildPhase::Cancelled);
        assert_eq!(BuildPhase::parse(" Running "), BuildPhase::Running);
    }

    #[test]
    fn test_unknown_build_phase_is_not_terminal() {
        let phase = BuildPhase::parse("Queued");
        assert_eq!(phase, BuildPhase::Unknown("Queued".to_string()));
        assert!(!phase.is_terminal());
        assert_eq!(phase.to_string(), "Queued");
    }

    #[test]
    fn test_request_cancel_sets_status_flag() {
        let mut build = Build::new("app-1", BuildSpec::default());
        assert!(build.status.is_none());

        build.request_cancel();

        assert_eq!(build.status.and_then(|s| s.cancelled), Some(true));
    }

    #[test]
    fn test_output_image_tag() {
        let mut bc = BuildConfig::new("app", BuildConfigSpec::default());
        assert_eq!(bc.output_image_tag(), None);

        bc.spec.output = Some(BuildOutput {
            to: Some(ImageReference::image_stream_tag("app:latest")),
            ..Default::default()
        });
        assert_eq!(bc.output_image_tag(), Some("app:latest"));
    }

    #[test]
    fn test_build_round_trips_unmodelled_fields() {
        let json = serde_json::json!({
            "apiVersion": "build.openshift.io/v1",
            "kind": "Build",
            "metadata": {"name": "app-3", "namespace": "ci"},
            "spec": {
                "strategy": {"type": "Docker"},
                "output": {"to": {"kind": "ImageStreamTag", "name": "app:latest"}}
            },
            "status": {"phase": "Running", "startTimestamp": "2024-01-01T00:00:00Z"}
        });

        let build: Build = serde_json::from_value(json).unwrap();
        assert_eq!(build.phase(), Some(BuildPhase::Running));

        let back = serde_json::to_value(&build).unwrap();
        assert_eq!(back["spec"]["strategy"]["type"], "Docker");
        assert_eq!(back["status"]["startTimestamp"], "2024-01-01T00:00:00Z");
    }
}
