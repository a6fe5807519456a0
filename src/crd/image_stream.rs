use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ImageStream tracks the image history of each of its tags
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "image.openshift.io",
    version = "v1",
    kind = "ImageStream",
    namespaced,
    status = "ImageStreamStatus"
)]
pub struct ImageStreamSpec {
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
pub struct ImageStreamStatus {
    #[serde(rename = "dockerImageRepository", skip_serializing_if = "Option::is_none")]
    pub docker_image_repository: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<NamedTagEventList>,
}

/// History of one tag, newest event first
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
pub struct NamedTagEventList {
    pub tag: String,

    #[serde(default)]
    pub items: Vec<TagEvent>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
pub struct TagEvent {
    /// RFC3339 creation time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,

    #[serde(rename = "dockerImageReference", skip_serializing_if = "Option::is_none")]
    pub docker_image_reference: Option<String>,

    /// Image ID, e.g. `sha256:4c1a...`
    pub image: String,
}

impl TagEvent {
    /// When the image was tagged, if the cluster recorded a valid RFC3339 time
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc))
    }
}

impl ImageStream {
    /// Newest event for `tag`
    ///
    /// The cluster keeps tag history newest first, so the head item wins.
    pub fn latest_event(&self, tag: &str) -> Option<&TagEvent> {
        self.status
            .as_ref()?
            .tags
            .iter()
            .find(|t| t.tag == tag)?
            .items
            .first()
    }

    /// Image ID currently behind `tag`
    pub fn image_id(&self, tag: &str) -> Option<&str> {
        self.latest_event(tag)
            .map(|item| item.image.as_str())
            .filter(|id| !id.trim().is_empty())
    }
}
