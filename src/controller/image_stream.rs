//! Image stream tags as a change-detection source
//!
//! The image ID behind a stream tag is used as an opaque revision token: a
//! different ID means something new was pushed.

use super::step::{Context, StepError};
use std::fmt;
use tracing::{debug, info};

/// Revision token wrapping the image ID behind a stream tag
///
/// Equality and ordering are those of the trimmed ID string.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImageStreamRevisionState(String);

impl ImageStreamRevisionState {
    /// Wrap an image ID. A missing or blank ID is a caller bug and is rejected.
    pub fn from_image_id(image_id: Option<&str>) -> Result<Self, StepError> {
        match image_id.map(str::trim) {
            Some(id) if !id.is_empty() => Ok(ImageStreamRevisionState(id.to_string())),
            _ => Err(StepError::InvalidArgument(
                "image stream revision requires an image ID".to_string(),
            )),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageStreamRevisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollingResult {
    NoChanges,
    Significant,
}

/// Watches one `stream:tag` for newly pushed images
#[derive(Clone, Debug)]
pub struct ImageStreamPoller {
    pub stream: String,
    pub tag: String,
    pub namespace: String,
}

impl ImageStreamPoller {
    pub fn new(
        stream: impl Into<String>,
        tag: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        ImageStreamPoller {
            stream: stream.into(),
            tag: tag.into(),
            namespace: namespace.into(),
        }
    }

    /// Revision currently behind the tag, `None` if nothing was pushed to it yet
    pub async fn current_revision(
        &self,
        ctx: &Context,
    ) -> Result<Option<ImageStreamRevisionState>, StepError> {
        let stream = ctx
            .client
            .get_image_stream(&self.stream, &self.namespace)
            .await?
            .ok_or_else(|| StepError::not_found("ImageStream", &self.stream, &self.namespace))?;

        match stream.image_id(&self.tag) {
            Some(id) => {
                let tagged_at = stream.latest_event(&self.tag).and_then(|e| e.created_at());
                debug!(stream = %self.stream, tag = %self.tag, image = %id, tagged_at = ?tagged_at, "Read tag revision");
                Ok(Some(ImageStreamRevisionState::from_image_id(Some(id))?))
            }
            None => {
                debug!(stream = %self.stream, tag = %self.tag, "Tag has no image yet");
                Ok(None)
            }
        }
    }

    /// Compare the cluster's current revision against `baseline`
    ///
    /// Returns the verdict and the revision to use as the next baseline. With
    /// no baseline any image counts as a change; with no image there is
    /// nothing to report and the baseline is kept.
    pub async fn compare_remote_revision(
        &self,
        ctx: &Context,
        baseline: Option<&ImageStreamRevisionState>,
    ) -> Result<(PollingResult, Option<ImageStreamRevisionState>), StepError> {
        let Some(current) = self.current_revision(ctx).await? else {
            return Ok((PollingResult::NoChanges, baseline.cloned()));
        };

        let result = match baseline {
            Some(previous) if *previous == current => PollingResult::NoChanges,
            _ => PollingResult::Significant,
        };
        if result == PollingResult::Significant {
            info!(
                stream = %self.stream,
                tag = %self.tag,
                previous = ?baseline.map(ImageStreamRevisionState::as_str),
                current = %current,
                "Image stream tag changed"
            );
        }
        Ok((result, Some(current)))
    }
}
