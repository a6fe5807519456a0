pub mod annotate;
pub mod build;
pub mod causality;
pub mod clock;
pub mod deploy;
pub mod image_stream;
pub mod poll;
pub mod scale;
pub mod service;
pub mod state;
pub mod step;

#[cfg(test)]
pub(crate) mod fixtures;

pub use annotate::{annotate_with_build_url, AnnotationTarget};
pub use build::{cancel_builds, verify_build};
pub use causality::{did_all_images_change_if_needed, did_image_change_from_previous_version, does_trigger};
pub use clock::{Clock, SystemClock};
pub use deploy::{cancel_deployment, deploy, verify_deployment};
pub use image_stream::{ImageStreamPoller, ImageStreamRevisionState, PollingResult};
pub use scale::{parse_replicas, scale};
pub use service::verify_service;
pub use step::{Context, StepError};
