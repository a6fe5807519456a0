//! Typed OpenShift resources read and mutated by the pipeline steps

pub mod build;
pub mod deployment_config;
pub mod image_stream;
pub mod replication_controller;

pub use build::{Build, BuildConfig, BuildPhase, ImageReference};
pub use deployment_config::DeploymentConfig;
pub use image_stream::ImageStream;
pub use replication_controller::{DeploymentGeneration, DeploymentPhase};
