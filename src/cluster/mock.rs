//! In-memory `ClusterClient` for tests
//!
//! Every object is stored as a script of states. Each `get` consumes the head
//! of the script until only the last state remains, which is then returned
//! forever. A `replace` overwrites an object only once its script is down to
//! one state, so scripted transitions keep playing out regardless of what the
//! code under test writes. Namespaces are ignored, though DeploymentConfig
//! lookups record the namespace they asked for.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{ClusterClient, ClusterError};
use crate::crd::{Build, BuildConfig, DeploymentConfig, ImageStream};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ReplicationController, Service};
use kube::{Resource, ResourceExt};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

struct Scripts<T> {
    objects: HashMap<String, VecDeque<T>>,
    order: Vec<String>,
}

impl<T> Default for Scripts<T> {
    fn default() -> Self {
        Scripts {
            objects: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl<T: Clone + Resource> Scripts<T> {
    fn push(&mut self, obj: T) {
        let name = obj.name_any();
        if !self.objects.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.objects.entry(name).or_default().push_back(obj);
    }

    fn next(&mut self, name: &str) -> Option<T> {
        let script = self.objects.get_mut(name)?;
        if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        }
    }

    fn all(&mut self) -> Vec<T> {
        let names = self.order.clone();
        names.iter().filter_map(|n| self.next(n)).collect()
    }

    fn overwrite(&mut self, obj: &T) -> bool {
        match self.objects.get_mut(&obj.name_any()) {
            Some(script) => {
                if script.len() <= 1 {
                    script.clear();
                    script.push_back(obj.clone());
                }
                true
            }
            None => false,
        }
    }
}

#[derive(Default)]
struct MockState {
    builds: Scripts<Build>,
    build_configs: Scripts<BuildConfig>,
    deployment_configs: Scripts<DeploymentConfig>,
    replication_controllers: Scripts<ReplicationController>,
    image_streams: Scripts<ImageStream>,
    services: Scripts<Service>,

    replaced_builds: Vec<Build>,
    replaced_deployment_configs: Vec<DeploymentConfig>,
    replaced_replication_controllers: Vec<ReplicationController>,
    deployment_config_lookups: Vec<String>,

    /// Remaining conflicts to raise per object name
    conflicts: HashMap<String, u32>,
    /// Object names whose replace always fails with a server error
    rejected: Vec<String>,
    fail_listing: bool,
}

#[derive(Default)]
pub struct MockClusterClient {
    state: Mutex<MockState>,
}

impl MockClusterClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_build(&self, build: Build) {
        self.state.lock().unwrap().builds.push(build);
    }

    pub fn add_build_config(&self, bc: BuildConfig) {
        self.state.lock().unwrap().build_configs.push(bc);
    }

    pub fn add_deployment_config(&self, dc: DeploymentConfig) {
        self.state.lock().unwrap().deployment_configs.push(dc);
    }

    pub fn add_replication_controller(&self, rc: ReplicationController) {
        self.state.lock().unwrap().replication_controllers.push(rc);
    }

    pub fn add_image_stream(&self, stream: ImageStream) {
        self.state.lock().unwrap().image_streams.push(stream);
    }

    pub fn add_service(&self, service: Service) {
        self.state.lock().unwrap().services.push(service);
    }

    /// Make the next `times` replaces of object `name` fail with a conflict
    pub fn conflict_on_replace(&self, name: &str, times: u32) {
        self.state
            .lock()
            .unwrap()
            .conflicts
            .insert(name.to_string(), times);
    }

    /// Make every replace of object `name` fail with HTTP 500
    pub fn reject_replace(&self, name: &str) {
        self.state.lock().unwrap().rejected.push(name.to_string());
    }

    pub fn fail_listing(&self) {
        self.state.lock().unwrap().fail_listing = true;
    }

    pub fn replaced_builds(&self) -> Vec<Build> {
        self.state.lock().unwrap().replaced_builds.clone()
    }

    pub fn replaced_deployment_configs(&self) -> Vec<DeploymentConfig> {
        self.state.lock().unwrap().replaced_deployment_configs.clone()
    }

    pub fn replaced_replication_controllers(&self) -> Vec<ReplicationController> {
        self.state
            .lock()
            .unwrap()
            .replaced_replication_controllers
            .clone()
    }

    /// Namespace passed to each `get_deployment_config`, in call order
    pub fn deployment_config_lookups(&self) -> Vec<String> {
        self.state.lock().unwrap().deployment_config_lookups.clone()
    }
}

impl MockState {
    fn check_replace(&mut self, kind: &str, name: &str) -> Result<(), ClusterError> {
        if self.rejected.iter().any(|n| n == name) {
            return Err(ClusterError::Api {
                kind: kind.to_string(),
                name: name.to_string(),
                code: 500,
                message: "internal error".to_string(),
            });
        }
        if let Some(remaining) = self.conflicts.get_mut(name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ClusterError::Conflict {
                    kind: kind.to_string(),
                    name: name.to_string(),
                    message: "the object has been modified".to_string(),
                });
            }
        }
        Ok(())
    }

    fn check_listing(&self) -> Result<(), ClusterError> {
        if self.fail_listing {
            return Err(ClusterError::Transport("connection refused".to_string()));
        }
        Ok(())
    }
}

fn not_found(kind: &str, name: &str) -> ClusterError {
    ClusterError::NotFound {
        kind: kind.to_string(),
        name: name.to_string(),
    }
}

#[async_trait]
impl ClusterClient for MockClusterClient {
    async fn get_build(&self, name: &str, _namespace: &str) -> Result<Option<Build>, ClusterError> {
        Ok(self.state.lock().unwrap().builds.next(name))
    }

    async fn list_builds(&self, _namespace: &str) -> Result<Vec<Build>, ClusterError> {
        let mut state = self.state.lock().unwrap();
        state.check_listing()?;
        Ok(state.builds.all())
    }

    async fn replace_build(&self, build: &Build) -> Result<Build, ClusterError> {
        let mut state = self.state.lock().unwrap();
        let name = build.name_any();
        state.check_replace("Build", &name)?;
        if !state.builds.overwrite(build) {
            return Err(not_found("Build", &name));
        }
        state.replaced_builds.push(build.clone());
        Ok(build.clone())
    }

    async fn get_build_config(
        &self,
        name: &str,
        _namespace: &str,
    ) -> Result<Option<BuildConfig>, ClusterError> {
        Ok(self.state.lock().unwrap().build_configs.next(name))
    }

    async fn get_deployment_config(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<DeploymentConfig>, ClusterError> {
        let mut state = self.state.lock().unwrap();
        state.deployment_config_lookups.push(namespace.to_string());
        Ok(state.deployment_configs.next(name))
    }

    async fn list_deployment_configs(
        &self,
        _namespace: &str,
    ) -> Result<Vec<DeploymentConfig>, ClusterError> {
        let mut state = self.state.lock().unwrap();
        state.check_listing()?;
        Ok(state.deployment_configs.all())
    }

    async fn replace_deployment_config(
        &self,
        dc: &DeploymentConfig,
    ) -> Result<DeploymentConfig, ClusterError> {
        let mut state = self.state.lock().unwrap();
        let name = dc.name_any();
        state.check_replace("DeploymentConfig", &name)?;
        if !state.deployment_configs.overwrite(dc) {
            return Err(not_found("DeploymentConfig", &name));
        }
        state.replaced_deployment_configs.push(dc.clone());
        Ok(dc.clone())
    }

    async fn get_replication_controller(
        &self,
        name: &str,
        _namespace: &str,
    ) -> Result<Option<ReplicationController>, ClusterError> {
        Ok(self.state.lock().unwrap().replication_controllers.next(name))
    }

    async fn replace_replication_controller(
        &self,
        rc: &ReplicationController,
    ) -> Result<ReplicationController, ClusterError> {
        let mut state = self.state.lock().unwrap();
        let name = rc.name_any();
        state.check_replace("ReplicationController", &name)?;
        if !state.replication_controllers.overwrite(rc) {
            return Err(not_found("ReplicationController", &name));
        }
        state.replaced_replication_controllers.push(rc.clone());
        Ok(rc.clone())
    }

    async fn get_image_stream(
        &self,
        name: &str,
        _namespace: &str,
    ) -> Result<Option<ImageStream>, ClusterError> {
        Ok(self.state.lock().unwrap().image_streams.next(name))
    }

    async fn get_service(
        &self,
        name: &str,
        _namespace: &str,
    ) -> Result<Option<Service>, ClusterError> {
        Ok(self.state.lock().unwrap().services.next(name))
    }
}
