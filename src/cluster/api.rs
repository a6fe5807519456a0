use super::{ClusterClient, ClusterError};
use crate::crd::{Build, BuildConfig, DeploymentConfig, ImageStream};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ReplicationController, Service};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, ListParams, PostParams};
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tracing::debug;

/// `ClusterClient` backed by a live API server
#[derive(Clone)]
pub struct KubeClusterClient {
    client: kube::Client,
}

impl KubeClusterClient {
    pub fn new(client: kube::Client) -> Self {
        KubeClusterClient { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn get_opt<K>(&self, name: &str, namespace: &str) -> Result<Option<K>, ClusterError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        K::DynamicType: Default,
    {
        debug!(kind = %K::kind(&K::DynamicType::default()), name = %name, namespace = %namespace, "GET");
        self.api::<K>(namespace)
            .get_opt(name)
            .await
            .map_err(|e| map_kube_error::<K>(name, e))
    }

    async fn list<K>(&self, namespace: &str) -> Result<Vec<K>, ClusterError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        K::DynamicType: Default,
    {
        debug!(kind = %K::kind(&K::DynamicType::default()), namespace = %namespace, "LIST");
        self.api::<K>(namespace)
            .list(&ListParams::default())
            .await
            .map(|list| list.items)
            .map_err(|e| map_kube_error::<K>("*", e))
    }

    /// PUT the object back; the server rejects it if `resourceVersion` is stale
    async fn replace<K>(&self, obj: &K) -> Result<K, ClusterError>
    where
        K: Resource<Scope = NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Serialize
            + Debug,
        K::DynamicType: Default,
    {
        let name = obj.name_any();
        let namespace = obj
            .namespace()
            .unwrap_or_else(|| self.client.default_namespace().to_string());
        debug!(
            kind = %K::kind(&K::DynamicType::default()),
            name = %name,
            namespace = %namespace,
            resource_version = ?obj.resource_version(),
            "PUT"
        );
        self.api::<K>(&namespace)
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(|e| map_kube_error::<K>(&name, e))
    }
}

fn map_kube_error<K>(name: &str, err: kube::Error) -> ClusterError
where
    K: Resource,
    K::DynamicType: Default,
{
    let kind = K::kind(&K::DynamicType::default()).to_string();
    match err {
        kube::Error::Api(resp) if resp.code == 404 => ClusterError::NotFound {
            kind,
            name: name.to_string(),
        },
        kube::Error::Api(resp) if resp.code == 409 => ClusterError::Conflict {
            kind,
            name: name.to_string(),
            message: resp.message.clone(),
        },
        kube::Error::Api(resp) => ClusterError::Api {
            kind,
            name: name.to_string(),
            code: resp.code,
            message: resp.message.clone(),
        },
        other => ClusterError::Transport(other.to_string()),
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get_build(&self, name: &str, namespace: &str) -> Result<Option<Build>, ClusterError> {
        self.get_opt(name, namespace).await
    }

    async fn list_builds(&self, namespace: &str) -> Result<Vec<Build>, ClusterError> {
        self.list(namespace).await
    }

    async fn replace_build(&self, build: &Build) -> Result<Build, ClusterError> {
        self.replace(build).await
    }

    async fn get_build_config(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<BuildConfig>, ClusterError> {
        self.get_opt(name, namespace).await
    }

    async fn get_deployment_config(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<DeploymentConfig>, ClusterError> {
        self.get_opt(name, namespace).await
    }

    async fn list_deployment_configs(
        &self,
        namespace: &str,
    ) -> Result<Vec<DeploymentConfig>, ClusterError> {
        self.list(namespace).await
    }

    async fn replace_deployment_config(
        &self,
        dc: &DeploymentConfig,
    ) -> Result<DeploymentConfig, ClusterError> {
        self.replace(dc).await
    }

    async fn get_replication_controller(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<ReplicationController>, ClusterError> {
        self.get_opt(name, namespace).await
    }

    async fn replace_replication_controller(
        &self,
        rc: &ReplicationController,
    ) -> Result<ReplicationController, ClusterError> {
        self.replace(rc).await
    }

    async fn get_image_stream(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<ImageStream>, ClusterError> {
        self.get_opt(name, namespace).await
    }

    async fn get_service(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<Service>, ClusterError> {
        self.get_opt(name, namespace).await
    }
}
