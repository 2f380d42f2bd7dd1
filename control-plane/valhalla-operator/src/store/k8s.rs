use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{instrument, trace};

use super::{ChildStore, InstanceStore, StoreError, StoreResult};
use crate::crd::Valhalla;
use crate::kinds::{ChildObject, ManagedKind};

impl From<kube::Error> for StoreError {
    fn from(e: kube::Error) -> Self {
        match &e {
            kube::Error::Api(resp) if resp.code == 404 => {
                StoreError::NotFound(resp.message.clone())
            }
            kube::Error::Api(resp) if resp.code == 409 => {
                StoreError::Conflict(resp.message.clone())
            }
            _ => StoreError::Other(e.to_string()),
        }
    }
}

/// Instance store backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeInstanceStore {
    client: Client,
}

impl KubeInstanceStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Valhalla> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl InstanceStore for KubeInstanceStore {
    #[instrument(level = "trace", skip(self))]
    async fn get_instance(
        &self,
        namespace: &str,
        name: &str,
    ) -> StoreResult<Option<Valhalla>> {
        Ok(self.api(namespace).get_opt(name).await?)
    }

    #[instrument(level = "trace", skip_all, fields(name = %instance.name_any()))]
    async fn update_instance(
        &self,
        instance: &Valhalla,
    ) -> StoreResult<Valhalla> {
        let ns = instance.namespace().unwrap_or_default();
        // replace carries metadata.resourceVersion, so a stale copy is
        // rejected with 409
        Ok(self
            .api(&ns)
            .replace(&instance.name_any(), &PostParams::default(), instance)
            .await?)
    }

    #[instrument(level = "trace", skip_all, fields(name = %instance.name_any()))]
    async fn update_instance_status(
        &self,
        instance: &Valhalla,
    ) -> StoreResult<Valhalla> {
        let ns = instance.namespace().unwrap_or_default();
        let patch = json!({
            "metadata": { "resourceVersion": instance.resource_version() },
            "status": instance.status,
        });
        trace!(%ns, "patching status");
        Ok(self
            .api(&ns)
            .patch_status(
                &instance.name_any(),
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await?)
    }
}

/// Child store backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeChildStore {
    client: Client,
}

impl KubeChildStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

async fn get_typed<K>(
    client: &Client,
    namespace: &str,
    name: &str,
) -> StoreResult<Option<K>>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + DeserializeOwned,
{
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    Ok(api.get_opt(name).await?)
}

async fn create_typed<K>(client: &Client, obj: &K) -> StoreResult<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned,
{
    let ns = obj.meta().namespace.clone().unwrap_or_default();
    let api: Api<K> = Api::namespaced(client.clone(), &ns);
    Ok(api.create(&PostParams::default(), obj).await?)
}

async fn replace_typed<K>(client: &Client, obj: &K) -> StoreResult<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned,
{
    let ns = obj.meta().namespace.clone().unwrap_or_default();
    let name = obj.meta().name.clone().unwrap_or_default();
    let api: Api<K> = Api::namespaced(client.clone(), &ns);
    Ok(api.replace(&name, &PostParams::default(), obj).await?)
}

#[async_trait]
impl ChildStore for KubeChildStore {
    #[instrument(level = "trace", skip(self))]
    async fn get_child(
        &self,
        kind: ManagedKind,
        namespace: &str,
        name: &str,
    ) -> StoreResult<Option<ChildObject>> {
        let c = &self.client;
        Ok(match kind {
            ManagedKind::PersistentVolumeClaim => get_typed(c, namespace, name)
                .await?
                .map(ChildObject::PersistentVolumeClaim),
            ManagedKind::Job => {
                get_typed(c, namespace, name).await?.map(ChildObject::Job)
            }
            ManagedKind::Deployment => get_typed(c, namespace, name)
                .await?
                .map(ChildObject::Deployment),
            ManagedKind::Service => {
                get_typed(c, namespace, name).await?.map(ChildObject::Service)
            }
            ManagedKind::HorizontalPodAutoscaler => {
                get_typed(c, namespace, name)
                    .await?
                    .map(ChildObject::HorizontalPodAutoscaler)
            }
            ManagedKind::PodDisruptionBudget => get_typed(c, namespace, name)
                .await?
                .map(ChildObject::PodDisruptionBudget),
            ManagedKind::CronJob => {
                get_typed(c, namespace, name).await?.map(ChildObject::CronJob)
            }
        })
    }

    #[instrument(level = "trace", skip_all, fields(kind = %object.kind(), name = %object.name()))]
    async fn create_child(
        &self,
        object: &ChildObject,
    ) -> StoreResult<ChildObject> {
        let c = &self.client;
        Ok(match object {
            ChildObject::PersistentVolumeClaim(o) => {
                ChildObject::PersistentVolumeClaim(create_typed(c, o).await?)
            }
            ChildObject::Job(o) => ChildObject::Job(create_typed(c, o).await?),
            ChildObject::Deployment(o) => {
                ChildObject::Deployment(create_typed(c, o).await?)
            }
            ChildObject::Service(o) => {
                ChildObject::Service(create_typed(c, o).await?)
            }
            ChildObject::HorizontalPodAutoscaler(o) => {
                ChildObject::HorizontalPodAutoscaler(create_typed(c, o).await?)
            }
            ChildObject::PodDisruptionBudget(o) => {
                ChildObject::PodDisruptionBudget(create_typed(c, o).await?)
            }
            ChildObject::CronJob(o) => {
                ChildObject::CronJob(create_typed(c, o).await?)
            }
        })
    }

    #[instrument(level = "trace", skip_all, fields(kind = %object.kind(), name = %object.name()))]
    async fn update_child(
        &self,
        object: &ChildObject,
    ) -> StoreResult<ChildObject> {
        let c = &self.client;
        Ok(match object {
            ChildObject::PersistentVolumeClaim(o) => {
                ChildObject::PersistentVolumeClaim(replace_typed(c, o).await?)
            }
            ChildObject::Job(o) => ChildObject::Job(replace_typed(c, o).await?),
            ChildObject::Deployment(o) => {
                ChildObject::Deployment(replace_typed(c, o).await?)
            }
            ChildObject::Service(o) => {
                ChildObject::Service(replace_typed(c, o).await?)
            }
            ChildObject::HorizontalPodAutoscaler(o) => {
                ChildObject::HorizontalPodAutoscaler(replace_typed(c, o).await?)
            }
            ChildObject::PodDisruptionBudget(o) => {
                ChildObject::PodDisruptionBudget(replace_typed(c, o).await?)
            }
            ChildObject::CronJob(o) => {
                ChildObject::CronJob(replace_typed(c, o).await?)
            }
        })
    }
}
