//! Seams between the reconciler and the cluster: read-only caches and the write client.
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::{api::PostParams, Api, Client, Resource, ResourceExt};
use kube_runtime::events::{Event, EventType, Recorder, Reporter};
use kube_runtime::reflector::{ObjectRef, Store};

use crate::crd::Star;
use crate::error::{Error, Result};

/// Read access to a (possibly stale) cache of `K`.
pub trait Lister<K>: Send + Sync {
    /// `Ok(None)` when the object is not in the cache.
    fn get(&self, namespace: &str, name: &str) -> Result<Option<Arc<K>>>;
}

impl<K> Lister<K> for Store<K>
where
    K: Resource + Clone + Send + Sync + 'static,
    K::DynamicType: Default + Eq + Hash + Clone + Send + Sync,
{
    fn get(&self, namespace: &str, name: &str) -> Result<Option<Arc<K>>> {
        Ok(Store::get(self, &ObjectRef::new(name).within(namespace)))
    }
}

/// Writes against the live API server.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment>;
    async fn create_service(&self, service: &Service) -> Result<Service>;
    /// Uncached read, used to get the latest resourceVersion before a status write.
    async fn get_star(&self, namespace: &str, name: &str) -> Result<Star>;
    async fn replace_star_status(&self, star: &Star) -> Result<Star>;
    async fn publish_event(&self, star: &Star, reason: &str, note: String) -> Result<()>;
}

#[derive(Clone)]
pub struct KubeCluster { client: Client, reporter: Reporter }

impl KubeCluster {
    pub fn new(client: Client, controller: &str) -> Self {
        let reporter = Reporter { controller: controller.to_string(), instance: std::env::var("POD_NAME").ok() };
        Self { client, reporter }
    }
}

fn namespace_of<K: ResourceExt>(obj: &K) -> Result<String> { obj.namespace().ok_or(Error::MissingObjectKey(".metadata.namespace")) }

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &namespace_of(deployment)?);
        Ok(api.create(&PostParams::default(), deployment).await?)
    }

    async fn create_service(&self, service: &Service) -> Result<Service> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), &namespace_of(service)?);
        Ok(api.create(&PostParams::default(), service).await?)
    }

    async fn get_star(&self, namespace: &str, name: &str) -> Result<Star> {
        let api: Api<Star> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }

    async fn replace_star_status(&self, star: &Star) -> Result<Star> {
        let api: Api<Star> = Api::namespaced(self.client.clone(), &namespace_of(star)?);
        let name = star.metadata.name.as_deref().ok_or(Error::MissingObjectKey(".metadata.name"))?;
        Ok(api.replace_status(name, &PostParams::default(), serde_json::to_vec(star)?).await?)
    }

    async fn publish_event(&self, star: &Star, reason: &str, note: String) -> Result<()> {
        let recorder = Recorder::new(self.client.clone(), self.reporter.clone(), star.object_ref(&()));
        recorder.publish(Event { type_: EventType::Normal, reason: reason.into(), note: Some(note), action: "Reconcile".into(), secondary: None }).await?;
        Ok(())
    }
}
