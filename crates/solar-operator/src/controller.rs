//! Glue between watches, the work queue and the reconciler.
use std::future::Future;
use std::sync::Arc;

use futures_util::{future::join_all, Stream, StreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::{Api, Client, Resource, ResourceExt};
use kube_runtime::reflector::{self, Store};
use kube_runtime::watcher::{self, watcher, Event};
use kube_runtime::WatchStreamExt;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::cluster::KubeCluster;
use crate::config::ControllerConfig;
use crate::convergence::controlling_star;
use crate::crd::Star;
use crate::queue::WorkQueue;
use crate::reconciler::Reconciler;
use crate::telemetry::RECONCILE_TOTAL;

pub const CONTROLLER_NAME: &str = "solar-system-controller";

pub struct Controller {
    reconciler: Arc<Reconciler>,
    queue: Arc<WorkQueue>,
    workers: usize,
}

impl Controller {
    pub fn new(reconciler: Reconciler, queue: Arc<WorkQueue>, workers: usize) -> Self {
        Self { reconciler: Arc::new(reconciler), queue, workers: workers.max(1) }
    }

    pub fn queue(&self) -> Arc<WorkQueue> { Arc::clone(&self.queue) }

    /// Runs the workers until `shutdown` resolves, then lets in-flight cycles finish.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        info!(workers = self.workers, "controller.starting");
        let handles: Vec<_> = (0..self.workers).map(|id| {
            let reconciler = Arc::clone(&self.reconciler);
            let queue = Arc::clone(&self.queue);
            tokio::spawn(async move { while process_next(&reconciler, &queue).await {} debug!(worker = id, "worker.stopped"); })
        }).collect();
        shutdown.await;
        info!("controller.shutting_down");
        self.queue.shutdown();
        for res in join_all(handles).await {
            if let Err(e) = res { warn!(error=%e, "worker.join.failed"); }
        }
        info!("controller.stopped");
    }
}

/// Processes one key; `false` once the queue is shut down.
pub async fn process_next(reconciler: &Reconciler, queue: &Arc<WorkQueue>) -> bool {
    let Some(key) = queue.get().await else { return false };
    match reconciler.reconcile(&key).await {
        Ok(()) => {
            RECONCILE_TOTAL.with_label_values(&["success"]).inc();
            queue.forget(&key);
        }
        Err(e) => {
            RECONCILE_TOTAL.with_label_values(&[e.metric_label()]).inc();
            let delay = queue.add_rate_limited(key.clone());
            warn!(key=%key, error=%e, retry_in_ms = delay.as_millis() as u64, "star.requeued");
        }
    }
    queue.done(&key);
    true
}

pub fn star_key(star: &Star) -> String { star.key() }

/// Key of the Star controlling a child, if any; child events wake their owner.
pub fn owner_key<K: ResourceExt>(obj: &K) -> Option<String> {
    let name = controlling_star(obj.meta())?;
    Some(format!("{}/{}", obj.namespace()?, name))
}

fn api_for<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    K::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Starts a reflector for `K` and forwards the keys `map` derives from each event into `queue`.
fn spawn_informer<K, F>(api: Api<K>, queue: Arc<WorkQueue>, map: F) -> Store<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + std::fmt::Debug + Send + Sync + 'static,
    F: Fn(&K) -> Option<String> + Send + 'static,
{
    let (store, writer) = reflector::store();
    let stream = reflector::reflector(writer, watcher(api, watcher::Config::default())).default_backoff();
    tokio::spawn(drive_events(stream, queue, map));
    store
}

async fn drive_events<K, S, F>(stream: S, queue: Arc<WorkQueue>, map: F)
where
    S: Stream<Item = Result<Event<K>, watcher::Error>>,
    F: Fn(&K) -> Option<String>,
{
    futures_util::pin_mut!(stream);
    while let Some(ev) = stream.next().await {
        match ev {
            Ok(Event::Applied(obj)) | Ok(Event::Deleted(obj)) => { if let Some(key) = map(&obj) { queue.add(key); } }
            Ok(Event::Restarted(objs)) => { for obj in &objs { if let Some(key) = map(obj) { queue.add(key); } } }
            Err(e) => warn!(error=%e, "watch.error"),
        }
    }
}

/// Builds caches, watches and the reconciler from a client; caches are synced on return.
pub async fn build(client: Client, config: &ControllerConfig) -> anyhow::Result<Controller> {
    let queue = WorkQueue::new(config.backoff());
    let ns = config.namespace.as_deref();
    let stars = spawn_informer(api_for::<Star>(&client, ns), queue.clone(), |s: &Star| Some(star_key(s)));
    let deployments = spawn_informer(api_for::<Deployment>(&client, ns), queue.clone(), |d: &Deployment| owner_key(d));
    let services = spawn_informer(api_for::<Service>(&client, ns), queue.clone(), |s: &Service| owner_key(s));
    info!(namespace = ns.unwrap_or("*"), "caches.syncing");
    stars.wait_until_ready().await?;
    deployments.wait_until_ready().await?;
    services.wait_until_ready().await?;
    info!("caches.synced");
    let cluster = KubeCluster::new(client, CONTROLLER_NAME);
    let reconciler = Reconciler::new(Arc::new(stars), Arc::new(deployments), Arc::new(services), Arc::new(cluster))
        .with_image(config.image.clone());
    Ok(Controller::new(reconciler, queue, config.workers))
}
