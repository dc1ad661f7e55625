//! In-memory stand-ins for the cache and the API server, shared by unit and integration tests.
//! The fake listers double as the "live" objects, so a write is visible to the next cycle the
//! way an informer would eventually deliver it.
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentCondition, DeploymentStatus};
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::ResourceExt;

use crate::cluster::{ClusterClient, Lister};
use crate::convergence::{desired_deployment, DEFAULT_IMAGE, ENERGY_SOURCE};
use crate::crd::{Star, StarSpec};
use crate::error::{api_error, Result};
use crate::reconciler::Reconciler;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> { m.lock().unwrap_or_else(|p| p.into_inner()) }

pub fn star(namespace: &str, name: &str) -> Star {
    let mut s = Star::new(name, StarSpec { type_: "G-type".into(), location: "milky-way".into() });
    s.metadata.namespace = Some(namespace.into());
    s.metadata.uid = Some(format!("uid-{name}"));
    s.metadata.generation = Some(1);
    s.metadata.resource_version = Some("1".into());
    s
}

pub fn deleting(mut s: Star) -> Star {
    s.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
    s
}

/// An `energy-source` Deployment nobody owns, e.g. left behind by hand.
pub fn unowned_deployment(namespace: &str) -> Deployment {
    Deployment { metadata: ObjectMeta { name: Some(ENERGY_SOURCE.into()), namespace: Some(namespace.into()), ..ObjectMeta::default() }, ..Deployment::default() }
}

pub fn with_available(mut d: Deployment) -> Deployment {
    d.status = Some(DeploymentStatus {
        conditions: Some(vec![DeploymentCondition { type_: "Available".into(), status: "True".into(), ..DeploymentCondition::default() }]),
        ..DeploymentStatus::default()
    });
    d
}

pub fn available_deployment(owner: &Star) -> Deployment {
    with_available(desired_deployment(owner, DEFAULT_IMAGE).expect("fixture star has uid and namespace"))
}

pub struct FakeLister<K> {
    objects: Mutex<HashMap<(String, String), Arc<K>>>,
    fail_code: Mutex<Option<u16>>,
}

impl<K: ResourceExt + Clone> FakeLister<K> {
    pub fn new() -> Arc<Self> { Arc::new(Self { objects: Mutex::new(HashMap::new()), fail_code: Mutex::new(None) }) }

    pub fn insert(&self, obj: K) {
        let key = (obj.namespace().unwrap_or_default(), obj.name_any());
        lock(&self.objects).insert(key, Arc::new(obj));
    }

    pub fn remove(&self, namespace: &str, name: &str) { lock(&self.objects).remove(&(namespace.to_string(), name.to_string())); }

    pub fn fetch(&self, namespace: &str, name: &str) -> Option<K> {
        lock(&self.objects).get(&(namespace.to_string(), name.to_string())).map(|o| K::clone(o))
    }

    /// Every following lookup fails with this API status code.
    pub fn fail_with(&self, code: u16) { *lock(&self.fail_code) = Some(code); }
}

impl<K: Send + Sync> Lister<K> for FakeLister<K> {
    fn get(&self, namespace: &str, name: &str) -> Result<Option<Arc<K>>> {
        if let Some(code) = *lock(&self.fail_code) { return Err(api_error(code, "InternalError", "lister failure")); }
        Ok(lock(&self.objects).get(&(namespace.to_string(), name.to_string())).cloned())
    }
}

#[derive(Default)]
struct Recorded {
    created_deployments: Vec<Deployment>,
    created_services: Vec<Service>,
    status_writes: Vec<Star>,
    events: Vec<String>,
}

pub struct FakeCluster {
    pub stars: Arc<FakeLister<Star>>,
    pub deployments: Arc<FakeLister<Deployment>>,
    pub services: Arc<FakeLister<Service>>,
    recorded: Mutex<Recorded>,
    fail_create: Mutex<Option<u16>>,
    fail_status: Mutex<Option<u16>>,
    delay: Duration,
    in_flight: Mutex<HashMap<String, usize>>,
    max_in_flight: AtomicUsize,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> { Self::with_delay(Duration::ZERO) }

    /// Every API call sleeps for `delay`, which widens the window for overlapping cycles.
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            stars: FakeLister::new(),
            deployments: FakeLister::new(),
            services: FakeLister::new(),
            recorded: Mutex::new(Recorded::default()),
            fail_create: Mutex::new(None),
            fail_status: Mutex::new(None),
            delay,
            in_flight: Mutex::new(HashMap::new()),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn reconciler(self: &Arc<Self>) -> Reconciler {
        Reconciler::new(self.stars.clone(), self.deployments.clone(), self.services.clone(), self.clone())
    }

    pub fn fail_creates_with(&self, code: u16) { *lock(&self.fail_create) = Some(code); }
    pub fn fail_status_with(&self, code: u16) { *lock(&self.fail_status) = Some(code); }

    pub fn created_deployments(&self) -> Vec<Deployment> { lock(&self.recorded).created_deployments.clone() }
    pub fn created_services(&self) -> Vec<Service> { lock(&self.recorded).created_services.clone() }
    pub fn status_writes(&self) -> Vec<Star> { lock(&self.recorded).status_writes.clone() }
    pub fn events(&self) -> Vec<String> { lock(&self.recorded).events.clone() }

    /// Highest number of API calls seen at once for a single Star namespace.
    pub fn max_in_flight(&self) -> usize { self.max_in_flight.load(Ordering::SeqCst) }

    /// Flips the stored energy-source Deployment in `namespace` to `Available=True`.
    pub fn make_deployment_available(&self, namespace: &str) {
        if let Some(d) = self.deployments.fetch(namespace, ENERGY_SOURCE) { self.deployments.insert(with_available(d)); }
    }

    async fn call(&self, scope: &str) {
        let now = {
            let mut m = lock(&self.in_flight);
            let n = m.entry(scope.to_string()).or_insert(0);
            *n += 1;
            *n
        };
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() { tokio::time::sleep(self.delay).await; }
        if let Some(n) = lock(&self.in_flight).get_mut(scope) { *n -= 1; }
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment> {
        let ns = deployment.namespace().unwrap_or_default();
        self.call(&ns).await;
        if let Some(code) = *lock(&self.fail_create) { return Err(api_error(code, "InternalError", "create failed")); }
        if self.deployments.fetch(&ns, &deployment.name_any()).is_some() { return Err(api_error(409, "AlreadyExists", "deployment exists")); }
        self.deployments.insert(deployment.clone());
        lock(&self.recorded).created_deployments.push(deployment.clone());
        Ok(deployment.clone())
    }

    async fn create_service(&self, service: &Service) -> Result<Service> {
        let ns = service.namespace().unwrap_or_default();
        self.call(&ns).await;
        if let Some(code) = *lock(&self.fail_create) { return Err(api_error(code, "InternalError", "create failed")); }
        if self.services.fetch(&ns, &service.name_any()).is_some() { return Err(api_error(409, "AlreadyExists", "service exists")); }
        self.services.insert(service.clone());
        lock(&self.recorded).created_services.push(service.clone());
        Ok(service.clone())
    }

    async fn get_star(&self, namespace: &str, name: &str) -> Result<Star> {
        self.call(namespace).await;
        self.stars.fetch(namespace, name).ok_or_else(|| api_error(404, "NotFound", format!("stars.solar.my.dev {name:?} not found")))
    }

    async fn replace_star_status(&self, star: &Star) -> Result<Star> {
        let ns = star.namespace().unwrap_or_default();
        self.call(&ns).await;
        if let Some(code) = *lock(&self.fail_status) { return Err(api_error(code, "Conflict", "the object has been modified")); }
        let mut live = self.stars.fetch(&ns, &star.name_any()).ok_or_else(|| api_error(404, "NotFound", "star not found"))?;
        if live.metadata.resource_version != star.metadata.resource_version {
            return Err(api_error(409, "Conflict", "the object has been modified; please apply your changes to the latest version"));
        }
        let rv: u64 = live.metadata.resource_version.as_deref().and_then(|v| v.parse().ok()).unwrap_or(0);
        live.metadata.resource_version = Some((rv + 1).to_string());
        live.status = star.status.clone();
        self.stars.insert(live.clone());
        lock(&self.recorded).status_writes.push(live.clone());
        Ok(live)
    }

    async fn publish_event(&self, star: &Star, reason: &str, note: String) -> Result<()> {
        self.call(&star.namespace().unwrap_or_default()).await;
        lock(&self.recorded).events.push(format!("{reason}: {note}"));
        Ok(())
    }
}
