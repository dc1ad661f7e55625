//! One load → copy → converge → diff → persist pass for a single Star key.
use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;
use tracing::{debug, info, instrument, warn};

use crate::cluster::{ClusterClient, Lister};
use crate::convergence::{deployment_action, desired_deployment, desired_service, service_action, ChildAction, DEFAULT_IMAGE, ENERGY_SOURCE};
use crate::condition::carry_transition_times;
use crate::crd::{Star, StarStatus};
use crate::error::{Error, Result};
use crate::telemetry::{CHILDREN_CREATED, STATUS_UPDATES};

pub struct Reconciler {
    stars: Arc<dyn Lister<Star>>,
    deployments: Arc<dyn Lister<Deployment>>,
    services: Arc<dyn Lister<Service>>,
    cluster: Arc<dyn ClusterClient>,
    image: String,
}

/// Splits a `namespace/name` queue key. Stars are namespaced, so both parts are required.
pub fn split_key(key: &str) -> Result<(&str, &str)> {
    match key.split_once('/') {
        Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/') => Ok((ns, name)),
        _ => Err(Error::InvalidKey(key.to_string())),
    }
}

impl Reconciler {
    pub fn new(
        stars: Arc<dyn Lister<Star>>,
        deployments: Arc<dyn Lister<Deployment>>,
        services: Arc<dyn Lister<Service>>,
        cluster: Arc<dyn ClusterClient>,
    ) -> Self {
        Self { stars, deployments, services, cluster, image: DEFAULT_IMAGE.to_string() }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self { self.image = image.into(); self }

    /// Converges the Star behind `key`. `Ok` also covers keys whose Star no longer exists;
    /// an `Err` asks the caller to retry later.
    #[instrument(skip(self))]
    pub async fn reconcile(&self, key: &str) -> Result<()> {
        let (namespace, name) = match split_key(key) {
            Ok(parts) => parts,
            Err(e) => { warn!(error=%e, "star.key.invalid"); return Ok(()); }
        };
        let Some(original) = self.stars.get(namespace, name)? else {
            debug!("star.gone");
            return Ok(());
        };
        // The cached object is shared with other workers; converge a private copy.
        let mut star = Star::clone(&original);
        let outcome = self.reconcile_kind(&mut star).await;
        let written = if same_status(original.status.as_ref(), star.status.as_ref()) {
            debug!("status.unchanged");
            false
        } else {
            self.update_status(&star).await?
        };
        let created = match outcome {
            Ok(created) => created,
            Err(e) => {
                warn!(error=%e, "star.reconcile.failed");
                return Err(e);
            }
        };
        if (created || written) && star.metadata.deletion_timestamp.is_none() {
            if let Err(e) = self.cluster.publish_event(&star, "Reconciled", format!("Star reconciled: {key:?}")).await {
                warn!(error=%e, "event.publish.failed");
            }
        }
        Ok(())
    }

    /// `Ok(true)` when a child object was created.
    async fn reconcile_kind(&self, star: &mut Star) -> Result<bool> {
        if star.metadata.deletion_timestamp.is_some() {
            info!("star.deleting");
            return Ok(false);
        }
        let mut status = star.status.take().unwrap_or_default();
        status.initialize_conditions();
        let result = self.converge(star, &mut status).await;
        if result.is_ok() { status.observed_generation = star.metadata.generation; }
        star.status = Some(status);
        result
    }

    async fn converge(&self, star: &Star, status: &mut StarStatus) -> Result<bool> {
        let deployment = self.reconcile_deployment(star, status).await?;
        // The Service only makes sense once pods are serving behind it.
        if deployment != ChildAction::Ready {
            return Ok(deployment == ChildAction::Create);
        }
        Ok(self.reconcile_service(star, status).await? == ChildAction::Create)
    }

    async fn reconcile_deployment(&self, star: &Star, status: &mut StarStatus) -> Result<ChildAction> {
        let namespace = star.namespace().ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
        let observed = self.deployments.get(&namespace, ENERGY_SOURCE)?;
        let action = deployment_action(star, observed.as_deref());
        match action {
            ChildAction::Create => {
                status.mark_deployment_unavailable(ENERGY_SOURCE);
                let desired = desired_deployment(star, &self.image)?;
                self.cluster.create_deployment(&desired).await?;
                CHILDREN_CREATED.with_label_values(&["deployment"]).inc();
                // Availability is picked up when the new Deployment's status change triggers the next cycle.
                info!(deployment = ENERGY_SOURCE, "deployment.created");
            }
            ChildAction::NotOwned => {
                status.mark_deployment_not_owned(ENERGY_SOURCE);
                return Err(Error::NotOwned { kind: "Deployment", name: ENERGY_SOURCE.into(), owner: star.name_any() });
            }
            ChildAction::Unavailable => status.mark_deployment_unavailable(ENERGY_SOURCE),
            ChildAction::Ready => status.mark_deployment_available(),
        }
        Ok(action)
    }

    async fn reconcile_service(&self, star: &Star, status: &mut StarStatus) -> Result<ChildAction> {
        let namespace = star.namespace().ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
        let observed = self.services.get(&namespace, ENERGY_SOURCE)?;
        let action = service_action(star, observed.as_deref());
        match action {
            ChildAction::Create => {
                status.mark_service_unavailable(ENERGY_SOURCE);
                let desired = desired_service(star)?;
                self.cluster.create_service(&desired).await?;
                CHILDREN_CREATED.with_label_values(&["service"]).inc();
                info!(service = ENERGY_SOURCE, "service.created");
                status.mark_star_ready();
            }
            ChildAction::NotOwned => {
                status.mark_service_not_owned(ENERGY_SOURCE);
                return Err(Error::NotOwned { kind: "Service", name: ENERGY_SOURCE.into(), owner: star.name_any() });
            }
            ChildAction::Unavailable => status.mark_service_unavailable(ENERGY_SOURCE),
            ChildAction::Ready => status.mark_star_ready(),
        }
        Ok(action)
    }

    /// Writes `desired.status` over a freshly fetched copy, unless the live object already has it.
    /// Conditions whose state matches the live one keep the live transition time.
    async fn update_status(&self, desired: &Star) -> Result<bool> {
        let namespace = desired.namespace().ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
        let mut latest = self.cluster.get_star(&namespace, &desired.name_any()).await?;
        let mut status = desired.status.clone();
        if let (Some(next), Some(live)) = (status.as_mut(), latest.status.as_ref()) {
            carry_transition_times(&mut next.conditions, &live.conditions);
        }
        if same_status(latest.status.as_ref(), status.as_ref()) {
            debug!("status.unchanged.live");
            return Ok(false);
        }
        latest.status = status;
        self.cluster.replace_star_status(&latest).await?;
        STATUS_UPDATES.inc();
        debug!(ready = latest.status.as_ref().is_some_and(StarStatus::is_ready), "status.updated");
        Ok(true)
    }
}

fn same_status(a: Option<&StarStatus>, b: Option<&StarStatus>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.same_state(b),
        (a, b) => a.is_none() && b.is_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_keys() {
        assert_eq!(split_key("ns/sol").unwrap(), ("ns", "sol"));
        for bad in ["sol", "/sol", "ns/", "a/b/c", ""] {
            assert!(matches!(split_key(bad), Err(Error::InvalidKey(_))), "{bad}");
        }
    }
}
