//! Decisions for the two children a Star manages, plus the desired shape of each.
//! Only presence, ownership and Deployment availability are inspected; field drift on an
//! existing child is left alone.
use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec, Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Resource, ResourceExt};

use crate::crd::{Star, GROUP, KIND};
use crate::error::{Error, Result};

/// Name shared by the managed Deployment, its container and the Service.
pub const ENERGY_SOURCE: &str = "energy-source";
pub const APP_LABEL: &str = "source-of-energy";
pub const DEFAULT_IMAGE: &str = "docker.io/houshengbo/energy-source:latest";
pub const CONTAINER_PORT: i32 = 8080;
pub const SERVICE_PORT: i32 = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildAction {
    /// Child is missing and must be created.
    Create,
    /// A child with our name exists but another controller (or nobody) owns it.
    NotOwned,
    /// Child exists and is ours, but is not serving yet.
    Unavailable,
    Ready,
}

pub fn deployment_action(star: &Star, observed: Option<&Deployment>) -> ChildAction {
    match observed {
        None => ChildAction::Create,
        Some(d) if !is_controlled_by(&d.metadata, star) => ChildAction::NotOwned,
        Some(d) if deployment_available(d) => ChildAction::Ready,
        Some(_) => ChildAction::Unavailable,
    }
}

/// A Service has no readiness of its own; existing and owned is enough.
pub fn service_action(star: &Star, observed: Option<&Service>) -> ChildAction {
    match observed {
        None => ChildAction::Create,
        Some(s) if !is_controlled_by(&s.metadata, star) => ChildAction::NotOwned,
        Some(_) => ChildAction::Ready,
    }
}

pub fn is_controlled_by(meta: &ObjectMeta, star: &Star) -> bool {
    let Some(uid) = star.metadata.uid.as_deref() else { return false };
    meta.owner_references.iter().flatten().any(|o| o.controller == Some(true) && o.uid == uid)
}

pub fn deployment_available(d: &Deployment) -> bool {
    d.status.as_ref().and_then(|s| s.conditions.as_ref())
        .is_some_and(|conds| conds.iter().any(|c| c.type_ == "Available" && c.status == "True"))
}

/// Name of the Star controlling an object, if its controller owner reference points at one.
pub fn controlling_star(meta: &ObjectMeta) -> Option<&str> {
    meta.owner_references.iter().flatten()
        .find(|o| o.controller == Some(true))
        .filter(|o| o.kind == KIND && o.api_version.split('/').next() == Some(GROUP))
        .map(|o| o.name.as_str())
}

pub fn labels() -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), APP_LABEL.to_string()), ("controller".to_string(), ENERGY_SOURCE.to_string())])
}

fn child_meta(star: &Star) -> Result<ObjectMeta> {
    let owner = star.controller_owner_ref(&()).ok_or(Error::MissingObjectKey(".metadata.uid"))?;
    let namespace = star.namespace().ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    Ok(ObjectMeta {
        name: Some(ENERGY_SOURCE.to_string()),
        namespace: Some(namespace),
        labels: Some(labels()),
        owner_references: Some(vec![owner]),
        ..ObjectMeta::default()
    })
}

/// One replica of the energy-source demo, told which star it serves through `SOURCE`.
pub fn desired_deployment(star: &Star, image: &str) -> Result<Deployment> {
    let env = |name: &str, value: String| EnvVar { name: name.into(), value: Some(value), ..EnvVar::default() };
    Ok(Deployment {
        metadata: child_meta(star)?,
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector { match_labels: Some(labels()), ..LabelSelector::default() },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta { labels: Some(labels()), ..ObjectMeta::default() }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: ENERGY_SOURCE.into(),
                        image: Some(image.into()),
                        ports: Some(vec![ContainerPort { name: Some("http".into()), container_port: CONTAINER_PORT, ..ContainerPort::default() }]),
                        env: Some(vec![env("SOURCE", star.name_any()), env("PORT", CONTAINER_PORT.to_string())]),
                        ..Container::default()
                    }],
                    ..PodSpec::default()
                }),
            },
            ..DeploymentSpec::default()
        }),
        status: None,
    })
}

pub fn desired_service(star: &Star) -> Result<Service> {
    Ok(Service {
        metadata: child_meta(star)?,
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".into()),
            selector: Some(labels()),
            ports: Some(vec![ServicePort {
                name: Some("http".into()),
                port: SERVICE_PORT,
                target_port: Some(IntOrString::Int(CONTAINER_PORT)),
                ..ServicePort::default()
            }]),
            ..ServiceSpec::default()
        }),
        status: None,
    })
}
