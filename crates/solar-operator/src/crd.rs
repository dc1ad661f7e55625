use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::condition::{same_conditions, Condition, ConditionSet, ConditionType};

pub const GROUP: &str = "solar.my.dev";
pub const VERSION: &str = "v1alpha1";
pub const KIND: &str = "Star";

/// Star is the basic unit forming the solar system.
#[derive(CustomResource, Serialize, Deserialize, Debug, Clone, JsonSchema, PartialEq)]
#[kube(group = "solar.my.dev", version = "v1alpha1", kind = "Star", namespaced, status = "StarStatus")]
#[kube(printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#)]
pub struct StarSpec {
    /// Energy-source category.
    #[serde(rename = "type")]
    pub type_: String,
    /// Placement hint.
    pub location: String,
}

const STAR_CONDITIONS: ConditionSet = ConditionSet::new(
    ConditionType::Ready,
    &[ConditionType::DeploymentsAvailable, ConditionType::CreationSucceeded],
);

pub const REASON_UNAVAILABLE: &str = "Unavailable";
pub const REASON_NOT_OWNED: &str = "NotOwned";

#[derive(Serialize, Deserialize, Debug, Clone, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StarStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl StarStatus {
    pub fn initialize_conditions(&mut self) { STAR_CONDITIONS.manage(&mut self.conditions).initialize_conditions(); }

    pub fn get_condition(&self, type_: ConditionType) -> Condition {
        self.condition(type_).cloned().unwrap_or_else(|| Condition::unknown(type_))
    }

    pub fn condition(&self, type_: ConditionType) -> Option<&Condition> { self.conditions.iter().find(|c| c.is(type_)) }

    pub fn is_ready(&self) -> bool { self.condition(ConditionType::Ready).is_some_and(Condition::is_true) }

    /// Equal for write purposes: condition order and transition times do not count.
    pub fn same_state(&self, other: &StarStatus) -> bool {
        self.observed_generation == other.observed_generation && same_conditions(&self.conditions, &other.conditions)
    }

    pub fn mark_deployment_unavailable(&mut self, name: &str) {
        STAR_CONDITIONS.manage(&mut self.conditions).mark_false(ConditionType::DeploymentsAvailable, REASON_UNAVAILABLE, format!("Deployment {name:?} is not available."));
    }

    pub fn mark_deployment_not_owned(&mut self, name: &str) {
        STAR_CONDITIONS.manage(&mut self.conditions).mark_false(ConditionType::DeploymentsAvailable, REASON_NOT_OWNED, format!("There is an existing Deployment {name:?} that we do not own."));
    }

    pub fn mark_deployment_available(&mut self) { STAR_CONDITIONS.manage(&mut self.conditions).mark_true(ConditionType::DeploymentsAvailable); }

    pub fn mark_service_unavailable(&mut self, name: &str) {
        STAR_CONDITIONS.manage(&mut self.conditions).mark_false(ConditionType::CreationSucceeded, REASON_UNAVAILABLE, format!("Service {name:?} is not available."));
    }

    pub fn mark_service_not_owned(&mut self, name: &str) {
        STAR_CONDITIONS.manage(&mut self.conditions).mark_false(ConditionType::CreationSucceeded, REASON_NOT_OWNED, format!("There is an existing Service {name:?} that we do not own."));
    }

    pub fn mark_star_ready(&mut self) { STAR_CONDITIONS.manage(&mut self.conditions).mark_true(ConditionType::CreationSucceeded); }
}

impl Star {
    /// `namespace/name`, the work queue key for this object.
    pub fn key(&self) -> String {
        format!("{}/{}", self.metadata.namespace.as_deref().unwrap_or_default(), self.metadata.name.as_deref().unwrap_or_default())
    }
}
