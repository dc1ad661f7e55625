use kube::CustomResourceExt;
use serde_json::json;
use solar_operator::condition::{ConditionStatus, ConditionType};
use solar_operator::{Star, StarSpec, StarStatus};

#[test]
fn spec_wire_shape() {
    let original = StarSpec { type_: "G-type".into(), location: "milky-way".into() };
    let j = serde_json::to_value(&original).unwrap();
    assert_eq!(j, json!({"type":"G-type","location":"milky-way"}));
    let back: StarSpec = serde_json::from_value(j).unwrap();
    assert_eq!(back, original);
}

#[test]
fn status_wire_shape() {
    let raw = json!({
        "observedGeneration": 3,
        "conditions": [
            {"type":"Ready","status":"False","reason":"NotOwned","message":"taken","lastTransitionTime":"2024-05-01T00:00:00Z"},
            {"type":"DeploymentsAvailable","status":"False","reason":"NotOwned","message":"taken","lastTransitionTime":"2024-05-01T00:00:00Z"},
            {"type":"CreationSucceeded","status":"Unknown","lastTransitionTime":"2024-05-01T00:00:00Z"}
        ]
    });
    let status: StarStatus = serde_json::from_value(raw.clone()).unwrap();
    assert_eq!(status.observed_generation, Some(3));
    assert_eq!(status.get_condition(ConditionType::Ready).status, ConditionStatus::False);
    assert!(!status.is_ready());
    assert_eq!(serde_json::to_value(&status).unwrap(), raw);
}

#[test]
fn crd_metadata() {
    let crd = Star::crd();
    assert_eq!(crd.metadata.name.as_deref(), Some("stars.solar.my.dev"));
    assert_eq!(crd.spec.scope, "Namespaced");
    let version = &crd.spec.versions[0];
    assert_eq!(version.name, "v1alpha1");
    assert!(version.subresources.as_ref().and_then(|s| s.status.as_ref()).is_some());
}

#[test]
fn status_with_foreign_condition_type_deserializes() {
    let raw = json!({
        "conditions": [
            {"type":"Ready","status":"True","lastTransitionTime":"2024-05-01T00:00:00Z"},
            {"type":"Succeeded","status":"True","reason":"Done","lastTransitionTime":"2024-05-01T00:00:00Z"}
        ]
    });
    let status: StarStatus = serde_json::from_value(raw.clone()).unwrap();
    assert!(status.is_ready());
    assert_eq!(serde_json::to_value(&status).unwrap(), raw);
}
