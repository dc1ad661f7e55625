use solar_operator::condition::{ConditionStatus, ConditionType};
use solar_operator::crd::{REASON_NOT_OWNED, REASON_UNAVAILABLE};
use solar_operator::test_support::{deleting, star, unowned_deployment, FakeCluster};
use solar_operator::{Error, StarStatus};

fn status(cluster: &FakeCluster, ns: &str, name: &str) -> StarStatus {
    cluster.stars.fetch(ns, name).and_then(|s| s.status).unwrap_or_default()
}

fn cond(st: &StarStatus, t: ConditionType) -> ConditionStatus { st.get_condition(t).status }

#[tokio::test]
async fn sol_scenario_creates_deployment_then_service() {
    let cluster = FakeCluster::new();
    cluster.stars.insert(star("ns", "sol"));
    let r = cluster.reconciler();

    r.reconcile("ns/sol").await.unwrap();
    let deps = cluster.created_deployments();
    assert_eq!(deps.len(), 1);
    let d = &deps[0];
    assert_eq!(d.metadata.namespace.as_deref(), Some("ns"));
    assert_eq!(d.metadata.name.as_deref(), Some("energy-source"));
    assert_eq!(d.metadata.owner_references.as_ref().unwrap()[0].name, "sol");
    let env = d.spec.as_ref().unwrap().template.spec.as_ref().unwrap().containers[0].env.clone().unwrap();
    assert!(env.iter().any(|e| e.name == "SOURCE" && e.value.as_deref() == Some("sol")));
    assert!(env.iter().any(|e| e.name == "PORT" && e.value.as_deref() == Some("8080")));
    assert!(cluster.created_services().is_empty());
    let st = status(&cluster, "ns", "sol");
    assert_eq!(cond(&st, ConditionType::DeploymentsAvailable), ConditionStatus::False);
    assert_eq!(st.get_condition(ConditionType::DeploymentsAvailable).reason, REASON_UNAVAILABLE);
    assert_eq!(cond(&st, ConditionType::Ready), ConditionStatus::False);
    assert_eq!(st.observed_generation, Some(1));

    cluster.make_deployment_available("ns");
    r.reconcile("ns/sol").await.unwrap();
    assert_eq!(cluster.created_services().len(), 1);
    let st = status(&cluster, "ns", "sol");
    assert_eq!(cond(&st, ConditionType::DeploymentsAvailable), ConditionStatus::True);
    assert_eq!(cond(&st, ConditionType::CreationSucceeded), ConditionStatus::True);
    assert!(st.is_ready());
    assert_eq!(cluster.events().len(), 2);
}

#[tokio::test]
async fn second_cycle_without_changes_writes_nothing() {
    let cluster = FakeCluster::new();
    cluster.stars.insert(star("ns", "sol"));
    let r = cluster.reconciler();
    r.reconcile("ns/sol").await.unwrap();
    let writes = cluster.status_writes().len();
    assert_eq!(writes, 1);
    let before = status(&cluster, "ns", "sol");
    r.reconcile("ns/sol").await.unwrap();
    assert_eq!(cluster.status_writes().len(), writes);
    assert_eq!(status(&cluster, "ns", "sol"), before);
    assert_eq!(cluster.created_deployments().len(), 1);
}

#[tokio::test]
async fn ready_never_regresses_on_healthy_cluster() {
    let cluster = FakeCluster::new();
    cluster.stars.insert(star("ns", "sol"));
    let r = cluster.reconciler();
    let mut seen = vec![cond(&status(&cluster, "ns", "sol"), ConditionType::Ready)];
    for i in 0..5 {
        if i == 1 { cluster.make_deployment_available("ns"); }
        r.reconcile("ns/sol").await.unwrap();
        seen.push(cond(&status(&cluster, "ns", "sol"), ConditionType::Ready));
    }
    seen.dedup();
    assert_eq!(seen, vec![ConditionStatus::Unknown, ConditionStatus::False, ConditionStatus::True]);
}

#[tokio::test]
async fn deleting_star_is_left_alone() {
    let cluster = FakeCluster::new();
    cluster.stars.insert(deleting(star("ns", "sol")));
    cluster.deployments.insert(unowned_deployment("ns"));
    cluster.reconciler().reconcile("ns/sol").await.unwrap();
    assert!(cluster.created_deployments().is_empty());
    assert!(cluster.created_services().is_empty());
    assert!(cluster.status_writes().is_empty());
    assert!(cluster.events().is_empty());
}

#[tokio::test]
async fn unowned_deployment_is_reported_not_adopted() {
    let cluster = FakeCluster::new();
    cluster.stars.insert(star("ns", "sol"));
    cluster.deployments.insert(unowned_deployment("ns"));
    let err = cluster.reconciler().reconcile("ns/sol").await.unwrap_err();
    assert!(matches!(err, Error::NotOwned { kind: "Deployment", .. }), "got {err}");
    assert!(cluster.created_deployments().is_empty());
    let st = status(&cluster, "ns", "sol");
    let dep = st.get_condition(ConditionType::DeploymentsAvailable);
    assert_eq!(dep.status, ConditionStatus::False);
    assert_eq!(dep.reason, REASON_NOT_OWNED);
    assert_eq!(st.get_condition(ConditionType::Ready).reason, REASON_NOT_OWNED);
    assert_eq!(st.observed_generation, None);
    assert!(cluster.events().is_empty());
}

#[tokio::test]
async fn unowned_service_is_reported() {
    let cluster = FakeCluster::new();
    let sol = star("ns", "sol");
    cluster.stars.insert(sol.clone());
    cluster.deployments.insert(solar_operator::test_support::available_deployment(&sol));
    let mut svc = solar_operator::convergence::desired_service(&sol).unwrap();
    svc.metadata.owner_references = None;
    cluster.services.insert(svc);
    let err = cluster.reconciler().reconcile("ns/sol").await.unwrap_err();
    assert!(matches!(err, Error::NotOwned { kind: "Service", .. }));
    let st = status(&cluster, "ns", "sol");
    assert_eq!(cond(&st, ConditionType::DeploymentsAvailable), ConditionStatus::True);
    assert_eq!(st.get_condition(ConditionType::CreationSucceeded).reason, REASON_NOT_OWNED);
    assert!(!st.is_ready());
}

#[tokio::test]
async fn missing_star_and_bad_keys_are_not_errors() {
    let cluster = FakeCluster::new();
    let r = cluster.reconciler();
    r.reconcile("ns/gone").await.unwrap();
    r.reconcile("no-namespace").await.unwrap();
    assert!(cluster.status_writes().is_empty());
}

#[tokio::test]
async fn create_failure_propagates_but_status_is_persisted() {
    let cluster = FakeCluster::new();
    cluster.stars.insert(star("ns", "sol"));
    cluster.fail_creates_with(500);
    let err = cluster.reconciler().reconcile("ns/sol").await.unwrap_err();
    assert!(matches!(err, Error::Kube(_)));
    let st = status(&cluster, "ns", "sol");
    assert_eq!(cond(&st, ConditionType::DeploymentsAvailable), ConditionStatus::False);
    assert_eq!(st.observed_generation, None);
}

#[tokio::test]
async fn lister_errors_propagate() {
    let cluster = FakeCluster::new();
    cluster.stars.insert(star("ns", "sol"));
    cluster.deployments.fail_with(503);
    let err = cluster.reconciler().reconcile("ns/sol").await.unwrap_err();
    assert!(matches!(err, Error::Kube(_)));
    assert!(cluster.created_deployments().is_empty());
}

#[tokio::test]
async fn status_conflict_is_retryable_error() {
    let cluster = FakeCluster::new();
    cluster.stars.insert(star("ns", "sol"));
    cluster.fail_status_with(409);
    let err = cluster.reconciler().reconcile("ns/sol").await.unwrap_err();
    assert!(err.is_conflict());
    assert!(cluster.status_writes().is_empty());
}

#[tokio::test]
async fn live_status_already_current_skips_write() {
    let cluster = FakeCluster::new();
    cluster.stars.insert(star("ns", "sol"));
    cluster.reconciler().reconcile("ns/sol").await.unwrap();
    assert_eq!(cluster.status_writes().len(), 1);

    // A cache lagging behind the status write: the cycle sees a diff, the live re-read does not.
    let mut lagging = cluster.stars.fetch("ns", "sol").unwrap();
    lagging.status.as_mut().unwrap().observed_generation = Some(0);
    lagging.metadata.resource_version = Some("1".into());
    let stale_cache = solar_operator::test_support::FakeLister::new();
    stale_cache.insert(lagging);
    let r = solar_operator::Reconciler::new(stale_cache, cluster.deployments.clone(), cluster.services.clone(), cluster.clone());
    r.reconcile("ns/sol").await.unwrap();
    assert_eq!(cluster.status_writes().len(), 1);
}

#[tokio::test]
async fn stale_cache_without_status_keeps_transition_times() {
    let cluster = FakeCluster::new();
    cluster.stars.insert(star("ns", "sol"));
    cluster.reconciler().reconcile("ns/sol").await.unwrap();
    assert_eq!(cluster.status_writes().len(), 1);

    // Pin the live times so any rewrite is visible regardless of clock resolution.
    let mut live = cluster.stars.fetch("ns", "sol").unwrap();
    live.status.as_mut().unwrap().conditions.iter_mut().for_each(|c| c.last_transition_time = Some("2020-01-01T00:00:00Z".into()));
    cluster.stars.insert(live.clone());

    // The cache still holds the Star as it was before the first status write.
    let stale_cache = solar_operator::test_support::FakeLister::new();
    stale_cache.insert(star("ns", "sol"));
    let r = solar_operator::Reconciler::new(stale_cache, cluster.deployments.clone(), cluster.services.clone(), cluster.clone());
    r.reconcile("ns/sol").await.unwrap();

    assert_eq!(cluster.status_writes().len(), 1);
    assert_eq!(cluster.stars.fetch("ns", "sol").unwrap().status, live.status);
    assert_eq!(cluster.events().len(), 1);
}

#[tokio::test]
async fn unchanged_cycle_publishes_no_event() {
    let cluster = FakeCluster::new();
    cluster.stars.insert(star("ns", "sol"));
    let r = cluster.reconciler();
    r.reconcile("ns/sol").await.unwrap();
    assert_eq!(cluster.events().len(), 1);
    r.reconcile("ns/sol").await.unwrap();
    r.reconcile("ns/sol").await.unwrap();
    assert_eq!(cluster.events().len(), 1);
}

#[tokio::test]
async fn service_create_failure_propagates_but_status_is_persisted() {
    let cluster = FakeCluster::new();
    let sol = star("ns", "sol");
    cluster.stars.insert(sol.clone());
    cluster.deployments.insert(solar_operator::test_support::available_deployment(&sol));
    cluster.fail_creates_with(500);
    let err = cluster.reconciler().reconcile("ns/sol").await.unwrap_err();
    assert!(matches!(err, Error::Kube(_)), "got {err}");
    assert!(cluster.created_services().is_empty());
    assert_eq!(cluster.status_writes().len(), 1);
    let st = status(&cluster, "ns", "sol");
    assert_eq!(cond(&st, ConditionType::DeploymentsAvailable), ConditionStatus::True);
    let svc = st.get_condition(ConditionType::CreationSucceeded);
    assert_eq!(svc.status, ConditionStatus::False);
    assert_eq!(svc.reason, REASON_UNAVAILABLE);
    assert!(!st.is_ready());
    assert_eq!(st.observed_generation, None);
}

#[tokio::test]
async fn star_deleted_before_status_write_is_retryable() {
    let cluster = FakeCluster::new();
    let cache = solar_operator::test_support::FakeLister::new();
    cache.insert(star("ns", "sol"));
    let r = solar_operator::Reconciler::new(cache, cluster.deployments.clone(), cluster.services.clone(), cluster.clone());
    let err = r.reconcile("ns/sol").await.unwrap_err();
    assert!(err.is_not_found(), "got {err}");
    assert!(cluster.status_writes().is_empty());
    assert!(cluster.events().is_empty());
}
