mod common;

use std::time::Duration;

use common::Harness;
use kube::ResourceExt;
use kube::runtime::controller::Action;
use valhalla_operator::controller::ReconcileErr;
use valhalla_operator::crd::{ConditionStatus, ConditionType, Phase};
use valhalla_operator::kinds::ManagedKind;
use valhalla_operator::store::{StoreError, StoreOp};

#[test_log::test(tokio::test)]
async fn status_conflict_requeues_without_error() {
    let h = Harness::new();
    h.create().await;
    h.store.inject_conflicts(StoreOp::UpdateInstanceStatus, 1).await;

    let out = h.pass().await.unwrap();
    assert_eq!(out, Action::requeue(Duration::from_secs(2)));
    // the pass ended before the finalizer step
    assert!(h.instance().await.finalizers().is_empty());

    h.pass().await.unwrap();
    assert!(h.instance().await.has_finalizer());
}

#[test_log::test(tokio::test)]
async fn status_conflict_after_apply_requeues() {
    let h = Harness::new();
    h.create().await;
    h.pass().await.unwrap();

    h.store.inject_conflicts(StoreOp::UpdateInstanceStatus, 1).await;
    let out = h.pass().await.unwrap();
    assert_eq!(out, Action::requeue(Duration::from_secs(2)));
    assert_eq!(h.kinds().await.len(), 2);
    // phase was not recorded; the next pass catches up
    assert_eq!(h.instance().await.phase(), Phase::Empty);
    h.pass().await.unwrap();
    assert_eq!(h.instance().await.phase(), Phase::MapBuilding);
}

#[test_log::test(tokio::test)]
async fn child_conflicts_within_bound_are_absorbed() {
    let h = Harness::new();
    h.create().await;
    h.pass().await.unwrap();

    h.store.inject_conflicts(StoreOp::CreateChild, 3).await;
    h.pass().await.unwrap();
    assert_eq!(
        h.kinds().await,
        vec![ManagedKind::PersistentVolumeClaim, ManagedKind::Job]
    );
    assert_eq!(
        h.condition(ConditionType::ReconciliationSuccess).await.status,
        ConditionStatus::True
    );
}

#[test_log::test(tokio::test)]
async fn exhausted_conflicts_fail_the_pass_but_phase_still_moves() {
    let h = Harness::new();
    h.create().await;
    h.pass().await.unwrap();

    h.store.inject_conflicts(StoreOp::CreateChild, 5).await;
    let err = h.pass().await.unwrap_err();
    assert!(matches!(
        err,
        ReconcileErr::ConflictRetriesExhausted { kind: ManagedKind::PersistentVolumeClaim, attempts: 5, .. }
    ));
    assert!(h.kinds().await.is_empty());

    let status = h.status().await;
    assert_eq!(status.phase, Phase::MapBuilding);
    let rs = status.condition(ConditionType::ReconciliationSuccess).unwrap();
    assert_eq!(rs.status, ConditionStatus::False);
    assert_eq!(rs.reason.as_deref(), Some("Error"));
    assert!(rs.message.as_deref().unwrap().contains("PersistentVolumeClaim"));

    // next pass converges
    h.pass().await.unwrap();
    assert_eq!(h.kinds().await.len(), 2);
    assert_eq!(
        h.condition(ConditionType::ReconciliationSuccess).await.status,
        ConditionStatus::True
    );
}

#[test_log::test(tokio::test)]
async fn store_error_mid_plan_is_recorded() {
    let h = Harness::new();
    h.create().await;
    h.pass().await.unwrap();

    // the first create (the claim) fails with a non-conflict error
    h.store.inject_error(StoreOp::CreateChild, StoreError::Other("quota exceeded".into())).await;
    let err = h.pass().await.unwrap_err();
    assert!(matches!(err, ReconcileErr::Store(StoreError::Other(_))));
    let rs = h.condition(ConditionType::ReconciliationSuccess).await;
    assert_eq!(rs.status, ConditionStatus::False);
    assert!(rs.message.as_deref().unwrap().contains("quota exceeded"));
}

#[test_log::test(tokio::test)]
async fn invalid_spec_is_a_build_error() {
    let h = Harness::new();
    h.create().await;
    h.pass().await.unwrap();
    h.store
        .edit_instance(common::NS, common::NAME, |vh| vh.spec.pbf_url = "ftp://nowhere/x.pbf".into())
        .await
        .unwrap();

    let err = h.pass().await.unwrap_err();
    assert!(matches!(err, ReconcileErr::Build(_)));
    assert!(h.kinds().await.is_empty());
    let rs = h.condition(ConditionType::ReconciliationSuccess).await;
    assert_eq!(rs.status, ConditionStatus::False);
    assert!(rs.message.as_deref().unwrap().contains("pbfUrl"));
    // the phase machine does not depend on apply outcome
    assert_eq!(h.instance().await.phase(), Phase::MapBuilding);
}
