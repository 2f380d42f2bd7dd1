mod common;

use common::{Harness, NAME, NS};
use kube::ResourceExt;
use kube::runtime::controller::Action;
use valhalla_operator::controller::{ReconcileErr, reconcile_pass};
use valhalla_operator::crd::{ConditionStatus, ConditionType, FINALIZER, Phase};
use valhalla_operator::kinds::ManagedKind;
use valhalla_operator::store::{StoreError, StoreOp};

#[test_log::test(tokio::test)]
async fn fresh_instance_gets_finalizer_then_claim_and_builder() {
    let h = Harness::new();
    h.create().await;

    // pass 1: finalizer only
    assert_eq!(h.pass().await.unwrap(), Action::await_change());
    let vh = h.instance().await;
    assert!(vh.finalizers().iter().any(|f| f == FINALIZER));
    assert_eq!(vh.phase(), Phase::Empty);
    assert!(h.kinds().await.is_empty());

    // pass 2: phase advances, storage claim and map builder appear
    h.pass().await.unwrap();
    assert_eq!(h.instance().await.phase(), Phase::MapBuilding);
    assert_eq!(
        h.kinds().await,
        vec![ManagedKind::PersistentVolumeClaim, ManagedKind::Job]
    );

    let job = h.child(ManagedKind::Job).await.unwrap();
    assert_eq!(job.name(), "andorra-builder");
    assert!(job.is_owned_by(&h.instance().await.uid().unwrap()));
}

#[test_log::test(tokio::test)]
async fn completed_builder_moves_to_serving_and_deploys_workers() {
    let h = Harness::new();
    h.bootstrap().await;

    // a bound claim alone changes nothing while the builder runs
    h.bind_pvc().await;
    h.pass().await.unwrap();
    assert_eq!(h.instance().await.phase(), Phase::MapBuilding);
    assert_eq!(h.kinds().await.len(), 2);

    h.complete_job().await;
    h.pass().await.unwrap();
    assert_eq!(h.instance().await.phase(), Phase::Serving);
    let kinds = h.kinds().await;
    for k in [
        ManagedKind::Deployment,
        ManagedKind::Service,
        ManagedKind::HorizontalPodAutoscaler,
    ] {
        assert!(kinds.contains(&k), "missing {k}");
    }

    h.set_deployment_ready(1, true).await;
    h.pass().await.unwrap();
    let available = h.condition(ConditionType::Available).await;
    assert_eq!(available.status, ConditionStatus::True);
    assert_eq!(
        available.message.as_deref(),
        Some("Deployment has minimum availability.")
    );
    assert_eq!(
        h.condition(ConditionType::AllReplicasReady).await.status,
        ConditionStatus::True
    );
}

#[test_log::test(tokio::test)]
async fn autoscaling_follows_builder_even_without_bound_claim() {
    let h = Harness::new();
    h.bootstrap().await;
    h.complete_job().await;
    h.pass().await.unwrap();

    let kinds = h.kinds().await;
    assert!(kinds.contains(&ManagedKind::HorizontalPodAutoscaler));
    assert!(kinds.contains(&ManagedKind::PodDisruptionBudget));
    assert!(!kinds.contains(&ManagedKind::Deployment));
    assert!(!kinds.contains(&ManagedKind::CronJob));
}

#[test_log::test(tokio::test)]
async fn deletion_marks_cleanup_releases_finalizer_and_cascades() {
    let h = Harness::new();
    h.bootstrap().await;
    h.bind_pvc().await;
    h.complete_job().await;
    h.pass().await.unwrap();
    assert!(!h.kinds().await.is_empty());

    h.store.delete_instance(NS, NAME).await;
    // finalizer still holds the instance
    let marked = h.instance().await;
    assert!(marked.is_being_deleted());

    // first attempt fails to release the finalizer; the instance must stay
    h.store
        .inject_error(StoreOp::UpdateInstance, StoreError::Other("apiserver down".into()))
        .await;
    assert!(h.pass().await.is_err());
    let held = h.instance().await;
    assert!(held.has_finalizer());
    let available = h.condition(ConditionType::Available).await;
    assert_eq!(available.status, ConditionStatus::False);
    assert_eq!(available.reason.as_deref(), Some("Cleanup"));

    h.pass().await.unwrap();
    assert!(h.store.instance(NS, NAME).await.is_none());
    assert!(h.kinds().await.is_empty());

    // absent is terminal
    h.store.reset_calls().await;
    assert_eq!(h.pass().await.unwrap(), Action::await_change());
    assert_eq!(h.store.write_count().await, 0);
}

/// Marks the instance deleted and edits its spec afterwards, so cleanup has a
/// newer generation to record.
async fn delete_with_pending_generation(h: &Harness, extra_finalizer: bool) {
    h.bootstrap().await;
    if extra_finalizer {
        h.store
            .edit_instance(NS, NAME, |vh| {
                vh.finalizers_mut().push("example.com/hold".into())
            })
            .await
            .unwrap();
    }
    h.store.delete_instance(NS, NAME).await;
    h.store
        .edit_instance(NS, NAME, |vh| vh.spec.max_replicas = Some(5))
        .await
        .unwrap();
}

#[test_log::test(tokio::test)]
async fn final_generation_write_ignores_vanished_instance() {
    let h = Harness::new();
    delete_with_pending_generation(&h, false).await;

    h.pass().await.unwrap();
    assert!(h.store.instance(NS, NAME).await.is_none());
}

#[test_log::test(tokio::test)]
async fn final_generation_write_ignores_conflict() {
    let h = Harness::new();
    delete_with_pending_generation(&h, true).await;
    // first status write records Cleanup; the second is the generation write
    h.store
        .inject_error_after(
            StoreOp::UpdateInstanceStatus,
            1,
            StoreError::Conflict("stale".into()),
        )
        .await;

    h.pass().await.unwrap();
    let vh = h.instance().await;
    assert!(!vh.has_finalizer());
    assert_eq!(vh.status.unwrap().observed_generation, Some(1));
}

#[test_log::test(tokio::test)]
async fn final_generation_write_propagates_other_errors() {
    let h = Harness::new();
    delete_with_pending_generation(&h, true).await;
    h.store
        .inject_error_after(
            StoreOp::UpdateInstanceStatus,
            1,
            StoreError::Other("etcd unavailable".into()),
        )
        .await;

    let err = h.pass().await.unwrap_err();
    assert!(matches!(err, ReconcileErr::Store(StoreError::Other(_))));
    assert!(!h.instance().await.has_finalizer());

    // with the store healthy again the generation is recorded
    h.pass().await.unwrap();
    let vh = h.instance().await;
    assert_eq!(vh.status.unwrap().observed_generation, vh.metadata.generation);
}

#[test_log::test(tokio::test)]
async fn missing_instance_is_a_no_op() {
    let h = Harness::new();
    let out = reconcile_pass(&h.ctx, NS, "nope").await.unwrap();
    assert_eq!(out, Action::await_change());
    assert_eq!(h.store.write_count().await, 0);
    assert_eq!(h.store.calls(StoreOp::GetChild).await, 0);
}

#[test_log::test(tokio::test)]
async fn spec_edit_reaches_children() {
    let h = Harness::new();
    h.bootstrap().await;
    h.bind_pvc().await;
    h.complete_job().await;
    h.pass().await.unwrap();

    h.store
        .edit_instance(NS, NAME, |vh| vh.spec.max_replicas = Some(7))
        .await
        .unwrap();
    h.pass().await.unwrap();

    let hpa = h.child(ManagedKind::HorizontalPodAutoscaler).await.unwrap();
    let valhalla_operator::kinds::ChildObject::HorizontalPodAutoscaler(hpa) = hpa else {
        panic!("not an hpa");
    };
    assert_eq!(hpa.spec.unwrap().max_replicas, 7);
    let vh = h.instance().await;
    assert_eq!(vh.status.unwrap().observed_generation, vh.metadata.generation);
}
