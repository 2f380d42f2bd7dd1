#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use k8s_openapi::api::apps::v1::{DeploymentCondition, DeploymentStatus};
use k8s_openapi::api::batch::v1::{JobCondition, JobStatus};
use k8s_openapi::api::core::v1::PersistentVolumeClaimStatus;
use kube::runtime::controller::Action;
use valhalla_operator::config::{OperatorConfig, RetryConfig};
use valhalla_operator::controller::{ControllerContext, ReconcileErr, reconcile_pass};
use valhalla_operator::crd::{
    Condition, ConditionType, PersistenceSpec, Valhalla, ValhallaSpec,
    ValhallaStatus,
};
use valhalla_operator::kinds::{ChildObject, ManagedKind};
use valhalla_operator::store::MemoryStore;
use valhalla_operator::templates::child_name;

pub const NS: &str = "maps";
pub const NAME: &str = "andorra";

pub fn spec() -> ValhallaSpec {
    ValhallaSpec {
        pbf_url: "https://download.geofabrik.de/europe/andorra-latest.osm.pbf".into(),
        persistence: PersistenceSpec {
            storage_class_name: None,
            storage: "1Gi".into(),
        },
        min_replicas: Some(1),
        max_replicas: Some(3),
        ..Default::default()
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn t1() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 5, 0).unwrap()
}

pub fn test_config() -> OperatorConfig {
    OperatorConfig {
        retry: RetryConfig {
            conflict_retries: 5,
            conflict_backoff_ms: 1,
        },
        ..Default::default()
    }
}

pub struct Harness {
    pub store: MemoryStore,
    pub ctx: ControllerContext,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_clock(t0)
    }

    pub fn with_clock(clock: fn() -> DateTime<Utc>) -> Self {
        let store = MemoryStore::new();
        let ctx = ControllerContext::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            test_config(),
        )
        .with_clock(clock);
        Self { store, ctx }
    }

    /// Same store observed through a different clock.
    pub fn at(&self, clock: fn() -> DateTime<Utc>) -> ControllerContext {
        self.ctx.clone().with_clock(clock)
    }

    pub async fn create(&self) -> Valhalla {
        let mut vh = Valhalla::new(NAME, spec());
        vh.metadata.namespace = Some(NS.into());
        self.store.create_instance(vh).await
    }

    pub async fn pass(&self) -> Result<Action, ReconcileErr> {
        reconcile_pass(&self.ctx, NS, NAME).await
    }

    /// Run passes until the instance has its finalizer and the first apply
    /// has happened.
    pub async fn bootstrap(&self) -> Valhalla {
        self.create().await;
        self.pass().await.unwrap();
        self.pass().await.unwrap();
        self.instance().await
    }

    pub async fn instance(&self) -> Valhalla {
        self.store.instance(NS, NAME).await.expect("instance present")
    }

    pub async fn status(&self) -> ValhallaStatus {
        self.instance().await.status.unwrap_or_default()
    }

    pub async fn condition(&self, t: ConditionType) -> Condition {
        self.status()
            .await
            .condition(t)
            .cloned()
            .expect("condition present")
    }

    pub async fn child(&self, kind: ManagedKind) -> Option<ChildObject> {
        self.store.child(kind, NS, &child_name(NAME, kind)).await
    }

    pub async fn kinds(&self) -> Vec<ManagedKind> {
        let mut kinds = self.store.child_kinds(NS).await;
        kinds.sort();
        kinds
    }

    pub async fn bind_pvc(&self) {
        let kind = ManagedKind::PersistentVolumeClaim;
        assert!(
            self.store
                .edit_child_status(kind, NS, &child_name(NAME, kind), |obj| {
                    if let ChildObject::PersistentVolumeClaim(p) = obj {
                        p.status = Some(PersistentVolumeClaimStatus {
                            phase: Some("Bound".into()),
                            ..Default::default()
                        });
                    }
                })
                .await
        );
    }

    pub async fn complete_job(&self) {
        let kind = ManagedKind::Job;
        assert!(
            self.store
                .edit_child_status(kind, NS, &child_name(NAME, kind), |obj| {
                    if let ChildObject::Job(j) = obj {
                        j.status = Some(JobStatus {
                            succeeded: Some(1),
                            conditions: Some(vec![JobCondition {
                                type_: "Complete".into(),
                                status: "True".into(),
                                ..Default::default()
                            }]),
                            ..Default::default()
                        });
                    }
                })
                .await
        );
    }

    pub async fn set_deployment_ready(&self, ready: i32, available: bool) {
        let kind = ManagedKind::Deployment;
        assert!(
            self.store
                .edit_child_status(kind, NS, &child_name(NAME, kind), |obj| {
                    if let ChildObject::Deployment(d) = obj {
                        d.status = Some(DeploymentStatus {
                            ready_replicas: Some(ready),
                            conditions: Some(vec![DeploymentCondition {
                                type_: "Available".into(),
                                status: if available { "True" } else { "False" }.into(),
                                message: Some("Deployment has minimum availability.".into()),
                                ..Default::default()
                            }]),
                            ..Default::default()
                        });
                    }
                })
                .await
        );
    }

    pub async fn set_annotation(&self, key: &str, value: &str) {
        self.store
            .edit_instance(NS, NAME, |vh| {
                vh.metadata
                    .annotations
                    .get_or_insert_with(Default::default)
                    .insert(key.to_string(), value.to_string());
            })
            .await
            .expect("instance present");
    }
}
