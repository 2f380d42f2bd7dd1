use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;

use crate::kinds::{ChildObject, ManagedKind};

/// Observed child resources of one instance, read fresh at the start of a
/// pass. A kind missing from the map is absent from the store.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChildSnapshot {
    objects: BTreeMap<ManagedKind, ChildObject>,
}

impl ChildSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, object: ChildObject) {
        self.objects.insert(object.kind(), object);
    }

    pub fn with(mut self, object: ChildObject) -> Self {
        self.insert(object);
        self
    }

    pub fn get(&self, kind: ManagedKind) -> Option<&ChildObject> {
        self.objects.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn pvc(&self) -> Option<&PersistentVolumeClaim> {
        self.get(ManagedKind::PersistentVolumeClaim)
            .and_then(ChildObject::as_pvc)
    }

    pub fn job(&self) -> Option<&Job> {
        self.get(ManagedKind::Job).and_then(ChildObject::as_job)
    }

    pub fn deployment(&self) -> Option<&Deployment> {
        self.get(ManagedKind::Deployment)
            .and_then(ChildObject::as_deployment)
    }

    /// Storage claim exists and reports phase `Bound`.
    pub fn is_pvc_bound(&self) -> bool {
        self.pvc()
            .and_then(|p| p.status.as_ref())
            .and_then(|s| s.phase.as_deref())
            == Some("Bound")
    }

    /// Map-builder job exists and reports `Complete=True`.
    pub fn is_job_completed(&self) -> bool {
        self.job()
            .and_then(|j| j.status.as_ref())
            .and_then(|s| s.conditions.as_ref())
            .is_some_and(|conds| {
                conds
                    .iter()
                    .any(|c| c.type_ == "Complete" && c.status == "True")
            })
    }
}
