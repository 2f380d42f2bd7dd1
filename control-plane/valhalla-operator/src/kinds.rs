use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Service};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    ObjectMeta, OwnerReference,
};

/// Child kinds managed for every instance, in dependency order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ManagedKind {
    PersistentVolumeClaim,
    Job,
    Deployment,
    Service,
    HorizontalPodAutoscaler,
    PodDisruptionBudget,
    CronJob,
}

impl ManagedKind {
    pub const ALL: [ManagedKind; 7] = [
        ManagedKind::PersistentVolumeClaim,
        ManagedKind::Job,
        ManagedKind::Deployment,
        ManagedKind::Service,
        ManagedKind::HorizontalPodAutoscaler,
        ManagedKind::PodDisruptionBudget,
        ManagedKind::CronJob,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ManagedKind::PersistentVolumeClaim => "PersistentVolumeClaim",
            ManagedKind::Job => "Job",
            ManagedKind::Deployment => "Deployment",
            ManagedKind::Service => "Service",
            ManagedKind::HorizontalPodAutoscaler => "HorizontalPodAutoscaler",
            ManagedKind::PodDisruptionBudget => "PodDisruptionBudget",
            ManagedKind::CronJob => "CronJob",
        }
    }
}

impl std::fmt::Display for ManagedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A child object of one of the managed kinds.
#[derive(Clone, Debug, PartialEq)]
pub enum ChildObject {
    PersistentVolumeClaim(PersistentVolumeClaim),
    Job(Job),
    Deployment(Deployment),
    Service(Service),
    HorizontalPodAutoscaler(HorizontalPodAutoscaler),
    PodDisruptionBudget(PodDisruptionBudget),
    CronJob(CronJob),
}

macro_rules! each_variant {
    ($value:expr, $obj:ident => $body:expr) => {
        match $value {
            ChildObject::PersistentVolumeClaim($obj) => $body,
            ChildObject::Job($obj) => $body,
            ChildObject::Deployment($obj) => $body,
            ChildObject::Service($obj) => $body,
            ChildObject::HorizontalPodAutoscaler($obj) => $body,
            ChildObject::PodDisruptionBudget($obj) => $body,
            ChildObject::CronJob($obj) => $body,
        }
    };
}

impl ChildObject {
    /// Minimal identity object (name + namespace only) of the given kind.
    pub fn empty(kind: ManagedKind, namespace: &str, name: &str) -> Self {
        let metadata = ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        };
        match kind {
            ManagedKind::PersistentVolumeClaim => {
                ChildObject::PersistentVolumeClaim(PersistentVolumeClaim {
                    metadata,
                    ..Default::default()
                })
            }
            ManagedKind::Job => ChildObject::Job(Job {
                metadata,
                ..Default::default()
            }),
            ManagedKind::Deployment => ChildObject::Deployment(Deployment {
                metadata,
                ..Default::default()
            }),
            ManagedKind::Service => ChildObject::Service(Service {
                metadata,
                ..Default::default()
            }),
            ManagedKind::HorizontalPodAutoscaler => {
                ChildObject::HorizontalPodAutoscaler(HorizontalPodAutoscaler {
                    metadata,
                    ..Default::default()
                })
            }
            ManagedKind::PodDisruptionBudget => {
                ChildObject::PodDisruptionBudget(PodDisruptionBudget {
                    metadata,
                    ..Default::default()
                })
            }
            ManagedKind::CronJob => ChildObject::CronJob(CronJob {
                metadata,
                ..Default::default()
            }),
        }
    }

    pub fn kind(&self) -> ManagedKind {
        match self {
            ChildObject::PersistentVolumeClaim(_) => {
                ManagedKind::PersistentVolumeClaim
            }
            ChildObject::Job(_) => ManagedKind::Job,
            ChildObject::Deployment(_) => ManagedKind::Deployment,
            ChildObject::Service(_) => ManagedKind::Service,
            ChildObject::HorizontalPodAutoscaler(_) => {
                ManagedKind::HorizontalPodAutoscaler
            }
            ChildObject::PodDisruptionBudget(_) => {
                ManagedKind::PodDisruptionBudget
            }
            ChildObject::CronJob(_) => ManagedKind::CronJob,
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        each_variant!(self, o => &o.metadata)
    }

    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        each_variant!(self, o => &mut o.metadata)
    }

    pub fn name(&self) -> &str {
        self.meta().name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.meta().namespace.as_deref().unwrap_or_default()
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.meta().resource_version.as_deref()
    }

    /// Whether the object has been persisted by a store at least once.
    pub fn is_persisted(&self) -> bool {
        self.resource_version().is_some()
    }

    /// Add `owner` to the owner references unless an entry with the same
    /// uid is already present.
    pub fn ensure_owner(&mut self, owner: &OwnerReference) {
        let refs = self.meta_mut().owner_references.get_or_insert_with(Vec::new);
        if !refs.iter().any(|r| r.uid == owner.uid) {
            refs.push(owner.clone());
        }
    }

    pub fn is_owned_by(&self, uid: &str) -> bool {
        self.meta()
            .owner_references
            .as_ref()
            .is_some_and(|refs| refs.iter().any(|r| r.uid == uid))
    }

    /// Copy the observed status of `other` (same kind) onto this object.
    /// Writes through the main resource never change status.
    pub fn copy_status_from(&mut self, other: &ChildObject) {
        match (self, other) {
            (
                ChildObject::PersistentVolumeClaim(a),
                ChildObject::PersistentVolumeClaim(b),
            ) => a.status = b.status.clone(),
            (ChildObject::Job(a), ChildObject::Job(b)) => {
                a.status = b.status.clone()
            }
            (ChildObject::Deployment(a), ChildObject::Deployment(b)) => {
                a.status = b.status.clone()
            }
            (ChildObject::Service(a), ChildObject::Service(b)) => {
                a.status = b.status.clone()
            }
            (
                ChildObject::HorizontalPodAutoscaler(a),
                ChildObject::HorizontalPodAutoscaler(b),
            ) => a.status = b.status.clone(),
            (
                ChildObject::PodDisruptionBudget(a),
                ChildObject::PodDisruptionBudget(b),
            ) => a.status = b.status.clone(),
            (ChildObject::CronJob(a), ChildObject::CronJob(b)) => {
                a.status = b.status.clone()
            }
            _ => {}
        }
    }

    pub fn as_pvc(&self) -> Option<&PersistentVolumeClaim> {
        match self {
            ChildObject::PersistentVolumeClaim(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_job(&self) -> Option<&Job> {
        match self {
            ChildObject::Job(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_deployment(&self) -> Option<&Deployment> {
        match self {
            ChildObject::Deployment(o) => Some(o),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(uid: &str) -> OwnerReference {
        OwnerReference {
            api_version: "valhalla.oaas.io/v1alpha1".into(),
            kind: "Valhalla".into(),
            name: "vh".into(),
            uid: uid.into(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    #[test]
    fn empty_objects_carry_identity_and_kind() {
        for kind in ManagedKind::ALL {
            let obj = ChildObject::empty(kind, "ns", "vh");
            assert_eq!(obj.kind(), kind);
            assert_eq!(obj.name(), "vh");
            assert_eq!(obj.namespace(), "ns");
            assert!(!obj.is_persisted());
        }
    }

    #[test]
    fn ensure_owner_is_idempotent() {
        let mut obj = ChildObject::empty(ManagedKind::Service, "ns", "vh");
        obj.ensure_owner(&owner("u1"));
        obj.ensure_owner(&owner("u1"));
        assert_eq!(obj.meta().owner_references.as_ref().unwrap().len(), 1);
        assert!(obj.is_owned_by("u1"));
        assert!(!obj.is_owned_by("u2"));
    }
}
