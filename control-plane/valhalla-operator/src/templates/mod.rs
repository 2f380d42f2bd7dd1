mod converge;
pub mod cron_job;
pub mod deployment;
pub mod hpa;
pub mod job;
pub mod manager;
pub mod pdb;
pub mod pvc;
pub mod service;

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    PersistentVolumeClaimVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

pub use cron_job::CronJobBuilder;
pub use deployment::DeploymentBuilder;
pub use hpa::HpaBuilder;
pub use job::JobBuilder;
pub use manager::ResourcePlanner;
pub use pdb::PdbBuilder;
pub use pvc::PvcBuilder;
pub use service::ServiceBuilder;

use crate::config::ImagesConfig;
use crate::controller::fsm::ChildSnapshot;
use crate::crd::{SpecError, Valhalla};
use crate::kinds::{ChildObject, ManagedKind};

/// Mount point of the shared tile volume in every pod.
pub const DATA_PATH: &str = "/data";
/// Port the serving workers listen on.
pub const WORKER_PORT: i32 = 8002;

pub const APP_LABEL: &str = "app";
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const INSTANCE_LABEL: &str = "valhalla.oaas.io/instance";
pub const MANAGER_NAME: &str = "valhalla-operator";

#[derive(thiserror::Error, Debug)]
pub enum TemplateError {
    #[error("invalid spec: {0}")]
    InvalidSpec(#[from] SpecError),
    #[error("builder for {expected} got a {found} object")]
    KindMismatch {
        expected: ManagedKind,
        found: ManagedKind,
    },
}

/// Child name of `kind` for the instance `instance_name`.
pub fn child_name(instance_name: &str, kind: ManagedKind) -> String {
    match name_suffix(kind) {
        "" => instance_name.to_string(),
        suffix => format!("{instance_name}-{suffix}"),
    }
}

fn name_suffix(kind: ManagedKind) -> &'static str {
    match kind {
        ManagedKind::Job => "builder",
        ManagedKind::CronJob => "predicted-traffic-fetcher",
        _ => "",
    }
}

/// Identity of a planned child resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub kind: ManagedKind,
    pub namespace: String,
    pub name: String,
}

/// Inputs shared by every builder of one instance.
#[derive(Clone, Copy, Debug)]
pub struct BuildContext<'a> {
    pub instance: &'a Valhalla,
    pub images: &'a ImagesConfig,
}

impl<'a> BuildContext<'a> {
    pub fn new(instance: &'a Valhalla, images: &'a ImagesConfig) -> Self {
        Self { instance, images }
    }

    pub fn namespace(&self) -> String {
        self.instance.namespace().unwrap_or_default()
    }

    pub fn instance_name(&self) -> String {
        self.instance.name_any()
    }

    pub fn name_of(&self, kind: ManagedKind) -> String {
        child_name(&self.instance_name(), kind)
    }

    pub fn descriptor(&self, kind: ManagedKind) -> ResourceDescriptor {
        ResourceDescriptor {
            kind,
            namespace: self.namespace(),
            name: self.name_of(kind),
        }
    }

    /// Selector labels of the serving pods.
    pub fn selector_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(
            APP_LABEL.to_string(),
            self.name_of(ManagedKind::Deployment),
        )])
    }

    /// Labels stamped on every child object.
    pub fn common_labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.selector_labels();
        labels.insert(MANAGED_BY_LABEL.into(), MANAGER_NAME.into());
        labels.insert(INSTANCE_LABEL.into(), self.instance_name());
        labels
    }

    pub fn worker_image(&self) -> String {
        self.instance
            .spec
            .image
            .clone()
            .unwrap_or_else(|| self.images.worker.clone())
    }

    pub fn builder_image(&self) -> String {
        self.instance
            .spec
            .image
            .clone()
            .unwrap_or_else(|| self.images.builder.clone())
    }

    pub fn traffic_fetcher_image(&self) -> String {
        self.instance
            .spec
            .predicted_traffic
            .as_ref()
            .and_then(|p| p.image.clone())
            .unwrap_or_else(|| self.images.traffic_fetcher.clone())
    }

    /// Volume backed by the instance's storage claim, named after the claim.
    pub fn data_volume(&self, read_only: bool) -> (Volume, VolumeMount) {
        let claim = self.name_of(ManagedKind::PersistentVolumeClaim);
        let volume = Volume {
            name: claim.clone(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: claim.clone(),
                read_only: read_only.then_some(true),
            }),
            ..Default::default()
        };
        let mount = VolumeMount {
            name: claim,
            mount_path: DATA_PATH.into(),
            read_only: read_only.then_some(true),
            ..Default::default()
        };
        (volume, mount)
    }
}

/// One managed child kind: how to create it, how to converge it, and when it
/// may exist at all.
pub trait ResourceBuilder: Send + Sync {
    fn descriptor(&self) -> ResourceDescriptor;

    /// Fresh identity object for creation. Desired state is filled in by
    /// [`ResourceBuilder::update`].
    fn build(&self) -> ChildObject {
        let d = self.descriptor();
        ChildObject::empty(d.kind, &d.namespace, &d.name)
    }

    /// Converge `object` to desired state in place. Must be deterministic and
    /// idempotent: applying it to its own output changes nothing.
    fn update(&self, object: &mut ChildObject) -> Result<(), TemplateError>;

    /// Gate over the snapshot taken at the start of the pass.
    fn should_deploy(&self, snapshot: &ChildSnapshot) -> bool;

    fn kind(&self) -> ManagedKind {
        self.descriptor().kind
    }
}

/// Merge `labels` into the object's labels. Foreign keys are kept.
pub(crate) fn merge_labels(meta: &mut ObjectMeta, labels: BTreeMap<String, String>) {
    meta.labels.get_or_insert_with(BTreeMap::new).extend(labels);
}

pub(crate) fn mismatch(expected: ManagedKind, found: &ChildObject) -> TemplateError {
    TemplateError::KindMismatch {
        expected,
        found: found.kind(),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_names_follow_kind_suffixes() {
        assert_eq!(child_name("vh", ManagedKind::PersistentVolumeClaim), "vh");
        assert_eq!(child_name("vh", ManagedKind::Deployment), "vh");
        assert_eq!(child_name("vh", ManagedKind::Job), "vh-builder");
        assert_eq!(
            child_name("vh", ManagedKind::CronJob),
            "vh-predicted-traffic-fetcher"
        );
    }

    #[test]
    fn common_labels_include_selector() {
        let vh = test_support::instance();
        let images = ImagesConfig::default();
        let ctx = BuildContext::new(&vh, &images);
        let labels = ctx.common_labels();
        assert_eq!(labels.get(APP_LABEL).map(String::as_str), Some("andorra"));
        assert_eq!(
            labels.get(MANAGED_BY_LABEL).map(String::as_str),
            Some(MANAGER_NAME)
        );
        assert_eq!(ctx.descriptor(ManagedKind::Job).namespace, "maps");
    }

    #[test]
    fn image_override_applies_to_worker_and_builder() {
        let mut vh = test_support::instance();
        let images = ImagesConfig::default();
        assert_eq!(BuildContext::new(&vh, &images).worker_image(), images.worker);

        vh.spec.image = Some("custom/valhalla:3".into());
        let ctx = BuildContext::new(&vh, &images);
        assert_eq!(ctx.worker_image(), "custom/valhalla:3");
        assert_eq!(ctx.builder_image(), "custom/valhalla:3");
        assert_eq!(ctx.traffic_fetcher_image(), images.traffic_fetcher);
    }
}
