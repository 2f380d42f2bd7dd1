use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    PersistentVolumeClaimSpec, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use super::{
    BuildContext, ResourceBuilder, ResourceDescriptor, TemplateError,
    merge_labels, mismatch,
};
use crate::controller::fsm::ChildSnapshot;
use crate::kinds::{ChildObject, ManagedKind};

/// Shared tile volume. Created first so the map builder has somewhere to
/// write.
pub struct PvcBuilder<'a> {
    ctx: BuildContext<'a>,
}

impl<'a> PvcBuilder<'a> {
    pub fn new(ctx: BuildContext<'a>) -> Self {
        Self { ctx }
    }

    fn desired_spec(&self) -> PersistentVolumeClaimSpec {
        let persistence = &self.ctx.instance.spec.persistence;
        PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".into()]),
            storage_class_name: persistence.storage_class_name.clone(),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(persistence.storage.clone()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

impl ResourceBuilder for PvcBuilder<'_> {
    fn descriptor(&self) -> ResourceDescriptor {
        self.ctx.descriptor(ManagedKind::PersistentVolumeClaim)
    }

    fn update(&self, object: &mut ChildObject) -> Result<(), TemplateError> {
        let persisted = object.is_persisted();
        let pvc = match object {
            ChildObject::PersistentVolumeClaim(pvc) => pvc,
            other => {
                return Err(mismatch(ManagedKind::PersistentVolumeClaim, other));
            }
        };
        merge_labels(&mut pvc.metadata, self.ctx.common_labels());
        // claim spec is immutable once bound
        if !persisted {
            pvc.spec = Some(self.desired_spec());
        }
        Ok(())
    }

    fn should_deploy(&self, _snapshot: &ChildSnapshot) -> bool {
        true
    }
}
