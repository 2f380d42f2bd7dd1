use k8s_openapi::api::policy::v1::PodDisruptionBudgetSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

use super::{
    BuildContext, ResourceBuilder, ResourceDescriptor, TemplateError,
    merge_labels, mismatch,
};
use crate::controller::fsm::ChildSnapshot;
use crate::kinds::{ChildObject, ManagedKind};

pub struct PdbBuilder<'a> {
    ctx: BuildContext<'a>,
}

impl<'a> PdbBuilder<'a> {
    pub fn new(ctx: BuildContext<'a>) -> Self {
        Self { ctx }
    }
}

impl ResourceBuilder for PdbBuilder<'_> {
    fn descriptor(&self) -> ResourceDescriptor {
        self.ctx.descriptor(ManagedKind::PodDisruptionBudget)
    }

    fn update(&self, object: &mut ChildObject) -> Result<(), TemplateError> {
        let pdb = match object {
            ChildObject::PodDisruptionBudget(p) => p,
            other => {
                return Err(mismatch(ManagedKind::PodDisruptionBudget, other));
            }
        };
        merge_labels(&mut pdb.metadata, self.ctx.common_labels());
        let spec = pdb.spec.get_or_insert_with(PodDisruptionBudgetSpec::default);
        spec.min_available = Some(self.ctx.instance.spec.min_available());
        spec.selector = Some(LabelSelector {
            match_labels: Some(self.ctx.selector_labels()),
            ..Default::default()
        });
        Ok(())
    }

    fn should_deploy(&self, snapshot: &ChildSnapshot) -> bool {
        snapshot.is_job_completed()
    }
}
