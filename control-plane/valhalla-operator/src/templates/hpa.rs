use k8s_openapi::api::autoscaling::v2::{
    CrossVersionObjectReference, HorizontalPodAutoscalerSpec, MetricSpec,
    MetricTarget, ResourceMetricSource,
};

use super::{
    BuildContext, ResourceBuilder, ResourceDescriptor, TemplateError,
    merge_labels, mismatch,
};
use crate::controller::fsm::ChildSnapshot;
use crate::kinds::{ChildObject, ManagedKind};

const TARGET_CPU_UTILIZATION: i32 = 85;

pub struct HpaBuilder<'a> {
    ctx: BuildContext<'a>,
}

impl<'a> HpaBuilder<'a> {
    pub fn new(ctx: BuildContext<'a>) -> Self {
        Self { ctx }
    }
}

impl ResourceBuilder for HpaBuilder<'_> {
    fn descriptor(&self) -> ResourceDescriptor {
        self.ctx.descriptor(ManagedKind::HorizontalPodAutoscaler)
    }

    fn update(&self, object: &mut ChildObject) -> Result<(), TemplateError> {
        let hpa = match object {
            ChildObject::HorizontalPodAutoscaler(h) => h,
            other => {
                return Err(mismatch(ManagedKind::HorizontalPodAutoscaler, other));
            }
        };
        merge_labels(&mut hpa.metadata, self.ctx.common_labels());
        let spec = &self.ctx.instance.spec;
        let target = hpa
            .spec
            .get_or_insert_with(HorizontalPodAutoscalerSpec::default);
        target.scale_target_ref = CrossVersionObjectReference {
            api_version: Some("apps/v1".into()),
            kind: "Deployment".into(),
            name: self.ctx.name_of(ManagedKind::Deployment),
        };
        target.min_replicas = Some(spec.min_replicas());
        target.max_replicas = spec.max_replicas();
        target.metrics = Some(vec![MetricSpec {
            type_: "Resource".into(),
            resource: Some(ResourceMetricSource {
                name: "cpu".into(),
                target: MetricTarget {
                    type_: "Utilization".into(),
                    average_utilization: Some(TARGET_CPU_UTILIZATION),
                    ..Default::default()
                },
            }),
            ..Default::default()
        }]);
        Ok(())
    }

    fn should_deploy(&self, snapshot: &ChildSnapshot) -> bool {
        snapshot.is_job_completed()
    }
}
