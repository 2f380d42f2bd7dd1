use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::{CronJobSpec, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, PodSpec, PodTemplateSpec, ResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use super::{
    BuildContext, DATA_PATH, ResourceBuilder, ResourceDescriptor,
    TemplateError, converge, merge_labels, mismatch,
};
use crate::controller::fsm::ChildSnapshot;
use crate::kinds::{ChildObject, ManagedKind};

/// Periodic refresh of predicted traffic data into the shared volume.
pub struct CronJobBuilder<'a> {
    ctx: BuildContext<'a>,
}

impl<'a> CronJobBuilder<'a> {
    pub fn new(ctx: BuildContext<'a>) -> Self {
        Self { ctx }
    }

    fn pod_spec(&self) -> PodSpec {
        let (volume, mount) = self.ctx.data_volume(false);
        PodSpec {
            restart_policy: Some("OnFailure".into()),
            containers: vec![Container {
                name: self.ctx.name_of(ManagedKind::CronJob),
                image: Some(self.ctx.traffic_fetcher_image()),
                resources: Some(ResourceRequirements {
                    requests: Some(BTreeMap::from([
                        ("memory".to_string(), Quantity("100M".into())),
                        ("cpu".to_string(), Quantity("100m".into())),
                    ])),
                    ..Default::default()
                }),
                env: Some(vec![EnvVar {
                    name: "ROOT_DIR".into(),
                    value: Some(DATA_PATH.into()),
                    ..Default::default()
                }]),
                volume_mounts: Some(vec![mount]),
                ..Default::default()
            }],
            volumes: Some(vec![volume]),
            ..Default::default()
        }
    }
}

impl ResourceBuilder for CronJobBuilder<'_> {
    fn descriptor(&self) -> ResourceDescriptor {
        self.ctx.descriptor(ManagedKind::CronJob)
    }

    fn update(&self, object: &mut ChildObject) -> Result<(), TemplateError> {
        let cron = match object {
            ChildObject::CronJob(c) => c,
            other => return Err(mismatch(ManagedKind::CronJob, other)),
        };
        merge_labels(&mut cron.metadata, self.ctx.common_labels());
        let spec = cron.spec.get_or_insert_with(CronJobSpec::default);
        spec.schedule = self.ctx.instance.spec.traffic_schedule().to_string();
        spec.concurrency_policy = Some("Forbid".into());
        let job = spec.job_template.spec.get_or_insert_with(JobSpec::default);
        converge::pod_template(
            &mut job.template,
            PodTemplateSpec {
                metadata: None,
                spec: Some(self.pod_spec()),
            },
        );
        Ok(())
    }

    fn should_deploy(&self, snapshot: &ChildSnapshot) -> bool {
        snapshot.is_pvc_bound() && snapshot.is_job_completed()
    }
}
