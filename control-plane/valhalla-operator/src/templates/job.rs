use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::JobSpec;
use k8s_openapi::api::core::v1::{
    Container, PodSpec, PodTemplateSpec, ResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::{
    BuildContext, DATA_PATH, ResourceBuilder, ResourceDescriptor,
    TemplateError, merge_labels, mismatch,
};
use crate::controller::fsm::ChildSnapshot;
use crate::kinds::{ChildObject, ManagedKind};

/// One-shot map builder: downloads the PBF extract into the shared volume and
/// builds routing tiles from it.
pub struct JobBuilder<'a> {
    ctx: BuildContext<'a>,
}

impl<'a> JobBuilder<'a> {
    pub fn new(ctx: BuildContext<'a>) -> Self {
        Self { ctx }
    }

    fn build_script(&self) -> String {
        let spec = &self.ctx.instance.spec;
        let pbf = spec.pbf_file_name();
        format!(
            "set -e\n\
             cd {DATA_PATH}\n\
             mkdir -p valhalla_tiles conf\n\
             wget -q -O {pbf} {url}\n\
             valhalla_build_config --mjolnir-tile-dir ${{PWD}}/valhalla_tiles \
             --mjolnir-tile-extract ./valhalla_tiles.tar \
             --mjolnir-timezone ./valhalla_tiles/timezones.sqlite \
             --mjolnir-admin ./valhalla_tiles/admins.sqlite > ./conf/valhalla.json\n\
             valhalla_build_admins --config ./conf/valhalla.json {pbf}\n\
             valhalla_build_timezones > ./valhalla_tiles/timezones.sqlite\n\
             valhalla_build_tiles -c ./conf/valhalla.json {pbf}\n",
            url = spec.pbf_url.trim(),
        )
    }

    fn desired_spec(&self) -> JobSpec {
        let name = self.ctx.name_of(ManagedKind::Job);
        let (volume, mount) = self.ctx.data_volume(false);
        let requests = BTreeMap::from([
            ("memory".to_string(), Quantity("1000M".into())),
            ("cpu".to_string(), Quantity("1000m".into())),
        ]);
        JobSpec {
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(BTreeMap::from([(
                        super::INSTANCE_LABEL.to_string(),
                        self.ctx.instance_name(),
                    )])),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    restart_policy: Some("OnFailure".into()),
                    containers: vec![Container {
                        name: format!("{name}-map-builder"),
                        image: Some(self.ctx.builder_image()),
                        command: Some(vec!["/bin/sh".into(), "-c".into()]),
                        args: Some(vec![self.build_script()]),
                        resources: Some(ResourceRequirements {
                            requests: Some(requests),
                            ..Default::default()
                        }),
                        volume_mounts: Some(vec![mount]),
                        ..Default::default()
                    }],
                    volumes: Some(vec![volume]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }
    }
}

impl ResourceBuilder for JobBuilder<'_> {
    fn descriptor(&self) -> ResourceDescriptor {
        self.ctx.descriptor(ManagedKind::Job)
    }

    fn update(&self, object: &mut ChildObject) -> Result<(), TemplateError> {
        let persisted = object.is_persisted();
        let job = match object {
            ChildObject::Job(job) => job,
            other => return Err(mismatch(ManagedKind::Job, other)),
        };
        merge_labels(&mut job.metadata, self.ctx.common_labels());
        // pod template of a job cannot be changed after creation
        if !persisted {
            job.spec = Some(self.desired_spec());
        }
        Ok(())
    }

    fn should_deploy(&self, _snapshot: &ChildSnapshot) -> bool {
        true
    }
}
