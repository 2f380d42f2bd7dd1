use k8s_openapi::api::apps::v1::DeploymentSpec;
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec, Probe,
    TCPSocketAction,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector, ObjectMeta,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::{
    BuildContext, DATA_PATH, ResourceBuilder, ResourceDescriptor,
    TemplateError, WORKER_PORT, converge, merge_labels, mismatch,
};
use crate::controller::fsm::ChildSnapshot;
use crate::kinds::{ChildObject, ManagedKind};

/// Serving workers reading the built tiles from the shared volume.
pub struct DeploymentBuilder<'a> {
    ctx: BuildContext<'a>,
}

impl<'a> DeploymentBuilder<'a> {
    pub fn new(ctx: BuildContext<'a>) -> Self {
        Self { ctx }
    }

    fn worker_container(&self) -> Container {
        let spec = &self.ctx.instance.spec;
        let (_, mount) = self.ctx.data_volume(true);
        Container {
            name: self.ctx.name_of(ManagedKind::Deployment),
            image: Some(self.ctx.worker_image()),
            ports: Some(vec![ContainerPort {
                container_port: WORKER_PORT,
                protocol: Some("TCP".into()),
                ..Default::default()
            }]),
            env: Some(vec![
                EnvVar {
                    name: "ROOT_DIR".into(),
                    value: Some(DATA_PATH.into()),
                    ..Default::default()
                },
                EnvVar {
                    name: "THREADS_PER_POD".into(),
                    value: Some(spec.threads_per_pod().to_string()),
                    ..Default::default()
                },
            ]),
            resources: Some(spec.resources()),
            readiness_probe: Some(Probe {
                tcp_socket: Some(TCPSocketAction {
                    port: IntOrString::Int(WORKER_PORT),
                    ..Default::default()
                }),
                period_seconds: Some(10),
                ..Default::default()
            }),
            volume_mounts: Some(vec![mount]),
            ..Default::default()
        }
    }

    fn pod_template(&self) -> PodTemplateSpec {
        let (volume, _) = self.ctx.data_volume(true);
        PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(self.ctx.selector_labels()),
                ..Default::default()
            }),
            spec: Some(PodSpec {
                containers: vec![self.worker_container()],
                volumes: Some(vec![volume]),
                ..Default::default()
            }),
        }
    }
}

impl ResourceBuilder for DeploymentBuilder<'_> {
    fn descriptor(&self) -> ResourceDescriptor {
        self.ctx.descriptor(ManagedKind::Deployment)
    }

    fn update(&self, object: &mut ChildObject) -> Result<(), TemplateError> {
        let persisted = object.is_persisted();
        let deploy = match object {
            ChildObject::Deployment(d) => d,
            other => return Err(mismatch(ManagedKind::Deployment, other)),
        };
        merge_labels(&mut deploy.metadata, self.ctx.common_labels());
        let spec = deploy.spec.get_or_insert_with(DeploymentSpec::default);
        // replicas are owned by the autoscaler once the deployment exists
        if !persisted {
            spec.replicas = Some(self.ctx.instance.spec.min_replicas());
        }
        spec.selector = LabelSelector {
            match_labels: Some(self.ctx.selector_labels()),
            ..Default::default()
        };
        converge::pod_template(&mut spec.template, self.pod_template());
        Ok(())
    }

    fn should_deploy(&self, snapshot: &ChildSnapshot) -> bool {
        snapshot.is_pvc_bound() && snapshot.is_job_completed()
    }
}
