use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::{
    BuildContext, ResourceBuilder, ResourceDescriptor, TemplateError,
    WORKER_PORT, merge_labels, mismatch,
};
use crate::controller::fsm::ChildSnapshot;
use crate::kinds::{ChildObject, ManagedKind};

const DEFAULT_SERVICE_TYPE: &str = "ClusterIP";

pub struct ServiceBuilder<'a> {
    ctx: BuildContext<'a>,
}

impl<'a> ServiceBuilder<'a> {
    pub fn new(ctx: BuildContext<'a>) -> Self {
        Self { ctx }
    }

    fn service_type(&self) -> String {
        self.ctx
            .instance
            .spec
            .service
            .as_ref()
            .and_then(|s| s.type_.clone())
            .unwrap_or_else(|| DEFAULT_SERVICE_TYPE.to_string())
    }
}

impl ResourceBuilder for ServiceBuilder<'_> {
    fn descriptor(&self) -> ResourceDescriptor {
        self.ctx.descriptor(ManagedKind::Service)
    }

    fn update(&self, object: &mut ChildObject) -> Result<(), TemplateError> {
        let svc = match object {
            ChildObject::Service(s) => s,
            other => return Err(mismatch(ManagedKind::Service, other)),
        };
        merge_labels(&mut svc.metadata, self.ctx.common_labels());
        if let Some(extra) = self.ctx.instance.spec.service.as_ref() {
            if !extra.annotations.is_empty() {
                svc.metadata
                    .annotations
                    .get_or_insert_with(BTreeMap::new)
                    .extend(extra.annotations.clone());
            }
        }

        // cluster IPs and node ports are assigned by the server; keep them
        let spec = svc.spec.get_or_insert_with(ServiceSpec::default);
        spec.type_ = Some(self.service_type());
        spec.selector = Some(self.ctx.selector_labels());
        let node_port = spec
            .ports
            .as_ref()
            .and_then(|p| p.iter().find(|p| p.name.as_deref() == Some("default")))
            .and_then(|p| p.node_port);
        spec.ports = Some(vec![ServicePort {
            name: Some("default".into()),
            protocol: Some("TCP".into()),
            port: 80,
            target_port: Some(IntOrString::Int(WORKER_PORT)),
            node_port,
            ..Default::default()
        }]);
        Ok(())
    }

    fn should_deploy(&self, snapshot: &ChildSnapshot) -> bool {
        snapshot.is_pvc_bound() && snapshot.is_job_completed()
    }
}
