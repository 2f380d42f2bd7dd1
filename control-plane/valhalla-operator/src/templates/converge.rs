//! In-place convergence of pod templates. Only fields the operator sets are
//! written; everything else on the stored object (server defaults such as
//! `dnsPolicy`, `imagePullPolicy` or probe thresholds) is left alone so an
//! unchanged instance produces an unchanged object.

use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec, Probe};

use super::merge_labels;

pub(crate) fn pod_template(current: &mut PodTemplateSpec, desired: PodTemplateSpec) {
    if let Some(labels) = desired.metadata.and_then(|m| m.labels) {
        merge_labels(current.metadata.get_or_insert_with(Default::default), labels);
    }
    if let Some(spec) = desired.spec {
        pod_spec(current.spec.get_or_insert_with(Default::default), spec);
    }
}

pub(crate) fn pod_spec(current: &mut PodSpec, desired: PodSpec) {
    if desired.restart_policy.is_some() {
        current.restart_policy = desired.restart_policy;
    }
    current.volumes = desired.volumes;
    let mut previous = std::mem::take(&mut current.containers);
    current.containers = desired
        .containers
        .into_iter()
        .map(|want| {
            let mut c = previous
                .iter()
                .position(|c| c.name == want.name)
                .map(|i| previous.swap_remove(i))
                .unwrap_or_default();
            container(&mut c, want);
            c
        })
        .collect();
}

fn container(current: &mut Container, desired: Container) {
    current.name = desired.name;
    current.image = desired.image;
    current.command = desired.command;
    current.args = desired.args;
    current.ports = desired.ports;
    current.env = desired.env;
    current.resources = desired.resources;
    current.volume_mounts = desired.volume_mounts;
    current.readiness_probe = match desired.readiness_probe {
        Some(want) => {
            let mut p = current.readiness_probe.take().unwrap_or_default();
            probe(&mut p, want);
            Some(p)
        }
        None => None,
    };
}

fn probe(current: &mut Probe, desired: Probe) {
    current.tcp_socket = desired.tcp_socket;
    current.http_get = desired.http_get;
    current.exec = desired.exec;
    current.period_seconds = desired.period_seconds;
    if desired.initial_delay_seconds.is_some() {
        current.initial_delay_seconds = desired.initial_delay_seconds;
    }
}
