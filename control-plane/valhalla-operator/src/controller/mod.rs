pub mod annotations;
pub mod apply;
pub mod fsm;
pub mod reconcile;
pub mod status_reducer;


use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Service};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::{
    Client, Resource, ResourceExt,
    api::Api,
    runtime::{Controller, controller::Action, watcher::Config},
};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use crate::config::OperatorConfig;
use crate::crd::Valhalla;
use crate::kinds::ManagedKind;
use crate::store::{
    ChildStore, InstanceStore, KubeChildStore, KubeInstanceStore, StoreError,
};
use crate::templates::TemplateError;

pub use reconcile::reconcile_pass;

#[derive(thiserror::Error, Debug)]
pub enum ReconcileErr {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("build error: {0}")]
    Build(#[from] TemplateError),
    #[error("{kind} {name}: gave up after {attempts} conflicting attempts")]
    ConflictRetriesExhausted {
        kind: ManagedKind,
        name: String,
        attempts: u32,
    },
    #[error("reconcile pass exceeded its {0:?} deadline")]
    Timeout(Duration),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Shared, read-only state of the controller. Store handles are trait
/// objects so passes run the same against the API server and in memory.
#[derive(Clone)]
pub struct ControllerContext {
    pub instances: Arc<dyn InstanceStore>,
    pub children: Arc<dyn ChildStore>,
    pub cfg: OperatorConfig,
    clock: fn() -> DateTime<Utc>,
}

impl ControllerContext {
    pub fn new(
        instances: Arc<dyn InstanceStore>,
        children: Arc<dyn ChildStore>,
        cfg: OperatorConfig,
    ) -> Self {
        Self {
            instances,
            children,
            cfg,
            clock: Utc::now,
        }
    }

    /// Replace the wall clock used for condition timestamps.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

fn owned<K>(client: &Client, namespace: Option<&str>) -> (Api<K>, Config)
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static,
{
    (scoped_api(client, namespace), Config::default())
}

pub async fn run_controller(
    client: Client,
    cfg: OperatorConfig,
) -> anyhow::Result<()> {
    let ns = cfg.namespace.clone();
    let ns = ns.as_deref();
    let api: Api<Valhalla> = scoped_api(&client, ns);
    let ctx = Arc::new(ControllerContext::new(
        Arc::new(KubeInstanceStore::new(client.clone())),
        Arc::new(KubeChildStore::new(client.clone())),
        cfg,
    ));
    info!(namespace = ns.unwrap_or("*"), "controller: starting");

    let (pvc, pvc_cfg) = owned::<PersistentVolumeClaim>(&client, ns);
    let (job, job_cfg) = owned::<Job>(&client, ns);
    let (deploy, deploy_cfg) = owned::<Deployment>(&client, ns);
    let (svc, svc_cfg) = owned::<Service>(&client, ns);
    let (hpa, hpa_cfg) = owned::<HorizontalPodAutoscaler>(&client, ns);
    let (pdb, pdb_cfg) = owned::<PodDisruptionBudget>(&client, ns);
    let (cron, cron_cfg) = owned::<CronJob>(&client, ns);

    Controller::new(api, Config::default())
        .owns(pvc, pvc_cfg)
        .owns(job, job_cfg)
        .owns(deploy, deploy_cfg)
        .owns(svc, svc_cfg)
        .owns(hpa, hpa_cfg)
        .owns(pdb, pdb_cfg)
        .owns(cron, cron_cfg)
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj_ref, action)) => {
                    debug!(object = %obj_ref, ?action, "reconciled")
                }
                Err(e) => error!(error = %e, "reconcile error"),
            }
        })
        .await;

    info!("controller: stopped");
    Ok(())
}

async fn reconcile(
    obj: Arc<Valhalla>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileErr> {
    let ns = obj.namespace().unwrap_or_default();
    let name = obj.name_any();
    let deadline = ctx.cfg.pass_timeout();
    tokio::time::timeout(deadline, reconcile_pass(&ctx, &ns, &name))
        .await
        .map_err(|_| ReconcileErr::Timeout(deadline))?
}

fn error_policy(
    obj: Arc<Valhalla>,
    error: &ReconcileErr,
    ctx: Arc<ControllerContext>,
) -> Action {
    warn!(name = %obj.name_any(), %error, "reconcile failed; requeueing");
    Action::requeue(ctx.cfg.error_requeue())
}
