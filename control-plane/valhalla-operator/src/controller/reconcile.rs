use kube::Resource;
use kube::runtime::controller::Action;
use tracing::{debug, info, instrument, warn};

use super::annotations::is_paused;
use super::apply::apply_resource;
use super::fsm::conditions::cleanup_condition;
use super::fsm::{ApplyReport, ChildSnapshot, advance, aggregate, observe_children};
use super::status_reducer::{set_condition, should_patch_status};
use super::{ControllerContext, ReconcileErr};
use crate::crd::{FINALIZER, Valhalla, ValhallaStatus};
use crate::store::StoreResult;
use crate::templates::{BuildContext, ResourcePlanner};

/// One level-triggered pass for the instance `namespace/name`. Everything is
/// derived from state read at the start of the pass; nothing carries over
/// from earlier passes.
#[instrument(skip_all, fields(ns = %namespace, name = %name))]
pub async fn reconcile_pass(
    ctx: &ControllerContext,
    namespace: &str,
    name: &str,
) -> Result<Action, ReconcileErr> {
    let Some(mut instance) =
        ctx.instances.get_instance(namespace, name).await?
    else {
        debug!("reconcile: instance not found; nothing to do");
        return Ok(Action::await_change());
    };

    let snapshot =
        observe_children(ctx.children.as_ref(), namespace, name).await?;

    // refresh conditions from observed children before anything else
    let mut status = instance.status.clone().unwrap_or_default();
    status.conditions = aggregate(
        &status.conditions,
        &snapshot,
        &ApplyReport::Unchanged,
        ctx.now(),
    );
    match persist_status(ctx, &mut instance, status).await {
        Ok(()) => {}
        Err(e) if e.is_conflict() => {
            info!("reconcile: status conflict; requeueing");
            return Ok(Action::requeue(ctx.cfg.status_conflict_requeue()));
        }
        Err(e) => return Err(e.into()),
    }

    // the API server refuses new finalizers once deletion has started
    if !instance.has_finalizer() && !instance.is_being_deleted() {
        info!("reconcile: adding finalizer");
        instance
            .metadata
            .finalizers
            .get_or_insert_with(Vec::new)
            .push(FINALIZER.to_string());
        ctx.instances.update_instance(&instance).await?;
        return Ok(Action::await_change());
    }

    if instance.is_being_deleted() {
        cleanup(ctx, instance).await?;
        return Ok(Action::await_change());
    }

    if is_paused(&instance) {
        let mut status = instance.status.clone().unwrap_or_default();
        if status.paused {
            debug!("reconcile: paused");
            return Ok(Action::await_change());
        }
        info!("reconcile: pausing");
        status.paused = true;
        persist_status(ctx, &mut instance, status).await?;
        return Ok(Action::await_change());
    }

    let applied = apply_plan(ctx, &instance, &snapshot).await;
    if let Err(e) = &applied {
        warn!(error = %e, "reconcile: apply failed");
    }

    let mut status = instance.status.clone().unwrap_or_default();
    let transition = advance(status.phase, &snapshot);
    if transition.changed() {
        info!(from = %transition.from, to = %transition.to, "phase advanced");
    }
    status.phase = transition.to;
    status.paused = false;
    let report = match &applied {
        Ok(()) => {
            status.observed_generation = instance.metadata.generation;
            ApplyReport::Succeeded
        }
        Err(e) => ApplyReport::Failed(e.to_string()),
    };
    status.conditions =
        aggregate(&status.conditions, &snapshot, &report, ctx.now());

    match persist_status(ctx, &mut instance, status).await {
        Ok(()) => {}
        Err(e) if e.is_conflict() && applied.is_ok() => {
            info!("reconcile: status conflict after apply; requeueing");
            return Ok(Action::requeue(ctx.cfg.status_conflict_requeue()));
        }
        Err(e) => {
            // an apply failure outranks a failed status write
            applied?;
            return Err(e.into());
        }
    }
    applied?;
    Ok(Action::await_change())
}

async fn apply_plan(
    ctx: &ControllerContext,
    instance: &Valhalla,
    snapshot: &ChildSnapshot,
) -> Result<(), ReconcileErr> {
    let owner = instance.controller_owner_ref(&()).ok_or_else(|| {
        ReconcileErr::Internal("instance has no uid for owner reference".into())
    })?;
    let planner = ResourcePlanner::for_instance(BuildContext::new(
        instance,
        &ctx.cfg.images,
    ))?;
    let plan = planner.plan(snapshot);
    debug!(planned = plan.len(), "apply: plan ready");
    for builder in plan {
        apply_resource(ctx.children.as_ref(), builder, &owner, &ctx.cfg.retry)
            .await?;
    }
    Ok(())
}

/// Finalizer-guarded teardown. Child objects go away through their owner
/// references once the instance is gone.
async fn cleanup(
    ctx: &ControllerContext,
    mut instance: Valhalla,
) -> Result<(), ReconcileErr> {
    if instance.has_finalizer() {
        info!("cleanup: marking unavailable and releasing finalizer");
        let mut status = instance.status.clone().unwrap_or_default();
        set_condition(&mut status.conditions, cleanup_condition(ctx.now()));
        persist_status(ctx, &mut instance, status).await?;

        if let Some(finalizers) = instance.metadata.finalizers.as_mut() {
            finalizers.retain(|f| f != FINALIZER);
        }
        instance = ctx.instances.update_instance(&instance).await?;
    }

    let mut status = instance.status.clone().unwrap_or_default();
    status.observed_generation = instance.metadata.generation;
    match persist_status(ctx, &mut instance, status).await {
        Err(e) if e.is_not_found() || e.is_conflict() => {
            debug!(error = %e, "cleanup: final status write skipped");
            Ok(())
        }
        other => other.map_err(ReconcileErr::from),
    }
}

/// Write `desired` as the instance status unless nothing material changed.
/// On success `instance` is replaced with the stored copy.
async fn persist_status(
    ctx: &ControllerContext,
    instance: &mut Valhalla,
    desired: ValhallaStatus,
) -> StoreResult<()> {
    if !should_patch_status(instance.status.as_ref(), &desired) {
        return Ok(());
    }
    let mut next = instance.clone();
    next.status = Some(desired);
    *instance = ctx.instances.update_instance_status(&next).await?;
    Ok(())
}
