use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use tracing::{info, trace, warn};

use super::ReconcileErr;
use crate::config::RetryConfig;
use crate::kinds::ChildObject;
use crate::store::ChildStore;
use crate::templates::{ResourceBuilder, ResourceDescriptor};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Converge one child resource: fetch or create, run the builder's update,
/// write back only when something changed. A version conflict restarts the
/// whole sequence from a fresh read, at most `conflict_retries` attempts.
pub async fn apply_resource<C>(
    store: &C,
    builder: &dyn ResourceBuilder,
    owner: &OwnerReference,
    retry: &RetryConfig,
) -> Result<ApplyOutcome, ReconcileErr>
where
    C: ChildStore + ?Sized,
{
    let d = builder.descriptor();
    let max_attempts = retry.conflict_retries.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match apply_once(store, builder, &d, owner).await {
            Ok(outcome) => {
                log_outcome(&d, outcome);
                return Ok(outcome);
            }
            Err(ReconcileErr::Store(e)) if e.is_conflict() => {
                if attempt >= max_attempts {
                    warn!(kind = %d.kind, name = %d.name, attempt, "apply: conflict retries exhausted");
                    return Err(ReconcileErr::ConflictRetriesExhausted {
                        kind: d.kind,
                        name: d.name,
                        attempts: attempt,
                    });
                }
                let backoff = retry.backoff(attempt);
                trace!(kind = %d.kind, name = %d.name, attempt, backoff_ms = backoff.as_millis() as u64, "apply: conflict, retrying");
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn apply_once<C>(
    store: &C,
    builder: &dyn ResourceBuilder,
    d: &ResourceDescriptor,
    owner: &OwnerReference,
) -> Result<ApplyOutcome, ReconcileErr>
where
    C: ChildStore + ?Sized,
{
    match store.get_child(d.kind, &d.namespace, &d.name).await? {
        None => {
            let mut obj = builder.build();
            converge(builder, &mut obj, owner)?;
            store.create_child(&obj).await?;
            Ok(ApplyOutcome::Created)
        }
        Some(current) => {
            let mut obj = current.clone();
            converge(builder, &mut obj, owner)?;
            if obj == current {
                return Ok(ApplyOutcome::Unchanged);
            }
            store.update_child(&obj).await?;
            Ok(ApplyOutcome::Updated)
        }
    }
}

fn converge(
    builder: &dyn ResourceBuilder,
    obj: &mut ChildObject,
    owner: &OwnerReference,
) -> Result<(), ReconcileErr> {
    builder.update(obj)?;
    obj.ensure_owner(owner);
    Ok(())
}

fn log_outcome(d: &ResourceDescriptor, outcome: ApplyOutcome) {
    match outcome {
        ApplyOutcome::Created => info!(kind = %d.kind, ns = %d.namespace, name = %d.name, "created resource"),
        ApplyOutcome::Updated => info!(kind = %d.kind, ns = %d.namespace, name = %d.name, "updated resource"),
        ApplyOutcome::Unchanged => trace!(kind = %d.kind, name = %d.name, "resource unchanged"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImagesConfig;
    use crate::kinds::ManagedKind;
    use crate::store::{MemoryStore, StoreError, StoreOp};
    use crate::templates::test_support::instance;
    use crate::templates::{BuildContext, ServiceBuilder};

    fn owner() -> OwnerReference {
        OwnerReference {
            api_version: "valhalla.oaas.io/v1alpha1".into(),
            kind: "Valhalla".into(),
            name: "andorra".into(),
            uid: "uid-1".into(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    fn fast_retry(n: u32) -> RetryConfig {
        RetryConfig {
            conflict_retries: n,
            conflict_backoff_ms: 1,
        }
    }

    #[test_log::test(tokio::test)]
    async fn create_then_unchanged() {
        let store = MemoryStore::new();
        let vh = instance();
        let images = ImagesConfig::default();
        let b = ServiceBuilder::new(BuildContext::new(&vh, &images));

        let first = apply_resource(&store, &b, &owner(), &fast_retry(5)).await.unwrap();
        assert_eq!(first, ApplyOutcome::Created);
        let second = apply_resource(&store, &b, &owner(), &fast_retry(5)).await.unwrap();
        assert_eq!(second, ApplyOutcome::Unchanged);
        assert_eq!(store.child_write_count().await, 1);

        let svc = store.child(ManagedKind::Service, "maps", "andorra").await.unwrap();
        assert!(svc.is_owned_by("uid-1"));
    }

    #[test_log::test(tokio::test)]
    async fn drift_is_corrected() {
        let store = MemoryStore::new();
        let vh = instance();
        let images = ImagesConfig::default();
        let b = ServiceBuilder::new(BuildContext::new(&vh, &images));
        apply_resource(&store, &b, &owner(), &fast_retry(5)).await.unwrap();

        let mut drifted = store.child(ManagedKind::Service, "maps", "andorra").await.unwrap();
        if let ChildObject::Service(s) = &mut drifted {
            s.spec.as_mut().unwrap().type_ = Some("NodePort".into());
        }
        store.update_child(&drifted).await.unwrap();

        let out = apply_resource(&store, &b, &owner(), &fast_retry(5)).await.unwrap();
        assert_eq!(out, ApplyOutcome::Updated);
    }

    #[test_log::test(tokio::test)]
    async fn conflicts_below_bound_are_retried() {
        let store = MemoryStore::new();
        let vh = instance();
        let images = ImagesConfig::default();
        let b = ServiceBuilder::new(BuildContext::new(&vh, &images));
        store.inject_conflicts(StoreOp::CreateChild, 4).await;

        let out = apply_resource(&store, &b, &owner(), &fast_retry(5)).await.unwrap();
        assert_eq!(out, ApplyOutcome::Created);
        assert_eq!(store.calls(StoreOp::GetChild).await, 5);
    }

    #[test_log::test(tokio::test)]
    async fn conflicts_at_bound_exhaust() {
        let store = MemoryStore::new();
        let vh = instance();
        let images = ImagesConfig::default();
        let b = ServiceBuilder::new(BuildContext::new(&vh, &images));
        store.inject_conflicts(StoreOp::CreateChild, 5).await;

        let err = apply_resource(&store, &b, &owner(), &fast_retry(5)).await.unwrap_err();
        assert!(matches!(
            err,
            ReconcileErr::ConflictRetriesExhausted { attempts: 5, .. }
        ));
        assert!(store.child(ManagedKind::Service, "maps", "andorra").await.is_none());
    }

    #[test_log::test(tokio::test)]
    async fn other_errors_are_not_retried() {
        let store = MemoryStore::new();
        let vh = instance();
        let images = ImagesConfig::default();
        let b = ServiceBuilder::new(BuildContext::new(&vh, &images));
        store
            .inject_error(StoreOp::GetChild, StoreError::Other("unreachable".into()))
            .await;

        let err = apply_resource(&store, &b, &owner(), &fast_retry(5)).await.unwrap_err();
        assert!(matches!(err, ReconcileErr::Store(StoreError::Other(_))));
        assert_eq!(store.calls(StoreOp::GetChild).await, 0);
    }
}
