use tracing::{debug, instrument};

use super::observed::ChildSnapshot;
use crate::kinds::ManagedKind;
use crate::store::{ChildStore, StoreResult};
use crate::templates::child_name;

/// Read every managed kind of `instance` from the child store. A missing
/// object is recorded as absent; any other store error fails the read.
#[instrument(level = "debug", skip_all, fields(ns = %namespace, name = %instance_name))]
pub async fn observe_children<C>(
    store: &C,
    namespace: &str,
    instance_name: &str,
) -> StoreResult<ChildSnapshot>
where
    C: ChildStore + ?Sized,
{
    let mut snapshot = ChildSnapshot::new();
    for kind in ManagedKind::ALL {
        let name = child_name(instance_name, kind);
        match store.get_child(kind, namespace, &name).await {
            Ok(Some(obj)) => snapshot.insert(obj),
            Ok(None) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
    }
    debug!(observed = snapshot.len(), "snapshot: children observed");
    Ok(snapshot)
}
