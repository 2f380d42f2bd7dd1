//! In-process implementation of both stores with the semantics of the
//! Kubernetes API server that the reconciler relies on: resource versions,
//! generation bumps on spec edits, finalizer-blocked deletion and
//! owner-reference cascading delete. Faults can be injected per operation.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;
use tokio::sync::RwLock;
use tracing::debug;

use super::{ChildStore, InstanceStore, StoreError, StoreResult};
use crate::crd::Valhalla;
use crate::kinds::{ChildObject, ManagedKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreOp {
    GetInstance,
    UpdateInstance,
    UpdateInstanceStatus,
    GetChild,
    CreateChild,
    UpdateChild,
}

impl StoreOp {
    pub fn is_write(&self) -> bool {
        !matches!(self, StoreOp::GetInstance | StoreOp::GetChild)
    }
}

type InstanceKey = (String, String);
type ChildKey = (ManagedKind, String, String);

#[derive(Default)]
struct State {
    instances: BTreeMap<InstanceKey, Valhalla>,
    children: BTreeMap<ChildKey, ChildObject>,
    next_version: u64,
    next_uid: u64,
    /// Per-operation script; `None` entries let a call through untouched.
    faults: HashMap<StoreOp, VecDeque<Option<StoreError>>>,
    calls: HashMap<StoreOp, usize>,
}

impl State {
    fn bump_version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }

    fn new_uid(&mut self) -> String {
        self.next_uid += 1;
        format!("uid-{:08}", self.next_uid)
    }

    /// Pops an injected fault, otherwise counts the call as served.
    fn enter(&mut self, op: StoreOp) -> StoreResult<()> {
        if let Some(Some(err)) =
            self.faults.get_mut(&op).and_then(|q| q.pop_front())
        {
            debug!(?op, %err, "memory store: injected fault");
            return Err(err);
        }
        *self.calls.entry(op).or_default() += 1;
        Ok(())
    }

    fn remove_instance(&mut self, key: &InstanceKey) {
        if let Some(removed) = self.instances.remove(key) {
            if let Some(uid) = removed.uid() {
                self.children.retain(|_, child| !child.is_owned_by(&uid));
            }
        }
    }
}

fn instance_key(namespace: &str, name: &str) -> InstanceKey {
    (namespace.to_string(), name.to_string())
}

fn key_of(instance: &Valhalla) -> InstanceKey {
    instance_key(&instance.namespace().unwrap_or_default(), &instance.name_any())
}

fn child_key(object: &ChildObject) -> ChildKey {
    (
        object.kind(),
        object.namespace().to_string(),
        object.name().to_string(),
    )
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// User-side create: assigns uid, generation 1 and a resource version.
    pub async fn create_instance(&self, mut instance: Valhalla) -> Valhalla {
        let mut st = self.state.write().await;
        instance.metadata.uid = Some(st.new_uid());
        instance.metadata.generation = Some(1);
        instance.metadata.resource_version = Some(st.bump_version());
        instance.metadata.creation_timestamp = Some(Time(Utc::now()));
        st.instances.insert(key_of(&instance), instance.clone());
        instance
    }

    /// User-side edit: applies `edit` and bumps the generation when the spec
    /// changed.
    pub async fn edit_instance<F>(
        &self,
        namespace: &str,
        name: &str,
        edit: F,
    ) -> Option<Valhalla>
    where
        F: FnOnce(&mut Valhalla),
    {
        let mut st = self.state.write().await;
        let key = instance_key(namespace, name);
        let mut current = st.instances.get(&key)?.clone();
        let before = current.spec.clone();
        edit(&mut current);
        if current.spec != before {
            current.metadata.generation =
                Some(current.metadata.generation.unwrap_or(0) + 1);
        }
        current.metadata.resource_version = Some(st.bump_version());
        st.instances.insert(key, current.clone());
        Some(current)
    }

    /// User-side delete: marks the instance for deletion while finalizers
    /// remain, otherwise removes it and cascades to owned children.
    pub async fn delete_instance(&self, namespace: &str, name: &str) {
        let mut st = self.state.write().await;
        let key = instance_key(namespace, name);
        let Some(current) = st.instances.get(&key).cloned() else {
            return;
        };
        if current.finalizers().is_empty() {
            st.remove_instance(&key);
            return;
        }
        if current.metadata.deletion_timestamp.is_none() {
            let mut marked = current;
            marked.metadata.deletion_timestamp = Some(Time(Utc::now()));
            marked.metadata.resource_version = Some(st.bump_version());
            st.instances.insert(key, marked);
        }
    }

    /// Snapshot of an instance without counting a call.
    pub async fn instance(&self, namespace: &str, name: &str) -> Option<Valhalla> {
        let st = self.state.read().await;
        st.instances.get(&instance_key(namespace, name)).cloned()
    }

    /// Snapshot of a child without counting a call.
    pub async fn child(
        &self,
        kind: ManagedKind,
        namespace: &str,
        name: &str,
    ) -> Option<ChildObject> {
        let st = self.state.read().await;
        st.children
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub async fn child_kinds(&self, namespace: &str) -> Vec<ManagedKind> {
        let st = self.state.read().await;
        st.children
            .keys()
            .filter(|(_, ns, _)| ns == namespace)
            .map(|(kind, _, _)| *kind)
            .collect()
    }

    /// Cluster-side status change of a child (e.g. a job completing),
    /// bypassing the main-resource write path.
    pub async fn edit_child_status<F>(
        &self,
        kind: ManagedKind,
        namespace: &str,
        name: &str,
        edit: F,
    ) -> bool
    where
        F: FnOnce(&mut ChildObject),
    {
        let mut st = self.state.write().await;
        let key = (kind, namespace.to_string(), name.to_string());
        let Some(mut current) = st.children.get(&key).cloned() else {
            return false;
        };
        edit(&mut current);
        current.meta_mut().resource_version = Some(st.bump_version());
        st.children.insert(key, current);
        true
    }

    /// Queue `count` conflicts for the next calls of `op`.
    pub async fn inject_conflicts(&self, op: StoreOp, count: usize) {
        let mut st = self.state.write().await;
        let q = st.faults.entry(op).or_default();
        for _ in 0..count {
            q.push_back(Some(StoreError::Conflict(format!("injected {op:?}"))));
        }
    }

    pub async fn inject_error(&self, op: StoreOp, error: StoreError) {
        self.inject_error_after(op, 0, error).await;
    }

    /// Let the next `skip` calls of `op` through, then fail one with `error`.
    pub async fn inject_error_after(
        &self,
        op: StoreOp,
        skip: usize,
        error: StoreError,
    ) {
        let mut st = self.state.write().await;
        let q = st.faults.entry(op).or_default();
        q.extend(std::iter::repeat_n(None, skip));
        q.push_back(Some(error));
    }

    /// Number of successfully served calls of `op`.
    pub async fn calls(&self, op: StoreOp) -> usize {
        let st = self.state.read().await;
        st.calls.get(&op).copied().unwrap_or(0)
    }

    pub async fn write_count(&self) -> usize {
        let st = self.state.read().await;
        st.calls
            .iter()
            .filter(|(op, _)| op.is_write())
            .map(|(_, n)| *n)
            .sum()
    }

    pub async fn child_write_count(&self) -> usize {
        let st = self.state.read().await;
        [StoreOp::CreateChild, StoreOp::UpdateChild]
            .iter()
            .map(|op| st.calls.get(op).copied().unwrap_or(0))
            .sum()
    }

    pub async fn reset_calls(&self) {
        self.state.write().await.calls.clear();
    }
}

#[async_trait]
impl InstanceStore for MemoryStore {
    async fn get_instance(
        &self,
        namespace: &str,
        name: &str,
    ) -> StoreResult<Option<Valhalla>> {
        let mut st = self.state.write().await;
        st.enter(StoreOp::GetInstance)?;
        Ok(st.instances.get(&instance_key(namespace, name)).cloned())
    }

    async fn update_instance(
        &self,
        instance: &Valhalla,
    ) -> StoreResult<Valhalla> {
        let mut st = self.state.write().await;
        st.enter(StoreOp::UpdateInstance)?;
        let key = key_of(instance);
        let current = st
            .instances
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{key:?}")))?;
        if current.resource_version() != instance.resource_version() {
            return Err(StoreError::Conflict(format!(
                "{key:?}: stale resourceVersion {:?}",
                instance.resource_version()
            )));
        }
        if current.metadata.deletion_timestamp.is_some()
            && instance
                .finalizers()
                .iter()
                .any(|f| !current.finalizers().contains(f))
        {
            return Err(StoreError::Other(format!(
                "{key:?}: no new finalizers can be added while deleting"
            )));
        }
        let mut next = instance.clone();
        next.status = current.status.clone();
        next.metadata.uid = current.metadata.uid.clone();
        next.metadata.deletion_timestamp =
            current.metadata.deletion_timestamp.clone();
        next.metadata.generation = if next.spec != current.spec {
            Some(current.metadata.generation.unwrap_or(0) + 1)
        } else {
            current.metadata.generation
        };
        next.metadata.resource_version = Some(st.bump_version());
        if next.metadata.deletion_timestamp.is_some()
            && next.finalizers().is_empty()
        {
            debug!(?key, "memory store: last finalizer removed; deleting");
            st.remove_instance(&key);
            return Ok(next);
        }
        st.instances.insert(key, next.clone());
        Ok(next)
    }

    async fn update_instance_status(
        &self,
        instance: &Valhalla,
    ) -> StoreResult<Valhalla> {
        let mut st = self.state.write().await;
        st.enter(StoreOp::UpdateInstanceStatus)?;
        let key = key_of(instance);
        let mut current = st
            .instances
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{key:?}")))?;
        if current.resource_version() != instance.resource_version() {
            return Err(StoreError::Conflict(format!(
                "{key:?}: stale resourceVersion {:?}",
                instance.resource_version()
            )));
        }
        current.status = instance.status.clone();
        current.metadata.resource_version = Some(st.bump_version());
        st.instances.insert(key, current.clone());
        Ok(current)
    }
}

#[async_trait]
impl ChildStore for MemoryStore {
    async fn get_child(
        &self,
        kind: ManagedKind,
        namespace: &str,
        name: &str,
    ) -> StoreResult<Option<ChildObject>> {
        let mut st = self.state.write().await;
        st.enter(StoreOp::GetChild)?;
        Ok(st
            .children
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn create_child(
        &self,
        object: &ChildObject,
    ) -> StoreResult<ChildObject> {
        let mut st = self.state.write().await;
        st.enter(StoreOp::CreateChild)?;
        let key = child_key(object);
        if st.children.contains_key(&key) {
            return Err(StoreError::Conflict(format!("{key:?} already exists")));
        }
        let mut created = object.clone();
        let uid = st.new_uid();
        let rv = st.bump_version();
        let meta = created.meta_mut();
        meta.uid = Some(uid);
        meta.resource_version = Some(rv);
        st.children.insert(key, created.clone());
        Ok(created)
    }

    async fn update_child(
        &self,
        object: &ChildObject,
    ) -> StoreResult<ChildObject> {
        let mut st = self.state.write().await;
        st.enter(StoreOp::UpdateChild)?;
        let key = child_key(object);
        let current = st
            .children
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{key:?}")))?;
        if current.resource_version() != object.resource_version() {
            return Err(StoreError::Conflict(format!(
                "{key:?}: stale resourceVersion {:?}",
                object.resource_version()
            )));
        }
        let mut next = object.clone();
        next.copy_status_from(&current);
        next.meta_mut().resource_version = Some(st.bump_version());
        st.children.insert(key, next.clone());
        Ok(next)
    }
}
