//! Clients of the two external stores the reconciler talks to: the instance
//! store holding `Valhalla` objects and the child store holding the managed
//! kinds. Both use optimistic concurrency through resource versions.

pub mod k8s;
pub mod memory;

use async_trait::async_trait;

use crate::crd::Valhalla;
use crate::kinds::{ChildObject, ManagedKind};

pub use k8s::{KubeChildStore, KubeInstanceStore};
pub use memory::{MemoryStore, StoreOp};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    /// The write carried a stale resource version (or the object already
    /// exists on create).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store error: {0}")]
    Other(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

#[async_trait]
pub trait InstanceStore: Send + Sync {
    async fn get_instance(
        &self,
        namespace: &str,
        name: &str,
    ) -> StoreResult<Option<Valhalla>>;

    /// Write metadata and spec. Status is ignored.
    async fn update_instance(&self, instance: &Valhalla)
    -> StoreResult<Valhalla>;

    /// Write the status subresource only.
    async fn update_instance_status(
        &self,
        instance: &Valhalla,
    ) -> StoreResult<Valhalla>;
}

#[async_trait]
pub trait ChildStore: Send + Sync {
    async fn get_child(
        &self,
        kind: ManagedKind,
        namespace: &str,
        name: &str,
    ) -> StoreResult<Option<ChildObject>>;

    async fn create_child(&self, object: &ChildObject)
    -> StoreResult<ChildObject>;

    /// Write the object back. Fails with `Conflict` when its resource
    /// version is stale.
    async fn update_child(&self, object: &ChildObject)
    -> StoreResult<ChildObject>;
}
