//! The platform API seam.

use async_trait::async_trait;

use super::error::Result;
use super::object::{AppliedObject, DesiredObject, ObjectKind, ObjectRef, PlatformObject, WorkloadStatus};

/// Create/patch/get/list primitives of the container platform.
///
/// `apply` is an upsert: submitting a spec identical to the stored one must
/// report [`ApplyOutcome::Unchanged`](super::ApplyOutcome::Unchanged) and
/// leave the object's generation alone.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn apply(&self, object: &DesiredObject) -> Result<AppliedObject>;

    /// Deletes an object. Returns false if it did not exist.
    async fn delete(&self, object: &ObjectRef) -> Result<bool>;

    async fn get(&self, object: &ObjectRef) -> Result<Option<PlatformObject>>;

    async fn list(&self, kind: ObjectKind, namespace: &str) -> Result<Vec<PlatformObject>>;

    /// Current rollout status of a workload or delegated resource.
    async fn workload_status(&self, object: &ObjectRef) -> Result<WorkloadStatus>;
}
