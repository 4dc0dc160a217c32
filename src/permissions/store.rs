use async_trait::async_trait;

use crate::errors::LoaderError;
use crate::permissions::types::{PermissionRecord, RoleRecord};

/// Storage seen by the permission loader.
///
/// Implementations are expected to run inside the caller's unit of work; the
/// loader never commits or rolls back on its own.
#[async_trait]
pub trait SecurityStore: Send + Sync {
    async fn find_all_permissions(&self) -> Result<Vec<PermissionRecord>, LoaderError>;

    /// Organization-less roles whose name is in `names`, with the permissions they hold.
    async fn find_system_roles(&self, names: &[String]) -> Result<Vec<RoleRecord>, LoaderError>;

    /// Create records without an id and update the others. Fails with
    /// [`LoaderError::Persistence`] listing every rejected record, before writing anything.
    async fn upsert_permissions(
        &self,
        batch: Vec<PermissionRecord>,
    ) -> Result<Vec<PermissionRecord>, LoaderError>;

    /// Persist permissions newly held by each role. Existing grants are left as they are.
    async fn update_roles(&self, batch: Vec<RoleRecord>) -> Result<(), LoaderError>;
}
