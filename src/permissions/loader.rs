use std::path::{Path, PathBuf};

use sea_orm::{DatabaseConnection, TransactionTrait};

use crate::data_files;
use crate::errors::LoaderError;
use crate::permissions::attach::{attach_roles, ensure_roles_exist, used_roles};
use crate::permissions::reconcile::reconcile;
use crate::permissions::schema;
use crate::permissions::store::SecurityStore;
use crate::permissions::types::NormalizedConfig;
use crate::storage::{self, SeaOrmStore};

/// What a load changed, for status reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadResult {
    pub has_new_permissions: bool,
    pub has_updated_permissions: bool,
    pub has_updated_roles: bool,
}

impl LoadResult {
    pub fn has_changes(&self) -> bool {
        self.has_new_permissions || self.has_updated_permissions || self.has_updated_roles
    }
}

/// Load raw YAML documents into the database in a single transaction.
pub async fn load<S: AsRef<str>>(
    db: &DatabaseConnection,
    sources: &[S],
) -> Result<LoadResult, LoaderError> {
    let config = schema::process(sources)?;
    load_config(db, &config).await
}

/// Load every permission file found for `file_name` in `dir`.
pub async fn load_dir(
    db: &DatabaseConnection,
    dir: &Path,
    file_name: &str,
) -> Result<LoadResult, LoaderError> {
    let files = data_files::discover(dir, file_name)?;
    load_files(db, &files).await
}

pub async fn load_files(
    db: &DatabaseConnection,
    files: &[PathBuf],
) -> Result<LoadResult, LoaderError> {
    tracing::info!(files = files.len(), "Loading permission files");
    let sources = data_files::read_all(files)?;
    load(db, &sources).await
}

/// Reconcile an already normalized configuration. Everything happens inside one
/// transaction; any failure leaves the database untouched.
pub async fn load_config(
    db: &DatabaseConnection,
    config: &NormalizedConfig,
) -> Result<LoadResult, LoaderError> {
    let txn = db.begin().await?;
    let result = reconcile_with(&SeaOrmStore::new(&txn), config).await;
    storage::finish(txn, result).await
}

/// Diff `config` against `store` and write the differences.
///
/// Every referenced role is resolved before the first write, so a missing role
/// aborts the load with nothing persisted.
pub async fn reconcile_with<S: SecurityStore + ?Sized>(
    store: &S,
    config: &NormalizedConfig,
) -> Result<LoadResult, LoaderError> {
    let used = used_roles(config);
    let found = if used.is_empty() {
        Vec::new()
    } else {
        let names: Vec<String> = used.iter().cloned().collect();
        store.find_system_roles(&names).await?
    };
    let roles = ensure_roles_exist(&used, found)?;

    let existing = store.find_all_permissions().await?;
    let mut permissions = reconcile(config, existing);

    let touched = permissions.touched();
    if !touched.is_empty() {
        let saved = store.upsert_permissions(touched).await?;
        permissions.absorb(saved);
    }

    let role_plan = attach_roles(config, &permissions.permissions, roles)?;
    if role_plan.has_updated_roles() {
        store.update_roles(role_plan.updated_roles()).await?;
    }

    tracing::info!(
        permissions = permissions.permissions.len(),
        created = permissions.created,
        updated = permissions.updated,
        roles_updated = role_plan.touched.len(),
        attachments = role_plan.attachments,
        "Reconciled permissions"
    );

    Ok(LoadResult {
        has_new_permissions: permissions.has_new_permissions(),
        has_updated_permissions: permissions.has_updated_permissions(),
        has_updated_roles: role_plan.has_updated_roles(),
    })
}
