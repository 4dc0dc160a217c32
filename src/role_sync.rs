use std::collections::HashMap;
use std::path::Path;

use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};
use serde::{Deserialize, Serialize};

use crate::data_files;
use crate::errors::LoaderError;
use crate::storage;
use crate::validation::{ensure_valid, Rules, Validate, Violation};

/// System role definition from a YAML data file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinition {
    /// Role name (unique among organization-less roles)
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
}

/// Either `- ROLE_USER` or `- {name: ROLE_USER, label: User}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RoleEntry {
    Name(String),
    Definition(RoleDefinition),
}

impl From<RoleEntry> for RoleDefinition {
    fn from(entry: RoleEntry) -> Self {
        match entry {
            RoleEntry::Name(name) => RoleDefinition { name, label: None },
            RoleEntry::Definition(def) => def,
        }
    }
}

/// Root structure of a roles YAML file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RolesFile {
    #[serde(default)]
    roles: Option<Vec<RoleEntry>>,
}

impl Validate for RoleDefinition {
    fn entity_name(&self) -> String {
        format!("role `{}`", self.name)
    }

    fn violations(&self) -> Vec<Violation> {
        Rules::new()
            .name("name", &self.name)
            .optional_text("label", self.label.as_deref())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleSyncOutcome {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl RoleSyncOutcome {
    /// No role was declared at all.
    pub fn is_empty(&self) -> bool {
        self.created + self.updated + self.unchanged == 0
    }

    pub fn has_changes(&self) -> bool {
        self.created + self.updated > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncResult {
    Created,
    Updated,
    Unchanged,
}

/// Parse role documents and merge them by name; a later definition replaces
/// an earlier one but keeps its position.
pub fn parse_roles<S: AsRef<str>>(documents: &[S]) -> Result<Vec<RoleDefinition>, LoaderError> {
    let mut roles: Vec<RoleDefinition> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for document in documents {
        let value: serde_yaml::Value = serde_yaml::from_str(document.as_ref())?;
        if value.is_null() {
            continue;
        }
        let file: RolesFile = serde_yaml::from_value(value)?;

        for def in file.roles.unwrap_or_default().into_iter().map(RoleDefinition::from) {
            match positions.get(&def.name) {
                Some(&i) => roles[i] = def,
                None => {
                    positions.insert(def.name.clone(), roles.len());
                    roles.push(def);
                }
            }
        }
    }

    Ok(roles)
}

/// Sync every role file found for `file_name` in `dir`.
pub async fn sync_roles_dir(
    db: &DatabaseConnection,
    dir: &Path,
    file_name: &str,
) -> Result<RoleSyncOutcome, LoaderError> {
    let files = data_files::discover(dir, file_name)?;
    tracing::info!(files = files.len(), "Loading role files");
    let documents = data_files::read_all(&files)?;
    sync_roles(db, &documents).await
}

/// Create missing system roles and update changed labels (idempotent).
pub async fn sync_roles<S: AsRef<str>>(
    db: &DatabaseConnection,
    documents: &[S],
) -> Result<RoleSyncOutcome, LoaderError> {
    let definitions = parse_roles(documents)?;
    tracing::info!("Found {} role(s) in data files", definitions.len());
    if definitions.is_empty() {
        return Ok(RoleSyncOutcome::default());
    }

    let txn = db.begin().await?;
    let result = sync_all(&txn, &definitions).await;
    let outcome = storage::finish(txn, result).await?;

    tracing::info!(
        "Role sync complete: {} created, {} updated, {} unchanged",
        outcome.created,
        outcome.updated,
        outcome.unchanged
    );

    Ok(outcome)
}

async fn sync_all<C: ConnectionTrait>(
    db: &C,
    definitions: &[RoleDefinition],
) -> Result<RoleSyncOutcome, LoaderError> {
    let names: Vec<String> = definitions.iter().map(|d| d.name.clone()).collect();
    let existing: HashMap<String, (i32, Option<String>)> =
        storage::find_system_roles_by_name(db, &names)
            .await?
            .into_iter()
            .map(|m| (m.name, (m.id, m.label)))
            .collect();

    let mut outcome = RoleSyncOutcome::default();
    for def in definitions {
        match sync_role(db, def, existing.get(&def.name)).await? {
            SyncResult::Created => outcome.created += 1,
            SyncResult::Updated => outcome.updated += 1,
            SyncResult::Unchanged => outcome.unchanged += 1,
        }
    }

    Ok(outcome)
}

/// Sync a single role (idempotent)
async fn sync_role<C: ConnectionTrait>(
    db: &C,
    def: &RoleDefinition,
    existing: Option<&(i32, Option<String>)>,
) -> Result<SyncResult, LoaderError> {
    ensure_valid(def)?;

    match existing {
        None => {
            tracing::info!("Creating role: {}", def.name);
            storage::create_system_role(db, &def.name, def.label.clone()).await?;
            Ok(SyncResult::Created)
        }
        Some((id, label)) if *label != def.label => {
            tracing::info!("Updating role: {}", def.name);
            storage::update_role_label(db, *id, def.label.clone()).await?;
            Ok(SyncResult::Updated)
        }
        Some(_) => Ok(SyncResult::Unchanged),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_and_shorthand_entries() {
        let roles = parse_roles(&[r#"
roles:
  - name: ROLE_ADMIN
    label: Administrator
  - ROLE_USER
"#])
        .unwrap();

        assert_eq!(
            roles,
            vec![
                RoleDefinition {
                    name: "ROLE_ADMIN".into(),
                    label: Some("Administrator".into())
                },
                RoleDefinition {
                    name: "ROLE_USER".into(),
                    label: None
                },
            ]
        );
    }

    #[test]
    fn test_later_document_wins() {
        let roles = parse_roles(&[
            "roles: [ROLE_ADMIN, ROLE_USER]",
            "roles:\n  - {name: ROLE_ADMIN, label: Admin}",
        ])
        .unwrap();

        assert_eq!(roles.len(), 2);
        assert_eq!(roles[0].name, "ROLE_ADMIN");
        assert_eq!(roles[0].label.as_deref(), Some("Admin"));
    }

    #[test]
    fn test_empty_documents() {
        assert!(parse_roles(&["", "roles: []", "roles:"]).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_root_key() {
        let err = parse_roles(&["groups: [ROLE_ADMIN]"]).unwrap_err();
        assert!(matches!(err, LoaderError::Schema { .. }));
    }

    #[test]
    fn test_outcome_flags() {
        assert!(RoleSyncOutcome::default().is_empty());
        let unchanged = RoleSyncOutcome {
            unchanged: 2,
            ..Default::default()
        };
        assert!(!unchanged.is_empty());
        assert!(!unchanged.has_changes());
        let created = RoleSyncOutcome {
            created: 1,
            ..Default::default()
        };
        assert!(created.has_changes());
    }
}
