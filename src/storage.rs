use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use base64ct::Encoding;
use chrono::Utc;
use rand::RngCore;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, Database, DatabaseConnection,
    DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use sea_orm_migration::MigratorTrait;
use serde::{Deserialize, Serialize};

use crate::entities;
use crate::errors::{LoaderError, RecordError};
use crate::permissions::store::SecurityStore;
use crate::permissions::types::{PermissionKey, PermissionRecord, RoleRecord};
use crate::settings::Database as DbCfg;
use crate::validation::{Rules, Validate, Violation};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: i32,
    pub name: String,
    pub label: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrganization {
    pub name: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub subject: String,
    pub username: String,
    pub password_hash: String,
    pub email: Option<String>,
    pub roles: Vec<String>,
    pub enabled: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub email: Option<String>,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub id: i32,
    pub organization_id: i32,
    pub user_subject: String,
    pub roles: Vec<String>,
    pub created_at: i64,
}

/// Link between an organization and a user, both referenced by their unique names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMembership {
    pub organization: String,
    pub username: String,
    pub roles: Vec<String>,
}

impl Validate for NewOrganization {
    fn entity_name(&self) -> String {
        format!("organization `{}`", self.name)
    }

    fn violations(&self) -> Vec<Violation> {
        Rules::new()
            .organization_name("name", &self.name)
            .optional_text("label", self.label.as_deref())
            .finish()
    }
}

impl Validate for NewUser {
    fn entity_name(&self) -> String {
        format!("user `{}`", self.username)
    }

    fn violations(&self) -> Vec<Violation> {
        Rules::new()
            .username("username", &self.username)
            .not_blank("password", &self.password_hash)
            .email("email", self.email.as_deref())
            .each_not_blank("roles", &self.roles)
            .finish()
    }
}

impl Validate for NewMembership {
    fn entity_name(&self) -> String {
        format!("membership `{}` in `{}`", self.username, self.organization)
    }

    fn violations(&self) -> Vec<Violation> {
        Rules::new()
            .not_blank("organization", &self.organization)
            .not_blank("user", &self.username)
            .each_not_blank("roles", &self.roles)
            .finish()
    }
}

/// Connect and bring the schema up to date.
pub async fn init(cfg: &DbCfg) -> Result<DatabaseConnection, LoaderError> {
    let db = Database::connect(&cfg.url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

/// Commit `txn` when `result` is a success, roll it back otherwise.
///
/// A transaction dropped without either (for instance on panic) is rolled back
/// by SeaORM itself.
pub async fn finish<T>(
    txn: DatabaseTransaction,
    result: Result<T, LoaderError>,
) -> Result<T, LoaderError> {
    match result {
        Ok(value) => {
            txn.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                tracing::error!(error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}

fn random_id() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64ct::Base64UrlUnpadded::encode_string(&bytes)
}

fn encode_list(values: &[String]) -> Result<String, LoaderError> {
    Ok(serde_json::to_string(values)?)
}

fn decode_list(json: &str) -> Result<Vec<String>, LoaderError> {
    Ok(serde_json::from_str(json)?)
}

/// Collect validation failures for a whole batch.
fn reject_invalid<T: Validate>(batch: &[T]) -> Result<(), LoaderError> {
    let errors: Vec<RecordError> = batch
        .iter()
        .filter_map(|record| {
            let violations = record.violations();
            (!violations.is_empty()).then(|| RecordError {
                entity: record.entity_name(),
                violations,
            })
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(LoaderError::Persistence { errors })
    }
}

// Permission and role store

fn permission_key(model: &entities::permission::Model) -> PermissionKey {
    PermissionKey::new(
        model.operation.clone(),
        model.class.as_deref(),
        model.field.as_deref(),
    )
}

fn permission_from_model(
    model: entities::permission::Model,
) -> Result<PermissionRecord, LoaderError> {
    Ok(PermissionRecord {
        id: Some(model.id),
        contexts: decode_list(&model.contexts)?,
        operation: model.operation,
        class: model.class,
        field: model.field,
        label: model.label,
        detail_label: model.detail_label,
        translation_domain: model.translation_domain,
    })
}

/// [`SecurityStore`] backed by a SeaORM connection or transaction.
pub struct SeaOrmStore<'c, C> {
    conn: &'c C,
}

impl<'c, C: ConnectionTrait> SeaOrmStore<'c, C> {
    pub fn new(conn: &'c C) -> Self {
        Self { conn }
    }

    async fn permission_ids(&self) -> Result<HashMap<PermissionKey, i32>, LoaderError> {
        use entities::permission::Entity;

        let ids = Entity::find()
            .all(self.conn)
            .await?
            .into_iter()
            .map(|m| (permission_key(&m), m.id))
            .collect();
        Ok(ids)
    }
}

#[async_trait]
impl<'c, C> SecurityStore for SeaOrmStore<'c, C>
where
    C: ConnectionTrait + Send + Sync,
{
    async fn find_all_permissions(&self) -> Result<Vec<PermissionRecord>, LoaderError> {
        use entities::permission::{Column, Entity};

        Entity::find()
            .order_by_asc(Column::Id)
            .all(self.conn)
            .await?
            .into_iter()
            .map(permission_from_model)
            .collect()
    }

    async fn find_system_roles(&self, names: &[String]) -> Result<Vec<RoleRecord>, LoaderError> {
        use entities::{permission, role, role_permission};

        if names.is_empty() {
            return Ok(Vec::new());
        }

        let roles = role::Entity::find()
            .filter(role::Column::OrganizationId.is_null())
            .filter(role::Column::Name.is_in(names.iter().cloned()))
            .order_by_asc(role::Column::Id)
            .all(self.conn)
            .await?;
        if roles.is_empty() {
            return Ok(Vec::new());
        }

        let grants = role_permission::Entity::find()
            .filter(role_permission::Column::RoleId.is_in(roles.iter().map(|r| r.id)))
            .all(self.conn)
            .await?;

        let mut keys: HashMap<i32, PermissionKey> = HashMap::new();
        if !grants.is_empty() {
            let permission_ids: HashSet<i32> = grants.iter().map(|g| g.permission_id).collect();
            for model in permission::Entity::find()
                .filter(permission::Column::Id.is_in(permission_ids))
                .all(self.conn)
                .await?
            {
                keys.insert(model.id, permission_key(&model));
            }
        }

        Ok(roles
            .into_iter()
            .map(|model| RoleRecord {
                permissions: grants
                    .iter()
                    .filter(|g| g.role_id == model.id)
                    .filter_map(|g| keys.get(&g.permission_id).cloned())
                    .collect(),
                id: model.id,
                name: model.name,
                label: model.label,
            })
            .collect())
    }

    async fn upsert_permissions(
        &self,
        batch: Vec<PermissionRecord>,
    ) -> Result<Vec<PermissionRecord>, LoaderError> {
        use entities::permission::ActiveModel;

        reject_invalid(&batch)?;

        let mut saved = Vec::with_capacity(batch.len());
        for record in batch {
            let contexts = encode_list(&record.contexts)?;
            let model = match record.id {
                None => {
                    ActiveModel {
                        operation: Set(record.operation),
                        class: Set(record.class),
                        field: Set(record.field),
                        label: Set(record.label),
                        detail_label: Set(record.detail_label),
                        translation_domain: Set(record.translation_domain),
                        contexts: Set(contexts),
                        ..Default::default()
                    }
                    .insert(self.conn)
                    .await?
                }
                // The identity triple is never rewritten.
                Some(id) => {
                    ActiveModel {
                        id: Set(id),
                        label: Set(record.label),
                        detail_label: Set(record.detail_label),
                        translation_domain: Set(record.translation_domain),
                        contexts: Set(contexts),
                        ..Default::default()
                    }
                    .update(self.conn)
                    .await?
                }
            };
            saved.push(permission_from_model(model)?);
        }

        Ok(saved)
    }

    async fn update_roles(&self, batch: Vec<RoleRecord>) -> Result<(), LoaderError> {
        use entities::role_permission::{ActiveModel, Column, Entity};

        reject_invalid(&batch)?;
        let ids = self.permission_ids().await?;

        for role in batch {
            let held: HashSet<i32> = Entity::find()
                .filter(Column::RoleId.eq(role.id))
                .all(self.conn)
                .await?
                .into_iter()
                .map(|g| g.permission_id)
                .collect();

            let mut rows = Vec::new();
            for key in &role.permissions {
                let permission_id = *ids.get(key).ok_or_else(|| {
                    LoaderError::Unexpected(format!(
                        "permission `{key}` of role `{}` is not stored",
                        role.name
                    ))
                })?;
                if !held.contains(&permission_id) {
                    rows.push(ActiveModel {
                        role_id: Set(role.id),
                        permission_id: Set(permission_id),
                    });
                }
            }

            if !rows.is_empty() {
                tracing::debug!(role = %role.name, added = rows.len(), "Granting permissions");
                Entity::insert_many(rows)
                    .exec_without_returning(self.conn)
                    .await?;
            }
        }

        Ok(())
    }
}

// System roles

pub async fn find_system_roles_by_name<C: ConnectionTrait>(
    db: &C,
    names: &[String],
) -> Result<Vec<entities::role::Model>, LoaderError> {
    use entities::role::{Column, Entity};

    if names.is_empty() {
        return Ok(Vec::new());
    }

    Ok(Entity::find()
        .filter(Column::OrganizationId.is_null())
        .filter(Column::Name.is_in(names.iter().cloned()))
        .order_by_asc(Column::Id)
        .all(db)
        .await?)
}

pub async fn create_system_role<C: ConnectionTrait>(
    db: &C,
    name: &str,
    label: Option<String>,
) -> Result<entities::role::Model, LoaderError> {
    let role = entities::role::ActiveModel {
        name: Set(name.to_string()),
        label: Set(label),
        organization_id: Set(None),
        ..Default::default()
    };

    Ok(role.insert(db).await?)
}

pub async fn update_role_label<C: ConnectionTrait>(
    db: &C,
    id: i32,
    label: Option<String>,
) -> Result<(), LoaderError> {
    let role = entities::role::ActiveModel {
        id: Set(id),
        label: Set(label),
        ..Default::default()
    };
    role.update(db).await?;
    Ok(())
}

// Organizations, users and memberships

pub async fn count_organizations<C: ConnectionTrait>(db: &C) -> Result<u64, LoaderError> {
    Ok(entities::organization::Entity::find().count(db).await?)
}

pub async fn create_organization<C: ConnectionTrait>(
    db: &C,
    input: &NewOrganization,
) -> Result<Organization, LoaderError> {
    let created_at = Utc::now().timestamp();

    let org = entities::organization::ActiveModel {
        name: Set(input.name.clone()),
        label: Set(input.label.clone()),
        created_at: Set(created_at),
        ..Default::default()
    }
    .insert(db)
    .await?;

    Ok(Organization {
        id: org.id,
        name: org.name,
        label: org.label,
        created_at: org.created_at,
    })
}

pub async fn create_user<C: ConnectionTrait>(db: &C, input: &NewUser) -> Result<User, LoaderError> {
    let subject = random_id();
    let created_at = Utc::now().timestamp();

    let user = entities::user::ActiveModel {
        subject: Set(subject.clone()),
        username: Set(input.username.clone()),
        password_hash: Set(input.password_hash.clone()),
        email: Set(input.email.clone()),
        roles: Set(encode_list(&input.roles)?),
        enabled: Set(1),
        created_at: Set(created_at),
    };

    user.insert(db).await?;

    Ok(User {
        subject,
        username: input.username.clone(),
        password_hash: input.password_hash.clone(),
        email: input.email.clone(),
        roles: input.roles.clone(),
        enabled: 1,
        created_at,
    })
}

pub async fn create_membership<C: ConnectionTrait>(
    db: &C,
    organization_id: i32,
    user_subject: &str,
    roles: &[String],
) -> Result<Membership, LoaderError> {
    let created_at = Utc::now().timestamp();

    let link = entities::organization_user::ActiveModel {
        organization_id: Set(organization_id),
        user_subject: Set(user_subject.to_string()),
        roles: Set(encode_list(roles)?),
        created_at: Set(created_at),
        ..Default::default()
    }
    .insert(db)
    .await?;

    Ok(Membership {
        id: link.id,
        organization_id: link.organization_id,
        user_subject: link.user_subject,
        roles: roles.to_vec(),
        created_at: link.created_at,
    })
}
