use permsync::entities;
use permsync::permissions::store::SecurityStore;
use permsync::permissions::{PermissionKey, PermissionRecord};
use permsync::storage::SeaOrmStore;
use sea_orm::{
    ColumnTrait, Database, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
};
use sea_orm_migration::MigratorTrait;
use std::collections::BTreeSet;
use tempfile::NamedTempFile;

/// Test database with automatic cleanup
pub struct TestDb {
    connection: DatabaseConnection,
    _temp_file: NamedTempFile,
}

impl TestDb {
    /// Create a new test database with migrations applied
    pub async fn new() -> Self {
        // Create temporary SQLite database file
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let db_path = temp_file.path().to_str().expect("Invalid temp file path");
        let db_url = format!("sqlite://{}?mode=rwc", db_path);

        // Connect to database
        let connection = Database::connect(&db_url)
            .await
            .expect("Failed to connect to test database");

        // Run migrations
        migration::Migrator::up(&connection, None)
            .await
            .expect("Failed to run migrations");

        Self {
            connection,
            _temp_file: temp_file,
        }
    }

    /// Get database connection
    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }
}

/// All stored permissions, in insertion order
pub async fn all_permissions(db: &DatabaseConnection) -> Vec<PermissionRecord> {
    SeaOrmStore::new(db)
        .find_all_permissions()
        .await
        .expect("Failed to list permissions")
}

/// Permissions currently held by a system role
pub async fn role_permissions(db: &DatabaseConnection, name: &str) -> BTreeSet<PermissionKey> {
    SeaOrmStore::new(db)
        .find_system_roles(&[name.to_string()])
        .await
        .expect("Failed to load role")
        .into_iter()
        .next()
        .expect("Role not found")
        .permissions
}

/// Number of rows in the role/permission join table
pub async fn grant_count(db: &DatabaseConnection) -> u64 {
    permsync::entities::RolePermission::find()
        .count(db)
        .await
        .expect("Failed to count grants")
}

pub async fn organization_by_name(
    db: &DatabaseConnection,
    name: &str,
) -> Option<entities::organization::Model> {
    entities::Organization::find()
        .filter(entities::organization::Column::Name.eq(name))
        .one(db)
        .await
        .expect("Failed to query organization")
}

pub async fn user_by_username(
    db: &DatabaseConnection,
    username: &str,
) -> Option<entities::user::Model> {
    entities::User::find()
        .filter(entities::user::Column::Username.eq(username))
        .one(db)
        .await
        .expect("Failed to query user")
}

/// Memberships of a user, with their role markers decoded
pub async fn memberships_of(
    db: &DatabaseConnection,
    user_subject: &str,
) -> Vec<(i32, Vec<String>)> {
    entities::OrganizationUser::find()
        .filter(entities::organization_user::Column::UserSubject.eq(user_subject))
        .all(db)
        .await
        .expect("Failed to query memberships")
        .into_iter()
        .map(|m| {
            let roles = serde_json::from_str(&m.roles).expect("Invalid roles JSON");
            (m.organization_id, roles)
        })
        .collect()
}

/// Check a plaintext password against a stored Argon2 hash
pub fn password_matches(stored_hash: &str, plaintext: &str) -> bool {
    use argon2::{Argon2, PasswordHash, PasswordVerifier};

    let parsed_hash = PasswordHash::new(stored_hash).expect("Invalid password hash");
    Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed_hash)
        .is_ok()
}
