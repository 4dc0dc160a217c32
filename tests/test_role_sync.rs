mod helpers;

use helpers::db::role_permissions;
use helpers::{RoleBuilder, TestDb};
use permsync::errors::LoaderError;
use permsync::role_sync::{self, RoleSyncOutcome};
use permsync::storage;

const ROLES: &str = r#"
roles:
  - name: ROLE_ADMIN
    label: Administrator
  - ROLE_USER
"#;

#[tokio::test]
async fn test_sync_creates_missing_roles() {
    let test_db = TestDb::new().await;
    let db = test_db.connection();

    let outcome = role_sync::sync_roles(db, &[ROLES])
        .await
        .expect("Failed to sync roles");
    assert_eq!(
        outcome,
        RoleSyncOutcome {
            created: 2,
            updated: 0,
            unchanged: 0
        }
    );

    let roles = storage::find_system_roles_by_name(db, &["ROLE_ADMIN".into(), "ROLE_USER".into()])
        .await
        .expect("Query failed");
    assert_eq!(roles.len(), 2);
    assert_eq!(roles[0].label.as_deref(), Some("Administrator"));
    assert!(roles.iter().all(|r| r.organization_id.is_none()));
}

#[tokio::test]
async fn test_sync_is_idempotent() {
    let test_db = TestDb::new().await;
    let db = test_db.connection();

    role_sync::sync_roles(db, &[ROLES])
        .await
        .expect("First sync failed");
    let outcome = role_sync::sync_roles(db, &[ROLES])
        .await
        .expect("Second sync failed");

    assert!(!outcome.has_changes());
    assert_eq!(outcome.unchanged, 2);
}

#[tokio::test]
async fn test_sync_updates_label_and_keeps_grants() {
    let test_db = TestDb::new().await;
    let db = test_db.connection();
    RoleBuilder::new("ROLE_ADMIN").with_label("Admin").create(db).await;
    permsync::permissions::load(db, &["permissions: {view: [ROLE_ADMIN]}"])
        .await
        .expect("Failed to load permissions");

    let outcome = role_sync::sync_roles(db, &[ROLES])
        .await
        .expect("Failed to sync roles");
    assert_eq!(outcome.created, 1);
    assert_eq!(outcome.updated, 1);

    let admin = storage::find_system_roles_by_name(db, &["ROLE_ADMIN".into()])
        .await
        .expect("Query failed");
    assert_eq!(admin[0].label.as_deref(), Some("Administrator"));
    assert_eq!(role_permissions(db, "ROLE_ADMIN").await.len(), 1);
}

#[tokio::test]
async fn test_invalid_role_rolls_back_sync() {
    let test_db = TestDb::new().await;
    let db = test_db.connection();

    let err = role_sync::sync_roles(db, &["roles: [ROLE_ADMIN, 'ROLE BROKEN']"])
        .await
        .unwrap_err();
    match err {
        LoaderError::Validation { entity, .. } => assert_eq!(entity, "role `ROLE BROKEN`"),
        other => panic!("unexpected error: {other:?}"),
    }

    let roles = storage::find_system_roles_by_name(db, &["ROLE_ADMIN".into()])
        .await
        .expect("Query failed");
    assert!(roles.is_empty());
}

#[tokio::test]
async fn test_no_roles_declared() {
    let test_db = TestDb::new().await;
    let db = test_db.connection();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    let outcome = role_sync::sync_roles_dir(db, dir.path(), "security_roles.yaml")
        .await
        .expect("Failed to sync roles");
    assert!(outcome.is_empty());
}

#[tokio::test]
async fn test_sync_dir_merges_sibling_files() {
    let test_db = TestDb::new().await;
    let db = test_db.connection();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    std::fs::write(dir.path().join("security_roles.yaml"), ROLES).expect("Failed to write file");
    std::fs::write(
        dir.path().join("security_roles_billing.yaml"),
        "roles:\n  - { name: ROLE_ACCOUNTANT, label: Accountant }\n",
    )
    .expect("Failed to write file");

    let outcome = role_sync::sync_roles_dir(db, dir.path(), "security_roles.yaml")
        .await
        .expect("Failed to sync roles");
    assert_eq!(outcome.created, 3);
}
