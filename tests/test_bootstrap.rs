mod helpers;

use helpers::db::{memberships_of, organization_by_name, password_matches, user_by_username};
use helpers::TestDb;
use permsync::bootstrap::{self, SeedOutcome};
use permsync::credentials::{Argon2Hasher, CredentialHasher};
use permsync::entities::{Organization, OrganizationUser, User};
use permsync::errors::LoaderError;
use permsync::storage;
use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait};

async fn counts(db: &DatabaseConnection) -> (u64, u64, u64) {
    (
        Organization::find().count(db).await.expect("Count failed"),
        User::find().count(db).await.expect("Count failed"),
        OrganizationUser::find().count(db).await.expect("Count failed"),
    )
}

#[tokio::test]
async fn test_seed_creates_organization_user_and_membership() {
    let test_db = TestDb::new().await;
    let db = test_db.connection();

    let outcome = bootstrap::seed_organization(db, &Argon2Hasher)
        .await
        .expect("Failed to seed");
    assert_eq!(outcome, SeedOutcome::Initialized);
    assert_eq!(counts(db).await, (1, 1, 1));

    let org = organization_by_name(db, "org-admin")
        .await
        .expect("Organization not found");
    assert_eq!(org.label.as_deref(), Some("Organization Admin"));

    let user = user_by_username(db, "admin")
        .await
        .expect("User not found");
    assert_eq!(user.email.as_deref(), Some("admin@example.tld"));
    assert_eq!(user.roles, r#"["ROLE_SUPER_ADMIN"]"#);
    assert!(password_matches(&user.password_hash, "password"));

    let memberships = memberships_of(db, &user.subject).await;
    assert_eq!(memberships.len(), 1);
    assert_eq!(memberships[0].0, org.id);
    assert_eq!(memberships[0].1, vec!["ROLE_ADMIN"]);
}

#[tokio::test]
async fn test_seed_runs_once() {
    let test_db = TestDb::new().await;
    let db = test_db.connection();

    bootstrap::seed_organization(db, &Argon2Hasher)
        .await
        .expect("First seed failed");
    let outcome = bootstrap::seed_organization(db, &Argon2Hasher)
        .await
        .expect("Second seed failed");

    assert_eq!(outcome, SeedOutcome::AlreadyInitialized);
    assert_eq!(counts(db).await, (1, 1, 1));
}

#[tokio::test]
async fn test_any_organization_blocks_seeding() {
    let test_db = TestDb::new().await;
    let db = test_db.connection();

    storage::create_organization(
        db,
        &storage::NewOrganization {
            name: "acme".into(),
            label: None,
        },
    )
    .await
    .expect("Failed to create organization");

    let outcome = bootstrap::seed_organization(db, &Argon2Hasher)
        .await
        .expect("Seed failed");
    assert_eq!(outcome, SeedOutcome::AlreadyInitialized);
    assert_eq!(counts(db).await, (1, 0, 0));
}

struct FailingHasher;

impl CredentialHasher for FailingHasher {
    fn hash(&self, _username: &str, _plaintext: &str) -> Result<String, LoaderError> {
        Err(LoaderError::Unexpected("hasher unavailable".into()))
    }
}

#[tokio::test]
async fn test_failed_seed_writes_nothing() {
    let test_db = TestDb::new().await;
    let db = test_db.connection();

    let err = bootstrap::seed_organization(db, &FailingHasher)
        .await
        .unwrap_err();
    assert!(matches!(err, LoaderError::Unexpected(_)));
    assert_eq!(counts(db).await, (0, 0, 0));
}

#[tokio::test]
async fn test_user_conflict_rolls_back_organization() {
    let test_db = TestDb::new().await;
    let db = test_db.connection();

    // A pre-existing `admin` user makes the user insert fail after the
    // organization row was written.
    storage::create_user(
        db,
        &storage::NewUser {
            username: "admin".into(),
            password_hash: "hash".into(),
            email: None,
            roles: Vec::new(),
        },
    )
    .await
    .expect("Failed to create user");

    let err = bootstrap::seed_organization(db, &Argon2Hasher)
        .await
        .unwrap_err();
    assert!(matches!(err, LoaderError::Db(_)));
    assert_eq!(counts(db).await, (0, 1, 0));
}
