//! One-time seeding of the administrative organization and its super admin.

use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};

use crate::credentials::CredentialHasher;
use crate::errors::LoaderError;
use crate::storage::{self, NewMembership, NewOrganization, NewUser};
use crate::validation::ensure_valid;

pub const ORGANIZATION_NAME: &str = "org-admin";
pub const ORGANIZATION_LABEL: &str = "Organization Admin";
pub const USERNAME: &str = "admin";
pub const USER_EMAIL: &str = "admin@example.tld";
pub const USER_PASSWORD: &str = "password";
pub const USER_ROLE: &str = "ROLE_SUPER_ADMIN";
pub const MEMBERSHIP_ROLE: &str = "ROLE_ADMIN";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    Initialized,
    AlreadyInitialized,
}

/// The three records written by a first run.
#[derive(Debug, Clone)]
pub struct BootstrapEntities {
    pub organization: NewOrganization,
    pub user: NewUser,
    pub membership: NewMembership,
}

/// Build and validate the bootstrap records without touching storage.
pub fn build_bootstrap_entities(
    hasher: &dyn CredentialHasher,
) -> Result<BootstrapEntities, LoaderError> {
    let organization = NewOrganization {
        name: ORGANIZATION_NAME.to_string(),
        label: Some(ORGANIZATION_LABEL.to_string()),
    };
    ensure_valid(&organization)?;

    let user = NewUser {
        username: USERNAME.to_string(),
        password_hash: hasher.hash(USERNAME, USER_PASSWORD)?,
        email: Some(USER_EMAIL.to_string()),
        roles: vec![USER_ROLE.to_string()],
    };
    ensure_valid(&user)?;

    let membership = NewMembership {
        organization: organization.name.clone(),
        username: user.username.clone(),
        roles: vec![MEMBERSHIP_ROLE.to_string()],
    };
    ensure_valid(&membership)?;

    Ok(BootstrapEntities {
        organization,
        user,
        membership,
    })
}

/// Create the bootstrap organization, user and membership unless any
/// organization already exists.
pub async fn seed_organization(
    db: &DatabaseConnection,
    hasher: &dyn CredentialHasher,
) -> Result<SeedOutcome, LoaderError> {
    let txn = db.begin().await?;
    let result = seed_with(&txn, hasher).await;
    storage::finish(txn, result).await
}

async fn seed_with<C: ConnectionTrait>(
    db: &C,
    hasher: &dyn CredentialHasher,
) -> Result<SeedOutcome, LoaderError> {
    if storage::count_organizations(db).await? > 0 {
        tracing::info!("Organization already initialized, skipping bootstrap");
        return Ok(SeedOutcome::AlreadyInitialized);
    }

    let entities = build_bootstrap_entities(hasher)?;

    let organization = storage::create_organization(db, &entities.organization).await?;
    let user = storage::create_user(db, &entities.user).await?;
    storage::create_membership(db, organization.id, &user.subject, &entities.membership.roles)
        .await?;

    tracing::info!(
        organization = %organization.name,
        username = %user.username,
        "Created bootstrap organization and super admin"
    );
    Ok(SeedOutcome::Initialized)
}
