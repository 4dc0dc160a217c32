use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Enable foreign keys for SQLite
        if manager.get_database_backend() == sea_orm::DatabaseBackend::Sqlite {
            manager
                .get_connection()
                .execute_unprepared("PRAGMA foreign_keys = ON")
                .await?;
        }

        // Create organizations table
        manager
            .create_table(
                Table::create()
                    .table(Organizations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Organizations::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(string_uniq(Organizations::Name))
                    .col(string_null(Organizations::Label))
                    .col(big_integer(Organizations::CreatedAt))
                    .to_owned(),
            )
            .await?;

        // Create users table
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Subject)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string_uniq(Users::Username))
                    .col(string(Users::PasswordHash))
                    .col(string_null(Users::Email))
                    .col(
                        ColumnDef::new(Users::Roles)
                            .string()
                            .not_null()
                            .default("[]"),
                    )
                    .col(
                        ColumnDef::new(Users::Enabled)
                            .big_integer()
                            .not_null()
                            .default(1),
                    )
                    .col(big_integer(Users::CreatedAt))
                    .to_owned(),
            )
            .await?;

        // Create organization_users table (membership link)
        manager
            .create_table(
                Table::create()
                    .table(OrganizationUsers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OrganizationUsers::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(integer(OrganizationUsers::OrganizationId))
                    .col(string(OrganizationUsers::UserSubject))
                    .col(
                        ColumnDef::new(OrganizationUsers::Roles)
                            .string()
                            .not_null()
                            .default("[]"),
                    )
                    .col(big_integer(OrganizationUsers::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_organization_users_organization")
                            .from(OrganizationUsers::Table, OrganizationUsers::OrganizationId)
                            .to(Organizations::Table, Organizations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_organization_users_user")
                            .from(OrganizationUsers::Table, OrganizationUsers::UserSubject)
                            .to(Users::Table, Users::Subject)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_organization_users_link")
                    .table(OrganizationUsers::Table)
                    .col(OrganizationUsers::OrganizationId)
                    .col(OrganizationUsers::UserSubject)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Create roles table; organization_id NULL marks a system role
        manager
            .create_table(
                Table::create()
                    .table(Roles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Roles::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(string(Roles::Name))
                    .col(string_null(Roles::Label))
                    .col(integer_null(Roles::OrganizationId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_roles_organization")
                            .from(Roles::Table, Roles::OrganizationId)
                            .to(Organizations::Table, Organizations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_roles_name")
                    .table(Roles::Table)
                    .col(Roles::Name)
                    .to_owned(),
            )
            .await?;

        // System role names are unique; organization roles may reuse them.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_roles_system_name \
                 ON roles (name) WHERE organization_id IS NULL",
            )
            .await?;

        // Create permissions table
        manager
            .create_table(
                Table::create()
                    .table(Permissions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Permissions::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(string(Permissions::Operation))
                    .col(string_null(Permissions::Class))
                    .col(string_null(Permissions::Field))
                    .col(string_null(Permissions::Label))
                    .col(string_null(Permissions::DetailLabel))
                    .col(string_null(Permissions::TranslationDomain))
                    .col(
                        ColumnDef::new(Permissions::Contexts)
                            .string()
                            .not_null()
                            .default("[]"),
                    )
                    .to_owned(),
            )
            .await?;

        // NULL class/field never compare equal, so the identity triple is
        // indexed with COALESCE. Empty class/field names are rejected on write.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_permissions_identity \
                 ON permissions (operation, COALESCE(class, ''), COALESCE(field, ''))",
            )
            .await?;

        // Create role_permissions join table
        manager
            .create_table(
                Table::create()
                    .table(RolePermissions::Table)
                    .if_not_exists()
                    .col(integer(RolePermissions::RoleId))
                    .col(integer(RolePermissions::PermissionId))
                    .primary_key(
                        Index::create()
                            .col(RolePermissions::RoleId)
                            .col(RolePermissions::PermissionId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_role_permissions_role")
                            .from(RolePermissions::Table, RolePermissions::RoleId)
                            .to(Roles::Table, Roles::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_role_permissions_permission")
                            .from(RolePermissions::Table, RolePermissions::PermissionId)
                            .to(Permissions::Table, Permissions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RolePermissions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Permissions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Roles::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OrganizationUsers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Organizations::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Organizations {
    Table,
    Id,
    Name,
    Label,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Subject,
    Username,
    PasswordHash,
    Email,
    Roles,
    Enabled,
    CreatedAt,
}

#[derive(DeriveIden)]
enum OrganizationUsers {
    Table,
    Id,
    OrganizationId,
    UserSubject,
    Roles,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Roles {
    Table,
    Id,
    Name,
    Label,
    OrganizationId,
}

#[derive(DeriveIden)]
enum Permissions {
    Table,
    Id,
    Operation,
    Class,
    Field,
    Label,
    DetailLabel,
    TranslationDomain,
    Contexts,
}

#[derive(DeriveIden)]
enum RolePermissions {
    Table,
    RoleId,
    PermissionId,
}
