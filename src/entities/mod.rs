pub mod organization;
pub mod organization_user;
pub mod permission;
pub mod role;
pub mod role_permission;
pub mod user;

pub use organization::Entity as Organization;
pub use organization_user::Entity as OrganizationUser;
pub use permission::Entity as Permission;
pub use role::Entity as Role;
pub use role_permission::Entity as RolePermission;
pub use user::Entity as User;
