use permsync::entities;
use permsync::storage;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

/// Builder for creating test roles
pub struct RoleBuilder {
    name: String,
    label: Option<String>,
    organization_id: Option<i32>,
}

impl RoleBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            label: None,
            organization_id: None,
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    /// Scope the role to an organization instead of making it a system role
    pub fn in_organization(mut self, organization_id: i32) -> Self {
        self.organization_id = Some(organization_id);
        self
    }

    pub async fn create(self, db: &DatabaseConnection) -> entities::role::Model {
        match self.organization_id {
            None => storage::create_system_role(db, &self.name, self.label)
                .await
                .expect("Failed to create test role"),
            Some(organization_id) => entities::role::ActiveModel {
                name: Set(self.name),
                label: Set(self.label),
                organization_id: Set(Some(organization_id)),
                ..Default::default()
            }
            .insert(db)
            .await
            .expect("Failed to create organization role"),
        }
    }
}
