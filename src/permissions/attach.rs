use std::collections::{BTreeMap, BTreeSet};

use crate::errors::LoaderError;
use crate::permissions::scope::entries;
use crate::permissions::types::{NormalizedConfig, PermissionKey, PermissionRecord, RoleRecord};

/// Every distinct role name referenced by an `attached_roles` list.
pub fn used_roles(config: &NormalizedConfig) -> BTreeSet<String> {
    entries(config)
        .flat_map(|(_, spec)| spec.attached_roles.iter().cloned())
        .collect()
}

/// Index `found` by name, failing with every name of `used` that has no role.
pub fn ensure_roles_exist(
    used: &BTreeSet<String>,
    found: Vec<RoleRecord>,
) -> Result<BTreeMap<String, RoleRecord>, LoaderError> {
    let roles: BTreeMap<String, RoleRecord> = found
        .into_iter()
        .map(|role| (role.name.clone(), role))
        .collect();

    let missing: Vec<String> = used
        .iter()
        .filter(|name| !roles.contains_key(*name))
        .cloned()
        .collect();

    if missing.is_empty() {
        Ok(roles)
    } else {
        Err(LoaderError::MissingRoles(missing))
    }
}

#[derive(Debug, Default)]
pub struct RolePlan {
    pub roles: BTreeMap<String, RoleRecord>,
    /// Names of roles that gained at least one permission.
    pub touched: BTreeSet<String>,
    pub attachments: usize,
}

impl RolePlan {
    pub fn has_updated_roles(&self) -> bool {
        !self.touched.is_empty()
    }

    /// Roles to submit to the store as one batch.
    pub fn updated_roles(&self) -> Vec<RoleRecord> {
        self.touched
            .iter()
            .filter_map(|name| self.roles.get(name).cloned())
            .collect()
    }
}

/// Grant every attached role the permission it is attached to. Roles only gain
/// permissions here; nothing is removed.
pub fn attach_roles(
    config: &NormalizedConfig,
    permissions: &BTreeMap<PermissionKey, PermissionRecord>,
    roles: BTreeMap<String, RoleRecord>,
) -> Result<RolePlan, LoaderError> {
    let plan = RolePlan {
        roles,
        ..Default::default()
    };

    entries(config)
        .filter(|(_, spec)| !spec.attached_roles.is_empty())
        .try_fold(plan, |mut plan, (scope, spec)| {
            let key = scope.key(&spec.operation);
            if !permissions.contains_key(&key) {
                return Err(LoaderError::Unexpected(format!(
                    "permission `{key}` was not reconciled before role attachment"
                )));
            }

            for role_name in &spec.attached_roles {
                let role = plan.roles.get_mut(role_name).ok_or_else(|| {
                    LoaderError::MissingRoles(vec![role_name.clone()])
                })?;

                if role.add_permission(key.clone()) {
                    tracing::debug!(role = %role_name, permission = %key, "Attaching permission");
                    plan.touched.insert(role_name.clone());
                    plan.attachments += 1;
                }
            }

            Ok(plan)
        })
}
