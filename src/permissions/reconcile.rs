use std::collections::{BTreeMap, HashMap};

use crate::permissions::scope::entries;
use crate::permissions::types::{NormalizedConfig, PermissionKey, PermissionRecord};

/// Existing records grouped by `(class, field)`, then by operation.
pub type ExistingIndex =
    HashMap<(Option<String>, Option<String>), HashMap<String, PermissionRecord>>;

pub fn build_index(existing: Vec<PermissionRecord>) -> ExistingIndex {
    let mut index = ExistingIndex::new();
    for record in existing {
        index
            .entry((record.class.clone(), record.field.clone()))
            .or_default()
            .insert(record.operation.clone(), record);
    }
    index
}

/// Result of diffing the configuration against stored permissions.
#[derive(Debug, Default)]
pub struct PermissionPlan {
    /// Every permission the configuration declares, created or existing.
    pub permissions: BTreeMap<PermissionKey, PermissionRecord>,
    /// Keys of records that must be written, in traversal order.
    pub upserts: Vec<PermissionKey>,
    pub created: usize,
    pub updated: usize,
}

impl PermissionPlan {
    pub fn has_new_permissions(&self) -> bool {
        self.created > 0
    }

    pub fn has_updated_permissions(&self) -> bool {
        self.updated > 0
    }

    /// Records to submit to the store as one batch.
    pub fn touched(&self) -> Vec<PermissionRecord> {
        self.upserts
            .iter()
            .filter_map(|key| self.permissions.get(key).cloned())
            .collect()
    }

    /// Replace planned records with their saved counterparts (which carry ids).
    pub fn absorb(&mut self, saved: Vec<PermissionRecord>) {
        for record in saved {
            self.permissions.insert(record.key(), record);
        }
    }
}

/// Decide which permissions must be created or updated. Pure: nothing is written.
pub fn reconcile(config: &NormalizedConfig, existing: Vec<PermissionRecord>) -> PermissionPlan {
    let mut index = build_index(existing);

    entries(config).fold(PermissionPlan::default(), |mut plan, (scope, spec)| {
        let key = scope.key(&spec.operation);
        let stored = index
            .get_mut(&(key.class.clone(), key.field.clone()))
            .and_then(|ops| ops.remove(&spec.operation));

        let record = match stored {
            None => {
                let mut record = PermissionRecord::new(&key);
                record.apply(spec);
                tracing::debug!(permission = %key, "New permission");
                plan.created += 1;
                plan.upserts.push(key.clone());
                record
            }
            Some(mut record) => {
                if record.apply(spec) {
                    tracing::debug!(permission = %key, "Permission changed");
                    plan.updated += 1;
                    plan.upserts.push(key.clone());
                }
                record
            }
        };

        plan.permissions.insert(key, record);
        plan
    })
}
