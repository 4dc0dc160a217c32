use crate::permissions::scope::for_each_map_mut;
use crate::permissions::types::{NormalizedConfig, PermissionMap};

/// Fill the empty fields of every permission whose operation names a template,
/// across the global, class and field scopes.
pub fn resolve_templates(config: &mut NormalizedConfig) {
    if config.templates.is_empty() {
        return;
    }

    let templates = std::mem::take(&mut config.templates);
    for_each_map_mut(config, |_, permissions| {
        apply_templates(&templates, permissions)
    });
    config.templates = templates;
}

/// Templates are matched strictly by operation name.
pub fn apply_templates(templates: &PermissionMap, permissions: &mut PermissionMap) {
    for spec in permissions.iter_mut() {
        if let Some(template) = templates.get(&spec.operation) {
            spec.inherit(template);
        }
    }
}
