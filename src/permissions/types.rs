use std::collections::{BTreeMap, BTreeSet};

use crate::validation::{Rules, Validate, Violation};

/// Identity of a permission record: `(operation, class, field)`.
///
/// `None` class/field means the global scope and is distinct from the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PermissionKey {
    pub operation: String,
    pub class: Option<String>,
    pub field: Option<String>,
}

impl PermissionKey {
    pub fn new(operation: impl Into<String>, class: Option<&str>, field: Option<&str>) -> Self {
        Self {
            operation: operation.into(),
            class: class.map(str::to_string),
            field: field.map(str::to_string),
        }
    }

    pub fn global(operation: impl Into<String>) -> Self {
        Self::new(operation, None, None)
    }
}

impl std::fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.operation,
            self.class.as_deref().unwrap_or_default(),
            self.field.as_deref().unwrap_or_default()
        )
    }
}

/// One permission entry of the configuration, also used as a template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSpec {
    pub operation: String,
    pub label: Option<String>,
    pub detail_label: Option<String>,
    pub translation_domain: Option<String>,
    pub contexts: Vec<String>,
    pub attached_roles: BTreeSet<String>,
}

impl PermissionSpec {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Default::default()
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attached_roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Fold a later declaration of the same operation into this one.
    pub fn merge(&mut self, other: PermissionSpec) {
        if other.label.is_some() {
            self.label = other.label;
        }
        if other.detail_label.is_some() {
            self.detail_label = other.detail_label;
        }
        if other.translation_domain.is_some() {
            self.translation_domain = other.translation_domain;
        }
        for context in other.contexts {
            if !self.contexts.contains(&context) {
                self.contexts.push(context);
            }
        }
        self.attached_roles.extend(other.attached_roles);
    }

    /// Fill every empty field from `template`. Non-empty values are never replaced.
    pub fn inherit(&mut self, template: &PermissionSpec) {
        inherit_text(&mut self.label, &template.label);
        inherit_text(&mut self.detail_label, &template.detail_label);
        inherit_text(&mut self.translation_domain, &template.translation_domain);
        if self.contexts.is_empty() && !template.contexts.is_empty() {
            self.contexts = template.contexts.clone();
        }
        if self.attached_roles.is_empty() && !template.attached_roles.is_empty() {
            self.attached_roles = template.attached_roles.clone();
        }
    }
}

fn inherit_text(value: &mut Option<String>, template: &Option<String>) {
    let empty = value.as_deref().map_or(true, str::is_empty);
    if let Some(t) = template.as_deref().filter(|t| !t.is_empty()) {
        if empty {
            *value = Some(t.to_string());
        }
    }
}

/// Operation → spec mapping that keeps document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionMap {
    entries: Vec<PermissionSpec>,
}

impl PermissionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, operation: &str) -> Option<&PermissionSpec> {
        self.entries.iter().find(|s| s.operation == operation)
    }

    pub fn get_mut(&mut self, operation: &str) -> Option<&mut PermissionSpec> {
        self.entries.iter_mut().find(|s| s.operation == operation)
    }

    /// Insert `spec`, replacing a previous entry with the same operation in place.
    pub fn insert(&mut self, spec: PermissionSpec) {
        match self.get_mut(&spec.operation) {
            Some(existing) => *existing = spec,
            None => self.entries.push(spec),
        }
    }

    pub fn merge(&mut self, other: PermissionMap) {
        for spec in other.entries {
            match self.get_mut(&spec.operation) {
                Some(existing) => existing.merge(spec),
                None => self.entries.push(spec),
            }
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PermissionSpec> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, PermissionSpec> {
        self.entries.iter_mut()
    }
}

impl FromIterator<PermissionSpec> for PermissionMap {
    fn from_iter<T: IntoIterator<Item = PermissionSpec>>(iter: T) -> Self {
        let mut map = PermissionMap::new();
        for spec in iter {
            map.insert(spec);
        }
        map
    }
}

impl<'a> IntoIterator for &'a PermissionMap {
    type Item = &'a PermissionSpec;
    type IntoIter = std::slice::Iter<'a, PermissionSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldScope {
    pub name: String,
    pub permissions: PermissionMap,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassScope {
    pub name: String,
    pub permissions: PermissionMap,
    /// field name -> field scope
    pub fields: BTreeMap<String, FieldScope>,
}

impl ClassScope {
    pub fn merge(&mut self, other: ClassScope) {
        self.permissions.merge(other.permissions);
        for (name, field) in other.fields {
            match self.fields.get_mut(&name) {
                Some(existing) => existing.permissions.merge(field.permissions),
                None => {
                    self.fields.insert(name, field);
                }
            }
        }
    }
}

/// Validated configuration, ready for template resolution and reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedConfig {
    /// Templates keyed by the operation they apply to. Never persisted.
    pub templates: PermissionMap,
    /// Global scope
    pub permissions: PermissionMap,
    /// class name -> class scope, iterated in name order
    pub classes: BTreeMap<String, ClassScope>,
}

impl NormalizedConfig {
    /// Merge a later document into this one.
    pub fn merge(&mut self, other: NormalizedConfig) {
        self.templates.merge(other.templates);
        self.permissions.merge(other.permissions);
        for (name, class) in other.classes {
            match self.classes.get_mut(&name) {
                Some(existing) => existing.merge(class),
                None => {
                    self.classes.insert(name, class);
                }
            }
        }
    }
}

/// Persisted permission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRecord {
    /// `None` until the record has been written
    pub id: Option<i32>,
    pub operation: String,
    pub class: Option<String>,
    pub field: Option<String>,
    pub label: Option<String>,
    pub detail_label: Option<String>,
    pub translation_domain: Option<String>,
    pub contexts: Vec<String>,
}

impl PermissionRecord {
    /// A blank, unsaved record carrying only its identity.
    pub fn new(key: &PermissionKey) -> Self {
        Self {
            id: None,
            operation: key.operation.clone(),
            class: key.class.clone(),
            field: key.field.clone(),
            label: None,
            detail_label: None,
            translation_domain: None,
            contexts: Vec::new(),
        }
    }

    pub fn key(&self) -> PermissionKey {
        PermissionKey {
            operation: self.operation.clone(),
            class: self.class.clone(),
            field: self.field.clone(),
        }
    }

    /// Copy the mutable fields of `spec` onto this record. Returns whether anything changed.
    pub fn apply(&mut self, spec: &PermissionSpec) -> bool {
        let mut updated = false;

        if self.contexts != spec.contexts {
            self.contexts = spec.contexts.clone();
            updated = true;
        }
        if self.label != spec.label {
            self.label = spec.label.clone();
            updated = true;
        }
        if self.detail_label != spec.detail_label {
            self.detail_label = spec.detail_label.clone();
            updated = true;
        }
        if self.translation_domain != spec.translation_domain {
            self.translation_domain = spec.translation_domain.clone();
            updated = true;
        }

        updated
    }
}

impl Validate for PermissionRecord {
    fn entity_name(&self) -> String {
        format!("permission `{}`", self.key())
    }

    fn violations(&self) -> Vec<Violation> {
        Rules::new()
            .name("operation", &self.operation)
            .optional_name("class", self.class.as_deref())
            .optional_name("field", self.field.as_deref())
            .check(
                "field",
                self.field.is_none() || self.class.is_some(),
                "requires a class",
            )
            .optional_text("label", self.label.as_deref())
            .optional_text("detail_label", self.detail_label.as_deref())
            .optional_text("translation_domain", self.translation_domain.as_deref())
            .each_not_blank("contexts", &self.contexts)
            .finish()
    }
}

/// Persisted organization-less role together with the permissions it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRecord {
    pub id: i32,
    pub name: String,
    pub label: Option<String>,
    pub permissions: BTreeSet<PermissionKey>,
}

impl RoleRecord {
    pub fn has_permission(&self, key: &PermissionKey) -> bool {
        self.permissions.contains(key)
    }

    /// Returns `true` when the permission was not held before.
    pub fn add_permission(&mut self, key: PermissionKey) -> bool {
        self.permissions.insert(key)
    }
}

impl Validate for RoleRecord {
    fn entity_name(&self) -> String {
        format!("role `{}`", self.name)
    }

    fn violations(&self) -> Vec<Violation> {
        Rules::new()
            .name("name", &self.name)
            .optional_text("label", self.label.as_deref())
            .finish()
    }
}
