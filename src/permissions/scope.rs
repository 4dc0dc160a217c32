use crate::permissions::types::{NormalizedConfig, PermissionKey, PermissionMap, PermissionSpec};

/// Where a permission map lives in the configuration tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope<'a> {
    Global,
    Class(&'a str),
    Field { class: &'a str, field: &'a str },
}

impl<'a> Scope<'a> {
    pub fn class(&self) -> Option<&'a str> {
        match *self {
            Scope::Global => None,
            Scope::Class(class) | Scope::Field { class, .. } => Some(class),
        }
    }

    pub fn field(&self) -> Option<&'a str> {
        match *self {
            Scope::Field { field, .. } => Some(field),
            _ => None,
        }
    }

    pub fn key(&self, operation: &str) -> PermissionKey {
        PermissionKey::new(operation, self.class(), self.field())
    }
}

impl std::fmt::Display for Scope<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Global => write!(f, "global"),
            Scope::Class(class) => write!(f, "class `{class}`"),
            Scope::Field { class, field } => write!(f, "field `{class}.{field}`"),
        }
    }
}

/// Every permission entry of the configuration: global scope first, then each
/// class followed by its fields.
pub fn entries(config: &NormalizedConfig) -> impl Iterator<Item = (Scope<'_>, &PermissionSpec)> {
    let global = config.permissions.iter().map(|spec| (Scope::Global, spec));

    let classes = config.classes.iter().flat_map(|(class_name, class)| {
        let own = class
            .permissions
            .iter()
            .map(move |spec| (Scope::Class(class_name.as_str()), spec));

        let fields = class.fields.iter().flat_map(move |(field_name, field)| {
            field.permissions.iter().map(move |spec| {
                (
                    Scope::Field {
                        class: class_name.as_str(),
                        field: field_name.as_str(),
                    },
                    spec,
                )
            })
        });

        own.chain(fields)
    });

    global.chain(classes)
}

/// Visit each permission map mutably, in the same order as [`entries`].
/// Templates are not visited.
pub fn for_each_map_mut<F>(config: &mut NormalizedConfig, mut visit: F)
where
    F: FnMut(Scope<'_>, &mut PermissionMap),
{
    visit(Scope::Global, &mut config.permissions);

    for (class_name, class) in config.classes.iter_mut() {
        visit(Scope::Class(class_name), &mut class.permissions);

        for (field_name, field) in class.fields.iter_mut() {
            visit(
                Scope::Field {
                    class: class_name,
                    field: field_name,
                },
                &mut field.permissions,
            );
        }
    }
}
