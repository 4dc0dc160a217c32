//! Normalization of raw permission documents.
//!
//! Accepted shape (every node optional):
//!
//! ```yaml
//! permission_templates:
//!     view: { label: "View", translation_domain: permissions }
//! permissions:
//!     view: [ROLE_USER]                 # shorthand for attached_roles
//! permission_classes:
//!     App\Entity\Invoice:
//!         permissions:
//!             edit: { attached_roles: [ROLE_ADMIN], label: "Edit invoice" }
//!         fields:
//!             total:
//!                 read: [ROLE_USER]     # shorthand for { permissions: ... }
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde_yaml::{Mapping, Value};

use crate::errors::LoaderError;
use crate::permissions::templates::resolve_templates;
use crate::permissions::types::{
    ClassScope, FieldScope, NormalizedConfig, PermissionMap, PermissionSpec,
};

const ROOT_KEYS: &[&str] = &["permission_templates", "permissions", "permission_classes"];
const CLASS_KEYS: &[&str] = &["permissions", "fields"];
const PERMISSION_KEYS: &[&str] = &[
    "label",
    "detail_label",
    "translation_domain",
    "contexts",
    "attached_roles",
];

/// Parse, normalize and merge `sources` in order, then resolve templates.
pub fn process<S: AsRef<str>>(sources: &[S]) -> Result<NormalizedConfig, LoaderError> {
    let mut config = NormalizedConfig::default();
    for source in sources {
        config.merge(parse_document(source.as_ref())?);
    }
    resolve_templates(&mut config);
    Ok(config)
}

/// Parse a single YAML document into its normalized form (templates not yet applied).
pub fn parse_document(source: &str) -> Result<NormalizedConfig, LoaderError> {
    let value: Value = serde_yaml::from_str(source)?;
    normalize(&value)
}

pub fn normalize(value: &Value) -> Result<NormalizedConfig, LoaderError> {
    let root = match value {
        Value::Null => return Ok(NormalizedConfig::default()),
        Value::Mapping(m) => m,
        _ => {
            return Err(LoaderError::schema(
                "<root>",
                format!("expected a mapping, found {}", kind(value)),
            ))
        }
    };
    check_keys(root, ROOT_KEYS, "")?;

    Ok(NormalizedConfig {
        templates: permissions_node(root.get("permission_templates"), "permission_templates")?,
        permissions: permissions_node(root.get("permissions"), "permissions")?,
        classes: classes_node(root.get("permission_classes"), "permission_classes")?,
    })
}

fn classes_node(
    node: Option<&Value>,
    path: &str,
) -> Result<BTreeMap<String, ClassScope>, LoaderError> {
    let mut classes = BTreeMap::new();
    let Some(map) = non_empty_mapping(node, path)? else {
        return Ok(classes);
    };

    for (key, value) in map {
        let name = key_string(key, path)?;
        let class_path = join(path, &name);
        let class = match value {
            Value::Null => ClassScope {
                name: name.clone(),
                ..Default::default()
            },
            Value::Mapping(m) => {
                check_keys(m, CLASS_KEYS, &class_path)?;
                ClassScope {
                    name: name.clone(),
                    permissions: permissions_node(
                        m.get("permissions"),
                        &join(&class_path, "permissions"),
                    )?,
                    fields: fields_node(m.get("fields"), &join(&class_path, "fields"))?,
                }
            }
            other => {
                return Err(LoaderError::schema(
                    class_path,
                    format!("expected a mapping, found {}", kind(other)),
                ))
            }
        };
        classes.insert(name, class);
    }

    Ok(classes)
}

fn fields_node(
    node: Option<&Value>,
    path: &str,
) -> Result<BTreeMap<String, FieldScope>, LoaderError> {
    let mut fields = BTreeMap::new();
    let Some(map) = non_empty_mapping(node, path)? else {
        return Ok(fields);
    };

    for (key, value) in map {
        let name = key_string(key, path)?;
        let field_path = join(path, &name);

        // A field given as a bare permissions map is shorthand for { permissions: <map> }.
        let permissions = match value {
            Value::Mapping(m) if m.contains_key("permissions") => {
                check_keys(m, &["permissions"], &field_path)?;
                permissions_node(m.get("permissions"), &join(&field_path, "permissions"))?
            }
            Value::Null | Value::Mapping(_) => permissions_node(Some(value), &field_path)?,
            other => {
                return Err(LoaderError::schema(
                    field_path,
                    format!("expected a mapping, found {}", kind(other)),
                ))
            }
        };

        fields.insert(name.clone(), FieldScope { name, permissions });
    }

    Ok(fields)
}

fn permissions_node(node: Option<&Value>, path: &str) -> Result<PermissionMap, LoaderError> {
    let mut permissions = PermissionMap::new();
    let Some(map) = non_empty_mapping(node, path)? else {
        return Ok(permissions);
    };

    for (key, value) in map {
        let operation = key_string(key, path)?;
        let spec = permission_entry(operation.clone(), value, &join(path, &operation))?;
        permissions.insert(spec);
    }

    Ok(permissions)
}

fn permission_entry(
    operation: String,
    value: &Value,
    path: &str,
) -> Result<PermissionSpec, LoaderError> {
    let mut spec = PermissionSpec::new(operation);

    match value {
        Value::Null => {}
        // A bare list is shorthand for { attached_roles: <list> }.
        Value::Sequence(_) => spec.attached_roles = string_set(value, path)?,
        Value::Mapping(m) => {
            check_keys(m, PERMISSION_KEYS, path)?;
            spec.label = optional_scalar(m.get("label"), &join(path, "label"))?;
            spec.detail_label =
                optional_scalar(m.get("detail_label"), &join(path, "detail_label"))?;
            spec.translation_domain = optional_scalar(
                m.get("translation_domain"),
                &join(path, "translation_domain"),
            )?;
            if let Some(contexts) = m.get("contexts") {
                spec.contexts = string_list(contexts, &join(path, "contexts"))?;
            }
            if let Some(roles) = m.get("attached_roles") {
                spec.attached_roles = string_set(roles, &join(path, "attached_roles"))?;
            }
        }
        other => {
            return Err(LoaderError::schema(
                path,
                format!(
                    "expected a mapping or a list of role names, found {}",
                    kind(other)
                ),
            ))
        }
    }

    Ok(spec)
}

/// `None` for an absent or null node; an error for an empty or non-mapping node.
fn non_empty_mapping<'a>(
    node: Option<&'a Value>,
    path: &str,
) -> Result<Option<&'a Mapping>, LoaderError> {
    match node {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Mapping(m)) if m.is_empty() => Err(LoaderError::schema(
            path,
            "must contain at least one entry",
        )),
        Some(Value::Mapping(m)) => Ok(Some(m)),
        Some(other) => Err(LoaderError::schema(
            path,
            format!("expected a mapping, found {}", kind(other)),
        )),
    }
}

fn check_keys(map: &Mapping, allowed: &[&str], path: &str) -> Result<(), LoaderError> {
    for key in map.keys() {
        let name = key_string(key, path)?;
        if !allowed.contains(&name.as_str()) {
            return Err(LoaderError::schema(
                join(path, &name),
                format!(
                    "unrecognized option (expected one of: {})",
                    allowed.join(", ")
                ),
            ));
        }
    }
    Ok(())
}

fn key_string(key: &Value, path: &str) -> Result<String, LoaderError> {
    scalar_string(key).ok_or_else(|| {
        LoaderError::schema(path, format!("keys must be scalars, found {}", kind(key)))
    })
}

fn optional_scalar(node: Option<&Value>, path: &str) -> Result<Option<String>, LoaderError> {
    match node {
        None | Some(Value::Null) => Ok(None),
        Some(v) => scalar_string(v).map(Some).ok_or_else(|| {
            LoaderError::schema(path, format!("expected a scalar, found {}", kind(v)))
        }),
    }
}

fn string_list(node: &Value, path: &str) -> Result<Vec<String>, LoaderError> {
    match node {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                scalar_string(item).ok_or_else(|| {
                    LoaderError::schema(
                        format!("{path}[{i}]"),
                        format!("expected a scalar, found {}", kind(item)),
                    )
                })
            })
            .collect(),
        other => Err(LoaderError::schema(
            path,
            format!("expected a list, found {}", kind(other)),
        )),
    }
}

fn string_set(node: &Value, path: &str) -> Result<BTreeSet<String>, LoaderError> {
    Ok(string_list(node, path)?.into_iter().collect())
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Tagged(tagged) => scalar_string(&tagged.value),
        _ => None,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{path}.{segment}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::types::PermissionKey;

    fn schema_path(err: LoaderError) -> String {
        match err {
            LoaderError::Schema { path, .. } => path,
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_document() {
        let config = parse_document("").unwrap();
        assert_eq!(config, NormalizedConfig::default());
    }

    #[test]
    fn test_list_shorthand_and_defaults() {
        let config = parse_document(
            r#"
permissions:
    view: [ROLE_USER, ROLE_ADMIN]
    create: ~
    delete: []
"#,
        )
        .unwrap();

        let view = config.permissions.get("view").unwrap();
        assert_eq!(view.attached_roles.len(), 2);
        assert!(view.label.is_none());
        assert!(view.detail_label.is_none());
        assert!(view.translation_domain.is_none());
        assert!(view.contexts.is_empty());

        assert!(config.permissions.get("create").unwrap().attached_roles.is_empty());
        assert!(config.permissions.get("delete").unwrap().attached_roles.is_empty());
    }

    #[test]
    fn test_full_entry() {
        let config = parse_document(
            r#"
permissions:
    view:
        label: View
        detail_label: View every record
        translation_domain: permissions
        contexts: [organization, admin]
        attached_roles: [ROLE_USER]
"#,
        )
        .unwrap();
        let view = config.permissions.get("view").unwrap();
        assert_eq!(view.label.as_deref(), Some("View"));
        assert_eq!(view.detail_label.as_deref(), Some("View every record"));
        assert_eq!(view.translation_domain.as_deref(), Some("permissions"));
        assert_eq!(view.contexts, vec!["organization", "admin"]);
        assert!(view.attached_roles.contains("ROLE_USER"));
    }

    #[test]
    fn test_document_order_preserved() {
        let config = parse_document(
            r#"
permissions:
    zeta: ~
    alpha: ~
    mid: ~
"#,
        )
        .unwrap();
        let ops: Vec<_> = config.permissions.iter().map(|s| s.operation.as_str()).collect();
        assert_eq!(ops, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_classes_and_field_shorthand() {
        let config = parse_document(
            r#"
permission_classes:
    App\Entity\Invoice:
        permissions:
            edit: { attached_roles: [ROLE_ADMIN], label: Edit invoice }
        fields:
            total:
                read: [ROLE_USER]
            number:
                permissions:
                    read: ~
"#,
        )
        .unwrap();

        let class = config.classes.get("App\\Entity\\Invoice").unwrap();
        assert_eq!(class.name, "App\\Entity\\Invoice");
        assert_eq!(
            class.permissions.get("edit").unwrap().label.as_deref(),
            Some("Edit invoice")
        );
        let total = class.fields.get("total").unwrap();
        assert!(total
            .permissions
            .get("read")
            .unwrap()
            .attached_roles
            .contains("ROLE_USER"));
        assert!(class.fields.get("number").unwrap().permissions.get("read").is_some());
    }

    #[test]
    fn test_empty_classes_rejected() {
        let err = parse_document("permission_classes: {}").unwrap_err();
        assert_eq!(schema_path(err), "permission_classes");
    }

    #[test]
    fn test_empty_fields_rejected() {
        let err = parse_document(
            r#"
permission_classes:
    Invoice:
        fields: {}
"#,
        )
        .unwrap_err();
        assert_eq!(schema_path(err), "permission_classes.Invoice.fields");
    }

    #[test]
    fn test_unknown_key_rejected_with_path() {
        let err = parse_document(
            r#"
permission_classes:
    Invoice:
        permissions:
            edit: { labl: typo }
"#,
        )
        .unwrap_err();
        assert_eq!(
            schema_path(err),
            "permission_classes.Invoice.permissions.edit.labl"
        );

        let err = parse_document("perms: {}").unwrap_err();
        assert_eq!(schema_path(err), "perms");
    }

    #[test]
    fn test_wrong_shapes_rejected() {
        let err = parse_document("permissions: { view: ROLE_USER }").unwrap_err();
        assert_eq!(schema_path(err), "permissions.view");

        let err = parse_document("permissions: { view: { label: [a] } }").unwrap_err();
        assert_eq!(schema_path(err), "permissions.view.label");

        let err = parse_document("permissions: { view: { contexts: [[a]] } }").unwrap_err();
        assert_eq!(schema_path(err), "permissions.view.contexts[0]");

        let err = parse_document("- a\n- b\n").unwrap_err();
        assert_eq!(schema_path(err), "<root>");
    }

    #[test]
    fn test_scalar_coercion() {
        let config = parse_document("permissions: { view: { label: 42, contexts: [true] } }")
            .unwrap();
        let view = config.permissions.get("view").unwrap();
        assert_eq!(view.label.as_deref(), Some("42"));
        assert_eq!(view.contexts, vec!["true"]);
    }

    #[test]
    fn test_process_merges_documents() {
        let first = r#"
permissions:
    view: { label: View, attached_roles: [ROLE_USER] }
permission_classes:
    Invoice:
        permissions:
            edit: [ROLE_ADMIN]
"#;
        let second = r#"
permissions:
    view: { attached_roles: [ROLE_ADMIN], contexts: [admin] }
permission_classes:
    Invoice:
        fields:
            total:
                read: [ROLE_USER]
"#;
        let config = process(&[first, second]).unwrap();

        let view = config.permissions.get("view").unwrap();
        assert_eq!(view.label.as_deref(), Some("View"));
        assert_eq!(view.contexts, vec!["admin"]);
        assert_eq!(
            view.attached_roles.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["ROLE_ADMIN", "ROLE_USER"]
        );

        let invoice = config.classes.get("Invoice").unwrap();
        assert!(invoice.permissions.get("edit").is_some());
        assert!(invoice.fields.contains_key("total"));
    }

    #[test]
    fn test_process_applies_templates() {
        let config = process(&[r#"
permission_templates:
    view: { label: Template view, translation_domain: permissions }
permission_classes:
    Invoice:
        permissions:
            view: { label: Invoice view }
"#])
        .unwrap();

        let key = PermissionKey::new("view", Some("Invoice"), None);
        let view = config
            .classes
            .get(key.class.as_deref().unwrap())
            .and_then(|c| c.permissions.get(&key.operation))
            .unwrap();
        assert_eq!(view.label.as_deref(), Some("Invoice view"));
        assert_eq!(view.translation_domain.as_deref(), Some("permissions"));
    }
}
