//! Declarative permission provisioning.
//!
//! Raw YAML flows through [`schema`] (validation and defaults), [`templates`]
//! (inheritance), [`reconcile`] (permission diff) and [`attach`] (role diff);
//! [`loader`] runs the whole pipeline against a [`store::SecurityStore`].

pub mod attach;
pub mod loader;
pub mod reconcile;
pub mod schema;
pub mod scope;
pub mod store;
pub mod templates;
pub mod types;

pub use loader::{load, load_config, load_dir, reconcile_with, LoadResult};
pub use types::{
    ClassScope, FieldScope, NormalizedConfig, PermissionKey, PermissionMap, PermissionRecord,
    PermissionSpec, RoleRecord,
};
