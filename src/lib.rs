//! permsync - declarative provisioning of system roles and permissions
//!
//! Reconciles YAML descriptions of roles, permissions and role attachments
//! against the database and seeds the bootstrap organization.
//! It exposes all modules for testing purposes.

pub mod bootstrap;
pub mod credentials;
pub mod data_files;
pub mod entities;
pub mod errors;
pub mod permissions;
pub mod role_sync;
pub mod settings;
pub mod storage;
pub mod validation;
