pub mod builders;
pub mod db;

pub use builders::RoleBuilder;
pub use db::TestDb;
