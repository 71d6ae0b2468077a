//! Persistence layer — libSQL-backed storage for users, organizations,
//! channel identities and subscriptions.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::IdentityStore;
