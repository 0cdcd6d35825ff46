//! Persistence layer: repositories, unit of work, and the libSQL backend.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::{LibSqlBackend, LibSqlUnitOfWork};
pub use traits::{
    ConversationRepository, MessageRepository, Store, TokenRepository, UnitOfWork, UserRepository,
};
