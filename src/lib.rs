//! Content desk: accounts, webhook-backed content generation, and a
//! transactional conversation log.

pub mod api;
pub mod auth;
pub mod config;
pub mod conversations;
pub mod error;
pub mod generation;
pub mod store;
pub mod validation;
