//! Persistence layer: SQLite pool, row entities and repositories.

pub mod database;
pub mod entities;
pub mod repositories;
pub mod traits;
