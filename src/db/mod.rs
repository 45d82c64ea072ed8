//! Database layer
//!
//! Storage for users, sessions, articles and provider API keys. Two backends
//! are supported behind the `DatabasePool` trait:
//! - SQLite (default, single file next to the binary)
//! - MySQL
//!
//! # Usage
//!
//! ```ignore
//! use quillboard::config::DatabaseConfig;
//! use quillboard::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
