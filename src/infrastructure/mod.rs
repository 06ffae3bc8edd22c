//! Infrastructure layer - external adapters (database, filesystem).
//!
//! This layer handles all I/O operations and external dependencies.

pub mod backup_repository;
pub mod config;
pub mod database;
pub mod file_repository;
pub mod file_store;
pub mod hr_reader;

pub use backup_repository::Keyset;
pub use config::{ensure_config_exists, load_config};
pub use database::Database;
pub use file_store::FileStore;
pub use hr_reader::HrSnapshots;
