pub mod database;
pub mod error;
pub mod schema;

pub use database::WardenDatabase;
pub use error::StorageError;

pub const WARDEN_DB_FILENAME: &str = "warden.db";
