//! Restoring archives into PostgreSQL and checking the result.
pub(crate) mod db_restore;
pub(crate) mod verification;

pub use db_restore::{create_database, drop_database, ensure_archive, list_archive, restore_archive};
pub use verification::verify_table_counts;
