//! Database backups taken with `pg_dump`.
pub(crate) mod db_dump;

pub use db_dump::{BackupTarget, backup_database};
