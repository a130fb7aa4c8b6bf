//! Mirroring a remote database into a local Docker container.
pub(crate) mod docker;
pub(crate) mod logic;
pub(crate) mod toc;

pub use docker::{LocalContainer, PostgresProbe, Readiness, ReadinessProbe};
pub use logic::{SyncPlan, perform_sync};
pub use toc::TocFilter;
