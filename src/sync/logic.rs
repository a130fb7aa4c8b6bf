// pgmigrate/src/sync/logic.rs
use std::path::{Path, PathBuf};
use tracing::info;

use super::docker::{self, LocalContainer, ReadinessProbe};
use super::toc::{TocFilter, edit_toc_file};
use crate::backup::{BackupTarget, backup_database};
use crate::database::ConnectionDescriptor;
use crate::errors::Result;
use crate::process::CommandRunner;
use crate::restore::list_archive;
use crate::workflow::pipeline::Pipeline;

const TOC_FILE: &str = "toc.list";
const EDITED_TOC_FILE: &str = "toc_edited.list";

/// Everything needed to mirror a remote database into a local container.
#[derive(Debug, Clone)]
pub struct SyncPlan {
    pub source: ConnectionDescriptor,
    pub container: LocalContainer,
    /// Fixed archive path in the persistent backup directory. Reused when present.
    pub backup_path: PathBuf,
    pub toc_filter: TocFilter,
}

/// Dumps the source, provisions the container and restores a filtered copy into it.
///
/// Stages:
/// 1. Fixed-name backup of the source database.
/// 2. Recreate the container and wait until PostgreSQL accepts connections.
/// 3. `pg_restore --list` into `toc.list`.
/// 4. Filter the manifest into `toc_edited.list`.
/// 5. Copy archive and manifest into the container.
/// 6. `pg_restore --use-list` inside the container.
pub async fn perform_sync(
    runner: &dyn CommandRunner,
    probe: &dyn ReadinessProbe,
    plan: &SyncPlan,
    work_dir: &Path,
    pipeline: &mut Pipeline,
) -> Result<()> {
    info!(source = %plan.source, container = %plan.container.name, "Starting sync into local container");

    let artifact = pipeline
        .step(
            "Back up source database",
            backup_database(runner, &plan.source, &BackupTarget::Fixed(plan.backup_path.clone())),
        )
        .await?;
    pipeline.annotate(artifact.path.display());

    pipeline
        .best_effort(
            "Remove existing container",
            docker::remove_container(runner, &plan.container),
        )
        .await;
    pipeline
        .step(
            "Start local container",
            docker::start_container(runner, &plan.container),
        )
        .await?;
    pipeline.annotate(&plan.container.name);
    pipeline
        .step(
            "Wait for PostgreSQL to accept connections",
            docker::wait_until_ready(probe, &plan.container),
        )
        .await?;

    let toc = work_dir.join(TOC_FILE);
    pipeline
        .step("List archive contents", list_archive(runner, &artifact.path, &toc))
        .await?;
    pipeline.annotate(toc.display());

    let edited = work_dir.join(EDITED_TOC_FILE);
    let commented = pipeline
        .step("Edit TOC file", async {
            edit_toc_file(&toc, &edited, &plan.toc_filter)
        })
        .await?;
    pipeline.annotate(edited.display());
    info!(commented, "Entries excluded from local restore");

    let archive_in_container = pipeline
        .step(
            "Copy backup into container",
            docker::copy_into(runner, &plan.container, &artifact.path),
        )
        .await?;
    let list_in_container = pipeline
        .step(
            "Copy TOC file into container",
            docker::copy_into(runner, &plan.container, &edited),
        )
        .await?;

    pipeline
        .step(
            "Restore into local container",
            docker::restore_from_list(
                runner,
                &plan.container,
                &archive_in_container,
                &list_in_container,
            ),
        )
        .await?;
    info!(
        container = %plan.container.name,
        port = plan.container.host_port,
        database = %plan.container.database,
        "Sync completed"
    );
    Ok(())
}
