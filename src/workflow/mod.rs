//! Named workflows built from the migration steps, and the operation menu that selects them.

pub mod pipeline;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::backup::{BackupTarget, backup_database};
use crate::config::{AppConfig, SecretSources};
use crate::errors::{AppError, Result};
use crate::process::CommandRunner;
use crate::restore::{create_database, drop_database, ensure_archive, restore_archive, verify_table_counts};
use crate::storage::open_store;
use crate::storage::transfer::{Endpoint, download, migrate_container, upload, verify_sizes};
use crate::sync::{ReadinessProbe, perform_sync};
use crate::utils::prompt::Prompt;
use crate::utils::workdir::WorkingDirectory;
use pipeline::{Outcome, Pipeline, StepStatus, WorkflowReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Sync,
    StorageMigration,
    DatabaseMigration,
    All,
    BackupOnly,
    RestoreOnly,
    Exit,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Operation::Sync,
        Operation::StorageMigration,
        Operation::DatabaseMigration,
        Operation::All,
        Operation::BackupOnly,
        Operation::RestoreOnly,
        Operation::Exit,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Sync => "sync",
            Operation::StorageMigration => "storage-migration",
            Operation::DatabaseMigration => "database-migration",
            Operation::All => "all",
            Operation::BackupOnly => "backup-only",
            Operation::RestoreOnly => "restore-only",
            Operation::Exit => "exit",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Operation::Sync => "Database Sync (remote PostgreSQL to local Docker)",
            Operation::StorageMigration => "Storage Account Migration",
            Operation::DatabaseMigration => "Database Migration (PostgreSQL to PostgreSQL)",
            Operation::All => "All Operations",
            Operation::BackupOnly => "Backup Only (source database to temp path)",
            Operation::RestoreOnly => "Restore Only (destination database, specify dump path)",
            Operation::Exit => "Exit",
        }
    }

    pub fn number(&self) -> usize {
        Operation::ALL.iter().position(|op| op == self).unwrap_or(0) + 1
    }

    /// Numbered menu text.
    pub fn menu() -> String {
        let mut menu = String::from("Please select an operation:\n");
        for op in Operation::ALL {
            menu.push_str(&format!("{}. {} (or type '{}')\n", op.number(), op.description(), op.name()));
        }
        menu
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let choice = s.trim().to_ascii_lowercase();
        Operation::ALL
            .into_iter()
            .find(|op| choice == op.number().to_string() || choice == op.name() || choice == op.name().replace('-', "_"))
            .ok_or_else(|| AppError::InvalidArgument {
                tool: "pgmigrate",
                reason: format!("invalid choice '{}', expected 1-7 or an operation name", s.trim()),
            })
    }
}

/// One workflow invocation: run id, step log and its working directory.
struct Run {
    pipeline: Pipeline,
    work: Option<WorkingDirectory>,
}

impl Run {
    fn start(workflow: &str) -> (Self, tracing::Span) {
        let run_id = Uuid::new_v4().simple().to_string();
        let pipeline = Pipeline::new(workflow, &run_id);
        let span = info_span!("workflow", workflow, run_id = %&run_id[..8]);
        (
            Self {
                pipeline,
                work: None,
            },
            span,
        )
    }

    /// Creates this run's working directory under `root`.
    fn work_dir(&mut self, root: &Path, workflow: &str, keep_local_files: bool) -> Result<PathBuf> {
        let work = self
            .work
            .insert(WorkingDirectory::new(root, workflow, keep_local_files));
        Ok(work.ensure()?.to_path_buf())
    }

    fn finish(self, result: Result<()>) -> WorkflowReport {
        if let Some(work) = &self.work {
            work.cleanup();
        }
        let report = self.pipeline.finish(result);
        log_report(&report);
        report
    }
}

fn log_report(report: &WorkflowReport) {
    let succeeded = report.count(StepStatus::Succeeded);
    let warnings = report.count(StepStatus::Warning);
    match &report.outcome {
        Outcome::Failed { message, .. } => {
            error!(workflow = %report.workflow, succeeded, warnings, error = %message, "Workflow failed")
        }
        Outcome::CompletedWithWarnings => {
            warn!(workflow = %report.workflow, succeeded, warnings, "Workflow completed with warnings")
        }
        Outcome::Completed => info!(workflow = %report.workflow, succeeded, "Workflow completed"),
        Outcome::Skipped(reason) => info!(workflow = %report.workflow, reason = %reason, "Workflow skipped"),
    }
}

/// Everything the workflows need from the outside world.
pub struct Workflows<'a> {
    pub config: &'a AppConfig,
    pub runner: &'a dyn CommandRunner,
    pub probe: &'a dyn ReadinessProbe,
    pub sources: SecretSources<'a>,
    pub prompt: &'a dyn Prompt,
    /// Forces local files to be kept regardless of config.
    pub keep_local_files: bool,
    /// Dump path for restore-only; asked for interactively when absent.
    pub dump_file: Option<PathBuf>,
}

impl Workflows<'_> {
    /// Runs the selected operation. `All` keeps going after a failed workflow.
    pub async fn run(&self, operation: Operation) -> Vec<WorkflowReport> {
        match operation {
            Operation::Sync => vec![self.sync().await],
            Operation::StorageMigration => vec![self.storage_migration().await],
            Operation::DatabaseMigration => vec![self.database_migration().await],
            Operation::All => vec![
                self.sync().await,
                self.storage_migration().await,
                self.database_migration().await,
            ],
            Operation::BackupOnly => vec![self.backup_only().await],
            Operation::RestoreOnly => vec![self.restore_only().await],
            Operation::Exit => Vec::new(),
        }
    }

    fn keep(&self, configured: bool) -> bool {
        self.keep_local_files || configured
    }

    pub async fn sync(&self) -> WorkflowReport {
        const NAME: &str = "sync";
        if self.config.sync.is_none() {
            return skipped(NAME, "no sync section in config");
        }
        let (mut run, span) = Run::start(NAME);
        let result = self.sync_steps(&mut run).instrument(span).await;
        run.finish(result)
    }

    async fn sync_steps(&self, run: &mut Run) -> Result<()> {
        let plan = self.config.sync_plan(&self.sources)?;
        let keep = self.keep(self.config.keep_local_files);
        let dir = run.work_dir(&self.config.sync_work_root(), "sync", keep)?;
        perform_sync(self.runner, self.probe, &plan, &dir, &mut run.pipeline).await
    }

    pub async fn storage_migration(&self) -> WorkflowReport {
        const NAME: &str = "storage-migration";
        if self.config.storage_migration.is_none() {
            return skipped(NAME, "no storage_migration section in config");
        }
        let (mut run, span) = Run::start(NAME);
        let result = self.storage_steps(&mut run).instrument(span).await;
        run.finish(result)
    }

    async fn storage_steps(&self, run: &mut Run) -> Result<()> {
        let plan = self.config.storage_plan(&self.sources)?;
        let keep = self.keep(plan.keep_local_files);
        let dir = run.work_dir(&plan.work_root, "storage", keep)?;
        let pipeline = &mut run.pipeline;

        let source_store = pipeline
            .step("Open source storage", open_store(&plan.source.connection_string))
            .await?;
        pipeline.annotate(source_store.describe());
        let destination_store = pipeline
            .step("Open destination storage", open_store(&plan.destination.connection_string))
            .await?;
        pipeline.annotate(destination_store.describe());
        let source = Endpoint {
            store: source_store.as_ref(),
            location: &plan.source,
        };

        if plan.source.is_whole_container() {
            let destination = Endpoint {
                store: destination_store.as_ref(),
                location: &plan.destination,
            };
            let label = format!(
                "Migrate container '{}' to '{}'",
                plan.source.container, plan.destination.container
            );
            let tally = pipeline
                .step(&label, async {
                    let tally = migrate_container(source, destination, &dir, keep).await?;
                    if tally.total > 0 && !tally.succeeded() {
                        return Err(AppError::transfer(format!(
                            "none of {} objects could be migrated",
                            tally.total
                        )));
                    }
                    Ok(tally)
                })
                .await?;
            pipeline.annotate(&tally);
            if tally.total == 0 {
                pipeline.warn("Source container is empty", "nothing was migrated");
            } else if !tally.is_complete() {
                let names: Vec<&str> = tally.failed.iter().map(|(name, _)| name.as_str()).collect();
                pipeline.warn(
                    "Some objects were not migrated",
                    format!("{} failed: {}", tally.failed.len(), names.join(", ")),
                );
            }
            return Ok(());
        }

        let mut destination_location = plan.destination.clone();
        if destination_location.is_whole_container() {
            destination_location.object = plan.source.object.clone();
        }
        let destination = Endpoint {
            store: destination_store.as_ref(),
            location: &destination_location,
        };
        let local = pipeline.step("Download object", download(source, &dir)).await?;
        pipeline.annotate(local.display());
        pipeline.step("Upload object", upload(destination, &local)).await?;
        if let Some(check) = pipeline
            .verify("Verify object sizes", verify_sizes(source, destination))
            .await
        {
            pipeline.annotate(format!("{} bytes", check.bytes));
        }
        Ok(())
    }

    pub async fn database_migration(&self) -> WorkflowReport {
        const NAME: &str = "database-migration";
        if self.config.database_migration.is_none() {
            return skipped(NAME, "no database_migration section in config");
        }
        let (mut run, span) = Run::start(NAME);
        let result = self.database_steps(&mut run).instrument(span).await;
        run.finish(result)
    }

    async fn database_steps(&self, run: &mut Run) -> Result<()> {
        let plan = self.config.database_plan(&self.sources)?;
        let keep = self.keep(plan.keep_local_files);
        let dir = run.work_dir(&plan.work_root, "database", keep)?;
        let pipeline = &mut run.pipeline;
        let runner = self.runner;

        let artifact = pipeline
            .step(
                "Back up source database",
                backup_database(runner, &plan.source, &BackupTarget::Timestamped(dir)),
            )
            .await?;
        pipeline.annotate(artifact.path.display());

        if plan.drop_destination_if_exists {
            pipeline
                .best_effort("Drop destination database", drop_database(runner, &plan.destination))
                .await;
        }
        pipeline
            .best_effort("Create destination database", create_database(runner, &plan.destination))
            .await;
        pipeline
            .step(
                "Restore destination database",
                restore_archive(runner, &plan.destination, &artifact.path),
            )
            .await?;
        if let Some(counts) = pipeline
            .verify(
                "Verify table counts",
                verify_table_counts(runner, &plan.source, &plan.destination),
            )
            .await
        {
            pipeline.annotate(format!("{} tables", counts.source));
        }
        Ok(())
    }

    pub async fn backup_only(&self) -> WorkflowReport {
        const NAME: &str = "backup-only";
        if self.config.database_migration.is_none() {
            return skipped(NAME, "no database_migration section in config");
        }
        let (mut run, span) = Run::start(NAME);
        let result = self.backup_steps(&mut run).instrument(span).await;
        run.finish(result)
    }

    async fn backup_steps(&self, run: &mut Run) -> Result<()> {
        let source = self.config.database_source(&self.sources)?;
        let root = self.config.database_work_root()?;
        let artifact = run
            .pipeline
            .step(
                "Back up source database",
                backup_database(self.runner, &source, &BackupTarget::Timestamped(root)),
            )
            .await?;
        run.pipeline.annotate(artifact.path.display());
        info!(path = %artifact.path.display(), "Backup created");
        Ok(())
    }

    pub async fn restore_only(&self) -> WorkflowReport {
        const NAME: &str = "restore-only";
        if self.config.database_migration.is_none() {
            return skipped(NAME, "no database_migration section in config");
        }
        let (mut run, span) = Run::start(NAME);
        let result = self.restore_steps(&mut run).instrument(span).await;
        run.finish(result)
    }

    fn dump_path(&self) -> Result<PathBuf> {
        let answer = match &self.dump_file {
            Some(path) => path.clone(),
            None => PathBuf::from(self.prompt.ask("Enter the full path to the dump file: ")?),
        };
        if answer.as_os_str().is_empty() {
            return Err(AppError::config("dump file path"));
        }
        Ok(answer)
    }

    async fn restore_steps(&self, run: &mut Run) -> Result<()> {
        let archive = self.dump_path()?;
        ensure_archive(&archive)?;
        let destination = self.config.database_destination(&self.sources)?;
        let drop_first = self
            .config
            .database_migration
            .as_ref()
            .is_some_and(|s| s.drop_destination_if_exists);
        let pipeline = &mut run.pipeline;

        if drop_first {
            pipeline
                .best_effort("Drop destination database", drop_database(self.runner, &destination))
                .await;
        }
        pipeline
            .best_effort("Create destination database", create_database(self.runner, &destination))
            .await;
        pipeline
            .step(
                "Restore destination database",
                restore_archive(self.runner, &destination, &archive),
            )
            .await?;
        pipeline.annotate(archive.display());
        Ok(())
    }
}

fn skipped(workflow: &str, reason: &str) -> WorkflowReport {
    let report = WorkflowReport::skipped(workflow, reason);
    log_report(&report);
    report
}

/// Exit code for a set of reports: the first failure wins.
pub fn exit_code(reports: &[WorkflowReport]) -> u8 {
    reports
        .iter()
        .map(|r| r.outcome.exit_code())
        .find(|code| *code != 0)
        .unwrap_or(0)
}

/// Human-readable end-of-run summary.
pub fn summary(reports: &[WorkflowReport]) -> String {
    let mut lines = vec!["=== Operation Summary ===".to_string()];
    for report in reports {
        if report.run_id.is_empty() {
            lines.push(format!("{}: {}", report.workflow, report.outcome));
            continue;
        }
        lines.push(format!(
            "{}: {} (run {}; {} steps succeeded, {} warnings, {} failed)",
            report.workflow,
            report.outcome,
            report.short_run_id(),
            report.count(StepStatus::Succeeded),
            report.count(StepStatus::Warning),
            report.count(StepStatus::Failed),
        ));
        for step in &report.steps {
            let status = match step.status {
                StepStatus::Succeeded => "ok",
                StepStatus::Warning => "warning",
                StepStatus::Failed => "failed",
            };
            let mut line = format!(
                "  [{}] {} {} ({:.1}s)",
                step.index,
                step.label,
                status,
                step.elapsed.as_secs_f64()
            );
            if let Some(detail) = step.detail.as_deref().filter(|_| step.status != StepStatus::Succeeded) {
                line.push_str(": ");
                line.push_str(detail);
            }
            lines.push(line);
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::RecordingRunner;
    use crate::process::{Invocation, ProcessOutput};
    use crate::sync::LocalContainer;
    use crate::utils::prompt::testing::ScriptedPrompt;
    use async_trait::async_trait;

    struct AlwaysReady;

    #[async_trait]
    impl ReadinessProbe for AlwaysReady {
        async fn probe(&self, _container: &LocalContainer) -> Result<()> {
            Ok(())
        }
    }

    fn no_env(_key: &str) -> Option<String> {
        None
    }

    fn workflows<'a>(
        config: &'a AppConfig,
        runner: &'a RecordingRunner,
        prompt: &'a ScriptedPrompt,
    ) -> Workflows<'a> {
        Workflows {
            config,
            runner,
            probe: &AlwaysReady,
            sources: SecretSources::new(&no_env, prompt),
            prompt,
            keep_local_files: false,
            dump_file: None,
        }
    }

    /// Answers pg_dump by writing the archive and psql table counts with `3`.
    fn database_simulator(inv: &Invocation) -> Result<ProcessOutput> {
        if let Some(file) = inv.arguments().iter().find_map(|a| a.strip_prefix("--file=")) {
            std::fs::write(file, b"PGDMP").unwrap();
        }
        let stdout = if inv.arguments().iter().any(|a| a == "--tuples-only") {
            "3\n".to_string()
        } else {
            String::new()
        };
        Ok(ProcessOutput {
            stdout,
            stderr: String::new(),
        })
    }

    fn database_config(work: &Path, drop: bool) -> AppConfig {
        let json = serde_json::json!({
            "database_migration": {
                "source": { "host": "src", "database": "orders", "username": "app", "password": "src-pw" },
                "destination": { "host": "dst", "database": "orders", "username": "admin", "password": "dst-pw" },
                "temp_local_path": work,
                "drop_destination_if_exists": drop
            }
        });
        AppConfig::from_json_str(&json.to_string()).unwrap()
    }

    #[test]
    fn operations_parse_from_numbers_and_names() {
        assert_eq!("1".parse::<Operation>().unwrap(), Operation::Sync);
        assert_eq!(" 4 ".parse::<Operation>().unwrap(), Operation::All);
        assert_eq!("restore-only".parse::<Operation>().unwrap(), Operation::RestoreOnly);
        assert_eq!("Backup_Only".parse::<Operation>().unwrap(), Operation::BackupOnly);
        assert_eq!("7".parse::<Operation>().unwrap(), Operation::Exit);
        let err = "8".parse::<Operation>().unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn menu_lists_seven_numbered_entries() {
        let menu = Operation::menu();
        assert!(menu.contains("1. Database Sync"));
        assert!(menu.contains("7. Exit"));
        assert_eq!(menu.lines().count(), 8);
    }

    #[tokio::test]
    async fn missing_sections_are_skipped() {
        let config = AppConfig::default();
        let runner = RecordingRunner::succeeding();
        let prompt = ScriptedPrompt::default();
        let reports = workflows(&config, &runner, &prompt).run(Operation::All).await;

        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| matches!(r.outcome, Outcome::Skipped(_))));
        assert_eq!(exit_code(&reports), 0);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn database_migration_runs_backup_restore_and_verification() {
        let work = tempfile::tempdir().unwrap();
        let config = database_config(work.path(), true);
        let runner = RecordingRunner::with(database_simulator);
        let prompt = ScriptedPrompt::default();

        let report = workflows(&config, &runner, &prompt).database_migration().await;

        assert_eq!(report.outcome, Outcome::Completed);
        assert_eq!(
            runner.programs(),
            ["pg_dump", "psql", "psql", "pg_restore", "psql", "psql"]
        );
        let labels: Vec<&str> = report.steps.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(
            labels,
            [
                "Back up source database",
                "Drop destination database",
                "Create destination database",
                "Restore destination database",
                "Verify table counts",
            ]
        );
        assert_eq!(report.steps[4].artifact.as_deref(), Some("3 tables"));
        // The working directory, archive included, is gone after the run.
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn failed_create_and_count_mismatch_are_warnings() {
        let work = tempfile::tempdir().unwrap();
        let config = database_config(work.path(), false);
        let runner = RecordingRunner::with(|inv| {
            let args = inv.arguments();
            if args.iter().any(|a| a.starts_with("--command=CREATE DATABASE")) {
                return Err(AppError::process("psql", "exit code 1: database \"orders\" already exists"));
            }
            let mut output = database_simulator(inv)?;
            if args.iter().any(|a| a == "--host=dst") && !output.stdout.is_empty() {
                output.stdout = "2".to_string();
            }
            Ok(output)
        });
        let prompt = ScriptedPrompt::default();

        let report = workflows(&config, &runner, &prompt).database_migration().await;

        assert_eq!(report.outcome, Outcome::CompletedWithWarnings);
        assert_eq!(report.count(StepStatus::Warning), 2);
        assert!(!runner.programs().is_empty());
        assert_eq!(exit_code(&[report]), 0);
    }

    #[tokio::test]
    async fn failing_backup_stops_database_migration() {
        let work = tempfile::tempdir().unwrap();
        let config = database_config(work.path(), true);
        let runner = RecordingRunner::with(|_| Err(AppError::process("pg_dump", "exit code 1: timeout expired")));
        let prompt = ScriptedPrompt::default();

        let report = workflows(&config, &runner, &prompt).database_migration().await;

        assert_eq!(report.outcome.exit_code(), 3);
        assert_eq!(runner.programs(), ["pg_dump"]);
        assert_eq!(report.steps.len(), 1);
    }

    #[tokio::test]
    async fn backup_only_keeps_the_archive() {
        let work = tempfile::tempdir().unwrap();
        let config = database_config(work.path(), false);
        let runner = RecordingRunner::with(database_simulator);
        let prompt = ScriptedPrompt::default();

        let report = workflows(&config, &runner, &prompt).backup_only().await;

        assert_eq!(report.outcome, Outcome::Completed);
        let artifact = PathBuf::from(report.steps[0].artifact.clone().unwrap());
        assert!(artifact.is_file());
        assert_eq!(artifact.parent(), Some(work.path()));
    }

    #[tokio::test]
    async fn restore_only_with_empty_path_is_configuration_missing() {
        let work = tempfile::tempdir().unwrap();
        let config = database_config(work.path(), false);
        let runner = RecordingRunner::succeeding();
        let prompt = ScriptedPrompt::new([""]);

        let report = workflows(&config, &runner, &prompt).restore_only().await;

        assert_eq!(report.outcome.exit_code(), 2);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn restore_only_uses_prompted_path() {
        let work = tempfile::tempdir().unwrap();
        let archive = work.path().join("orders.dump");
        std::fs::write(&archive, b"PGDMP").unwrap();
        let config = database_config(work.path(), false);
        let runner = RecordingRunner::succeeding();
        let prompt = ScriptedPrompt::default();
        let mut flows = workflows(&config, &runner, &prompt);
        flows.dump_file = Some(archive.clone());

        let report = flows.restore_only().await;

        assert_eq!(report.outcome, Outcome::Completed);
        assert_eq!(runner.programs(), ["psql", "pg_restore"]);
        assert!(prompt.questions().is_empty());
        assert!(archive.is_file());
    }

    #[tokio::test]
    async fn storage_migration_moves_a_whole_container() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        for name in ["a.txt", "b.txt"] {
            let path = src.path().join("uploads").join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, name).unwrap();
        }
        let json = serde_json::json!({
            "storage_migration": {
                "source": { "connection_string": format!("LocalPath={}", src.path().display()), "container": "uploads" },
                "destination": { "connection_string": format!("LocalPath={}", dst.path().display()), "container": "copy" },
                "temp_local_path": work.path()
            }
        });
        let config = AppConfig::from_json_str(&json.to_string()).unwrap();
        let runner = RecordingRunner::succeeding();
        let prompt = ScriptedPrompt::default();

        let report = workflows(&config, &runner, &prompt).storage_migration().await;

        assert_eq!(report.outcome, Outcome::Completed);
        assert!(dst.path().join("copy/a.txt").is_file());
        assert!(dst.path().join("copy/b.txt").is_file());
        let migrate = report.steps.iter().find(|s| s.label.starts_with("Migrate container")).unwrap();
        assert_eq!(migrate.artifact.as_deref(), Some("2/2 objects migrated"));
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn storage_migration_of_empty_container_warns() {
        let src = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("empty")).unwrap();
        let conn = format!("LocalPath={}", src.path().display());
        let json = serde_json::json!({
            "storage_migration": {
                "source": { "connection_string": conn, "container": "empty" },
                "destination": { "connection_string": conn, "container": "copy" },
                "temp_local_path": work.path()
            }
        });
        let config = AppConfig::from_json_str(&json.to_string()).unwrap();
        let runner = RecordingRunner::succeeding();
        let prompt = ScriptedPrompt::default();

        let report = workflows(&config, &runner, &prompt).storage_migration().await;
        assert_eq!(report.outcome, Outcome::CompletedWithWarnings);
    }

    #[tokio::test]
    async fn single_object_migration_defaults_destination_name() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("reports")).unwrap();
        std::fs::write(src.path().join("reports/q1.csv"), b"1,2,3").unwrap();
        let json = serde_json::json!({
            "storage_migration": {
                "source": { "connection_string": format!("LocalPath={}", src.path().display()),
                            "container": "reports", "object": "q1.csv" },
                "destination": { "connection_string": format!("LocalPath={}", dst.path().display()),
                                 "container": "archive" },
                "temp_local_path": work.path()
            }
        });
        let config = AppConfig::from_json_str(&json.to_string()).unwrap();
        let runner = RecordingRunner::succeeding();
        let prompt = ScriptedPrompt::default();

        let report = workflows(&config, &runner, &prompt).storage_migration().await;

        assert_eq!(report.outcome, Outcome::Completed);
        assert!(dst.path().join("archive/q1.csv").is_file());
        assert_eq!(report.steps.last().and_then(|s| s.artifact.as_deref()), Some("5 bytes"));
    }

    #[tokio::test]
    async fn all_continues_after_a_failed_workflow() {
        let work = tempfile::tempdir().unwrap();
        let json = serde_json::json!({
            "storage_migration": {
                "source": { "connection_string": "LocalPath=/nonexistent-root", "container": "missing" },
                "destination": { "connection_string": "LocalPath=/nonexistent-root", "container": "copy" },
                "temp_local_path": work.path()
            },
            "database_migration": {
                "source": { "host": "src", "database": "orders", "username": "app", "password": "pw" },
                "destination": { "host": "dst", "database": "orders", "username": "admin", "password": "pw" },
                "temp_local_path": work.path()
            }
        });
        let config = AppConfig::from_json_str(&json.to_string()).unwrap();
        let runner = RecordingRunner::with(database_simulator);
        let prompt = ScriptedPrompt::default();

        let reports = workflows(&config, &runner, &prompt).run(Operation::All).await;

        assert_eq!(reports.len(), 3);
        assert!(matches!(reports[0].outcome, Outcome::Skipped(_)));
        assert_eq!(reports[1].outcome.exit_code(), 4);
        assert_eq!(reports[2].outcome, Outcome::Completed);
        assert_eq!(exit_code(&reports), 4);

        let text = summary(&reports);
        assert!(text.contains("sync: skipped"));
        assert!(text.contains("storage-migration: failed"));
        assert!(text.contains("database-migration: completed"));
        for report in &reports[1..] {
            assert_eq!(report.short_run_id().len(), 8);
            assert!(text.contains(&format!("(run {};", report.short_run_id())));
        }
        assert_ne!(reports[1].run_id, reports[2].run_id);
        let step_lines = text.lines().filter(|l| l.starts_with("  [")).count();
        assert_eq!(step_lines, reports[1].steps.len() + reports[2].steps.len());
        assert!(text.lines().any(|l| l.contains(" failed (") && l.contains("s): ")));
    }
}
