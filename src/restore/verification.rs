// pgmigrate/src/restore/verification.rs
use tracing::info;

use crate::database::ConnectionDescriptor;
use crate::errors::{AppError, Result};
use crate::process::args::PsqlArgs;
use crate::process::{CommandRunner, Invocation};

const PUBLIC_TABLE_COUNT_SQL: &str =
    "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = 'public';";

/// Table counts that matched on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableCounts {
    pub source: i64,
    pub destination: i64,
}

/// First line of `psql` output that trims to an integer.
pub fn parse_scalar_count(output: &str) -> Option<i64> {
    output.lines().find_map(|line| line.trim().parse::<i64>().ok())
}

/// Number of tables in the `public` schema.
pub async fn count_public_tables(
    runner: &dyn CommandRunner,
    conn: &ConnectionDescriptor,
) -> Result<i64> {
    let args = PsqlArgs {
        conn,
        command: PUBLIC_TABLE_COUNT_SQL,
        tuples_only: true,
    }
    .build()?;
    let invocation = Invocation::new("psql").args(args).envs(conn.env_overlay()?);
    let output = runner.run(&invocation).await?;
    parse_scalar_count(&output.stdout).ok_or_else(|| {
        AppError::process(
            "psql",
            format!("could not read a table count for {}", conn.database),
        )
    })
}

/// Compares public table counts between source and destination.
pub async fn verify_table_counts(
    runner: &dyn CommandRunner,
    source: &ConnectionDescriptor,
    destination: &ConnectionDescriptor,
) -> Result<TableCounts> {
    let source_count = count_public_tables(runner, source).await?;
    info!(database = %source, tables = source_count, "Source table count");
    let destination_count = count_public_tables(runner, destination).await?;
    info!(database = %destination, tables = destination_count, "Destination table count");

    if source_count != destination_count {
        return Err(AppError::VerificationMismatch(format!(
            "table count mismatch: source={}, destination={}",
            source_count, destination_count
        )));
    }
    Ok(TableCounts {
        source: source_count,
        destination: destination_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessOutput;
    use crate::process::testing::RecordingRunner;
    use crate::utils::masking::Secret;

    fn conn(host: &str) -> ConnectionDescriptor {
        let mut conn = ConnectionDescriptor::new(host, "orders", "app");
        conn.password = Some(Secret::new("pw"));
        conn
    }

    fn counting_runner(src: &'static str, dst: &'static str) -> RecordingRunner {
        RecordingRunner::with(move |inv| {
            let on_source = inv.arguments().iter().any(|a| a == "--host=src");
            Ok(ProcessOutput {
                stdout: (if on_source { src } else { dst }).to_string(),
                stderr: String::new(),
            })
        })
    }

    #[test]
    fn parses_first_integer_line() {
        assert_eq!(parse_scalar_count("  42\n"), Some(42));
        assert_eq!(parse_scalar_count("SET\n 7 \n9"), Some(7));
        assert_eq!(parse_scalar_count("no rows"), None);
        assert_eq!(parse_scalar_count(""), None);
    }

    #[tokio::test]
    async fn equal_counts_pass() {
        let runner = counting_runner("12\n", " 12");
        let counts = verify_table_counts(&runner, &conn("src"), &conn("dst"))
            .await
            .unwrap();
        assert_eq!(counts, TableCounts { source: 12, destination: 12 });

        let args = runner.calls()[0].arguments().to_vec();
        assert!(args.contains(&"--tuples-only".to_string()));
        assert!(args.iter().any(|a| a.contains("table_schema = 'public'")));
    }

    #[tokio::test]
    async fn differing_counts_report_both() {
        let runner = counting_runner("12", "11");
        let err = verify_table_counts(&runner, &conn("src"), &conn("dst"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::VerificationMismatch(_)));
        assert!(err.to_string().contains("source=12, destination=11"));
    }

    #[tokio::test]
    async fn unreadable_output_is_a_process_failure() {
        let runner = counting_runner("ERROR", "1");
        let err = count_public_tables(&runner, &conn("src")).await.unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
