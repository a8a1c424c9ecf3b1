use deskbot_db::{connect_with_settings, migrations, DbPool};

use crate::commands::{load_config, runtime, CommandResult, EXIT_DATABASE, EXIT_MIGRATION};

const COMMAND: &str = "migrate";

type Failure = (&'static str, String, u8);

pub fn run() -> CommandResult {
    let outcome = with_pool(|pool| async move {
        let before = migrations::applied_versions(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;
        pool.close().await;
        let applied = migrations::known_versions().len().saturating_sub(before.len());
        Ok(format!("applied {applied} pending migration(s)"))
    });

    into_result(outcome)
}

/// Reports which known migrations the configured database has recorded.
pub fn status() -> CommandResult {
    let outcome = with_pool(|pool| async move {
        let applied = migrations::applied_versions(&pool)
            .await
            .map_err(|error| ("migration_status", error.to_string(), EXIT_MIGRATION))?;
        pool.close().await;
        Ok(describe_status(&applied, &migrations::known_versions()))
    });

    into_result(outcome)
}

pub(crate) fn pending_versions(applied: &[i64], known: &[i64]) -> Vec<i64> {
    known.iter().copied().filter(|version| !applied.contains(version)).collect()
}

fn describe_status(applied: &[i64], known: &[i64]) -> String {
    let pending = pending_versions(applied, known);
    format!("applied={} pending={} {:?}", applied.len(), pending.len(), pending)
}

fn with_pool<F, Fut>(work: F) -> Result<String, CommandResult>
where
    F: FnOnce(DbPool) -> Fut,
    Fut: std::future::Future<Output = Result<String, Failure>>,
{
    let config = load_config(COMMAND)?;
    let runtime = runtime(COMMAND)?;

    runtime
        .block_on(async {
            let pool = connect_with_settings(
                &config.database.url,
                config.database.max_connections,
                config.database.timeout_secs,
            )
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DATABASE))?;
            work(pool).await
        })
        .map_err(|(error_class, message, exit_code)| {
            CommandResult::failure(COMMAND, error_class, message, exit_code)
        })
}

fn into_result(outcome: Result<String, CommandResult>) -> CommandResult {
    match outcome {
        Ok(message) => CommandResult::success(COMMAND, message),
        Err(failure) => failure,
    }
}

#[cfg(test)]
mod tests {
    use super::{describe_status, pending_versions};

    #[test]
    fn pending_versions_keep_known_order() {
        assert_eq!(pending_versions(&[1], &[1, 2, 3]), vec![2, 3]);
        assert!(pending_versions(&[1, 2, 3], &[1, 2, 3]).is_empty());
    }

    #[test]
    fn status_line_lists_pending_versions() {
        assert_eq!(describe_status(&[], &[1, 2]), "applied=0 pending=2 [1, 2]");
    }
}
