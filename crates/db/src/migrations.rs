use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Versions recorded in `_sqlx_migrations`, oldest first.
pub async fn applied_versions(pool: &DbPool) -> Result<Vec<i64>, sqlx::Error> {
    let exists: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;
    if exists == 0 {
        return Ok(Vec::new());
    }

    sqlx::query_scalar("SELECT version FROM _sqlx_migrations WHERE success = 1 ORDER BY version")
        .fetch_all(pool)
        .await
}

pub fn known_versions() -> Vec<i64> {
    MIGRATOR
        .iter()
        .filter(|migration| migration.migration_type.is_up_migration())
        .map(|migration| migration.version)
        .collect()
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::{applied_versions, known_versions, run_pending};
    use crate::{connect_with_settings, migrations::MIGRATOR, DbPool};

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "ticket_logs",
        "idx_ticket_logs_channel_id",
        "idx_ticket_logs_user_review_state",
        "idx_ticket_logs_open_user",
    ];

    const REVIEW_COLUMNS: &[&str] = &[
        "initial_description",
        "awaiting_review",
        "review_state",
        "review_draft_text",
        "review_long_warned",
        "review_text",
        "review_created_at",
    ];

    #[tokio::test]
    async fn migrations_create_ticket_table_with_review_columns() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let columns: Vec<String> = sqlx::query("PRAGMA table_info(ticket_logs)")
            .fetch_all(&pool)
            .await
            .expect("table info")
            .into_iter()
            .map(|row| row.get::<String, _>("name"))
            .collect();

        for column in ["id", "ticket_channel_id", "user_id", "category", "closed_at"] {
            assert!(columns.iter().any(|name| name == column), "missing column {column}");
        }
        for column in REVIEW_COLUMNS {
            assert!(columns.iter().any(|name| name == column), "missing column {column}");
        }

        assert_eq!(applied_versions(&pool).await.expect("versions"), known_versions());
    }

    #[tokio::test]
    async fn legacy_database_is_upgraded_in_place() {
        let pool = legacy_pool().await;
        sqlx::query(
            "INSERT INTO ticket_logs (ticket_channel_id, user_id, category, created_at)
             VALUES ('C-legacy', 'U-legacy', 'bug', datetime('now'))",
        )
        .execute(&pool)
        .await
        .expect("insert legacy row");

        run_pending(&pool).await.expect("run migrations over legacy table");

        let row = sqlx::query(
            "SELECT awaiting_review, review_state, review_long_warned
             FROM ticket_logs WHERE ticket_channel_id = 'C-legacy'",
        )
        .fetch_one(&pool)
        .await
        .expect("legacy row");
        assert_eq!(row.get::<i64, _>("awaiting_review"), 0);
        assert_eq!(row.get::<String, _>("review_state"), "none");
        assert_eq!(row.get::<i64, _>("review_long_warned"), 0);
    }

    #[tokio::test]
    async fn duplicate_open_rows_keep_only_the_newest_open() {
        let pool = legacy_pool().await;
        for channel in ["C-first", "C-second"] {
            sqlx::query(
                "INSERT INTO ticket_logs (ticket_channel_id, user_id, category, created_at)
                 VALUES (?, 'U-1', 'general', datetime('now'))",
            )
            .bind(channel)
            .execute(&pool)
            .await
            .expect("insert legacy row");
        }

        run_pending(&pool).await.expect("run migrations over duplicate open rows");

        let open: Vec<String> =
            sqlx::query("SELECT ticket_channel_id FROM ticket_logs WHERE closed_at IS NULL")
                .fetch_all(&pool)
                .await
                .expect("open rows")
                .into_iter()
                .map(|row| row.get::<String, _>("ticket_channel_id"))
                .collect();
        assert_eq!(open, vec!["C-second".to_owned()]);

        let superseded = sqlx::query(
            "SELECT moderator_id, review_state FROM ticket_logs
             WHERE ticket_channel_id = 'C-first'",
        )
        .fetch_one(&pool)
        .await
        .expect("superseded row");
        assert_eq!(superseded.get::<String, _>("moderator_id"), "system");
        assert_eq!(superseded.get::<String, _>("review_state"), "none");
    }

    async fn legacy_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        sqlx::query(
            "CREATE TABLE ticket_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticket_channel_id TEXT,
                user_id TEXT,
                category TEXT,
                moderator_id TEXT,
                resolution_text TEXT,
                created_at TEXT,
                closed_at TEXT
            )",
        )
        .execute(&pool)
        .await
        .expect("create legacy table");
        pool
    }

    #[tokio::test]
    async fn migrations_up_down_up_preserves_schema_signature() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let initial_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            initial_signature.len(),
            MANAGED_SCHEMA_OBJECTS.len(),
            "initial migration pass should create all managed schema objects",
        );

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        let after_down_signature = managed_schema_signature(&pool).await;
        assert!(
            after_down_signature.is_empty(),
            "managed schema objects should be removed after full undo",
        );

        run_pending(&pool).await.expect("re-run migrations");

        let after_second_up_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            after_second_up_signature, initial_signature,
            "up/down/up should preserve migration-managed schema signature",
        );
    }

    async fn managed_schema_signature(pool: &sqlx::SqlitePool) -> Vec<(String, String, String)> {
        let mut signature: Vec<(String, String, String)> = sqlx::query(
            "SELECT type, name, IFNULL(sql, '') AS sql
             FROM sqlite_master
             WHERE type IN ('table', 'index')",
        )
        .fetch_all(pool)
        .await
        .expect("load schema objects")
        .into_iter()
        .filter_map(|row| {
            let name = row.get::<String, _>("name");
            if MANAGED_SCHEMA_OBJECTS.contains(&name.as_str()) {
                Some((row.get::<String, _>("type"), name, row.get::<String, _>("sql")))
            } else {
                None
            }
        })
        .collect();
        signature.sort();
        signature
    }
}
