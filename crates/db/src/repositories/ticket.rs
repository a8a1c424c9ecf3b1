use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{debug, warn};

use deskbot_core::desk::{StoreError, TicketStore};
use deskbot_core::domain::platform::{ChannelId, UserId};
use deskbot_core::domain::ticket::{
    FinalReview, NewTicket, Resolution, ReviewProgress, Ticket, TicketCategory, TicketId,
};

use super::RepositoryError;
use crate::DbPool;

const TICKET_COLUMNS: &str = "id, ticket_channel_id, user_id, category, initial_description,
    created_at, moderator_id, resolution_text, closed_at, review_state, review_draft_text,
    review_long_warned, review_text, review_created_at";

/// Rows written before review collection existed store `datetime('now')`.
const LEGACY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct SqlTicketStore {
    pool: DbPool,
}

impl SqlTicketStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(
        &self,
        clause: &str,
        bind: impl AsRef<str>,
    ) -> Result<Option<Ticket>, RepositoryError> {
        let sql = format!("SELECT {TICKET_COLUMNS} FROM ticket_logs WHERE {clause}");
        let row = sqlx::query(&sql).bind(bind.as_ref()).fetch_optional(&self.pool).await?;
        row.as_ref().map(row_to_ticket).transpose().inspect_err(|error| {
            warn!(
                event_name = "db.ticket.decode_failed",
                lookup = clause,
                key = bind.as_ref(),
                error = %error,
                "ticket row could not be decoded"
            );
        })
    }

    async fn update_pending(
        &self,
        id: TicketId,
        assignments: &str,
        text: Option<&str>,
    ) -> Result<bool, RepositoryError> {
        let sql = format!(
            "UPDATE ticket_logs SET {assignments}
             WHERE id = ? AND review_state != 'none'"
        );
        let mut query = sqlx::query(&sql);
        if let Some(text) = text {
            query = query.bind(text);
        }
        let result = query.bind(id.0).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

fn column<T>(row: &SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name).map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn required(value: Option<String>, column: &str, id: i64) -> Result<String, RepositoryError> {
    value.ok_or_else(|| RepositoryError::Decode(format!("ticket {id} has no {column}")))
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, LEGACY_TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| RepositoryError::Decode(format!("unrecognized timestamp `{value}`")))
}

fn parse_review(
    state: &str,
    draft: Option<String>,
    id: i64,
) -> Result<ReviewProgress, RepositoryError> {
    match state {
        "none" => Ok(ReviewProgress::Idle),
        "awaiting_input" => Ok(ReviewProgress::AwaitingInput),
        "draft_pending_confirm" => Ok(match draft {
            Some(draft) => ReviewProgress::DraftPendingConfirm { draft },
            None => ReviewProgress::AwaitingInput,
        }),
        other => Err(RepositoryError::Decode(format!("ticket {id} has review state `{other}`"))),
    }
}

fn row_to_ticket(row: &SqliteRow) -> Result<Ticket, RepositoryError> {
    let id: i64 = column(row, "id")?;
    let channel_id = required(column(row, "ticket_channel_id")?, "channel", id)?;
    let user_id = required(column(row, "user_id")?, "user", id)?;
    let category_id = required(column(row, "category")?, "category", id)?;
    let initial_description: Option<String> = column(row, "initial_description")?;
    let created_at = required(column(row, "created_at")?, "created_at", id)?;
    let moderator_id: Option<String> = column(row, "moderator_id")?;
    let resolution_text: Option<String> = column(row, "resolution_text")?;
    let closed_at: Option<String> = column(row, "closed_at")?;
    let review_state: String = column(row, "review_state")?;
    let review_draft_text: Option<String> = column(row, "review_draft_text")?;
    let review_long_warned: bool = column(row, "review_long_warned")?;
    let review_text: Option<String> = column(row, "review_text")?;
    let review_created_at: Option<String> = column(row, "review_created_at")?;

    let category = TicketCategory::from_id(&category_id).unwrap_or_else(|| {
        debug!(
            event_name = "db.ticket.retired_category",
            ticket_id = id,
            category = %category_id,
            "ticket row carries a category no longer offered"
        );
        TicketCategory::Retired
    });

    let resolution = match closed_at {
        Some(closed_at) => Some(Resolution {
            moderator_id: UserId(required(moderator_id, "moderator", id)?),
            text: resolution_text,
            closed_at: parse_timestamp(&closed_at)?,
        }),
        None => None,
    };

    let final_review = match (review_text, review_created_at) {
        (Some(text), Some(created_at)) => {
            Some(FinalReview { text, created_at: parse_timestamp(&created_at)? })
        }
        (Some(_), None) => {
            return Err(RepositoryError::Decode(format!(
                "ticket {id} has a review without a timestamp"
            )))
        }
        (None, _) => None,
    };

    Ok(Ticket {
        id: TicketId(id),
        channel_id: ChannelId(channel_id),
        user_id: UserId(user_id),
        category,
        category_id,
        initial_description,
        created_at: parse_timestamp(&created_at)?,
        resolution,
        review: parse_review(&review_state, review_draft_text, id)?,
        review_long_warned,
        final_review,
    })
}

#[async_trait::async_trait]
impl TicketStore for SqlTicketStore {
    async fn create_ticket(&self, new_ticket: NewTicket) -> Result<Ticket, StoreError> {
        let result = sqlx::query(
            "INSERT INTO ticket_logs
                 (ticket_channel_id, user_id, category, initial_description, created_at,
                  awaiting_review, review_state, review_long_warned)
             VALUES (?, ?, ?, ?, ?, 0, 'none', 0)",
        )
        .bind(&new_ticket.channel_id.0)
        .bind(&new_ticket.user_id.0)
        .bind(new_ticket.category.id())
        .bind(&new_ticket.initial_description)
        .bind(new_ticket.created_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(Ticket::opened(TicketId(done.last_insert_rowid()), new_ticket)),
            Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
                warn!(
                    event_name = "db.ticket.duplicate_open",
                    user_id = %new_ticket.user_id,
                    channel_id = %new_ticket.channel_id,
                    "open-ticket index rejected a second open row"
                );
                Err(StoreError::DuplicateOpenTicket { user_id: new_ticket.user_id })
            }
            Err(error) => Err(RepositoryError::from(error).into()),
        }
    }

    async fn ticket_by_id(&self, id: TicketId) -> Result<Option<Ticket>, StoreError> {
        let sql = format!("SELECT {TICKET_COLUMNS} FROM ticket_logs WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(row.as_ref().map(row_to_ticket).transpose()?)
    }

    async fn open_ticket_for_user(&self, user_id: &UserId) -> Result<Option<Ticket>, StoreError> {
        Ok(self
            .fetch_one_where(
                "user_id = ? AND closed_at IS NULL ORDER BY id DESC LIMIT 1",
                &user_id.0,
            )
            .await?)
    }

    async fn ticket_by_channel(
        &self,
        channel_id: &ChannelId,
    ) -> Result<Option<Ticket>, StoreError> {
        Ok(self
            .fetch_one_where("ticket_channel_id = ? ORDER BY id DESC LIMIT 1", &channel_id.0)
            .await?)
    }

    async fn close_ticket(
        &self,
        channel_id: &ChannelId,
        moderator_id: &UserId,
        resolution_text: &str,
        closed_at: DateTime<Utc>,
    ) -> Result<Option<Ticket>, StoreError> {
        let sql = format!(
            "UPDATE ticket_logs
             SET moderator_id = ?, resolution_text = ?, closed_at = ?,
                 awaiting_review = 1, review_state = 'awaiting_input',
                 review_draft_text = NULL, review_long_warned = 0
             WHERE id = (
                 SELECT id FROM ticket_logs
                 WHERE ticket_channel_id = ? AND closed_at IS NULL
                 ORDER BY id DESC LIMIT 1
             )
             AND closed_at IS NULL
             RETURNING {TICKET_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&moderator_id.0)
            .bind(resolution_text)
            .bind(closed_at.to_rfc3339())
            .bind(&channel_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(row.as_ref().map(row_to_ticket).transpose()?)
    }

    async fn pending_review_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Ticket>, StoreError> {
        Ok(self
            .fetch_one_where(
                "user_id = ? AND review_state != 'none' ORDER BY id DESC LIMIT 1",
                &user_id.0,
            )
            .await?)
    }

    async fn set_review_draft(&self, id: TicketId, text: &str) -> Result<bool, StoreError> {
        Ok(self
            .update_pending(
                id,
                "awaiting_review = 1, review_state = 'draft_pending_confirm',
                 review_draft_text = ?, review_long_warned = 0",
                Some(text),
            )
            .await?)
    }

    async fn clear_review_draft(&self, id: TicketId) -> Result<bool, StoreError> {
        Ok(self
            .update_pending(
                id,
                "awaiting_review = 1, review_state = 'awaiting_input',
                 review_draft_text = NULL, review_long_warned = 0",
                None,
            )
            .await?)
    }

    async fn set_review_long_warned(&self, id: TicketId, warned: bool) -> Result<bool, StoreError> {
        let assignments =
            if warned { "review_long_warned = 1" } else { "review_long_warned = 0" };
        Ok(self.update_pending(id, assignments, None).await?)
    }

    async fn finalize_review(
        &self,
        id: TicketId,
        text: &str,
        created_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE ticket_logs
             SET awaiting_review = 0, review_state = 'none', review_draft_text = NULL,
                 review_long_warned = 0, review_text = ?, review_created_at = ?
             WHERE id = ? AND review_state != 'none' AND review_text IS NULL",
        )
        .bind(text)
        .bind(created_at.to_rfc3339())
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;
        Ok(result.rows_affected() > 0)
    }
}
