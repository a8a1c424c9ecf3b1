use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::platform::{ChannelId, UserId};
use crate::domain::ticket::{NewTicket, Ticket, TicketId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("user {user_id} already has an open ticket")]
    DuplicateOpenTicket { user_id: UserId },
    #[error("ticket store backend failure: {0}")]
    Backend(String),
    #[error("ticket row could not be decoded: {0}")]
    Decode(String),
}

/// Durable ticket rows. Every operation touches a single row, addressed either
/// by id or by the most-recent-matching-row rule.
///
/// Mutators return `Ok(false)` when their guard did not match any row (for
/// example, the ticket was no longer awaiting a review), which callers treat as
/// a lost race rather than a failure.
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Fails with [`StoreError::DuplicateOpenTicket`] when the user already
    /// has an open row.
    async fn create_ticket(&self, new_ticket: NewTicket) -> Result<Ticket, StoreError>;

    async fn ticket_by_id(&self, id: TicketId) -> Result<Option<Ticket>, StoreError>;

    async fn open_ticket_for_user(&self, user_id: &UserId) -> Result<Option<Ticket>, StoreError>;

    /// Highest-id row for the channel, so a reused channel id resolves to the
    /// latest ticket.
    async fn ticket_by_channel(&self, channel_id: &ChannelId)
        -> Result<Option<Ticket>, StoreError>;

    /// Closes the open row bound to `channel_id`. Returns `None` when no open
    /// row exists, which makes repeated close requests a no-op.
    async fn close_ticket(
        &self,
        channel_id: &ChannelId,
        moderator_id: &UserId,
        resolution_text: &str,
        closed_at: DateTime<Utc>,
    ) -> Result<Option<Ticket>, StoreError>;

    async fn pending_review_for_user(&self, user_id: &UserId)
        -> Result<Option<Ticket>, StoreError>;

    async fn set_review_draft(&self, id: TicketId, text: &str) -> Result<bool, StoreError>;

    async fn clear_review_draft(&self, id: TicketId) -> Result<bool, StoreError>;

    async fn set_review_long_warned(&self, id: TicketId, warned: bool)
        -> Result<bool, StoreError>;

    async fn finalize_review(
        &self,
        id: TicketId,
        text: &str,
        created_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}
