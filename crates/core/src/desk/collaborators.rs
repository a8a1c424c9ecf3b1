use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::platform::{ChannelId, GuildId, RoleId, UserId};
use crate::domain::ticket::{TicketCategory, TicketId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("message delivery failed: {0}")]
    Delivery(String),
    #[error("directory lookup failed: {0}")]
    Lookup(String),
    #[error("channel operation failed: {0}")]
    Channel(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageTarget {
    Channel(ChannelId),
    /// Direct message to a user; the messenger resolves the DM channel.
    User(UserId),
}

/// What the desk wants to say. Rendering into platform messages happens in the
/// gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    SupportPanel {
        team_name: String,
    },
    TicketOpened {
        ticket_id: TicketId,
        requester: UserId,
        category: TicketCategory,
        description: Option<String>,
    },
    TicketClosedLog {
        ticket_id: TicketId,
        requester: UserId,
        category: TicketCategory,
        moderator: UserId,
        resolution: String,
        opened_at: DateTime<Utc>,
        closed_at: DateTime<Utc>,
    },
    TicketClosedDirect {
        closer_name: String,
        team_name: String,
        review_max_chars: usize,
    },
    ReviewTooLong {
        max_chars: usize,
    },
    ReviewDraftPrompt {
        ticket_id: TicketId,
        draft: String,
    },
    ReviewLog {
        ticket_id: TicketId,
        reviewer: UserId,
        reviewer_name: String,
        closer: Option<UserId>,
        closer_name: String,
        review: String,
        submitted_at: DateTime<Utc>,
    },
    Reminder {
        text: String,
    },
    /// Plain reply to a rejected text command.
    CommandRejected {
        text: String,
    },
}

impl Notice {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SupportPanel { .. } => "support_panel",
            Self::TicketOpened { .. } => "ticket_opened",
            Self::TicketClosedLog { .. } => "ticket_closed_log",
            Self::TicketClosedDirect { .. } => "ticket_closed_direct",
            Self::ReviewTooLong { .. } => "review_too_long",
            Self::ReviewDraftPrompt { .. } => "review_draft_prompt",
            Self::ReviewLog { .. } => "review_log",
            Self::Reminder { .. } => "reminder",
            Self::CommandRejected { .. } => "command_rejected",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrivateChannelSpec {
    pub guild_id: GuildId,
    pub name: String,
    pub parent_id: Option<ChannelId>,
    pub requester: UserId,
    pub staff_role_id: Option<RoleId>,
}

#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, target: &MessageTarget, notice: &Notice)
        -> Result<(), CollaboratorError>;
}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn has_role(
        &self,
        guild_id: &GuildId,
        user_id: &UserId,
        role_id: &RoleId,
    ) -> Result<bool, CollaboratorError>;

    /// Human-readable name, preferring the guild nickname when a guild is
    /// given. `None` when the user cannot be resolved.
    async fn display_name(
        &self,
        guild_id: Option<&GuildId>,
        user_id: &UserId,
    ) -> Result<Option<String>, CollaboratorError>;
}

#[async_trait]
pub trait ChannelLifecycle: Send + Sync {
    async fn create_private_channel(
        &self,
        spec: &PrivateChannelSpec,
    ) -> Result<ChannelId, CollaboratorError>;

    async fn delete_channel(&self, channel_id: &ChannelId) -> Result<(), CollaboratorError>;
}
