use thiserror::Error;

use crate::desk::{CollaboratorError, StoreError};
use crate::domain::platform::ChannelId;
use crate::flows::FlowTransitionError;

/// Failures surfaced to the actor who triggered an event.
///
/// Every variant aborts the event without changing ticket state, except
/// `Collaborator`, which is only returned when nothing had been committed yet.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TicketError {
    #[error("actor lacks the staff capability for this action")]
    PermissionDenied,
    #[error("action is only available inside the guild")]
    GuildOnly,
    #[error("requester already has an open ticket in channel {channel_id}")]
    DuplicateOpenTicket { channel_id: ChannelId },
    #[error("unknown ticket category `{0}`")]
    UnknownCategory(String),
    #[error("channel is not bound to a ticket")]
    NotRecognizedAsTicket,
    #[error("review is not pending for this actor")]
    StaleOrForeignReview,
    #[error("no review draft to submit")]
    NoDraftToSubmit { max_chars: usize },
    #[error("support panel destination is not configured")]
    PanelNotConfigured,
    #[error("support panel can only be posted in the portal channel")]
    NotPortalChannel,
    #[error(transparent)]
    Flow(#[from] FlowTransitionError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

impl TicketError {
    /// Internal failures are logged by the caller; everything else is an
    /// expected rejection that only needs to be reported to the actor.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Flow(_) | Self::Store(_) | Self::Collaborator(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "permission_denied",
            Self::GuildOnly => "guild_only",
            Self::DuplicateOpenTicket { .. } => "duplicate_open_ticket",
            Self::UnknownCategory(_) => "unknown_category",
            Self::NotRecognizedAsTicket => "not_recognized_as_ticket",
            Self::StaleOrForeignReview => "stale_or_foreign_review",
            Self::NoDraftToSubmit { .. } => "no_draft_to_submit",
            Self::PanelNotConfigured => "panel_not_configured",
            Self::NotPortalChannel => "not_portal_channel",
            Self::Flow(_) => "flow",
            Self::Store(_) => "store",
            Self::Collaborator(_) => "collaborator",
        }
    }
}
