use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::platform::{ChannelId, UserId};
use crate::flows::TicketState;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TicketId(pub i64);

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketCategory {
    PlayerCard,
    Appeal,
    General,
    DataLoss,
    Bug,
    /// Stored by an older deployment under an id no longer offered.
    Retired,
}

impl TicketCategory {
    pub const ALL: [TicketCategory; 5] =
        [Self::PlayerCard, Self::Appeal, Self::General, Self::DataLoss, Self::Bug];

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|category| category.id() == id)
    }

    pub fn id(self) -> &'static str {
        match self {
            Self::PlayerCard => "player_card",
            Self::Appeal => "appeal",
            Self::General => "general",
            Self::DataLoss => "data_loss",
            Self::Bug => "bug",
            Self::Retired => "retired",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::PlayerCard => "Report a Player or Card",
            Self::Appeal => "Appeal Moderation Action",
            Self::General => "General Support",
            Self::DataLoss => "Data Loss, Donations, or Player Data",
            Self::Bug => "Report a Bug",
            Self::Retired => "Retired Category",
        }
    }

    /// Categories that usually involve moderation get highlighted in the picker.
    pub fn is_sensitive(self) -> bool {
        matches!(self, Self::PlayerCard | Self::Appeal)
    }

    pub fn guidance(self) -> &'static str {
        match self {
            Self::PlayerCard => {
                "You opened a ticket to report a player or card.\n\n\
                 Please provide:\n\
                 - The player's username and any relevant card links.\n\
                 - What happened, including time and channel if possible.\n\
                 - Any screenshots or proof you can share."
            }
            Self::Appeal => {
                "You opened a ticket to appeal a moderation action.\n\n\
                 Please provide:\n\
                 - What action was taken against you (mute, warn, timeout, ban, etc.).\n\
                 - When it happened.\n\
                 - Why you believe it should be reviewed or lifted."
            }
            Self::General => {
                "You opened a general support ticket.\n\n\
                 Please explain your question or request in detail."
            }
            Self::DataLoss => {
                "You opened a ticket about data loss, donations, or player data.\n\n\
                 Please provide:\n\
                 - Your in-game username.\n\
                 - What was lost (donation, player data, etc.).\n\
                 - Approximately when it happened."
            }
            Self::Bug => {
                "You opened a ticket to report a bug.\n\n\
                 Please provide:\n\
                 - What you were doing when the bug happened.\n\
                 - Whether you can reproduce it consistently.\n\
                 - Screenshots or steps to reproduce, if possible."
            }
            Self::Retired => {
                "This ticket was opened under a category that is no longer offered."
            }
        }
    }
}

/// Where a closed ticket sits in the review sub-protocol.
///
/// `awaiting_review` is derived from this value rather than stored beside it,
/// so a ticket can never claim to await a review while holding no review state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReviewProgress {
    #[default]
    Idle,
    AwaitingInput,
    DraftPendingConfirm {
        draft: String,
    },
}

impl ReviewProgress {
    pub fn awaiting_review(&self) -> bool {
        !matches!(self, Self::Idle)
    }

    pub fn draft(&self) -> Option<&str> {
        match self {
            Self::DraftPendingConfirm { draft } => Some(draft),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "none",
            Self::AwaitingInput => "awaiting_input",
            Self::DraftPendingConfirm { .. } => "draft_pending_confirm",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub moderator_id: UserId,
    pub text: Option<String>,
    pub closed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalReview {
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub category: TicketCategory,
    /// Category id as stored; differs from `category.id()` only for retired ids.
    pub category_id: String,
    pub initial_description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolution: Option<Resolution>,
    pub review: ReviewProgress,
    pub review_long_warned: bool,
    pub final_review: Option<FinalReview>,
}

impl Ticket {
    pub fn opened(id: TicketId, new_ticket: NewTicket) -> Self {
        Self {
            id,
            channel_id: new_ticket.channel_id,
            user_id: new_ticket.user_id,
            category: new_ticket.category,
            category_id: new_ticket.category.id().to_owned(),
            initial_description: new_ticket.initial_description,
            created_at: new_ticket.created_at,
            resolution: None,
            review: ReviewProgress::Idle,
            review_long_warned: false,
            final_review: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.resolution.is_none()
    }

    pub fn awaiting_review(&self) -> bool {
        self.review.awaiting_review()
    }

    pub fn state(&self) -> TicketState {
        if self.resolution.is_none() {
            return TicketState::Open;
        }

        match (&self.review, &self.final_review) {
            (ReviewProgress::AwaitingInput, _) => TicketState::ClosedAwaitingInput,
            (ReviewProgress::DraftPendingConfirm { .. }, _) => {
                TicketState::ClosedDraftPendingConfirm
            }
            (ReviewProgress::Idle, Some(_)) => TicketState::ClosedReviewed,
            (ReviewProgress::Idle, None) => TicketState::Archived,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewTicket {
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub category: TicketCategory,
    pub initial_description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{
        FinalReview, NewTicket, Resolution, ReviewProgress, Ticket, TicketCategory, TicketId,
    };
    use crate::domain::platform::{ChannelId, UserId};
    use crate::flows::TicketState;

    fn open_ticket() -> Ticket {
        Ticket::opened(
            TicketId(7),
            NewTicket {
                channel_id: ChannelId("C-7".to_owned()),
                user_id: UserId("U-1".to_owned()),
                category: TicketCategory::General,
                initial_description: Some("need help".to_owned()),
                created_at: Utc::now(),
            },
        )
    }

    #[test]
    fn category_ids_resolve_to_the_fixed_set() {
        for category in TicketCategory::ALL {
            assert_eq!(TicketCategory::from_id(category.id()), Some(category));
        }
        assert_eq!(TicketCategory::from_id("billing"), None);
        assert_eq!(TicketCategory::from_id(TicketCategory::Retired.id()), None);
        assert!(TicketCategory::Appeal.is_sensitive());
        assert!(!TicketCategory::Bug.is_sensitive());
    }

    #[test]
    fn state_follows_resolution_and_review_progress() {
        let mut ticket = open_ticket();
        assert_eq!(ticket.state(), TicketState::Open);
        assert!(ticket.is_open());
        assert!(!ticket.awaiting_review());

        ticket.resolution = Some(Resolution {
            moderator_id: UserId("M-1".to_owned()),
            text: Some("resolved via refund".to_owned()),
            closed_at: Utc::now(),
        });
        ticket.review = ReviewProgress::AwaitingInput;
        assert_eq!(ticket.state(), TicketState::ClosedAwaitingInput);
        assert!(ticket.awaiting_review());

        ticket.review = ReviewProgress::DraftPendingConfirm { draft: "great help".to_owned() };
        assert_eq!(ticket.state(), TicketState::ClosedDraftPendingConfirm);
        assert_eq!(ticket.review.draft(), Some("great help"));

        ticket.review = ReviewProgress::Idle;
        assert_eq!(ticket.state(), TicketState::Archived);

        ticket.final_review =
            Some(FinalReview { text: "great help".to_owned(), created_at: Utc::now() });
        assert_eq!(ticket.state(), TicketState::ClosedReviewed);
        assert!(!ticket.awaiting_review());
    }
}
