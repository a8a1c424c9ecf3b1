use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use deskbot_core::desk::{StoreError, TicketStore};
use deskbot_core::domain::platform::{ChannelId, UserId};
use deskbot_core::domain::ticket::{
    FinalReview, NewTicket, Resolution, ReviewProgress, Ticket, TicketId,
};

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    tickets: BTreeMap<i64, Ticket>,
}

impl MemoryState {
    fn latest_where(&self, predicate: impl Fn(&Ticket) -> bool) -> Option<&Ticket> {
        self.tickets.values().rev().find(|ticket| predicate(ticket))
    }

    fn pending_mut(&mut self, id: TicketId) -> Option<&mut Ticket> {
        self.tickets.get_mut(&id.0).filter(|ticket| ticket.awaiting_review())
    }
}

/// Ticket store kept entirely in process memory. Mirrors the guards of the SQL
/// store so controller tests behave the same against either backend.
#[derive(Default)]
pub struct InMemoryTicketStore {
    state: RwLock<MemoryState>,
}

impl InMemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.tickets.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait::async_trait]
impl TicketStore for InMemoryTicketStore {
    async fn create_ticket(&self, new_ticket: NewTicket) -> Result<Ticket, StoreError> {
        let mut state = self.state.write().await;
        let user_id = new_ticket.user_id.clone();
        if state.latest_where(|ticket| ticket.user_id == user_id && ticket.is_open()).is_some() {
            return Err(StoreError::DuplicateOpenTicket { user_id });
        }

        state.next_id += 1;
        let ticket = Ticket::opened(TicketId(state.next_id), new_ticket);
        state.tickets.insert(ticket.id.0, ticket.clone());
        Ok(ticket)
    }

    async fn ticket_by_id(&self, id: TicketId) -> Result<Option<Ticket>, StoreError> {
        Ok(self.state.read().await.tickets.get(&id.0).cloned())
    }

    async fn open_ticket_for_user(&self, user_id: &UserId) -> Result<Option<Ticket>, StoreError> {
        let state = self.state.read().await;
        Ok(state.latest_where(|ticket| &ticket.user_id == user_id && ticket.is_open()).cloned())
    }

    async fn ticket_by_channel(
        &self,
        channel_id: &ChannelId,
    ) -> Result<Option<Ticket>, StoreError> {
        let state = self.state.read().await;
        Ok(state.latest_where(|ticket| &ticket.channel_id == channel_id).cloned())
    }

    async fn close_ticket(
        &self,
        channel_id: &ChannelId,
        moderator_id: &UserId,
        resolution_text: &str,
        closed_at: DateTime<Utc>,
    ) -> Result<Option<Ticket>, StoreError> {
        let mut state = self.state.write().await;
        let Some(id) = state
            .latest_where(|ticket| &ticket.channel_id == channel_id && ticket.is_open())
            .map(|ticket| ticket.id.0)
        else {
            return Ok(None);
        };

        let Some(ticket) = state.tickets.get_mut(&id) else {
            return Ok(None);
        };
        ticket.resolution = Some(Resolution {
            moderator_id: moderator_id.clone(),
            text: Some(resolution_text.to_string()),
            closed_at,
        });
        ticket.review = ReviewProgress::AwaitingInput;
        ticket.review_long_warned = false;
        Ok(Some(ticket.clone()))
    }

    async fn pending_review_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Ticket>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .latest_where(|ticket| &ticket.user_id == user_id && ticket.awaiting_review())
            .cloned())
    }

    async fn set_review_draft(&self, id: TicketId, text: &str) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        Ok(state
            .pending_mut(id)
            .map(|ticket| {
                ticket.review = ReviewProgress::DraftPendingConfirm { draft: text.to_string() };
                ticket.review_long_warned = false;
            })
            .is_some())
    }

    async fn clear_review_draft(&self, id: TicketId) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        Ok(state
            .pending_mut(id)
            .map(|ticket| {
                ticket.review = ReviewProgress::AwaitingInput;
                ticket.review_long_warned = false;
            })
            .is_some())
    }

    async fn set_review_long_warned(&self, id: TicketId, warned: bool) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        Ok(state.pending_mut(id).map(|ticket| ticket.review_long_warned = warned).is_some())
    }

    async fn finalize_review(
        &self,
        id: TicketId,
        text: &str,
        created_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let Some(ticket) = state.pending_mut(id).filter(|ticket| ticket.final_review.is_none())
        else {
            return Ok(false);
        };
        ticket.review = ReviewProgress::Idle;
        ticket.review_long_warned = false;
        ticket.final_review = Some(FinalReview { text: text.to_string(), created_at });
        Ok(true)
    }
}
