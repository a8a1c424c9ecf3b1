use chrono::Utc;
use tracing::{info, warn};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome};
use crate::desk::collaborators::{MessageTarget, Notice};
use crate::desk::lifecycle::SupportDesk;
use crate::domain::platform::UserId;
use crate::domain::ticket::{Ticket, TicketId};
use crate::errors::TicketError;
use crate::flows::{FlowAction, FlowContext, FlowTransitionError, TicketEvent, TransitionOutcome};

/// A direct message from a user to the bot, outside any guild.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectMessage {
    pub author: UserId,
    pub content: String,
    pub correlation_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReviewInputOutcome {
    /// Nothing pending for the author, or the message was blank.
    Ignored,
    Warned { ticket_id: TicketId, max_chars: usize },
    /// Overlong again inside the same warned episode.
    Suppressed { ticket_id: TicketId },
    DraftStored { ticket_id: TicketId },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReviewAction {
    Submit,
    NotReady,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReviewActionRequest {
    pub actor: UserId,
    pub actor_name: String,
    pub ticket_id: TicketId,
    pub action: ReviewAction,
    pub correlation_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReviewActionOutcome {
    Submitted { ticket_id: TicketId },
    DraftCleared { ticket_id: TicketId, max_chars: usize },
}

impl SupportDesk {
    pub async fn handle_direct_message(
        &self,
        message: DirectMessage,
    ) -> Result<ReviewInputOutcome, TicketError> {
        let Some(pending) =
            self.collaborators.store.pending_review_for_user(&message.author).await?
        else {
            return Ok(ReviewInputOutcome::Ignored);
        };

        let text = message.content.trim();
        if text.is_empty() {
            return Ok(ReviewInputOutcome::Ignored);
        }

        let max_chars = self.config.review_max_chars;
        let chars = text.chars().count();
        let transition = self.review_transition(
            &pending,
            &message.author,
            &message.correlation_id,
            &TicketEvent::ReviewMessageReceived,
            &FlowContext::review_input(chars, max_chars, pending.review_long_warned),
        )?;

        if transition.actions.contains(&FlowAction::StoreDraft) {
            if !self.collaborators.store.set_review_draft(pending.id, text).await? {
                return Ok(ReviewInputOutcome::Ignored);
            }
            info!(
                event_name = "desk.review.draft_stored",
                correlation_id = %message.correlation_id,
                ticket_id = pending.id.0,
                user_id = %message.author,
                chars,
                "review draft stored"
            );
            if transition.actions.contains(&FlowAction::PresentConfirmPrompt) {
                self.notify(
                    &MessageTarget::User(message.author.clone()),
                    Notice::ReviewDraftPrompt { ticket_id: pending.id, draft: text.to_owned() },
                    &message.correlation_id,
                )
                .await;
            }
            return Ok(ReviewInputOutcome::DraftStored { ticket_id: pending.id });
        }

        if transition.actions.contains(&FlowAction::MarkLongWarned) {
            if !self.collaborators.store.set_review_long_warned(pending.id, true).await? {
                return Ok(ReviewInputOutcome::Ignored);
            }
            if transition.actions.contains(&FlowAction::SendLengthWarning) {
                self.notify(
                    &MessageTarget::User(message.author.clone()),
                    Notice::ReviewTooLong { max_chars },
                    &message.correlation_id,
                )
                .await;
            }
            info!(
                event_name = "desk.review.too_long_warned",
                correlation_id = %message.correlation_id,
                ticket_id = pending.id.0,
                user_id = %message.author,
                chars,
                "overlong review warned"
            );
            return Ok(ReviewInputOutcome::Warned { ticket_id: pending.id, max_chars });
        }

        Ok(ReviewInputOutcome::Suppressed { ticket_id: pending.id })
    }

    /// Submit / not-ready buttons under a draft prompt. Only the most recent
    /// pending ticket of the actor is addressable.
    pub async fn handle_review_action(
        &self,
        request: ReviewActionRequest,
    ) -> Result<ReviewActionOutcome, TicketError> {
        let pending = self
            .collaborators
            .store
            .pending_review_for_user(&request.actor)
            .await?
            .filter(|pending| pending.id == request.ticket_id)
            .ok_or(TicketError::StaleOrForeignReview)?;

        match request.action {
            ReviewAction::NotReady => self.decline_draft(&request, &pending).await,
            ReviewAction::Submit => self.submit_review(&request, &pending).await,
        }
    }

    async fn decline_draft(
        &self,
        request: &ReviewActionRequest,
        pending: &Ticket,
    ) -> Result<ReviewActionOutcome, TicketError> {
        let transition = self.review_transition(
            pending,
            &request.actor,
            &request.correlation_id,
            &TicketEvent::NotReadySelected,
            &FlowContext::default(),
        )?;

        if transition.actions.contains(&FlowAction::ClearDraft)
            && !self.collaborators.store.clear_review_draft(pending.id).await?
        {
            return Err(TicketError::StaleOrForeignReview);
        }

        info!(
            event_name = "desk.review.not_ready",
            correlation_id = %request.correlation_id,
            ticket_id = pending.id.0,
            user_id = %request.actor,
            "review draft declined"
        );
        Ok(ReviewActionOutcome::DraftCleared {
            ticket_id: pending.id,
            max_chars: self.config.review_max_chars,
        })
    }

    async fn submit_review(
        &self,
        request: &ReviewActionRequest,
        pending: &Ticket,
    ) -> Result<ReviewActionOutcome, TicketError> {
        let max_chars = self.config.review_max_chars;
        let draft = pending.review.draft().map(str::trim).unwrap_or_default();
        if draft.is_empty() {
            return Err(TicketError::NoDraftToSubmit { max_chars });
        }

        let transition = self
            .review_transition(
                pending,
                &request.actor,
                &request.correlation_id,
                &TicketEvent::SubmitSelected,
                &FlowContext::default(),
            )
            .map_err(|error| match error {
                TicketError::Flow(FlowTransitionError::MissingDraft { .. }) => {
                    TicketError::NoDraftToSubmit { max_chars }
                }
                other => other,
            })?;

        let submitted_at = Utc::now();
        if !self.collaborators.store.finalize_review(pending.id, draft, submitted_at).await? {
            return Err(TicketError::StaleOrForeignReview);
        }

        self.record(
            AuditEvent::new(
                Some(pending.id),
                &request.correlation_id,
                "review.submitted",
                AuditCategory::Review,
                request.actor.0.as_str(),
                AuditOutcome::Success,
            )
            .with_metadata("chars", draft.chars().count().to_string()),
        );
        info!(
            event_name = "desk.review.submitted",
            correlation_id = %request.correlation_id,
            ticket_id = pending.id.0,
            user_id = %request.actor,
            "review submitted"
        );

        if transition.actions.contains(&FlowAction::EmitReviewLog) {
            self.emit_review_log(request, pending, draft, submitted_at).await;
        }

        Ok(ReviewActionOutcome::Submitted { ticket_id: pending.id })
    }

    async fn emit_review_log(
        &self,
        request: &ReviewActionRequest,
        pending: &Ticket,
        review: &str,
        submitted_at: chrono::DateTime<Utc>,
    ) {
        let Some(log_channel) = &self.config.rating_log_channel_id else {
            warn!(
                event_name = "desk.review.log_unconfigured",
                correlation_id = %request.correlation_id,
                ticket_id = pending.id.0,
                "rating log channel is not configured, review log skipped"
            );
            return;
        };

        let closer = pending.resolution.as_ref().map(|resolution| resolution.moderator_id.clone());
        let closer_name = match &closer {
            Some(moderator) => {
                match self.collaborators.directory.display_name(None, moderator).await {
                    Ok(Some(name)) => name,
                    Ok(None) => moderator.0.clone(),
                    Err(error) => {
                        warn!(
                            event_name = "desk.directory.lookup_failed",
                            user_id = %moderator,
                            error = %error,
                            "closer name lookup failed"
                        );
                        moderator.0.clone()
                    }
                }
            }
            None => "Unknown".to_owned(),
        };

        self.notify(
            &MessageTarget::Channel(log_channel.clone()),
            Notice::ReviewLog {
                ticket_id: pending.id,
                reviewer: request.actor.clone(),
                reviewer_name: request.actor_name.clone(),
                closer,
                closer_name,
                review: review.to_owned(),
                submitted_at,
            },
            &request.correlation_id,
        )
        .await;
    }

    fn review_transition(
        &self,
        pending: &Ticket,
        actor: &UserId,
        correlation_id: &str,
        event: &TicketEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, TicketError> {
        let audit = AuditContext::new(Some(pending.id), correlation_id, actor.0.as_str());
        Ok(self.flow.apply_with_audit(
            &pending.state(),
            event,
            context,
            self.collaborators.audit.as_ref(),
            &audit,
        )?)
    }
}
