use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{error, info, warn};

use deskbot_core::desk::{
    CloseOutcome, CloseRequest, DirectMessage, MessageTarget, Messenger, Notice,
    OpenTicketRequest, PanelOutcome, PanelRequest, ReviewAction, ReviewActionOutcome,
    ReviewActionRequest, ReviewInputOutcome, SupportDesk,
};
use deskbot_core::errors::TicketError;
use deskbot_core::reminders::ReminderBoard;
use deskbot_gateway::blocks::{
    self, category_picker, close_form, panel_error_message, review_not_ready, ticket_closed,
    ticket_created, ticket_error_message, ticket_form, MessageTemplate, Reply,
};
use deskbot_gateway::commands::{
    ComponentId, SlashCommand, TextCommand, CLOSE_NOTES_FIELD, TICKET_DESCRIPTION_FIELD,
};
use deskbot_gateway::events::{
    ButtonEvent, DeskEventService, EventContext, EventHandlerError, FormEvent, HandlerResult,
    MessageEvent, SlashCommandEvent,
};

const TICKET_ALREADY_CLOSED: &str = "This ticket is already closed.";
const CLOSE_NOTES_MISSING: &str = "Please describe how this ticket was resolved.";

/// Routes parsed gateway events into the ticket desk and the reminder board.
pub struct DeskService {
    desk: Arc<SupportDesk>,
    reminders: Arc<ReminderBoard>,
    messenger: Arc<dyn Messenger>,
}

impl DeskService {
    pub fn new(
        desk: Arc<SupportDesk>,
        reminders: Arc<ReminderBoard>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self { desk, reminders, messenger }
    }

    fn team_name(&self) -> &str {
        &self.desk.config().team_name
    }

    fn close_reply(
        &self,
        result: Result<CloseOutcome, TicketError>,
        from_form: bool,
        ctx: &EventContext,
    ) -> HandlerResult {
        let reply = match result {
            Ok(CloseOutcome::NotesRequired) if from_form => {
                Reply::ephemeral_text(CLOSE_NOTES_MISSING)
            }
            Ok(CloseOutcome::NotesRequired) => Reply::Modal(close_form()),
            Ok(CloseOutcome::Closed { deletion_delay, .. }) => {
                Reply::public(MessageTemplate::text(ticket_closed(deletion_delay.as_secs())))
            }
            Ok(CloseOutcome::AlreadyClosed) => Reply::ephemeral_text(TICKET_ALREADY_CLOSED),
            Err(error) => return rejected(&error, ctx),
        };
        HandlerResult::Responded(reply)
    }

    async fn observe_reminder(&self, event: &MessageEvent, ctx: &EventContext) {
        let Some(text) = self.reminders.observe(&event.channel_id) else {
            return;
        };
        let target = MessageTarget::Channel(event.channel_id.clone());
        match self.messenger.send(&target, &Notice::Reminder { text }).await {
            Ok(()) => info!(
                event_name = "desk.reminder.posted",
                correlation_id = %ctx.correlation_id,
                channel_id = %event.channel_id,
                "channel reminder posted"
            ),
            Err(error) => warn!(
                event_name = "desk.reminder.failed",
                correlation_id = %ctx.correlation_id,
                channel_id = %event.channel_id,
                error = %error,
                "channel reminder could not be posted"
            ),
        }
    }
}

fn rejected(error: &TicketError, ctx: &EventContext) -> HandlerResult {
    log_rejection(error, ctx);
    HandlerResult::Responded(Reply::ephemeral_text(ticket_error_message(error)))
}

fn log_rejection(error: &TicketError, ctx: &EventContext) {
    if error.is_internal() {
        error!(
            event_name = "desk.request.failed",
            correlation_id = %ctx.correlation_id,
            error_kind = error.kind(),
            error = %error,
            "desk request failed"
        );
    } else {
        info!(
            event_name = "desk.request.rejected",
            correlation_id = %ctx.correlation_id,
            error_kind = error.kind(),
            "desk request rejected"
        );
    }
}

#[async_trait]
impl DeskEventService for DeskService {
    async fn slash_command(
        &self,
        event: &SlashCommandEvent,
        command: SlashCommand,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlashCommand::Close { notes } = command;
        let request = CloseRequest {
            guild_id: event.guild_id.clone(),
            channel_id: event.channel_id.clone(),
            moderator: event.actor.user_id.clone(),
            notes,
            correlation_id: ctx.correlation_id.clone(),
        };
        Ok(self.close_reply(self.desk.request_close(request).await, false, ctx))
    }

    async fn button_pressed(
        &self,
        event: &ButtonEvent,
        component: ComponentId,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let actor = &event.actor.user_id;
        let review_action = |ticket_id, action| ReviewActionRequest {
            actor: actor.clone(),
            actor_name: event.actor.display_name(),
            ticket_id,
            action,
            correlation_id: ctx.correlation_id.clone(),
        };

        let result = match component {
            ComponentId::OpenTicket => {
                match self.desk.request_ticket_panel(actor, Instant::now()).await {
                    Ok(PanelOutcome::Suppressed) => return Ok(HandlerResult::Processed),
                    Ok(PanelOutcome::ChooseCategory) => {
                        Ok(Reply::ephemeral(category_picker(self.team_name())))
                    }
                    Err(error) => Err(error),
                }
            }
            ComponentId::Category(category_id) => self
                .desk
                .select_category(actor, &category_id)
                .await
                .map(|category| Reply::Modal(ticket_form(self.team_name(), category))),
            ComponentId::ReviewSubmit(_) | ComponentId::ReviewNotReady(_)
                if event.guild_id.is_some() =>
            {
                return Ok(HandlerResult::Ignored);
            }
            ComponentId::ReviewSubmit(ticket_id) => self
                .desk
                .handle_review_action(review_action(ticket_id, ReviewAction::Submit))
                .await
                .map(review_reply),
            ComponentId::ReviewNotReady(ticket_id) => self
                .desk
                .handle_review_action(review_action(ticket_id, ReviewAction::NotReady))
                .await
                .map(review_reply),
            ComponentId::TicketForm(_) | ComponentId::CloseForm => {
                return Ok(HandlerResult::Ignored);
            }
        };

        Ok(match result {
            Ok(reply) => HandlerResult::Responded(reply),
            Err(error) => rejected(&error, ctx),
        })
    }

    async fn form_submitted(
        &self,
        event: &FormEvent,
        component: ComponentId,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        match component {
            ComponentId::TicketForm(category_id) => {
                let request = OpenTicketRequest {
                    guild_id: event.guild_id.clone(),
                    requester: event.actor.user_id.clone(),
                    requester_username: event.actor.username.clone(),
                    category_id,
                    description: event
                        .field(TICKET_DESCRIPTION_FIELD)
                        .unwrap_or_default()
                        .to_owned(),
                    correlation_id: ctx.correlation_id.clone(),
                };
                Ok(match self.desk.open_ticket(request).await {
                    Ok(ticket) => HandlerResult::Responded(Reply::ephemeral_text(
                        ticket_created(&ticket.channel_id),
                    )),
                    Err(error) => rejected(&error, ctx),
                })
            }
            ComponentId::CloseForm => {
                let request = CloseRequest {
                    guild_id: event.guild_id.clone(),
                    channel_id: event.channel_id.clone(),
                    moderator: event.actor.user_id.clone(),
                    notes: event.field(CLOSE_NOTES_FIELD).map(str::to_owned),
                    correlation_id: ctx.correlation_id.clone(),
                };
                Ok(self.close_reply(self.desk.submit_close_notes(request).await, true, ctx))
            }
            _ => Ok(HandlerResult::Ignored),
        }
    }

    async fn direct_message(
        &self,
        event: &MessageEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let message = DirectMessage {
            author: event.author.user_id.clone(),
            content: event.content.clone(),
            correlation_id: ctx.correlation_id.clone(),
        };
        match self.desk.handle_direct_message(message).await {
            Ok(ReviewInputOutcome::Ignored) => Ok(HandlerResult::Ignored),
            Ok(_) => Ok(HandlerResult::Processed),
            Err(error) if error.is_internal() => Err(EventHandlerError::Desk(error.to_string())),
            Err(error) => {
                log_rejection(&error, ctx);
                Ok(HandlerResult::Processed)
            }
        }
    }

    async fn guild_message(
        &self,
        event: &MessageEvent,
        command: Option<TextCommand>,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        self.observe_reminder(event, ctx).await;

        let Some(TextCommand::SetupSupportPanel) = command else {
            return Ok(HandlerResult::Processed);
        };
        let request = PanelRequest {
            guild_id: event.guild_id.clone(),
            channel_id: event.channel_id.clone(),
            actor: event.author.user_id.clone(),
            correlation_id: ctx.correlation_id.clone(),
        };
        let Err(error) = self.desk.post_support_panel(request).await else {
            return Ok(HandlerResult::Processed);
        };

        log_rejection(&error, ctx);
        let notice = Notice::CommandRejected { text: panel_error_message(&error) };
        self.messenger
            .send(&MessageTarget::Channel(event.channel_id.clone()), &notice)
            .await
            .map_err(|error| EventHandlerError::Desk(error.to_string()))?;
        Ok(HandlerResult::Processed)
    }
}

fn review_reply(outcome: ReviewActionOutcome) -> Reply {
    let text = match outcome {
        ReviewActionOutcome::Submitted { .. } => blocks::REVIEW_RECORDED.to_owned(),
        ReviewActionOutcome::DraftCleared { max_chars, .. } => review_not_ready(max_chars),
    };
    Reply::public(MessageTemplate::text(text))
}
