use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{info, warn};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::config::DeskConfig;
use crate::desk::collaborators::{
    ChannelLifecycle, Directory, MessageTarget, Messenger, Notice, PrivateChannelSpec,
};
use crate::desk::cooldown::CooldownTracker;
use crate::desk::store::{StoreError, TicketStore};
use crate::desk::ticket_channel_name;
use crate::domain::platform::{ChannelId, GuildId, UserId};
use crate::domain::ticket::{NewTicket, Ticket, TicketCategory};
use crate::errors::TicketError;
use crate::flows::{FlowAction, FlowContext, FlowEngine, TicketEvent, TicketLifecycleFlow};

/// Everything the controller talks to. Built once at bootstrap and shared.
#[derive(Clone)]
pub struct DeskCollaborators {
    pub store: Arc<dyn TicketStore>,
    pub messenger: Arc<dyn Messenger>,
    pub directory: Arc<dyn Directory>,
    pub channels: Arc<dyn ChannelLifecycle>,
    pub audit: Arc<dyn AuditSink>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PanelRequest {
    pub guild_id: Option<GuildId>,
    pub channel_id: ChannelId,
    pub actor: UserId,
    pub correlation_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PanelOutcome {
    /// Inside the cooldown window; the entry request gets no reply at all.
    Suppressed,
    ChooseCategory,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenTicketRequest {
    pub guild_id: Option<GuildId>,
    pub requester: UserId,
    pub requester_username: String,
    pub category_id: String,
    pub description: String,
    pub correlation_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseRequest {
    pub guild_id: Option<GuildId>,
    pub channel_id: ChannelId,
    pub moderator: UserId,
    pub notes: Option<String>,
    pub correlation_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseOutcome {
    /// No inline notes; the caller should collect them with the close form.
    NotesRequired,
    Closed { ticket: Ticket, deletion_delay: Duration },
    AlreadyClosed,
}

pub struct SupportDesk {
    pub(crate) config: DeskConfig,
    pub(crate) collaborators: DeskCollaborators,
    pub(crate) flow: FlowEngine<TicketLifecycleFlow>,
    cooldown: CooldownTracker,
}

impl SupportDesk {
    pub fn new(config: DeskConfig, collaborators: DeskCollaborators) -> Self {
        let cooldown = CooldownTracker::new(Duration::from_secs(config.open_cooldown_secs));
        Self { config, collaborators, flow: FlowEngine::default(), cooldown }
    }

    pub fn config(&self) -> &DeskConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn TicketStore> {
        &self.collaborators.store
    }

    /// Posts the "open a ticket" panel. Staff only, and only in the portal
    /// channel.
    pub async fn post_support_panel(&self, request: PanelRequest) -> Result<(), TicketError> {
        let (Some(staff_role_id), Some(portal_channel_id)) =
            (&self.config.staff_role_id, &self.config.portal_channel_id)
        else {
            return Err(TicketError::PanelNotConfigured);
        };
        if &request.channel_id != portal_channel_id {
            return Err(TicketError::NotPortalChannel);
        }
        let guild_id = request.guild_id.as_ref().ok_or(TicketError::GuildOnly)?;
        if !self.collaborators.directory.has_role(guild_id, &request.actor, staff_role_id).await? {
            return Err(TicketError::PermissionDenied);
        }

        self.collaborators
            .messenger
            .send(
                &MessageTarget::Channel(request.channel_id.clone()),
                &Notice::SupportPanel { team_name: self.config.team_name.clone() },
            )
            .await?;

        info!(
            event_name = "desk.panel.posted",
            correlation_id = %request.correlation_id,
            channel_id = %request.channel_id,
            actor = %request.actor,
            "support panel posted"
        );
        Ok(())
    }

    /// Entry point of the open flow: the user pressed "open a ticket".
    pub async fn request_ticket_panel(
        &self,
        user_id: &UserId,
        now: Instant,
    ) -> Result<PanelOutcome, TicketError> {
        if !self.cooldown.try_acquire(user_id, now) {
            info!(
                event_name = "desk.open.suppressed",
                user_id = %user_id,
                "open request suppressed by cooldown"
            );
            return Ok(PanelOutcome::Suppressed);
        }

        self.ensure_no_open_ticket(user_id).await?;
        Ok(PanelOutcome::ChooseCategory)
    }

    pub async fn select_category(
        &self,
        user_id: &UserId,
        category_id: &str,
    ) -> Result<TicketCategory, TicketError> {
        self.ensure_no_open_ticket(user_id).await?;
        TicketCategory::from_id(category_id)
            .ok_or_else(|| TicketError::UnknownCategory(category_id.to_owned()))
    }

    pub async fn open_ticket(&self, request: OpenTicketRequest) -> Result<Ticket, TicketError> {
        let category = TicketCategory::from_id(&request.category_id)
            .ok_or_else(|| TicketError::UnknownCategory(request.category_id.clone()))?;
        let guild_id = request.guild_id.clone().ok_or(TicketError::GuildOnly)?;
        self.ensure_no_open_ticket(&request.requester).await?;

        let audit = AuditContext::new(None, &request.correlation_id, request.requester.0.as_str());
        let transition = self.flow.apply_with_audit(
            &self.flow.initial_state(),
            &TicketEvent::OpenRequested,
            &FlowContext::default(),
            self.collaborators.audit.as_ref(),
            &audit,
        )?;
        debug_assert!(transition.actions.contains(&FlowAction::CreatePrivateChannel));

        let spec = PrivateChannelSpec {
            guild_id,
            name: ticket_channel_name(&request.requester_username),
            parent_id: self.config.ticket_parent_id.clone(),
            requester: request.requester.clone(),
            staff_role_id: self.config.staff_role_id.clone(),
        };
        let channel_id = self.collaborators.channels.create_private_channel(&spec).await?;

        let description = request.description.trim();
        let new_ticket = NewTicket {
            channel_id: channel_id.clone(),
            user_id: request.requester.clone(),
            category,
            initial_description: (!description.is_empty()).then(|| description.to_owned()),
            created_at: Utc::now(),
        };

        let ticket = match self.collaborators.store.create_ticket(new_ticket).await {
            Ok(ticket) => ticket,
            Err(StoreError::DuplicateOpenTicket { .. }) => {
                // A concurrent open for the same user won the insert.
                self.discard_orphan_channel(&channel_id, &request.correlation_id).await;
                let existing = self
                    .collaborators
                    .store
                    .open_ticket_for_user(&request.requester)
                    .await?
                    .map(|ticket| ticket.channel_id)
                    .unwrap_or(channel_id);
                return Err(TicketError::DuplicateOpenTicket { channel_id: existing });
            }
            Err(error) => {
                self.discard_orphan_channel(&channel_id, &request.correlation_id).await;
                return Err(error.into());
            }
        };

        self.notify(
            &MessageTarget::Channel(ticket.channel_id.clone()),
            Notice::TicketOpened {
                ticket_id: ticket.id,
                requester: ticket.user_id.clone(),
                category: ticket.category,
                description: ticket.initial_description.clone(),
            },
            &request.correlation_id,
        )
        .await;

        self.record(
            AuditEvent::new(
                Some(ticket.id),
                &request.correlation_id,
                "ticket.opened",
                AuditCategory::Ticket,
                request.requester.0.as_str(),
                AuditOutcome::Success,
            )
            .with_metadata("channel_id", ticket.channel_id.0.as_str())
            .with_metadata("category", ticket.category_id.as_str()),
        );
        info!(
            event_name = "desk.ticket.opened",
            correlation_id = %request.correlation_id,
            ticket_id = ticket.id.0,
            user_id = %ticket.user_id,
            channel_id = %ticket.channel_id,
            category = %ticket.category_id,
            "ticket opened"
        );

        Ok(ticket)
    }

    /// `/close` with optional inline notes.
    pub async fn request_close(&self, request: CloseRequest) -> Result<CloseOutcome, TicketError> {
        let ticket = self.authorize_close(&request).await?;
        if !ticket.is_open() {
            return Ok(CloseOutcome::AlreadyClosed);
        }

        match normalized_notes(request.notes.as_deref()) {
            Some(notes) => self.perform_close(&request, ticket, notes).await,
            None => Ok(CloseOutcome::NotesRequired),
        }
    }

    /// Submission of the close-notes form.
    pub async fn submit_close_notes(
        &self,
        request: CloseRequest,
    ) -> Result<CloseOutcome, TicketError> {
        self.request_close(request).await
    }

    async fn authorize_close(&self, request: &CloseRequest) -> Result<Ticket, TicketError> {
        let guild_id = request.guild_id.as_ref().ok_or(TicketError::GuildOnly)?;
        let staff_role_id =
            self.config.staff_role_id.as_ref().ok_or(TicketError::PermissionDenied)?;
        if !self
            .collaborators
            .directory
            .has_role(guild_id, &request.moderator, staff_role_id)
            .await?
        {
            info!(
                event_name = "desk.close.denied",
                correlation_id = %request.correlation_id,
                user_id = %request.moderator,
                channel_id = %request.channel_id,
                "close rejected, actor lacks staff role"
            );
            return Err(TicketError::PermissionDenied);
        }

        self.collaborators
            .store
            .ticket_by_channel(&request.channel_id)
            .await?
            .ok_or(TicketError::NotRecognizedAsTicket)
    }

    async fn perform_close(
        &self,
        request: &CloseRequest,
        ticket: Ticket,
        notes: String,
    ) -> Result<CloseOutcome, TicketError> {
        let audit = AuditContext::new(
            Some(ticket.id),
            &request.correlation_id,
            request.moderator.0.as_str(),
        );
        let transition = self.flow.apply_with_audit(
            &ticket.state(),
            &TicketEvent::CloseRequested,
            &FlowContext::default(),
            self.collaborators.audit.as_ref(),
            &audit,
        )?;

        let closed = self
            .collaborators
            .store
            .close_ticket(&request.channel_id, &request.moderator, &notes, Utc::now())
            .await?;
        let Some(closed) = closed else {
            return Ok(CloseOutcome::AlreadyClosed);
        };
        let Some(resolution) = closed.resolution.clone() else {
            return Err(StoreError::Decode(format!(
                "ticket {} was closed without a resolution",
                closed.id
            ))
            .into());
        };

        if transition.actions.contains(&FlowAction::NotifyCloseLog) {
            if let Some(log_channel) = &self.config.support_log_channel_id {
                self.notify(
                    &MessageTarget::Channel(log_channel.clone()),
                    Notice::TicketClosedLog {
                        ticket_id: closed.id,
                        requester: closed.user_id.clone(),
                        category: closed.category,
                        moderator: resolution.moderator_id.clone(),
                        resolution: notes.clone(),
                        opened_at: closed.created_at,
                        closed_at: resolution.closed_at,
                    },
                    &request.correlation_id,
                )
                .await;
            }
        }

        if transition.actions.contains(&FlowAction::DirectMessageRequester) {
            let closer_name =
                self.closer_display_name(request.guild_id.as_ref(), &request.moderator).await;
            self.notify(
                &MessageTarget::User(closed.user_id.clone()),
                Notice::TicketClosedDirect {
                    closer_name,
                    team_name: self.config.team_name.clone(),
                    review_max_chars: self.config.review_max_chars,
                },
                &request.correlation_id,
            )
            .await;
        }

        let deletion_delay = Duration::from_secs(self.config.channel_delete_delay_secs);
        if transition.actions.contains(&FlowAction::ScheduleChannelDeletion) {
            self.schedule_channel_deletion(closed.channel_id.clone(), deletion_delay);
        }

        self.record(
            AuditEvent::new(
                Some(closed.id),
                &request.correlation_id,
                "ticket.closed",
                AuditCategory::Ticket,
                request.moderator.0.as_str(),
                AuditOutcome::Success,
            )
            .with_metadata("channel_id", closed.channel_id.0.as_str()),
        );
        info!(
            event_name = "desk.ticket.closed",
            correlation_id = %request.correlation_id,
            ticket_id = closed.id.0,
            user_id = %closed.user_id,
            moderator_id = %request.moderator,
            "ticket closed"
        );

        Ok(CloseOutcome::Closed { ticket: closed, deletion_delay })
    }

    async fn ensure_no_open_ticket(&self, user_id: &UserId) -> Result<(), TicketError> {
        match self.collaborators.store.open_ticket_for_user(user_id).await? {
            Some(open) => Err(TicketError::DuplicateOpenTicket { channel_id: open.channel_id }),
            None => Ok(()),
        }
    }

    async fn closer_display_name(&self, guild_id: Option<&GuildId>, moderator: &UserId) -> String {
        match self.collaborators.directory.display_name(guild_id, moderator).await {
            Ok(Some(name)) => name,
            Ok(None) => format!("the {}", self.config.team_name),
            Err(error) => {
                warn!(
                    event_name = "desk.directory.lookup_failed",
                    user_id = %moderator,
                    error = %error,
                    "closer name lookup failed"
                );
                format!("the {}", self.config.team_name)
            }
        }
    }

    async fn discard_orphan_channel(&self, channel_id: &ChannelId, correlation_id: &str) {
        if let Err(error) = self.collaborators.channels.delete_channel(channel_id).await {
            warn!(
                event_name = "desk.channel.orphan_delete_failed",
                correlation_id = %correlation_id,
                channel_id = %channel_id,
                error = %error,
                "could not delete channel created for a rejected ticket"
            );
        }
    }

    /// Detached; a failed delete is logged and never retried.
    fn schedule_channel_deletion(&self, channel_id: ChannelId, delay: Duration) {
        let channels = Arc::clone(&self.collaborators.channels);
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Err(error) = channels.delete_channel(&channel_id).await {
                warn!(
                    event_name = "desk.channel.delete_failed",
                    channel_id = %channel_id,
                    error = %error,
                    "ticket channel deletion failed"
                );
            }
        });
    }

    /// Outbound sends after a committed store write never fail the event.
    pub(crate) async fn notify(
        &self,
        target: &MessageTarget,
        notice: Notice,
        correlation_id: &str,
    ) -> bool {
        match self.collaborators.messenger.send(target, &notice).await {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    event_name = "desk.notify.failed",
                    correlation_id = %correlation_id,
                    notice = notice.kind(),
                    error = %error,
                    "notification could not be delivered"
                );
                false
            }
        }
    }

    pub(crate) fn record(&self, event: AuditEvent) {
        self.collaborators.audit.emit(event);
    }
}

fn normalized_notes(notes: Option<&str>) -> Option<String> {
    notes.map(str::trim).filter(|notes| !notes.is_empty()).map(str::to_owned)
}
