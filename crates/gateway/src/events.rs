use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use deskbot_core::domain::platform::{ChannelId, GuildId, UserId};

use crate::{
    blocks::Reply,
    commands::{
        parse_slash_command, parse_text_command, CommandParseError, ComponentId, SlashCommand,
        SlashCommandPayload, TextCommand,
    },
};

const INTERACTION_APPLICATION_COMMAND: u8 = 2;
const INTERACTION_MESSAGE_COMPONENT: u8 = 3;
const INTERACTION_MODAL_SUBMIT: u8 = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayEnvelope {
    pub envelope_id: String,
    pub event: GatewayEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayEvent {
    SlashCommand(SlashCommandEvent),
    ButtonPressed(ButtonEvent),
    FormSubmitted(FormEvent),
    DirectMessage(MessageEvent),
    GuildMessage(MessageEvent),
    Unsupported { event_type: String },
}

impl GatewayEvent {
    pub fn event_type(&self) -> GatewayEventType {
        match self {
            Self::SlashCommand(_) => GatewayEventType::SlashCommand,
            Self::ButtonPressed(_) => GatewayEventType::ButtonPressed,
            Self::FormSubmitted(_) => GatewayEventType::FormSubmitted,
            Self::DirectMessage(_) => GatewayEventType::DirectMessage,
            Self::GuildMessage(_) => GatewayEventType::GuildMessage,
            Self::Unsupported { .. } => GatewayEventType::Unsupported,
        }
    }

    /// The interaction to answer, for events that expect a reply.
    pub fn interaction(&self) -> Option<&InteractionRef> {
        match self {
            Self::SlashCommand(event) => Some(&event.interaction),
            Self::ButtonPressed(event) => Some(&event.interaction),
            Self::FormSubmitted(event) => Some(&event.interaction),
            _ => None,
        }
    }

    pub fn actor(&self) -> Option<&Actor> {
        match self {
            Self::SlashCommand(event) => Some(&event.actor),
            Self::ButtonPressed(event) => Some(&event.actor),
            Self::FormSubmitted(event) => Some(&event.actor),
            Self::DirectMessage(event) | Self::GuildMessage(event) => Some(&event.author),
            Self::Unsupported { .. } => None,
        }
    }

    /// Maps a gateway dispatch (`t` and `d` of an op 0 frame) onto an event.
    /// Dispatch kinds the desk does not care about come back as `Unsupported`.
    pub fn from_dispatch(kind: &str, data: &Value) -> Result<Self, EventParseError> {
        match kind {
            "INTERACTION_CREATE" => decode::<RawInteraction>(kind, data)?.into_event(),
            "MESSAGE_CREATE" => Ok(decode::<RawMessage>(kind, data)?.into_event()),
            other => Ok(Self::Unsupported { event_type: other.to_owned() }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum GatewayEventType {
    SlashCommand,
    ButtonPressed,
    FormSubmitted,
    DirectMessage,
    GuildMessage,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InteractionRef {
    pub id: String,
    pub token: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub username: String,
    pub nickname: Option<String>,
    pub is_bot: bool,
}

impl Actor {
    /// `username (nickname)` when a distinct guild nickname is set.
    pub fn display_name(&self) -> String {
        match self.nickname.as_deref() {
            Some(nickname) if nickname != self.username => {
                format!("{} ({nickname})", self.username)
            }
            _ => self.username.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlashCommandEvent {
    pub interaction: InteractionRef,
    pub guild_id: Option<GuildId>,
    pub channel_id: ChannelId,
    pub actor: Actor,
    pub payload: SlashCommandPayload,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ButtonEvent {
    pub interaction: InteractionRef,
    pub guild_id: Option<GuildId>,
    pub channel_id: ChannelId,
    pub actor: Actor,
    pub custom_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormEvent {
    pub interaction: InteractionRef,
    pub guild_id: Option<GuildId>,
    pub channel_id: ChannelId,
    pub actor: Actor,
    pub custom_id: String,
    pub fields: Vec<(String, String)>,
}

impl FormEvent {
    pub fn field(&self, custom_id: &str) -> Option<&str> {
        self.fields.iter().find(|(key, _)| key == custom_id).map(|(_, value)| value.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    pub message_id: String,
    pub channel_id: ChannelId,
    pub guild_id: Option<GuildId>,
    pub author: Actor,
    pub content: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventParseError {
    #[error("malformed {0} payload: {1}")]
    Malformed(String, String),
    #[error("interaction {0} has no acting user")]
    MissingActor(String),
    #[error("interaction {0} has no channel")]
    MissingChannel(String),
}

#[derive(Deserialize)]
struct RawUser {
    id: String,
    username: String,
    #[serde(default)]
    global_name: Option<String>,
    #[serde(default)]
    bot: bool,
}

#[derive(Deserialize)]
struct RawMember {
    #[serde(default)]
    user: Option<RawUser>,
    #[serde(default)]
    nick: Option<String>,
}

#[derive(Deserialize)]
struct RawInteraction {
    id: String,
    token: String,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    guild_id: Option<String>,
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    member: Option<RawMember>,
    #[serde(default)]
    user: Option<RawUser>,
    #[serde(default)]
    data: RawInteractionData,
}

#[derive(Default, Deserialize)]
struct RawInteractionData {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    options: Vec<RawOption>,
    #[serde(default)]
    custom_id: Option<String>,
    #[serde(default)]
    components: Vec<RawRow>,
}

#[derive(Deserialize)]
struct RawOption {
    name: String,
    #[serde(default)]
    value: Value,
}

#[derive(Deserialize)]
struct RawRow {
    #[serde(default)]
    components: Vec<RawField>,
}

#[derive(Deserialize)]
struct RawField {
    custom_id: String,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Deserialize)]
struct RawMessage {
    id: String,
    channel_id: String,
    #[serde(default)]
    guild_id: Option<String>,
    author: RawUser,
    #[serde(default)]
    member: Option<RawMember>,
    #[serde(default)]
    content: String,
}

fn decode<T: serde::de::DeserializeOwned>(kind: &str, data: &Value) -> Result<T, EventParseError> {
    T::deserialize(data)
        .map_err(|error| EventParseError::Malformed(kind.to_owned(), error.to_string()))
}

fn actor_from(user: RawUser, nickname: Option<String>) -> Actor {
    Actor {
        user_id: UserId(user.id),
        nickname: nickname.or(user.global_name),
        username: user.username,
        is_bot: user.bot,
    }
}

impl RawInteraction {
    fn into_event(self) -> Result<GatewayEvent, EventParseError> {
        let (user, nickname) = match (self.member, self.user) {
            (Some(RawMember { user: Some(user), nick }), _) => (user, nick),
            (_, Some(user)) => (user, None),
            _ => return Err(EventParseError::MissingActor(self.id)),
        };
        let actor = actor_from(user, nickname);
        let channel_id = self
            .channel_id
            .map(ChannelId)
            .ok_or_else(|| EventParseError::MissingChannel(self.id.clone()))?;
        let interaction = InteractionRef { id: self.id, token: self.token };
        let guild_id = self.guild_id.map(GuildId);
        let data = self.data;

        Ok(match (self.kind, data.name, data.custom_id) {
            (INTERACTION_APPLICATION_COMMAND, Some(name), _) => {
                let options = data
                    .options
                    .into_iter()
                    .map(|option| {
                        let value = match option.value {
                            Value::String(text) => text,
                            other => other.to_string(),
                        };
                        (option.name, value)
                    })
                    .collect();
                GatewayEvent::SlashCommand(SlashCommandEvent {
                    interaction,
                    guild_id,
                    channel_id,
                    actor,
                    payload: SlashCommandPayload { name, options },
                })
            }
            (INTERACTION_MESSAGE_COMPONENT, _, Some(custom_id)) => {
                GatewayEvent::ButtonPressed(ButtonEvent {
                    interaction,
                    guild_id,
                    channel_id,
                    actor,
                    custom_id,
                })
            }
            (INTERACTION_MODAL_SUBMIT, _, Some(custom_id)) => {
                let fields = data
                    .components
                    .into_iter()
                    .flat_map(|row| row.components)
                    .map(|field| (field.custom_id, field.value.unwrap_or_default()))
                    .collect();
                GatewayEvent::FormSubmitted(FormEvent {
                    interaction,
                    guild_id,
                    channel_id,
                    actor,
                    custom_id,
                    fields,
                })
            }
            (kind, _, _) => {
                GatewayEvent::Unsupported { event_type: format!("INTERACTION_CREATE:{kind}") }
            }
        })
    }
}

impl RawMessage {
    fn into_event(self) -> GatewayEvent {
        let nickname = self.member.and_then(|member| member.nick);
        let event = MessageEvent {
            message_id: self.id,
            channel_id: ChannelId(self.channel_id),
            guild_id: self.guild_id.map(GuildId),
            author: actor_from(self.author, nickname),
            content: self.content,
        };
        if event.guild_id.is_some() {
            GatewayEvent::GuildMessage(event)
        } else {
            GatewayEvent::DirectMessage(event)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    /// Answer the interaction with this reply.
    Responded(Reply),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Parse(#[from] CommandParseError),
    #[error("desk failure: {0}")]
    Desk(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> GatewayEventType;
    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<GatewayEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// What the desk does with each parsed event. Implemented by the server on top
/// of the ticket controller.
#[async_trait]
pub trait DeskEventService: Send + Sync {
    async fn slash_command(
        &self,
        event: &SlashCommandEvent,
        command: SlashCommand,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;

    async fn button_pressed(
        &self,
        event: &ButtonEvent,
        component: ComponentId,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;

    async fn form_submitted(
        &self,
        event: &FormEvent,
        component: ComponentId,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;

    async fn direct_message(
        &self,
        event: &MessageEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;

    /// Every human guild message, with the text command it carries if any.
    async fn guild_message(
        &self,
        event: &MessageEvent,
        command: Option<TextCommand>,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

pub fn desk_dispatcher<S>(service: Arc<S>) -> EventDispatcher
where
    S: DeskEventService + 'static,
{
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(SlashCommandHandler { service: service.clone() });
    dispatcher.register(ButtonHandler { service: service.clone() });
    dispatcher.register(FormHandler { service: service.clone() });
    dispatcher.register(DirectMessageHandler { service: service.clone() });
    dispatcher.register(GuildMessageHandler { service });
    dispatcher
}

pub struct SlashCommandHandler<S> {
    service: Arc<S>,
}

#[async_trait]
impl<S> EventHandler for SlashCommandHandler<S>
where
    S: DeskEventService + 'static,
{
    fn event_type(&self) -> GatewayEventType {
        GatewayEventType::SlashCommand
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let GatewayEvent::SlashCommand(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let command = parse_slash_command(&event.payload)?;
        self.service.slash_command(event, command, ctx).await
    }
}

pub struct ButtonHandler<S> {
    service: Arc<S>,
}

#[async_trait]
impl<S> EventHandler for ButtonHandler<S>
where
    S: DeskEventService + 'static,
{
    fn event_type(&self) -> GatewayEventType {
        GatewayEventType::ButtonPressed
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let GatewayEvent::ButtonPressed(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let component = ComponentId::parse(&event.custom_id)?;
        self.service.button_pressed(event, component, ctx).await
    }
}

pub struct FormHandler<S> {
    service: Arc<S>,
}

#[async_trait]
impl<S> EventHandler for FormHandler<S>
where
    S: DeskEventService + 'static,
{
    fn event_type(&self) -> GatewayEventType {
        GatewayEventType::FormSubmitted
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let GatewayEvent::FormSubmitted(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let component = ComponentId::parse(&event.custom_id)?;
        self.service.form_submitted(event, component, ctx).await
    }
}

pub struct DirectMessageHandler<S> {
    service: Arc<S>,
}

#[async_trait]
impl<S> EventHandler for DirectMessageHandler<S>
where
    S: DeskEventService + 'static,
{
    fn event_type(&self) -> GatewayEventType {
        GatewayEventType::DirectMessage
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let GatewayEvent::DirectMessage(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if event.author.is_bot {
            return Ok(HandlerResult::Ignored);
        }

        self.service.direct_message(event, ctx).await
    }
}

pub struct GuildMessageHandler<S> {
    service: Arc<S>,
}

#[async_trait]
impl<S> EventHandler for GuildMessageHandler<S>
where
    S: DeskEventService + 'static,
{
    fn event_type(&self) -> GatewayEventType {
        GatewayEventType::GuildMessage
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let GatewayEvent::GuildMessage(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if event.author.is_bot {
            return Ok(HandlerResult::Ignored);
        }

        let command = parse_text_command(&event.content);
        self.service.guild_message(event, command, ctx).await
    }
}
