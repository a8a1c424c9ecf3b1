//! HTTP side of the chat platform: outbound messages, member lookups, channel
//! management and interaction callbacks.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::debug;

use deskbot_core::config::GatewayConfig;
use deskbot_core::desk::{
    ChannelLifecycle, CollaboratorError, Directory, MessageTarget, Messenger, Notice,
    PrivateChannelSpec,
};
use deskbot_core::domain::platform::{ChannelId, GuildId, RoleId, UserId};

use crate::blocks::{render_notice, Reply};
use crate::commands::{CLOSE_COMMAND, CLOSE_NOTES_OPTION};
use crate::events::InteractionRef;
use crate::socket::{InteractionResponder, TransportError};

const VIEW_CHANNEL: u64 = 1 << 10;
const SEND_MESSAGES: u64 = 1 << 11;
const READ_MESSAGE_HISTORY: u64 = 1 << 16;
const TICKET_MEMBER_PERMISSIONS: u64 = VIEW_CHANNEL | SEND_MESSAGES | READ_MESSAGE_HISTORY;

const OVERWRITE_ROLE: u8 = 0;
const OVERWRITE_MEMBER: u8 = 1;
const GUILD_TEXT_CHANNEL: u8 = 0;
const STRING_OPTION: u8 = 3;

#[derive(Debug, Error)]
pub enum RestError {
    #[error("http client setup failed: {0}")]
    Client(String),
    #[error("request to {path} failed: {message}")]
    Transport { path: String, message: String },
    #[error("{path} returned {status}: {body}")]
    Status { path: String, status: u16, body: String },
    #[error("could not decode response from {path}: {message}")]
    Decode { path: String, message: String },
}

#[derive(Deserialize)]
struct UserPayload {
    id: String,
    username: String,
    #[serde(default)]
    global_name: Option<String>,
}

#[derive(Deserialize)]
struct MemberPayload {
    #[serde(default)]
    user: Option<UserPayload>,
    #[serde(default)]
    nick: Option<String>,
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Deserialize)]
struct IdPayload {
    id: String,
}

pub struct RestClient {
    http: Client,
    base_url: String,
    token: SecretString,
    bot_user_id: OnceCell<UserId>,
}

impl RestClient {
    pub fn new(
        base_url: impl Into<String>,
        token: SecretString,
        timeout: Duration,
    ) -> Result<Self, RestError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("deskbot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|error| RestError::Client(error.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Ok(Self { http, base_url, token, bot_user_id: OnceCell::new() })
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self, RestError> {
        Self::new(
            config.api_base_url.clone(),
            config.bot_token.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .header("Authorization", format!("Bot {}", self.token.expose_secret()))
    }

    async fn execute(&self, path: &str, builder: RequestBuilder) -> Result<Response, RestError> {
        let response = builder.send().await.map_err(|error| RestError::Transport {
            path: path.to_owned(),
            message: error.to_string(),
        })?;
        let status = response.status();
        debug!(path, status = status.as_u16(), "platform api call");
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(RestError::Status { path: path.to_owned(), status: status.as_u16(), body })
    }

    /// Like `execute` but a 404 becomes `None`.
    async fn fetch<T>(&self, path: &str) -> Result<Option<T>, RestError>
    where
        T: for<'de> Deserialize<'de>,
    {
        match self.execute(path, self.request(Method::GET, path)).await {
            Ok(response) => decode(path, response).await.map(Some),
            Err(RestError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    pub async fn post_message(
        &self,
        channel_id: &ChannelId,
        payload: &Value,
    ) -> Result<(), RestError> {
        let path = format!("/channels/{channel_id}/messages");
        self.execute(&path, self.request(Method::POST, &path).json(payload)).await.map(drop)
    }

    async fn open_direct_channel(&self, user_id: &UserId) -> Result<ChannelId, RestError> {
        let path = "/users/@me/channels";
        let builder = self.request(Method::POST, path).json(&json!({ "recipient_id": user_id.0 }));
        let channel: IdPayload = decode(path, self.execute(path, builder).await?).await?;
        Ok(ChannelId(channel.id))
    }

    async fn bot_user_id(&self) -> Result<&UserId, RestError> {
        self.bot_user_id
            .get_or_try_init(|| async {
                let path = "/users/@me";
                let me: UserPayload =
                    decode(path, self.execute(path, self.request(Method::GET, path)).await?)
                        .await?;
                Ok(UserId(me.id))
            })
            .await
    }

    /// Installs the `/close` command on the guild, replacing whatever guild
    /// commands the application had.
    pub async fn register_commands(&self, guild_id: &GuildId) -> Result<(), RestError> {
        let application_id = self.bot_user_id().await?.clone();
        let path = format!("/applications/{application_id}/guilds/{guild_id}/commands");
        let builder = self.request(Method::PUT, &path).json(&guild_commands());
        self.execute(&path, builder).await.map(drop)
    }

    async fn member(
        &self,
        guild_id: &GuildId,
        user_id: &UserId,
    ) -> Result<Option<MemberPayload>, RestError> {
        self.fetch(&format!("/guilds/{guild_id}/members/{user_id}")).await
    }
}

async fn decode<T>(path: &str, response: Response) -> Result<T, RestError>
where
    T: for<'de> Deserialize<'de>,
{
    response
        .json::<T>()
        .await
        .map_err(|error| RestError::Decode { path: path.to_owned(), message: error.to_string() })
}

fn guild_commands() -> Value {
    json!([{
        "name": CLOSE_COMMAND,
        "description": "Close this support ticket",
        "options": [{
            "name": CLOSE_NOTES_OPTION,
            "description": "Summary of how this ticket was resolved",
            "type": STRING_OPTION,
            "required": false,
        }],
    }])
}

/// Hidden from everyone, visible to the requester, the bot and staff.
fn private_channel_payload(spec: &PrivateChannelSpec, bot_user_id: &UserId) -> Value {
    let mut overwrites = vec![
        json!({ "id": spec.guild_id.0, "type": OVERWRITE_ROLE, "deny": VIEW_CHANNEL.to_string() }),
        member_overwrite(&spec.requester),
        member_overwrite(bot_user_id),
    ];
    if let Some(RoleId(staff_role)) = &spec.staff_role_id {
        overwrites.push(json!({
            "id": staff_role,
            "type": OVERWRITE_ROLE,
            "allow": TICKET_MEMBER_PERMISSIONS.to_string(),
        }));
    }

    let mut payload = json!({
        "name": spec.name,
        "type": GUILD_TEXT_CHANNEL,
        "permission_overwrites": overwrites,
    });
    if let Some(parent_id) = &spec.parent_id {
        payload["parent_id"] = json!(parent_id.0);
    }
    payload
}

fn member_overwrite(user_id: &UserId) -> Value {
    json!({
        "id": user_id.0,
        "type": OVERWRITE_MEMBER,
        "allow": TICKET_MEMBER_PERMISSIONS.to_string(),
    })
}

fn member_display_name(username: &str, nickname: Option<&str>) -> String {
    match nickname {
        Some(nickname) if nickname != username => format!("{username} ({nickname})"),
        _ => username.to_owned(),
    }
}

#[async_trait]
impl Messenger for RestClient {
    async fn send(&self, target: &MessageTarget, notice: &Notice) -> Result<(), CollaboratorError> {
        let channel_id = match target {
            MessageTarget::Channel(channel_id) => channel_id.clone(),
            MessageTarget::User(user_id) => self
                .open_direct_channel(user_id)
                .await
                .map_err(|error| CollaboratorError::Delivery(error.to_string()))?,
        };
        let payload = render_notice(notice).to_message_payload();
        self.post_message(&channel_id, &payload)
            .await
            .map_err(|error| CollaboratorError::Delivery(error.to_string()))
    }
}

#[async_trait]
impl Directory for RestClient {
    async fn has_role(
        &self,
        guild_id: &GuildId,
        user_id: &UserId,
        role_id: &RoleId,
    ) -> Result<bool, CollaboratorError> {
        let member = self
            .member(guild_id, user_id)
            .await
            .map_err(|error| CollaboratorError::Lookup(error.to_string()))?;
        Ok(member.is_some_and(|member| member.roles.iter().any(|role| *role == role_id.0)))
    }

    async fn display_name(
        &self,
        guild_id: Option<&GuildId>,
        user_id: &UserId,
    ) -> Result<Option<String>, CollaboratorError> {
        let lookup = |error: RestError| CollaboratorError::Lookup(error.to_string());

        if let Some(guild_id) = guild_id {
            if let Some(MemberPayload { user: Some(user), nick, .. }) =
                self.member(guild_id, user_id).await.map_err(lookup)?
            {
                let nickname = nick.or(user.global_name);
                return Ok(Some(member_display_name(&user.username, nickname.as_deref())));
            }
        }

        let user: Option<UserPayload> =
            self.fetch(&format!("/users/{user_id}")).await.map_err(lookup)?;
        Ok(user.map(|user| member_display_name(&user.username, user.global_name.as_deref())))
    }
}

#[async_trait]
impl ChannelLifecycle for RestClient {
    async fn create_private_channel(
        &self,
        spec: &PrivateChannelSpec,
    ) -> Result<ChannelId, CollaboratorError> {
        let channel_error = |error: RestError| CollaboratorError::Channel(error.to_string());
        let bot_user_id = self.bot_user_id().await.map_err(channel_error)?;
        let path = format!("/guilds/{}/channels", spec.guild_id);
        let builder =
            self.request(Method::POST, &path).json(&private_channel_payload(spec, bot_user_id));
        let response = self.execute(&path, builder).await.map_err(channel_error)?;
        let created: IdPayload = decode(&path, response).await.map_err(channel_error)?;
        Ok(ChannelId(created.id))
    }

    async fn delete_channel(&self, channel_id: &ChannelId) -> Result<(), CollaboratorError> {
        let path = format!("/channels/{channel_id}");
        match self.execute(&path, self.request(Method::DELETE, &path)).await {
            Ok(_) => Ok(()),
            Err(RestError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Ok(())
            }
            Err(error) => Err(CollaboratorError::Channel(error.to_string())),
        }
    }
}

#[async_trait]
impl InteractionResponder for RestClient {
    async fn respond(
        &self,
        interaction: &InteractionRef,
        reply: &Reply,
    ) -> Result<(), TransportError> {
        let path = format!("/interactions/{}/{}/callback", interaction.id, interaction.token);
        let builder = self.request(Method::POST, &path).json(&reply.to_interaction_response());
        self.execute(&path, builder)
            .await
            .map(drop)
            .map_err(|error| TransportError::Respond(error.to_string()))
    }
}
