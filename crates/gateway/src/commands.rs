use thiserror::Error;

use deskbot_core::domain::ticket::{TicketCategory, TicketId};

pub const CLOSE_COMMAND: &str = "close";
pub const CLOSE_NOTES_OPTION: &str = "notes";
pub const SETUP_PANEL_COMMAND: &str = "!setupSupportPanel";

pub const OPEN_TICKET_ID: &str = "support_open_ticket";
pub const CATEGORY_PREFIX: &str = "support_category:";
pub const TICKET_FORM_PREFIX: &str = "support_modal:";
pub const CLOSE_FORM_ID: &str = "close_modal";
pub const REVIEW_SUBMIT_PREFIX: &str = "review_submit:";
pub const REVIEW_NOT_READY_PREFIX: &str = "review_not_ready:";

pub const TICKET_DESCRIPTION_FIELD: &str = "ticket_description";
pub const CLOSE_NOTES_FIELD: &str = "close_notes";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlashCommandPayload {
    pub name: String,
    pub options: Vec<(String, String)>,
}

impl SlashCommandPayload {
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlashCommand {
    Close { notes: Option<String> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TextCommand {
    SetupSupportPanel,
}

/// Custom ids carried by buttons and forms. The category and ticket suffixes
/// are parsed here but validated by the desk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ComponentId {
    OpenTicket,
    Category(String),
    TicketForm(String),
    CloseForm,
    ReviewSubmit(TicketId),
    ReviewNotReady(TicketId),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("unsupported slash command: /{0}")]
    UnsupportedCommand(String),
    #[error("unknown component id `{0}`")]
    UnknownComponent(String),
    #[error("component `{0}` carries an invalid ticket id")]
    InvalidTicketId(String),
}

pub fn parse_slash_command(
    payload: &SlashCommandPayload,
) -> Result<SlashCommand, CommandParseError> {
    match payload.name.as_str() {
        CLOSE_COMMAND => Ok(SlashCommand::Close {
            notes: payload.option(CLOSE_NOTES_OPTION).map(str::to_owned),
        }),
        other => Err(CommandParseError::UnsupportedCommand(other.to_owned())),
    }
}

/// Text commands must be the whole message, surrounding whitespace aside.
pub fn parse_text_command(content: &str) -> Option<TextCommand> {
    (content.trim() == SETUP_PANEL_COMMAND).then_some(TextCommand::SetupSupportPanel)
}

impl ComponentId {
    pub fn parse(custom_id: &str) -> Result<Self, CommandParseError> {
        if custom_id == OPEN_TICKET_ID {
            return Ok(Self::OpenTicket);
        }
        if custom_id == CLOSE_FORM_ID {
            return Ok(Self::CloseForm);
        }
        if let Some(category) = custom_id.strip_prefix(CATEGORY_PREFIX) {
            return Ok(Self::Category(category.to_owned()));
        }
        if let Some(category) = custom_id.strip_prefix(TICKET_FORM_PREFIX) {
            return Ok(Self::TicketForm(category.to_owned()));
        }
        if let Some(ticket) = custom_id.strip_prefix(REVIEW_SUBMIT_PREFIX) {
            return parse_ticket_id(custom_id, ticket).map(Self::ReviewSubmit);
        }
        if let Some(ticket) = custom_id.strip_prefix(REVIEW_NOT_READY_PREFIX) {
            return parse_ticket_id(custom_id, ticket).map(Self::ReviewNotReady);
        }
        Err(CommandParseError::UnknownComponent(custom_id.to_owned()))
    }

    pub fn as_custom_id(&self) -> String {
        match self {
            Self::OpenTicket => OPEN_TICKET_ID.to_owned(),
            Self::Category(category) => format!("{CATEGORY_PREFIX}{category}"),
            Self::TicketForm(category) => format!("{TICKET_FORM_PREFIX}{category}"),
            Self::CloseForm => CLOSE_FORM_ID.to_owned(),
            Self::ReviewSubmit(ticket_id) => format!("{REVIEW_SUBMIT_PREFIX}{ticket_id}"),
            Self::ReviewNotReady(ticket_id) => format!("{REVIEW_NOT_READY_PREFIX}{ticket_id}"),
        }
    }

    pub fn category(category: TicketCategory) -> Self {
        Self::Category(category.id().to_owned())
    }

    pub fn ticket_form(category: TicketCategory) -> Self {
        Self::TicketForm(category.id().to_owned())
    }
}

fn parse_ticket_id(custom_id: &str, raw: &str) -> Result<TicketId, CommandParseError> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .map(TicketId)
        .ok_or_else(|| CommandParseError::InvalidTicketId(custom_id.to_owned()))
}
