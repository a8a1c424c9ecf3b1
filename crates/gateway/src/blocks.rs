use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use deskbot_core::desk::Notice;
use deskbot_core::domain::platform::{ChannelId, UserId};
use deskbot_core::domain::ticket::{TicketCategory, TicketId};
use deskbot_core::errors::TicketError;

use crate::commands::{ComponentId, CLOSE_NOTES_FIELD, TICKET_DESCRIPTION_FIELD};

/// Platform hard limit for message content.
pub const MAX_CONTENT_CHARS: usize = 2000;
const MAX_BUTTONS_PER_ROW: usize = 5;
const TICKET_DESCRIPTION_MAX_CHARS: u16 = 2000;
const CLOSE_NOTES_MAX_CHARS: u16 = 1000;
const EPHEMERAL_FLAG: u64 = 1 << 6;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    Plain { text: String },
    Markdown { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn markdown(text: impl Into<String>) -> Self {
        Self::Markdown { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Plain { text } | Self::Markdown { text } => text,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Secondary,
    Danger,
}

impl ButtonStyle {
    fn code(self) -> u8 {
        match self {
            Self::Primary => 1,
            Self::Secondary => 2,
            Self::Danger => 4,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ButtonElement {
    pub custom_id: String,
    pub label: String,
    pub style: ButtonStyle,
}

impl ButtonElement {
    pub fn new(component: &ComponentId, label: impl Into<String>) -> Self {
        Self {
            custom_id: component.as_custom_id(),
            label: label.into(),
            style: ButtonStyle::Secondary,
        }
    }

    pub fn style(mut self, style: ButtonStyle) -> Self {
        self.style = style;
        self
    }

    fn to_component(&self) -> Value {
        json!({
            "type": 2,
            "style": self.style.code(),
            "label": self.label,
            "custom_id": self.custom_id,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Header { block_id: String, text: String },
    Section { block_id: String, text: TextObject },
    Actions { block_id: String, elements: Vec<ButtonElement> },
    Context { block_id: String, elements: Vec<TextObject> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

impl MessageTemplate {
    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        MessageBuilder::new(text.clone())
            .section("desk.text.v1", |section| {
                section.markdown(text);
            })
            .build()
    }

    /// Visible text, blocks joined by blank lines and capped at the content
    /// limit.
    pub fn content(&self) -> String {
        let lines: Vec<String> = self
            .blocks
            .iter()
            .filter_map(|block| match block {
                Block::Header { text, .. } => Some(format!("**{text}**")),
                Block::Section { text, .. } => Some(text.as_str().to_owned()),
                Block::Context { elements, .. } => Some(
                    elements.iter().map(TextObject::as_str).collect::<Vec<_>>().join(" · "),
                ),
                Block::Actions { .. } => None,
            })
            .collect();

        let content =
            if lines.is_empty() { self.fallback_text.clone() } else { lines.join("\n\n") };
        truncate_chars(&content, MAX_CONTENT_CHARS)
    }

    pub fn buttons(&self) -> impl Iterator<Item = &ButtonElement> {
        self.blocks
            .iter()
            .filter_map(|block| match block {
                Block::Actions { elements, .. } => Some(elements),
                _ => None,
            })
            .flatten()
    }

    pub fn to_message_payload(&self) -> Value {
        let buttons: Vec<&ButtonElement> = self.buttons().collect();
        let rows: Vec<Value> = buttons
            .chunks(MAX_BUTTONS_PER_ROW)
            .map(|row| {
                let components: Vec<Value> =
                    row.iter().map(|button| button.to_component()).collect();
                json!({ "type": 1, "components": components })
            })
            .collect();

        json!({ "content": self.content(), "components": rows })
    }
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn header(mut self, block_id: impl Into<String>, text: impl Into<String>) -> Self {
        self.blocks.push(Block::Header { block_id: block_id.into(), text: text.into() });
        self
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: block_id.into(), text: builder.build() });
        self
    }

    pub fn actions<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ActionsBuilder),
    {
        let mut builder = ActionsBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Actions { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn markdown(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::markdown(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(""))
    }
}

#[derive(Default)]
pub struct ActionsBuilder {
    elements: Vec<ButtonElement>,
}

impl ActionsBuilder {
    pub fn button(&mut self, button: ButtonElement) -> &mut Self {
        self.elements.push(button);
        self
    }

    fn build(self) -> Vec<ButtonElement> {
        self.elements
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    pub fn markdown(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::markdown(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextInputStyle {
    Short,
    Paragraph,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TextInput {
    pub custom_id: String,
    pub label: String,
    pub style: TextInputStyle,
    pub required: bool,
    pub max_length: u16,
}

/// A form shown in response to an interaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Modal {
    pub custom_id: String,
    pub title: String,
    pub inputs: Vec<TextInput>,
}

impl Modal {
    pub fn to_payload(&self) -> Value {
        let rows: Vec<Value> = self
            .inputs
            .iter()
            .map(|input| {
                json!({
                    "type": 1,
                    "components": [{
                        "type": 4,
                        "custom_id": input.custom_id,
                        "label": input.label,
                        "style": match input.style {
                            TextInputStyle::Short => 1,
                            TextInputStyle::Paragraph => 2,
                        },
                        "required": input.required,
                        "max_length": input.max_length,
                    }],
                })
            })
            .collect();
        json!({ "custom_id": self.custom_id, "title": self.title, "components": rows })
    }
}

/// Answer to an interaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Message { template: MessageTemplate, ephemeral: bool },
    Modal(Modal),
}

impl Reply {
    pub fn ephemeral(template: MessageTemplate) -> Self {
        Self::Message { template, ephemeral: true }
    }

    pub fn ephemeral_text(text: impl Into<String>) -> Self {
        Self::ephemeral(MessageTemplate::text(text))
    }

    pub fn public(template: MessageTemplate) -> Self {
        Self::Message { template, ephemeral: false }
    }

    pub fn to_interaction_response(&self) -> Value {
        match self {
            Self::Message { template, ephemeral } => {
                let mut data = template.to_message_payload();
                if *ephemeral {
                    data["flags"] = json!(EPHEMERAL_FLAG);
                }
                json!({ "type": 4, "data": data })
            }
            Self::Modal(modal) => json!({ "type": 9, "data": modal.to_payload() }),
        }
    }
}

pub fn support_panel(team_name: &str) -> MessageTemplate {
    MessageBuilder::new(format!("{team_name} Support"))
        .header("desk.panel.title.v1", format!("{team_name} Support"))
        .section("desk.panel.body.v1", |section| {
            section.markdown(format!(
                "Need help? Use the button below to open a private ticket with the {team_name}.\n\n\
                 Please only open tickets when you genuinely need assistance."
            ));
        })
        .actions("desk.panel.actions.v1", |actions| {
            actions.button(
                ButtonElement::new(&ComponentId::OpenTicket, "Open a Ticket")
                    .style(ButtonStyle::Danger),
            );
        })
        .build()
}

pub fn category_picker(team_name: &str) -> MessageTemplate {
    MessageBuilder::new("How can we help?")
        .header("desk.categories.title.v1", "How can we help?")
        .section("desk.categories.body.v1", |section| {
            section.markdown(format!(
                "{team_name} members will be with you shortly after you open your ticket.\n\n\
                 **Do not open tickets without a legitimate need for assistance. You may lose \
                 access to the support system if you abuse it.**"
            ));
        })
        .actions("desk.categories.actions.v1", |actions| {
            for category in TicketCategory::ALL {
                let style = if category.is_sensitive() {
                    ButtonStyle::Danger
                } else {
                    ButtonStyle::Secondary
                };
                actions.button(
                    ButtonElement::new(&ComponentId::category(category), category.label())
                        .style(style),
                );
            }
        })
        .build()
}

pub fn ticket_form(team_name: &str, category: TicketCategory) -> Modal {
    Modal {
        custom_id: ComponentId::ticket_form(category).as_custom_id(),
        title: truncate_chars(&format!("{team_name} Support - {}", category.label()), 45),
        inputs: vec![TextInput {
            custom_id: TICKET_DESCRIPTION_FIELD.to_owned(),
            label: "Describe your issue".to_owned(),
            style: TextInputStyle::Paragraph,
            required: true,
            max_length: TICKET_DESCRIPTION_MAX_CHARS,
        }],
    }
}

pub fn close_form() -> Modal {
    Modal {
        custom_id: ComponentId::CloseForm.as_custom_id(),
        title: "Close Ticket - Notes".to_owned(),
        inputs: vec![TextInput {
            custom_id: CLOSE_NOTES_FIELD.to_owned(),
            label: "How was this ticket resolved?".to_owned(),
            style: TextInputStyle::Paragraph,
            required: true,
            max_length: CLOSE_NOTES_MAX_CHARS,
        }],
    }
}

pub fn ticket_created(channel_id: &ChannelId) -> String {
    format!("Your ticket has been created: {}", channel_mention(channel_id))
}

pub fn ticket_closed(delay_secs: u64) -> String {
    if delay_secs == 0 {
        return "Ticket closed. This channel will be deleted shortly.".to_owned();
    }
    format!("Ticket closed. This channel will be deleted in {delay_secs} seconds.")
}

pub fn review_not_ready(max_chars: usize) -> String {
    format!(
        "No problem. When you are ready, send your edited review here. \
         Remember: {max_chars} characters maximum."
    )
}

pub const REVIEW_RECORDED: &str = "Thank you. Your feedback has been recorded.";
pub const INTERACTION_FAILED: &str =
    "Something went wrong while handling your request. Please try again later.";

pub fn render_notice(notice: &Notice) -> MessageTemplate {
    match notice {
        Notice::SupportPanel { team_name } => support_panel(team_name),
        Notice::TicketOpened { ticket_id, requester, category, description } => {
            ticket_opened(*ticket_id, requester, *category, description.as_deref())
        }
        Notice::TicketClosedLog {
            ticket_id,
            requester,
            category,
            moderator,
            resolution,
            opened_at,
            closed_at,
        } => MessageBuilder::new(format!("Ticket #{ticket_id} closed"))
            .header("desk.close_log.title.v1", format!("Ticket #{ticket_id} closed"))
            .section("desk.close_log.body.v1", |section| {
                section.markdown(
                    [
                        format!("**Category:** {}", category.label()),
                        format!("**Opened by:** {} [{requester}]", user_mention(requester)),
                        format!("**Closed by:** {} [{moderator}]", user_mention(moderator)),
                        format!("**Opened:** {}", log_time(opened_at)),
                        format!("**Closed:** {}", log_time(closed_at)),
                        String::new(),
                        "**Resolution:**".to_owned(),
                        resolution.clone(),
                    ]
                    .join("\n"),
                );
            })
            .build(),
        Notice::TicketClosedDirect { closer_name, team_name, review_max_chars } => {
            MessageTemplate::text(
                [
                    format!("Hi, this is the {team_name}."),
                    String::new(),
                    format!("Your support ticket has been closed by **{closer_name}**."),
                    String::new(),
                    format!(
                        "If you would like, reply with brief feedback about your support \
                         experience ({review_max_chars} characters maximum)."
                    ),
                    "If other staff members assisted you, you may mention them as well."
                        .to_owned(),
                ]
                .join("\n"),
            )
        }
        Notice::ReviewTooLong { max_chars } => MessageTemplate::text(format!(
            "Sorry, your review is too long. Please shorten it to {max_chars} characters or \
             less and send it again."
        )),
        Notice::ReviewDraftPrompt { ticket_id, draft } => review_draft_prompt(*ticket_id, draft),
        Notice::ReviewLog {
            reviewer, reviewer_name, closer, closer_name, review, submitted_at, ..
        } => {
            let closer_id = closer.as_ref().map_or("Unknown", |closer| closer.0.as_str());
            MessageTemplate::text(
                [
                    "```text".to_owned(),
                    format!("Time: {}", log_time(submitted_at)),
                    format!("User: {reviewer_name} [{reviewer}]"),
                    format!("Closed By: {closer_name} [{closer_id}]"),
                    String::new(),
                    "Review:".to_owned(),
                    review.clone(),
                    "```".to_owned(),
                ]
                .join("\n"),
            )
        }
        Notice::Reminder { text } | Notice::CommandRejected { text } => {
            MessageTemplate::text(text.clone())
        }
    }
}

fn ticket_opened(
    ticket_id: TicketId,
    requester: &UserId,
    category: TicketCategory,
    description: Option<&str>,
) -> MessageTemplate {
    let description = description.unwrap_or("(no description provided)");
    MessageBuilder::new(format!("Support Ticket - {}", category.label()))
        .header("desk.ticket.title.v1", format!("Support Ticket - {}", category.label()))
        .section("desk.ticket.report.v1", |section| {
            section.markdown(format!(
                "Opened by: {}\n\nInitial Report (submitted by the user):\n\
                 ```text\n{description}\n```",
                user_mention(requester)
            ));
        })
        .section("desk.ticket.guidance.v1", |section| {
            section.markdown(category.guidance());
        })
        .context("desk.ticket.context.v1", |context| {
            context.plain(format!("Ticket #{ticket_id}"));
        })
        .build()
}

fn review_draft_prompt(ticket_id: TicketId, draft: &str) -> MessageTemplate {
    MessageBuilder::new("Review draft")
        .section("desk.review.draft.v1", |section| {
            section.markdown(format!(
                "Thanks, here is the review draft I will submit:\n\n```text\n{draft}\n```\n\n\
                 Are you sure you want to submit this review?\n\
                 **Illegitimate reviews will be ignored.**"
            ));
        })
        .actions("desk.review.actions.v1", |actions| {
            actions
                .button(
                    ButtonElement::new(&ComponentId::ReviewSubmit(ticket_id), "Submit review")
                        .style(ButtonStyle::Primary),
                )
                .button(
                    ButtonElement::new(
                        &ComponentId::ReviewNotReady(ticket_id),
                        "I'm not ready yet",
                    )
                    .style(ButtonStyle::Danger),
                );
        })
        .build()
}

/// What the actor is told when the desk rejects an interaction.
pub fn ticket_error_message(error: &TicketError) -> String {
    match error {
        TicketError::PermissionDenied => {
            "You do not have permission to close support tickets.".to_owned()
        }
        TicketError::GuildOnly => "Tickets can only be created inside a server.".to_owned(),
        TicketError::DuplicateOpenTicket { channel_id } => {
            format!("You already have an open support ticket: {}", channel_mention(channel_id))
        }
        TicketError::UnknownCategory(_) => {
            "This ticket category is no longer available.".to_owned()
        }
        TicketError::NotRecognizedAsTicket => {
            "This channel is not recognized as a support ticket.".to_owned()
        }
        TicketError::StaleOrForeignReview => "This review is no longer pending.".to_owned(),
        TicketError::NoDraftToSubmit { max_chars } => format!(
            "I do not have a draft to submit. Please send your review again \
             ({max_chars} characters maximum)."
        ),
        TicketError::PanelNotConfigured => "Support panel is not configured. Ask an admin to \
             set the staff role and the support portal channel."
            .to_owned(),
        TicketError::NotPortalChannel => {
            "You must run this command in the official support portal channel.".to_owned()
        }
        TicketError::Flow(_) | TicketError::Store(_) | TicketError::Collaborator(_) => {
            INTERACTION_FAILED.to_owned()
        }
    }
}

/// Panel posting uses the generic command wording for a missing staff role.
pub fn panel_error_message(error: &TicketError) -> String {
    match error {
        TicketError::PermissionDenied => {
            "You do not have permission to run this command.".to_owned()
        }
        other => ticket_error_message(other),
    }
}

pub fn channel_mention(channel_id: &ChannelId) -> String {
    format!("<#{channel_id}>")
}

pub fn user_mention(user_id: &UserId) -> String {
    format!("<@{user_id}>")
}

fn log_time(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%SZ").to_string()
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => text[..index].to_owned(),
        None => text.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use deskbot_core::desk::Notice;
    use deskbot_core::domain::platform::{ChannelId, UserId};
    use deskbot_core::domain::ticket::{TicketCategory, TicketId};
    use deskbot_core::errors::TicketError;

    use super::{
        category_picker, close_form, panel_error_message, render_notice, support_panel,
        ticket_error_message, truncate_chars, Block, ButtonStyle, MessageTemplate, Reply,
        MAX_CONTENT_CHARS,
    };

    #[test]
    fn support_panel_has_single_open_button() {
        let panel = support_panel("Support Team");
        let buttons: Vec<_> = panel.buttons().collect();
        assert_eq!(buttons.len(), 1);
        assert_eq!(buttons[0].custom_id, "support_open_ticket");
        assert_eq!(buttons[0].style, ButtonStyle::Danger);
        assert!(panel.content().starts_with("**Support Team Support**"));
    }

    #[test]
    fn category_picker_highlights_sensitive_categories() {
        let picker = category_picker("Support Team");
        let buttons: Vec<_> = picker.buttons().collect();
        assert_eq!(buttons.len(), TicketCategory::ALL.len());
        for (button, category) in buttons.iter().zip(TicketCategory::ALL) {
            assert_eq!(button.custom_id, format!("support_category:{}", category.id()));
            let expected =
                if category.is_sensitive() { ButtonStyle::Danger } else { ButtonStyle::Secondary };
            assert_eq!(button.style, expected);
        }

        let payload = picker.to_message_payload();
        assert_eq!(payload["components"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn draft_prompt_carries_ticket_scoped_buttons() {
        let prompt = render_notice(&Notice::ReviewDraftPrompt {
            ticket_id: TicketId(12),
            draft: "great help".to_owned(),
        });
        let ids: Vec<_> = prompt.buttons().map(|button| button.custom_id.clone()).collect();
        assert_eq!(ids, vec!["review_submit:12", "review_not_ready:12"]);
        assert!(prompt.content().contains("```text\ngreat help\n```"));
        assert!(prompt.content().contains("**Illegitimate reviews will be ignored.**"));
    }

    #[test]
    fn review_log_names_closer_or_unknown() {
        let submitted_at = Utc.with_ymd_and_hms(2025, 5, 1, 8, 30, 0).unwrap();
        let notice = Notice::ReviewLog {
            ticket_id: TicketId(3),
            reviewer: UserId("U-1".to_owned()),
            reviewer_name: "alice".to_owned(),
            closer: None,
            closer_name: "Unknown".to_owned(),
            review: "quick and kind".to_owned(),
            submitted_at,
        };
        let content = render_notice(&notice).content();
        assert!(content.contains("Time: 2025-05-01 08:30:00Z"));
        assert!(content.contains("User: alice [U-1]"));
        assert!(content.contains("Closed By: Unknown [Unknown]"));
        assert!(content.ends_with("quick and kind\n```"));
    }

    #[test]
    fn closed_direct_message_names_limit_and_closer() {
        let content = render_notice(&Notice::TicketClosedDirect {
            closer_name: "mod (Mod One)".to_owned(),
            team_name: "Support Team".to_owned(),
            review_max_chars: 200,
        })
        .content();
        assert!(content.contains("closed by **mod (Mod One)**"));
        assert!(content.contains("(200 characters maximum)"));
    }

    #[test]
    fn error_messages_match_user_facing_wording() {
        let duplicate = TicketError::DuplicateOpenTicket { channel_id: ChannelId("99".to_owned()) };
        assert_eq!(
            ticket_error_message(&duplicate),
            "You already have an open support ticket: <#99>"
        );
        assert_eq!(
            ticket_error_message(&TicketError::NoDraftToSubmit { max_chars: 200 }),
            "I do not have a draft to submit. Please send your review again \
             (200 characters maximum)."
        );
        assert_eq!(
            panel_error_message(&TicketError::PermissionDenied),
            "You do not have permission to run this command."
        );
        assert_eq!(
            ticket_error_message(&TicketError::PermissionDenied),
            "You do not have permission to close support tickets."
        );
    }

    #[test]
    fn replies_render_interaction_callbacks() {
        let ephemeral = Reply::ephemeral_text("hello").to_interaction_response();
        assert_eq!(ephemeral["type"], 4);
        assert_eq!(ephemeral["data"]["flags"], 64);
        assert_eq!(ephemeral["data"]["content"], "hello");

        let modal = Reply::Modal(close_form()).to_interaction_response();
        assert_eq!(modal["type"], 9);
        assert_eq!(modal["data"]["custom_id"], "close_modal");
        assert_eq!(modal["data"]["components"][0]["components"][0]["custom_id"], "close_notes");
    }

    #[test]
    fn content_is_capped_at_platform_limit() {
        let long = MessageTemplate::text("é".repeat(MAX_CONTENT_CHARS + 50));
        assert_eq!(long.content().chars().count(), MAX_CONTENT_CHARS);
        assert_eq!(truncate_chars("abc", 5), "abc");
        assert!(matches!(long.blocks[0], Block::Section { .. }));
    }
}
