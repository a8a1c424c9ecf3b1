//! Ticket lifecycle controller and the contracts it drives.

pub mod collaborators;
pub mod cooldown;
pub mod lifecycle;
pub mod review;
pub mod store;

pub use collaborators::{
    ChannelLifecycle, CollaboratorError, Directory, MessageTarget, Messenger, Notice,
    PrivateChannelSpec,
};
pub use cooldown::CooldownTracker;
pub use lifecycle::{
    CloseOutcome, CloseRequest, DeskCollaborators, OpenTicketRequest, PanelOutcome,
    PanelRequest, SupportDesk,
};
pub use review::{
    DirectMessage, ReviewAction, ReviewActionOutcome, ReviewActionRequest, ReviewInputOutcome,
};
pub use store::{StoreError, TicketStore};

pub const DEFAULT_REVIEW_MAX_CHARS: usize = 200;
pub const DEFAULT_OPEN_COOLDOWN_SECS: u64 = 20;
pub const DEFAULT_CHANNEL_DELETE_DELAY_SECS: u64 = 10;

const CHANNEL_PREFIX: &str = "support-";
const CHANNEL_BASE_MAX_CHARS: usize = 80;

/// `support-<username>` with the username lowercased, anything outside
/// `[a-z0-9-_]` replaced by `-`, and the username part capped at 80 characters.
pub fn ticket_channel_name(username: &str) -> String {
    let base: String = username
        .to_lowercase()
        .chars()
        .map(|ch| match ch {
            'a'..='z' | '0'..='9' | '-' | '_' => ch,
            _ => '-',
        })
        .take(CHANNEL_BASE_MAX_CHARS)
        .collect();
    format!("{CHANNEL_PREFIX}{base}")
}

#[cfg(test)]
mod tests {
    use super::ticket_channel_name;

    #[test]
    fn channel_names_are_sanitized() {
        assert_eq!(ticket_channel_name("Alice.B"), "support-alice-b");
        assert_eq!(ticket_channel_name("dev_ops-42"), "support-dev_ops-42");
        assert_eq!(ticket_channel_name("Zoë"), "support-zo-");
    }

    #[test]
    fn long_usernames_are_truncated() {
        let name = ticket_channel_name(&"x".repeat(120));
        assert_eq!(name.len(), "support-".len() + 80);
    }
}
