use std::collections::HashMap;
use std::sync::Mutex;

use crate::config::RemindersConfig;
use crate::domain::platform::ChannelId;

pub const DEFAULT_REMINDER_TEXT: &str = "**Reminder:** Please follow the community rules.";
pub const DEFAULT_REMINDER_THRESHOLD: u32 = 20;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReminderRule {
    pub channel_id: ChannelId,
    pub threshold: u32,
    pub text: String,
}

/// Counts human messages per watched channel and hands back the reminder text
/// each time a channel reaches its threshold.
#[derive(Debug, Default)]
pub struct ReminderBoard {
    rules: HashMap<ChannelId, ReminderRule>,
    counters: Mutex<HashMap<ChannelId, u32>>,
}

impl ReminderBoard {
    pub fn new(rules: impl IntoIterator<Item = ReminderRule>) -> Self {
        let rules = rules.into_iter().map(|rule| (rule.channel_id.clone(), rule)).collect();
        Self { rules, counters: Mutex::new(HashMap::new()) }
    }

    /// Channel `n` is paired with message `n`; channels without a message of
    /// their own get [`DEFAULT_REMINDER_TEXT`].
    pub fn from_config(config: &RemindersConfig) -> Self {
        let rules = config.channel_ids.iter().enumerate().map(|(index, channel_id)| {
            let text = config
                .messages
                .get(index)
                .map(|text| text.trim())
                .filter(|text| !text.is_empty())
                .unwrap_or(DEFAULT_REMINDER_TEXT);
            ReminderRule {
                channel_id: channel_id.clone(),
                threshold: config.threshold,
                text: text.to_owned(),
            }
        });
        Self::new(rules)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn watches(&self, channel_id: &ChannelId) -> bool {
        self.rules.contains_key(channel_id)
    }

    pub fn observe(&self, channel_id: &ChannelId) -> Option<String> {
        let rule = self.rules.get(channel_id)?;

        let mut counters = match self.counters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let count = counters.entry(channel_id.clone()).or_insert(0);
        *count += 1;

        if *count >= rule.threshold {
            *count = 0;
            return Some(rule.text.clone());
        }
        None
    }
}

/// Splits the raw `||`-separated message list used by env configuration.
pub fn split_messages(raw: &str) -> Vec<String> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    raw.split("||").map(|text| text.trim().to_owned()).collect()
}

/// Splits a comma-separated channel id list, dropping blanks.
pub fn split_channel_ids(raw: &str) -> Vec<ChannelId> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| ChannelId(id.to_owned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{
        split_channel_ids, split_messages, ReminderBoard, ReminderRule, DEFAULT_REMINDER_TEXT,
    };
    use crate::config::RemindersConfig;
    use crate::domain::platform::ChannelId;

    fn channel(id: &str) -> ChannelId {
        ChannelId(id.to_owned())
    }

    #[test]
    fn reminder_fires_at_threshold_and_resets() {
        let board = ReminderBoard::new([ReminderRule {
            channel_id: channel("C-general"),
            threshold: 3,
            text: "be kind".to_owned(),
        }]);

        assert_eq!(board.observe(&channel("C-general")), None);
        assert_eq!(board.observe(&channel("C-general")), None);
        assert_eq!(board.observe(&channel("C-general")).as_deref(), Some("be kind"));
        assert_eq!(board.observe(&channel("C-general")), None);
    }

    #[test]
    fn unwatched_channels_are_ignored() {
        let board = ReminderBoard::default();
        assert!(board.is_empty());
        assert_eq!(board.observe(&channel("C-random")), None);
    }

    #[test]
    fn config_pairs_channels_with_messages_and_falls_back_to_default_text() {
        let board = ReminderBoard::from_config(&RemindersConfig {
            channel_ids: split_channel_ids("C-1, C-2 ,,"),
            messages: split_messages("first rule || "),
            threshold: 1,
        });

        assert!(board.watches(&channel("C-1")));
        assert!(board.watches(&channel("C-2")));
        assert_eq!(board.observe(&channel("C-1")).as_deref(), Some("first rule"));
        assert_eq!(board.observe(&channel("C-2")).as_deref(), Some(DEFAULT_REMINDER_TEXT));
    }

    #[test]
    fn message_list_keeps_multiline_entries() {
        assert_eq!(split_messages("line one\nline two||second"), vec![
            "line one\nline two".to_owned(),
            "second".to_owned()
        ]);
        assert!(split_messages("  ").is_empty());
    }
}
