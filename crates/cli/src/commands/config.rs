use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use deskbot_core::config::AppConfig;
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::{load_config, CommandResult};

const CONFIG_FILE_CANDIDATES: [&str; 2] = ["deskbot.toml", "config/deskbot.toml"];

/// One reported setting: dotted key, env override and rendered value.
struct Field {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

impl Field {
    fn new(key: &'static str, env_keys: &'static [&'static str], value: impl Into<String>) -> Self {
        Self { key, env_keys, value: value.into() }
    }
}

pub fn run() -> CommandResult {
    let config = match load_config("config") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let file_path = detect_config_path();
    let file_doc = file_path.as_deref().and_then(load_config_file_doc);

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_owned()];
    for field in fields(&config) {
        let source = field_source(&field, file_doc.as_ref(), file_path.as_deref());
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }

    CommandResult::text(0, lines.join("\n"))
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let desk = &config.desk;
    let reminders = &config.reminders;
    vec![
        Field::new("database.url", &["DESKBOT_DATABASE_URL"], &config.database.url),
        Field::new(
            "database.max_connections",
            &["DESKBOT_DATABASE_MAX_CONNECTIONS"],
            config.database.max_connections.to_string(),
        ),
        Field::new(
            "gateway.bot_token",
            &["DESKBOT_GATEWAY_BOT_TOKEN"],
            redact_token(config.gateway.bot_token.expose_secret()),
        ),
        Field::new(
            "gateway.api_base_url",
            &["DESKBOT_GATEWAY_API_BASE_URL"],
            &config.gateway.api_base_url,
        ),
        Field::new("gateway.gateway_url", &["DESKBOT_GATEWAY_URL"], &config.gateway.gateway_url),
        Field::new("desk.guild_id", &["DESKBOT_DESK_GUILD_ID"], optional(&desk.guild_id)),
        Field::new(
            "desk.staff_role_id",
            &["DESKBOT_DESK_STAFF_ROLE_ID"],
            optional(&desk.staff_role_id),
        ),
        Field::new(
            "desk.ticket_parent_id",
            &["DESKBOT_DESK_TICKET_PARENT_ID"],
            optional(&desk.ticket_parent_id),
        ),
        Field::new(
            "desk.support_log_channel_id",
            &["DESKBOT_DESK_SUPPORT_LOG_CHANNEL_ID"],
            optional(&desk.support_log_channel_id),
        ),
        Field::new(
            "desk.rating_log_channel_id",
            &["DESKBOT_DESK_RATING_LOG_CHANNEL_ID"],
            optional(&desk.rating_log_channel_id),
        ),
        Field::new(
            "desk.portal_channel_id",
            &["DESKBOT_DESK_PORTAL_CHANNEL_ID"],
            optional(&desk.portal_channel_id),
        ),
        Field::new("desk.team_name", &["DESKBOT_DESK_TEAM_NAME"], &desk.team_name),
        Field::new(
            "desk.review_max_chars",
            &["DESKBOT_DESK_REVIEW_MAX_CHARS"],
            desk.review_max_chars.to_string(),
        ),
        Field::new(
            "desk.open_cooldown_secs",
            &["DESKBOT_DESK_OPEN_COOLDOWN_SECS"],
            desk.open_cooldown_secs.to_string(),
        ),
        Field::new(
            "desk.channel_delete_delay_secs",
            &["DESKBOT_DESK_CHANNEL_DELETE_DELAY_SECS"],
            desk.channel_delete_delay_secs.to_string(),
        ),
        Field::new(
            "reminders.channel_ids",
            &["DESKBOT_REMINDERS_CHANNEL_IDS"],
            reminders.channel_ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(","),
        ),
        Field::new(
            "reminders.threshold",
            &["DESKBOT_REMINDERS_THRESHOLD"],
            reminders.threshold.to_string(),
        ),
        Field::new(
            "server.health_check_port",
            &["DESKBOT_SERVER_HEALTH_CHECK_PORT"],
            config.server.health_check_port.to_string(),
        ),
        Field::new(
            "logging.level",
            &["DESKBOT_LOGGING_LEVEL", "DESKBOT_LOG_LEVEL"],
            &config.logging.level,
        ),
        Field::new(
            "logging.format",
            &["DESKBOT_LOGGING_FORMAT", "DESKBOT_LOG_FORMAT"],
            format!("{:?}", config.logging.format),
        ),
    ]
}

fn optional<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_else(|| "<unset>".to_owned())
}

fn detect_config_path() -> Option<PathBuf> {
    CONFIG_FILE_CANDIDATES.iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: &Path) -> Option<Value> {
    fs::read_to_string(path).ok()?.parse::<Value>().ok()
}

fn field_source(field: &Field, file_doc: Option<&Value>, file_path: Option<&Path>) -> String {
    if let Some(env_key) = field.env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    match (file_doc, file_path) {
        (Some(doc), Some(path)) if contains_path(doc, field.key) => {
            format!("file ({})", path.display())
        }
        _ => "default".to_owned(),
    }
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    key_path.split('.').try_fold(root, |current, key| current.get(key)).is_some()
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    match trimmed.chars().count() {
        0 => "<empty>".to_owned(),
        count if count <= 8 => "<redacted>".to_owned(),
        _ => format!("{}***", trimmed.chars().take(4).collect::<String>()),
    }
}
