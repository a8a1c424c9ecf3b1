use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::desk::{
    DEFAULT_CHANNEL_DELETE_DELAY_SECS, DEFAULT_OPEN_COOLDOWN_SECS, DEFAULT_REVIEW_MAX_CHARS,
};
use crate::domain::platform::{ChannelId, GuildId, RoleId};
use crate::reminders::{split_channel_ids, split_messages, DEFAULT_REMINDER_THRESHOLD};

const DEFAULT_CONFIG_FILE: &str = "deskbot.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub desk: DeskConfig,
    pub reminders: RemindersConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub bot_token: SecretString,
    pub api_base_url: String,
    /// Websocket endpoint events are received from.
    pub gateway_url: String,
    pub request_timeout_secs: u64,
}

/// Identifiers and limits the ticket desk runs with. Unset identifiers disable
/// the feature that needs them (no staff role means nobody may close tickets).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeskConfig {
    pub guild_id: Option<GuildId>,
    pub staff_role_id: Option<RoleId>,
    pub ticket_parent_id: Option<ChannelId>,
    pub support_log_channel_id: Option<ChannelId>,
    pub rating_log_channel_id: Option<ChannelId>,
    pub portal_channel_id: Option<ChannelId>,
    pub team_name: String,
    pub review_max_chars: usize,
    pub open_cooldown_secs: u64,
    pub channel_delete_delay_secs: u64,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            guild_id: None,
            staff_role_id: None,
            ticket_parent_id: None,
            support_log_channel_id: None,
            rating_log_channel_id: None,
            portal_channel_id: None,
            team_name: "Support Team".to_string(),
            review_max_chars: DEFAULT_REVIEW_MAX_CHARS,
            open_cooldown_secs: DEFAULT_OPEN_COOLDOWN_SECS,
            channel_delete_delay_secs: DEFAULT_CHANNEL_DELETE_DELAY_SECS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemindersConfig {
    pub channel_ids: Vec<ChannelId>,
    pub messages: Vec<String>,
    pub threshold: u32,
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self {
            channel_ids: Vec::new(),
            messages: Vec::new(),
            threshold: DEFAULT_REMINDER_THRESHOLD,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub bot_token: Option<String>,
    pub guild_id: Option<String>,
    pub staff_role_id: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://deskbot.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            gateway: GatewayConfig {
                bot_token: String::new().into(),
                api_base_url: "https://discord.com/api/v10".to_string(),
                gateway_url: "wss://gateway.discord.gg/?v=10&encoding=json".to_string(),
                request_timeout_secs: 10,
            },
            desk: DeskConfig::default(),
            reminders: RemindersConfig::default(),
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(gateway) = patch.gateway {
            if let Some(bot_token) = gateway.bot_token {
                self.gateway.bot_token = bot_token.into();
            }
            if let Some(api_base_url) = gateway.api_base_url {
                self.gateway.api_base_url = api_base_url;
            }
            if let Some(gateway_url) = gateway.gateway_url {
                self.gateway.gateway_url = gateway_url;
            }
            if let Some(request_timeout_secs) = gateway.request_timeout_secs {
                self.gateway.request_timeout_secs = request_timeout_secs;
            }
        }

        if let Some(desk) = patch.desk {
            if let Some(guild_id) = desk.guild_id {
                self.desk.guild_id = non_blank(guild_id).map(GuildId);
            }
            if let Some(staff_role_id) = desk.staff_role_id {
                self.desk.staff_role_id = non_blank(staff_role_id).map(RoleId);
            }
            if let Some(ticket_parent_id) = desk.ticket_parent_id {
                self.desk.ticket_parent_id = non_blank(ticket_parent_id).map(ChannelId);
            }
            if let Some(support_log_channel_id) = desk.support_log_channel_id {
                self.desk.support_log_channel_id = non_blank(support_log_channel_id).map(ChannelId);
            }
            if let Some(rating_log_channel_id) = desk.rating_log_channel_id {
                self.desk.rating_log_channel_id = non_blank(rating_log_channel_id).map(ChannelId);
            }
            if let Some(portal_channel_id) = desk.portal_channel_id {
                self.desk.portal_channel_id = non_blank(portal_channel_id).map(ChannelId);
            }
            if let Some(team_name) = desk.team_name {
                self.desk.team_name = team_name;
            }
            if let Some(review_max_chars) = desk.review_max_chars {
                self.desk.review_max_chars = review_max_chars;
            }
            if let Some(open_cooldown_secs) = desk.open_cooldown_secs {
                self.desk.open_cooldown_secs = open_cooldown_secs;
            }
            if let Some(channel_delete_delay_secs) = desk.channel_delete_delay_secs {
                self.desk.channel_delete_delay_secs = channel_delete_delay_secs;
            }
        }

        if let Some(reminders) = patch.reminders {
            if let Some(channel_ids) = reminders.channel_ids {
                self.reminders.channel_ids = channel_ids
                    .into_iter()
                    .filter_map(non_blank)
                    .map(ChannelId)
                    .collect();
            }
            if let Some(messages) = reminders.messages {
                self.reminders.messages = messages;
            }
            if let Some(threshold) = reminders.threshold {
                self.reminders.threshold = threshold;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("DESKBOT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("DESKBOT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("DESKBOT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("DESKBOT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("DESKBOT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("DESKBOT_GATEWAY_BOT_TOKEN") {
            self.gateway.bot_token = value.into();
        }
        if let Some(value) = read_env("DESKBOT_GATEWAY_API_BASE_URL") {
            self.gateway.api_base_url = value;
        }
        if let Some(value) = read_env("DESKBOT_GATEWAY_URL") {
            self.gateway.gateway_url = value;
        }
        if let Some(value) = read_env("DESKBOT_GATEWAY_REQUEST_TIMEOUT_SECS") {
            self.gateway.request_timeout_secs =
                parse_u64("DESKBOT_GATEWAY_REQUEST_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("DESKBOT_DESK_GUILD_ID") {
            self.desk.guild_id = Some(GuildId(value));
        }
        if let Some(value) = read_env("DESKBOT_DESK_STAFF_ROLE_ID") {
            self.desk.staff_role_id = Some(RoleId(value));
        }
        if let Some(value) = read_env("DESKBOT_DESK_TICKET_PARENT_ID") {
            self.desk.ticket_parent_id = Some(ChannelId(value));
        }
        if let Some(value) = read_env("DESKBOT_DESK_SUPPORT_LOG_CHANNEL_ID") {
            self.desk.support_log_channel_id = Some(ChannelId(value));
        }
        if let Some(value) = read_env("DESKBOT_DESK_RATING_LOG_CHANNEL_ID") {
            self.desk.rating_log_channel_id = Some(ChannelId(value));
        }
        if let Some(value) = read_env("DESKBOT_DESK_PORTAL_CHANNEL_ID") {
            self.desk.portal_channel_id = Some(ChannelId(value));
        }
        if let Some(value) = read_env("DESKBOT_DESK_TEAM_NAME") {
            self.desk.team_name = value;
        }
        if let Some(value) = read_env("DESKBOT_DESK_REVIEW_MAX_CHARS") {
            self.desk.review_max_chars = parse_usize("DESKBOT_DESK_REVIEW_MAX_CHARS", &value)?;
        }
        if let Some(value) = read_env("DESKBOT_DESK_OPEN_COOLDOWN_SECS") {
            self.desk.open_cooldown_secs = parse_u64("DESKBOT_DESK_OPEN_COOLDOWN_SECS", &value)?;
        }
        if let Some(value) = read_env("DESKBOT_DESK_CHANNEL_DELETE_DELAY_SECS") {
            self.desk.channel_delete_delay_secs =
                parse_u64("DESKBOT_DESK_CHANNEL_DELETE_DELAY_SECS", &value)?;
        }

        if let Some(value) = read_env("DESKBOT_REMINDERS_CHANNEL_IDS") {
            self.reminders.channel_ids = split_channel_ids(&value);
        }
        if let Some(value) = read_env("DESKBOT_REMINDERS_MESSAGES") {
            self.reminders.messages = split_messages(&value);
        }
        if let Some(value) = read_env("DESKBOT_REMINDERS_THRESHOLD") {
            self.reminders.threshold = parse_u32("DESKBOT_REMINDERS_THRESHOLD", &value)?;
        }

        if let Some(value) = read_env("DESKBOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("DESKBOT_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("DESKBOT_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("DESKBOT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("DESKBOT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("DESKBOT_LOGGING_LEVEL").or_else(|| read_env("DESKBOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("DESKBOT_LOGGING_FORMAT").or_else(|| read_env("DESKBOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bot_token) = overrides.bot_token {
            self.gateway.bot_token = bot_token.into();
        }
        if let Some(guild_id) = overrides.guild_id {
            self.desk.guild_id = non_blank(guild_id).map(GuildId);
        }
        if let Some(staff_role_id) = overrides.staff_role_id {
            self.desk.staff_role_id = non_blank(staff_role_id).map(RoleId);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_gateway(&self.gateway)?;
        validate_desk(&self.desk)?;
        validate_reminders(&self.reminders)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config/deskbot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_gateway(gateway: &GatewayConfig) -> Result<(), ConfigError> {
    if gateway.bot_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "gateway.bot_token is required (set DESKBOT_GATEWAY_BOT_TOKEN or [gateway].bot_token)"
                .to_string(),
        ));
    }

    let base_url = gateway.api_base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "gateway.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    let gateway_url = gateway.gateway_url.trim();
    if !gateway_url.starts_with("ws://") && !gateway_url.starts_with("wss://") {
        return Err(ConfigError::Validation(
            "gateway.gateway_url must start with ws:// or wss://".to_string(),
        ));
    }

    if gateway.request_timeout_secs == 0 || gateway.request_timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "gateway.request_timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    Ok(())
}

fn validate_desk(desk: &DeskConfig) -> Result<(), ConfigError> {
    if desk.team_name.trim().is_empty() {
        return Err(ConfigError::Validation("desk.team_name must not be empty".to_string()));
    }

    if desk.review_max_chars == 0 || desk.review_max_chars > 2000 {
        return Err(ConfigError::Validation(
            "desk.review_max_chars must be in range 1..=2000".to_string(),
        ));
    }

    if desk.open_cooldown_secs > 3600 {
        return Err(ConfigError::Validation(
            "desk.open_cooldown_secs must not exceed 3600".to_string(),
        ));
    }

    if desk.channel_delete_delay_secs > 3600 {
        return Err(ConfigError::Validation(
            "desk.channel_delete_delay_secs must not exceed 3600".to_string(),
        ));
    }

    Ok(())
}

fn validate_reminders(reminders: &RemindersConfig) -> Result<(), ConfigError> {
    if reminders.threshold == 0 {
        return Err(ConfigError::Validation(
            "reminders.threshold must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse::<usize>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    gateway: Option<GatewayPatch>,
    desk: Option<DeskPatch>,
    reminders: Option<RemindersPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayPatch {
    bot_token: Option<String>,
    api_base_url: Option<String>,
    gateway_url: Option<String>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DeskPatch {
    guild_id: Option<String>,
    staff_role_id: Option<String>,
    ticket_parent_id: Option<String>,
    support_log_channel_id: Option<String>,
    rating_log_channel_id: Option<String>,
    portal_channel_id: Option<String>,
    team_name: Option<String>,
    review_max_chars: Option<usize>,
    open_cooldown_secs: Option<u64>,
    channel_delete_delay_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RemindersPatch {
    channel_ids: Option<Vec<String>>,
    messages: Option<Vec<String>>,
    threshold: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
    use crate::domain::platform::{ChannelId, GuildId, RoleId};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_DESKBOT_TOKEN", "token-from-env");
        env::set_var("TEST_DESKBOT_STAFF_ROLE", "R-staff");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("deskbot.toml");
            fs::write(
                &path,
                r#"
[gateway]
bot_token = "${TEST_DESKBOT_TOKEN}"

[desk]
staff_role_id = "${TEST_DESKBOT_STAFF_ROLE}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.gateway.bot_token.expose_secret() == "token-from-env",
                "bot token should be interpolated from environment",
            )?;
            ensure(
                config.desk.staff_role_id == Some(RoleId("R-staff".to_string())),
                "staff role should be interpolated from environment",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_DESKBOT_TOKEN", "TEST_DESKBOT_STAFF_ROLE"]);
        result
    }

    #[test]
    fn desk_and_reminder_sections_load_from_file() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DESKBOT_GATEWAY_BOT_TOKEN", "token");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("deskbot.toml");
            fs::write(
                &path,
                r#"
[desk]
guild_id = "G-1"
portal_channel_id = "C-portal"
rating_log_channel_id = ""
team_name = "HYPED Support Team"
review_max_chars = 150

[reminders]
channel_ids = ["C-general", " "]
messages = ["Be kind."]
threshold = 5
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.desk.guild_id == Some(GuildId("G-1".to_string())), "guild id from file")?;
            ensure(
                config.desk.portal_channel_id == Some(ChannelId("C-portal".to_string())),
                "portal channel from file",
            )?;
            ensure(config.desk.rating_log_channel_id.is_none(), "blank ids are treated as unset")?;
            ensure(config.desk.review_max_chars == 150, "review cap from file")?;
            ensure(config.desk.open_cooldown_secs == 20, "cooldown keeps its default")?;
            ensure(config.desk.channel_delete_delay_secs == 10, "delete delay keeps its default")?;
            ensure(
                config.reminders.channel_ids == vec![ChannelId("C-general".to_string())],
                "blank reminder channels are dropped",
            )?;
            ensure(config.reminders.threshold == 5, "reminder threshold from file")?;
            Ok(())
        })();

        clear_vars(&["DESKBOT_GATEWAY_BOT_TOKEN"]);
        result
    }

    #[test]
    fn reminder_env_lists_are_split() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DESKBOT_GATEWAY_BOT_TOKEN", "token");
        env::set_var("DESKBOT_REMINDERS_CHANNEL_IDS", "C-1,C-2");
        env::set_var("DESKBOT_REMINDERS_MESSAGES", "first, with comma||second");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.reminders.channel_ids.len() == 2, "two reminder channels")?;
            ensure(
                config.reminders.messages
                    == vec!["first, with comma".to_string(), "second".to_string()],
                "messages split on || only",
            )?;
            ensure(config.reminders.threshold == 20, "default threshold is 20")?;
            Ok(())
        })();

        clear_vars(&[
            "DESKBOT_GATEWAY_BOT_TOKEN",
            "DESKBOT_REMINDERS_CHANNEL_IDS",
            "DESKBOT_REMINDERS_MESSAGES",
        ]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DESKBOT_GATEWAY_BOT_TOKEN", "token");
        env::set_var("DESKBOT_LOG_LEVEL", "warn");
        env::set_var("DESKBOT_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["DESKBOT_GATEWAY_BOT_TOKEN", "DESKBOT_LOG_LEVEL", "DESKBOT_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DESKBOT_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("DESKBOT_GATEWAY_BOT_TOKEN", "token-from-env");
        env::set_var("DESKBOT_DESK_STAFF_ROLE_ID", "R-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("deskbot.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[gateway]
bot_token = "token-from-file"

[desk]
staff_role_id = "R-file"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    staff_role_id: Some("R-override".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.gateway.bot_token.expose_secret() == "token-from-env",
                "env bot token should win over file and defaults",
            )?;
            ensure(
                config.desk.staff_role_id == Some(RoleId("R-override".to_string())),
                "override staff role should win over env and file",
            )?;
            Ok(())
        })();

        clear_vars(&[
            "DESKBOT_DATABASE_URL",
            "DESKBOT_GATEWAY_BOT_TOKEN",
            "DESKBOT_DESK_STAFF_ROLE_ID",
        ]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        clear_vars(&["DESKBOT_GATEWAY_BOT_TOKEN"]);

        let error = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => {
                return Err("expected validation failure but config load succeeded".to_string())
            }
            Err(error) => error,
        };
        let has_message = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("gateway.bot_token")
        );
        ensure(has_message, "validation failure should mention gateway.bot_token")
    }

    #[test]
    fn invalid_numeric_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DESKBOT_GATEWAY_BOT_TOKEN", "token");
        env::set_var("DESKBOT_DESK_REVIEW_MAX_CHARS", "two hundred");

        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected invalid override error".to_string()),
            Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                ensure(key == "DESKBOT_DESK_REVIEW_MAX_CHARS", "error should name the variable")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
        };

        clear_vars(&["DESKBOT_GATEWAY_BOT_TOKEN", "DESKBOT_DESK_REVIEW_MAX_CHARS"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DESKBOT_GATEWAY_BOT_TOKEN", "bot-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("bot-secret-value"), "debug output should not contain token")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["DESKBOT_GATEWAY_BOT_TOKEN"]);
        result
    }
}
