use deskbot_core::config::AppConfig;
use deskbot_db::{connect_with_settings, migrations};
use secrecy::ExposeSecret;
use serde::Serialize;

use crate::commands::migrate::pending_versions;
use crate::commands::{load_config, runtime, CommandResult, EXIT_NOT_READY};

const COMMAND: &str = "doctor";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
pub struct DoctorCheck {
    pub name: &'static str,
    pub status: CheckStatus,
    pub details: String,
}

impl DoctorCheck {
    fn new(name: &'static str, status: CheckStatus, details: impl Into<String>) -> Self {
        Self { name, status, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorReport {
    pub overall_status: CheckStatus,
    pub summary: String,
    pub checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Fail { EXIT_NOT_READY } else { 0 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            serde_json::json!({
                "overall_status": "fail",
                "summary": "doctor serialization failed",
                "error": error.to_string(),
            })
            .to_string()
        })
    } else {
        render_human(&report)
    };

    CommandResult::text(exit_code, output)
}

pub fn build_report() -> DoctorReport {
    let checks = match load_config(COMMAND) {
        Ok(config) => {
            let mut checks = vec![
                DoctorCheck::new("config_validation", CheckStatus::Pass, "configuration is valid"),
                check_bot_token(&config),
            ];
            checks.extend(check_desk_identifiers(&config));
            checks.push(check_database(&config));
            checks
        }
        Err(failure) => {
            let skipped = "skipped because configuration did not load";
            vec![
                DoctorCheck::new("config_validation", CheckStatus::Fail, failure.output),
                DoctorCheck::new("bot_token", CheckStatus::Skipped, skipped),
                DoctorCheck::new("desk_identifiers", CheckStatus::Skipped, skipped),
                DoctorCheck::new("ticket_store", CheckStatus::Skipped, skipped),
            ]
        }
    };

    let overall_status = overall(&checks);
    let summary = match overall_status {
        CheckStatus::Pass => "doctor: all readiness checks passed",
        CheckStatus::Warn => "doctor: ready, with warnings",
        _ => "doctor: one or more readiness checks failed",
    }
    .to_owned();

    DoctorReport { overall_status, summary, checks }
}

fn overall(checks: &[DoctorCheck]) -> CheckStatus {
    if checks.iter().any(|check| matches!(check.status, CheckStatus::Fail | CheckStatus::Skipped))
    {
        CheckStatus::Fail
    } else if checks.iter().any(|check| check.status == CheckStatus::Warn) {
        CheckStatus::Warn
    } else {
        CheckStatus::Pass
    }
}

fn check_bot_token(config: &AppConfig) -> DoctorCheck {
    let token = config.gateway.bot_token.expose_secret();
    if token.chars().any(char::is_whitespace) {
        return DoctorCheck::new("bot_token", CheckStatus::Fail, "token contains whitespace");
    }
    DoctorCheck::new("bot_token", CheckStatus::Pass, format!("{} characters set", token.len()))
}

/// Missing identifiers disable features rather than block startup.
fn check_desk_identifiers(config: &AppConfig) -> Vec<DoctorCheck> {
    let desk = &config.desk;
    let mut missing = Vec::new();
    for (key, set) in [
        ("desk.guild_id", desk.guild_id.is_some()),
        ("desk.staff_role_id", desk.staff_role_id.is_some()),
        ("desk.portal_channel_id", desk.portal_channel_id.is_some()),
        ("desk.support_log_channel_id", desk.support_log_channel_id.is_some()),
        ("desk.rating_log_channel_id", desk.rating_log_channel_id.is_some()),
    ] {
        if !set {
            missing.push(key);
        }
    }

    let identifiers = if missing.is_empty() {
        DoctorCheck::new("desk_identifiers", CheckStatus::Pass, "all desk identifiers set")
    } else {
        DoctorCheck::new(
            "desk_identifiers",
            CheckStatus::Warn,
            format!("unset: {}", missing.join(", ")),
        )
    };

    let reminders = &config.reminders;
    let reminder_check = DoctorCheck::new(
        "reminders",
        if reminders.channel_ids.is_empty() { CheckStatus::Warn } else { CheckStatus::Pass },
        format!(
            "{} channel(s), every {} message(s)",
            reminders.channel_ids.len(),
            reminders.threshold
        ),
    );

    vec![identifiers, reminder_check]
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    let runtime = match runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(failure) => return DoctorCheck::new("ticket_store", CheckStatus::Fail, failure.output),
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;
        let applied = migrations::applied_versions(&pool)
            .await
            .map_err(|error| format!("failed to read migration history: {error}"))?;
        pool.close().await;
        Ok::<_, String>(pending_versions(&applied, &migrations::known_versions()))
    });

    match result {
        Ok(pending) if pending.is_empty() => {
            DoctorCheck::new("ticket_store", CheckStatus::Pass, "schema up to date")
        }
        Ok(pending) => DoctorCheck::new(
            "ticket_store",
            CheckStatus::Warn,
            format!("{} pending migration(s); run `deskbot migrate`", pending.len()),
        ),
        Err(error) => DoctorCheck::new("ticket_store", CheckStatus::Fail, error),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];
    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::{overall, render_human, CheckStatus, DoctorCheck, DoctorReport};

    #[test]
    fn warnings_do_not_fail_the_report() {
        let checks = vec![
            DoctorCheck::new("config_validation", CheckStatus::Pass, "ok"),
            DoctorCheck::new("reminders", CheckStatus::Warn, "0 channel(s)"),
        ];
        assert_eq!(overall(&checks), CheckStatus::Warn);
    }

    #[test]
    fn skipped_checks_fail_the_report() {
        let checks = vec![DoctorCheck::new("ticket_store", CheckStatus::Skipped, "skipped")];
        assert_eq!(overall(&checks), CheckStatus::Fail);
    }

    #[test]
    fn human_rendering_marks_each_check() {
        let report = DoctorReport {
            overall_status: CheckStatus::Warn,
            summary: "doctor: ready, with warnings".to_owned(),
            checks: vec![DoctorCheck::new("reminders", CheckStatus::Warn, "0 channel(s)")],
        };
        assert_eq!(
            render_human(&report),
            "doctor: ready, with warnings\n- [warn] reminders: 0 channel(s)"
        );
    }
}
