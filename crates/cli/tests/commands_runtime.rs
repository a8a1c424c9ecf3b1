use std::env;
use std::sync::{Mutex, OnceLock};

use deskbot_cli::commands::{config, doctor, migrate};
use serde_json::Value;

const VALID_ENV: &[(&str, &str)] = &[
    ("DESKBOT_GATEWAY_BOT_TOKEN", "bot-token-for-tests"),
    ("DESKBOT_DATABASE_URL", "sqlite::memory:"),
];

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(VALID_ENV, || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["message"], "applied 3 pending migration(s)");
    });
}

#[test]
fn migrate_returns_config_failure_without_a_token() {
    with_env(&[("DESKBOT_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
        assert!(payload["message"].as_str().unwrap_or_default().contains("gateway.bot_token"));
    });
}

#[test]
fn migrate_status_reports_pending_versions_on_a_fresh_database() {
    with_env(VALID_ENV, || {
        let result = migrate::status();
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["message"], "applied=0 pending=3 [1, 2, 3]");
    });
}

#[test]
fn doctor_json_reports_each_check() {
    with_env(VALID_ENV, || {
        let result = doctor::run(true);
        let payload = parse_payload(&result.output);

        let names: Vec<&str> = payload["checks"]
            .as_array()
            .expect("checks array")
            .iter()
            .filter_map(|check| check["name"].as_str())
            .collect();
        assert_eq!(
            names,
            vec!["config_validation", "bot_token", "desk_identifiers", "reminders", "ticket_store"]
        );
        assert_eq!(payload["overall_status"], "warn");
        assert_eq!(result.exit_code, 0);
    });
}

#[test]
fn doctor_fails_when_configuration_does_not_load() {
    with_env(&[], || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, 6);
        assert!(result.output.starts_with("doctor: one or more readiness checks failed"));
        assert!(result.output.contains("- [skip] ticket_store"));
    });
}

#[test]
fn config_attributes_env_sources_and_redacts_the_token() {
    with_env(
        &[
            ("DESKBOT_GATEWAY_BOT_TOKEN", "MTA4ODk.abcdef.secret"),
            ("DESKBOT_DATABASE_URL", "sqlite::memory:"),
            ("DESKBOT_DESK_TEAM_NAME", "Moderation Team"),
        ],
        || {
            let result = config::run();
            assert_eq!(result.exit_code, 0);
            let lines: Vec<&str> = result.output.lines().collect();
            assert!(lines.contains(
                &"- gateway.bot_token = MTA4*** (source: env (DESKBOT_GATEWAY_BOT_TOKEN))"
            ));
            assert!(lines.contains(
                &"- desk.team_name = Moderation Team (source: env (DESKBOT_DESK_TEAM_NAME))"
            ));
            assert!(result.output.contains("- desk.guild_id = <unset> (source: default)"));
            assert!(!result.output.contains("secret"));
        },
    );
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let previous_values: Vec<(String, String)> =
        env::vars().filter(|(key, _)| key.starts_with("DESKBOT_")).collect();

    for (key, _) in &previous_values {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, _) in vars {
        env::remove_var(key);
    }
    for (key, value) in previous_values {
        env::set_var(key, value);
    }
}
