use std::env;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use agentmart_cli::commands::{admin, config, migrate, seed};
use serde_json::Value;

fn database_url(dir: &Path) -> String {
    format!("sqlite://{}", dir.join("agentmart.db").display())
}

#[test]
fn migrate_returns_success_with_valid_env() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(dir.path());
    with_env(&[("AGENTMART_DATABASE_URL", &url)], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
        assert!(dir.path().join("agentmart.db").exists(), "database file should be created");
    });
}

#[test]
fn migrate_reports_config_failure_for_invalid_webhook_url() {
    with_env(&[("AGENTMART_LEAD_WEBHOOK_URL", "ftp://hooks.example.test")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_lists_demo_agents_and_can_be_replayed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(dir.path());
    with_env(&[("AGENTMART_DATABASE_URL", &url)], || {
        let first = seed::run(false);
        let second = seed::run(true);
        assert_eq!(first.exit_code, 0, "first seed failed: {}", first.output);
        assert_eq!(second.exit_code, 0, "replayed seed failed: {}", second.output);

        let payload = parse_payload(&first.output);
        assert_eq!(payload["command"], "seed");
        let message = payload["message"].as_str().expect("message should be a string");
        assert!(message.contains("3 agents, 4 key features"), "unexpected summary: {message}");
        assert!(message.contains("  - demo-agent-support: "));
        assert_eq!(parse_payload(&second.output)["message"], payload["message"]);
    });
}

#[test]
fn admin_rejects_invalid_input_before_touching_the_database() {
    with_env(&[("AGENTMART_DATABASE_URL", "sqlite://does/not/exist/agentmart.db")], || {
        let result = admin::run("ops@example.com", "short");
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "admin");
        assert_eq!(payload["error_class"], "invalid_input");
    });
}

#[test]
fn admin_creates_then_resets_the_same_account() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(dir.path());
    with_env(&[("AGENTMART_DATABASE_URL", &url)], || {
        let created = admin::run("Ops@Example.com", "first-passphrase");
        let reset = admin::run("ops@example.com", "second-passphrase");
        assert_eq!(created.exit_code, 0, "admin create failed: {}", created.output);
        assert_eq!(reset.exit_code, 0, "admin reset failed: {}", reset.output);

        let created = parse_payload(&created.output);
        let reset = parse_payload(&reset.output);
        assert_eq!(created["details"]["user_id"], reset["details"]["user_id"]);
    });
}

#[test]
fn config_reports_sources_and_redacts_secret() {
    with_env(
        &[
            ("AGENTMART_LEAD_WEBHOOK_SECRET", "whsec-very-secret"),
            ("AGENTMART_SERVER_PORT", "4100"),
        ],
        || {
            let result = config::run();
            assert_eq!(result.exit_code, 0, "config failed: {}", result.output);
            assert!(!result.output.contains("whsec-very-secret"), "secret leaked: {}", result.output);

            let payload = parse_payload(&result.output);
            assert_eq!(payload["details"]["effective"]["server"]["port"], 4100);
            assert_eq!(payload["details"]["effective"]["lead_webhook"]["secret"], "[redacted]");
            assert_eq!(payload["details"]["sources"]["server.port"], "env (AGENTMART_SERVER_PORT)");
            assert_eq!(payload["details"]["sources"]["auth.session_ttl_hours"], "default");
            let message = payload["message"].as_str().expect("message should be a string");
            assert!(message.contains("- lead_webhook.secret = [redacted] (source: env (AGENTMART_LEAD_WEBHOOK_SECRET))"));
        },
    );
}

#[test]
fn config_fails_on_unparseable_env_override() {
    with_env(&[("AGENTMART_AUTH_SESSION_TTL_HOURS", "forever")], || {
        let result = config::run();
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "config_validation");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid json")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let keys = [
        "AGENTMART_DATABASE_URL",
        "AGENTMART_DATABASE_MAX_CONNECTIONS",
        "AGENTMART_DATABASE_TIMEOUT_SECS",
        "AGENTMART_SERVER_BIND_ADDRESS",
        "AGENTMART_SERVER_PORT",
        "AGENTMART_SERVER_HEALTH_CHECK_PORT",
        "AGENTMART_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "AGENTMART_LEAD_WEBHOOK_URL",
        "AGENTMART_LEAD_WEBHOOK_TIMEOUT_SECS",
        "AGENTMART_LEAD_WEBHOOK_SECRET",
        "AGENTMART_AUTH_SESSION_TTL_HOURS",
        "AGENTMART_AUTH_COOKIE_SECURE",
        "AGENTMART_SITE_BRAND_NAME",
        "AGENTMART_LOGGING_LEVEL",
        "AGENTMART_LOGGING_FORMAT",
        "AGENTMART_LOG_LEVEL",
        "AGENTMART_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
