use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use fabmarket_cli::commands::{config, migrate, price, seed};
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("FABMARKET_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["message"], "applied pending migrations");
    });
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("FABMARKET_DATABASE_URL", "postgres://localhost/fabmarket")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_lists_every_demo_record() {
    with_env(&[("FABMARKET_DATABASE_URL", "sqlite::memory:")], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected seed success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().unwrap_or("");
        for id in ["cust-demo-001", "mfr-demo-001", "mfr-demo-002", "design-demo-001", "quote-demo-001"]
        {
            assert!(message.contains(&format!("  - {id}")), "missing {id} in {message}");
        }
        assert!(message.contains("0 already present"));
    });
}

#[test]
fn seed_is_idempotent_against_a_persistent_database() {
    let database = TempDatabase::new("seed");
    with_env(&[("FABMARKET_DATABASE_URL", database.url.as_str())], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");
        let first_payload = parse_payload(&first.output);
        assert!(first_payload["message"].as_str().unwrap_or("").contains("0 already present"));

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");
        let second_payload = parse_payload(&second.output);
        let second_message = second_payload["message"].as_str().unwrap_or("");
        assert!(second_message.contains("(0 created"), "{second_message}");
    });
}

#[test]
fn price_reports_outcome_for_seeded_records() {
    let database = TempDatabase::new("price");
    with_env(&[("FABMARKET_DATABASE_URL", database.url.as_str())], || {
        assert_eq!(seed::run().exit_code, 0);

        let result = price::run("design-demo-001", "mfr-demo-001");
        assert_eq!(result.exit_code, 0, "expected pricing success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "price");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["data"]["price"], "24.53");
        assert_eq!(payload["data"]["estimated_lead_time_days"], 10);
        assert_eq!(payload["data"]["errors"], Value::Array(Vec::new()));
    });
}

#[test]
fn price_reports_engine_errors_for_unpriceable_design() {
    let database = TempDatabase::new("unpriceable");
    with_env(&[("FABMARKET_DATABASE_URL", database.url.as_str())], || {
        assert_eq!(seed::run().exit_code, 0);

        let result = price::run("design-demo-002", "mfr-demo-001");
        assert_eq!(result.exit_code, 6);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "not_quotable");
        assert!(payload["data"]["errors"].as_array().is_some_and(|errors| !errors.is_empty()));
    });
}

#[test]
fn price_returns_not_found_for_unknown_design() {
    with_env(&[("FABMARKET_DATABASE_URL", "sqlite::memory:")], || {
        let result = price::run("design-missing", "mfr-demo-001");
        assert_eq!(result.exit_code, 7);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "price");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "not_found");
    });
}

#[test]
fn config_attributes_env_overrides() {
    with_env(
        &[("FABMARKET_DATABASE_URL", "sqlite::memory:"), ("FABMARKET_LOG_LEVEL", "debug")],
        || {
            let result = config::run();
            assert_eq!(result.exit_code, 0);

            let payload = parse_payload(&result.output);
            let message = payload["message"].as_str().unwrap_or("");
            assert!(message
                .contains("- database.url = sqlite::memory: (source: env (FABMARKET_DATABASE_URL))"));
            assert!(message.contains("- logging.level = debug (source: env (FABMARKET_LOG_LEVEL))"));
            assert!(message.contains("- server.graceful_shutdown_secs = "));
        },
    );
}

#[test]
fn config_reports_validation_failure() {
    with_env(&[("FABMARKET_LOGGING_LEVEL", "verbose")], || {
        let result = config::run();
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "config");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

struct TempDatabase {
    path: PathBuf,
    url: String,
}

impl TempDatabase {
    fn new(label: &str) -> Self {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or(0);
        let path = env::temp_dir()
            .join(format!("fabmarket-cli-{label}-{}-{nanos}.db", std::process::id()));
        let url = format!("sqlite://{}?mode=rwc", path.display());
        Self { path, url }
    }
}

impl Drop for TempDatabase {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = fs::remove_file(format!("{}{suffix}", self.path.display()));
        }
    }
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "FABMARKET_DATABASE_URL",
        "FABMARKET_DATABASE_MAX_CONNECTIONS",
        "FABMARKET_DATABASE_TIMEOUT_SECS",
        "FABMARKET_SERVER_BIND_ADDRESS",
        "FABMARKET_SERVER_PORT",
        "FABMARKET_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "FABMARKET_LOGGING_LEVEL",
        "FABMARKET_LOGGING_FORMAT",
        "FABMARKET_LOG_LEVEL",
        "FABMARKET_LOG_FORMAT",
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
