use countwise_core::{Store, StoredValue};
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let env = Self::without_config();

        // Port 9 (discard) is expected to refuse connections locally
        fs::write(
            env.xdg_config.join("countwise/config.toml"),
            r#"
[analytics]
default_url = "http://127.0.0.1:9/report"
platform_version = "test-os"
timeout_secs = 2
"#,
        )
        .expect("failed to write config");

        env
    }

    fn without_config() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_data).expect("failed to create XDG_DATA_HOME");
        fs::create_dir_all(xdg_config.join("countwise")).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
        }
    }

    fn store_dir(&self) -> PathBuf {
        self.xdg_data.join("countwise")
    }
}

fn run(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("countwise"));

    Command::new(bin_path)
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute countwise: {e}"))
}

fn run_ok(env: &CliTestEnv, args: &[&str]) -> String {
    let output = run(env, args);
    if !output.status.success() {
        panic!(
            "countwise {} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
            args.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn status_reports_disabled_by_default() {
    let env = CliTestEnv::new();

    let stdout = run_ok(&env, &["status"]);
    assert!(stdout.contains("countwise Configuration"));
    assert!(stdout.contains("Enabled:         false"));
    assert!(stdout.contains("countwise.log"));
    assert!(stdout.contains("http://127.0.0.1:9/report"));
}

#[test]
fn counters_are_ignored_until_enabled() {
    let env = CliTestEnv::new();

    let stdout = run_ok(&env, &["incr", "opens"]);
    assert!(stdout.contains("Analytics are disabled"));

    run_ok(&env, &["enable"]);
    assert!(run_ok(&env, &["incr", "opens"]).contains("opens = 1"));
    assert!(run_ok(&env, &["incr", "opens", "--by", "4"]).contains("opens = 5"));
    assert!(run_ok(&env, &["decr", "opens", "--by", "2"]).contains("opens = 3"));

    let store = Store::open(env.store_dir()).expect("failed to open store");
    assert_eq!(
        store.get_value("opens").unwrap(),
        Some(StoredValue::Int(3))
    );
}

#[test]
fn show_json_includes_identity_entries() {
    let env = CliTestEnv::new();
    run_ok(&env, &["enable"]);
    run_ok(&env, &["set-string", "theme", "dark"]);
    run_ok(&env, &["set-flag", "beta", "true"]);

    let stdout = run_ok(&env, &["show", "--json"]);
    let entries: serde_json::Value = serde_json::from_str(&stdout).expect("invalid JSON");
    assert_eq!(entries["theme"], "dark");
    assert_eq!(entries["beta"], "true");
    assert_eq!(entries["_android_version"], "test-os");

    let install_id = run_ok(&env, &["install-id"]);
    assert_eq!(entries["_installation_id"], install_id.trim());
}

#[test]
fn install_id_is_stable_between_runs() {
    let env = CliTestEnv::new();
    let first = run_ok(&env, &["install-id"]);
    let second = run_ok(&env, &["install-id"]);
    assert_eq!(first, second);
    assert!(!first.trim().is_empty());
}

#[test]
fn set_url_only_applies_once() {
    let env = CliTestEnv::new();

    let stdout = run_ok(&env, &["set-url", "https://first.example.com/q"]);
    assert!(stdout.contains("Report URL set to https://first.example.com/q"));

    let stdout = run_ok(&env, &["set-url", "https://second.example.com/q"]);
    assert!(stdout.contains("already set to https://first.example.com/q"));
}

#[test]
fn report_is_silent_when_disabled_or_unreachable() {
    let env = CliTestEnv::new();

    let stdout = run_ok(&env, &["report", "-p", "x=1"]);
    assert!(stdout.contains("nothing sent"));

    run_ok(&env, &["enable"]);
    let stdout = run_ok(&env, &["report"]);
    assert!(stdout.contains("No response from server."));
}

#[test]
fn counters_work_without_config_file() {
    let env = CliTestEnv::without_config();

    assert!(run_ok(&env, &["status"]).contains("(not configured)"));
    run_ok(&env, &["enable"]);
    assert!(run_ok(&env, &["incr", "opens"]).contains("opens = 1"));
    assert!(!run_ok(&env, &["install-id"]).trim().is_empty());

    let output = run(&env, &["report"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("default_url"));

    run_ok(&env, &["set-url", "http://127.0.0.1:9/report"]);
    assert!(run_ok(&env, &["status"]).contains("http://127.0.0.1:9/report"));
}
