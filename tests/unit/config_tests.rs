use serial_test::serial;

use study_supervisor::config::GlobalConfig;
use study_supervisor::AppError;

fn sample_toml() -> &'static str {
    r#"
http_host = "127.0.0.1"
http_port = 8080
data_dir = "/srv/study"
feedback_file = "feedback.ndjson"
region_header = "x-edge-region"

[program]
command = "./run_web"
args = ["--web"]
fallback_command = "python3"
fallback_args = ["mock_algorithm.py"]
default_dataset = "datasets/car.txt"
datasets = ["datasets/car.txt", "datasets/house.txt"]
restart_grace_ms = 50
input_timeout_ms = 500

[ratings]
min = 0
max = 5
"#
}

/// An empty file is valid and yields the built-in defaults.
#[test]
fn empty_config_uses_defaults() {
    let config = GlobalConfig::from_toml_str("").expect("empty config is valid");
    assert_eq!(config, GlobalConfig::default());
    assert_eq!(config.http_port, 5001);
    assert_eq!(config.feedback_file, "user_feedback.json");
    assert_eq!(config.ratings.min, 1);
    assert_eq!(config.ratings.max, 10);
}

#[test]
fn full_config_parses() {
    let config = GlobalConfig::from_toml_str(sample_toml()).expect("valid config");

    assert_eq!(config.bind_addr(), "127.0.0.1:8080");
    assert_eq!(config.data_dir.as_deref(), Some(std::path::Path::new("/srv/study")));
    assert_eq!(config.region_header, "x-edge-region");
    assert_eq!(config.program.args, vec!["--web"]);
    assert_eq!(config.program.restart_grace().as_millis(), 50);
    assert_eq!(config.program.input_timeout().as_millis(), 500);
    assert!(config.ratings.contains(0));
    assert!(!config.ratings.contains(6));
}

#[test]
fn inverted_rating_bounds_are_rejected() {
    let err = GlobalConfig::from_toml_str("[ratings]\nmin = 9\nmax = 2\n")
        .expect_err("min > max must fail");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("ratings.min")));
}

#[test]
fn empty_program_command_is_rejected() {
    let err = GlobalConfig::from_toml_str("[program]\ncommand = \"  \"\n")
        .expect_err("blank command must fail");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("program.command")));
}

#[test]
fn zero_input_timeout_is_rejected() {
    let err = GlobalConfig::from_toml_str("[program]\ninput_timeout_ms = 0\n")
        .expect_err("zero timeout must fail");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn malformed_toml_is_a_config_error() {
    let err = GlobalConfig::from_toml_str("http_port = \"not a port\"").expect_err("bad type");
    assert!(err.to_string().starts_with("config: invalid config"));
}

/// Only allow-listed datasets are honoured; anything else falls back.
#[test]
fn dataset_selection_honours_allow_list() {
    let config = GlobalConfig::from_toml_str(sample_toml()).expect("valid config");
    let program = &config.program;

    assert_eq!(program.select_dataset(Some("datasets/house.txt")), "datasets/house.txt");
    assert_eq!(program.select_dataset(Some("../../etc/passwd")), "datasets/car.txt");
    assert_eq!(program.select_dataset(None), "datasets/car.txt");
}

#[test]
#[serial]
fn port_env_overrides_config() {
    std::env::set_var("PORT", "9090");
    let mut config = GlobalConfig::default();
    config.apply_env_overrides();
    std::env::remove_var("PORT");

    assert_eq!(config.http_port, 9090);
}

#[test]
#[serial]
fn invalid_port_env_is_ignored() {
    std::env::set_var("PORT", "eighty");
    let mut config = GlobalConfig::default();
    config.apply_env_overrides();
    std::env::remove_var("PORT");

    assert_eq!(config.http_port, 5001);
}

#[test]
fn load_from_missing_path_fails() {
    let err = GlobalConfig::load_from_path("/nonexistent/study-supervisor.toml")
        .expect_err("missing file");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("failed to read config")));
}
