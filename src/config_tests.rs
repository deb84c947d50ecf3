use crate::config::Config;
use std::env;
use std::sync::Mutex;
use std::sync::OnceLock;

// Global lock to prevent race conditions when modifying environment variables in tests
static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

fn get_env_lock() -> &'static Mutex<()> {
    ENV_LOCK.get_or_init(|| Mutex::new(()))
}

const KEYS: &[&str] = &[
    "WINDOW_SIZE",
    "PREDICTION_HORIZON",
    "SPLIT_RATIO",
    "EPOCHS",
    "BATCH_SIZE",
    "HIDDEN_UNITS",
    "LEARNING_RATE",
    "MODEL_SEED",
    "PROGRESS_THROTTLE_MS",
    "YIELD_EVERY_EPOCHS",
    "OBSERVABILITY_ENABLED",
];

fn clear_env() {
    for key in KEYS {
        // SAFETY: env mutation is serialized by ENV_LOCK
        unsafe { env::remove_var(key) };
    }
}

fn set_env(key: &str, value: &str) {
    // SAFETY: env mutation is serialized by ENV_LOCK
    unsafe { env::set_var(key, value) };
}

#[test]
fn test_config_defaults() {
    let _guard = get_env_lock().lock().unwrap();
    clear_env();

    let config = Config::from_env().unwrap();

    assert_eq!(config.window_size, 60);
    assert_eq!(config.prediction_horizon, 5);
    assert_eq!(config.batch_size, 256);
    assert_eq!(config.epochs, 12);
    assert!((config.split_ratio - 0.9).abs() < 1e-12);
    assert_eq!(config.hidden_units, 16);
    assert_eq!(config.progress_throttle_ms, 500);
    assert_eq!(config.yield_every_epochs, 3);
    assert_eq!(config, Config::default());
}

#[test]
fn test_config_overrides() {
    let _guard = get_env_lock().lock().unwrap();
    clear_env();

    set_env("WINDOW_SIZE", "30");
    set_env("PREDICTION_HORIZON", "3");
    set_env("SPLIT_RATIO", "0.75");
    set_env("EPOCHS", "40");
    set_env("LEARNING_RATE", "0.005");

    let config = Config::from_env().unwrap();

    assert_eq!(config.window_size, 30);
    assert_eq!(config.prediction_horizon, 3);
    assert!((config.split_ratio - 0.75).abs() < 1e-12);
    assert_eq!(config.epochs, 40);

    let topology = config.topology();
    assert_eq!(topology.window_size, 30);
    assert_eq!(topology.horizon, 3);
    assert!((topology.learning_rate - 0.005).abs() < 1e-12);

    clear_env();
}

#[test]
fn test_config_rejects_invalid_split_ratio() {
    let _guard = get_env_lock().lock().unwrap();
    clear_env();

    set_env("SPLIT_RATIO", "1.5");
    assert!(Config::from_env().is_err());

    set_env("SPLIT_RATIO", "abc");
    let err = Config::from_env().unwrap_err();
    assert!(format!("{:#}", err).contains("SPLIT_RATIO"));

    clear_env();
}

#[test]
fn test_config_rejects_zero_window() {
    let _guard = get_env_lock().lock().unwrap();
    clear_env();

    set_env("WINDOW_SIZE", "0");
    assert!(Config::from_env().is_err());

    set_env("WINDOW_SIZE", "-4");
    assert!(Config::from_env().is_err());

    clear_env();
}

#[test]
fn test_training_config_overrides_and_errors() {
    let _guard = get_env_lock().lock().unwrap();
    clear_env();

    set_env("MODEL_SEED", "7");
    set_env("PROGRESS_THROTTLE_MS", "0");
    set_env("YIELD_EVERY_EPOCHS", "5");
    let config = Config::from_env().unwrap();
    assert_eq!(config.seed, 7);
    assert_eq!(config.progress_throttle_ms, 0);
    assert_eq!(config.yield_every_epochs, 5);

    set_env("EPOCHS", "many");
    let err = Config::from_env().unwrap_err();
    assert!(format!("{:#}", err).contains("EPOCHS"));

    clear_env();
}
