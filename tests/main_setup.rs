use serial_test::serial;
use std::{env, net::SocketAddr, panic, path::PathBuf, time::Duration};
use switchyard::{
    AppConfig,
    config::{ConfigError, Env},
};

const VARS: [&str; 6] = [
    "APP_ENV",
    "BIND_ADDRESS",
    "JWT_SECRET",
    "STATIC_DIRS",
    "DISABLE_CACHE",
    "CACHE_MAX_AGE_SECS",
];

// --- Setup/Teardown Utilities ---

/// Runs `test` with exactly the given variables set (all others from `VARS`
/// removed) and restores the previous environment afterwards.
fn run_with_env<T, R>(vars: &[(&str, &str)], test: T) -> R
where
    T: FnOnce() -> R + panic::UnwindSafe,
{
    // Save current environment variables
    let originals: Vec<(&str, Option<String>)> =
        VARS.iter().map(|&var| (var, env::var(var).ok())).collect();

    unsafe {
        for var in VARS {
            env::remove_var(var);
        }
        for (key, value) in vars {
            env::set_var(key, value);
        }
    }

    let result = panic::catch_unwind(test);

    // Restore original environment variables
    for (key, original_value) in originals {
        unsafe {
            match original_value {
                Some(val) => env::set_var(key, val),
                None => env::remove_var(key),
            }
        }
    }

    match result {
        Ok(value) => value,
        Err(e) => panic::resume_unwind(e),
    }
}

// --- Tests ---

#[test]
#[serial]
fn test_app_config_local_env_defaults() {
    let config = run_with_env(&[], AppConfig::try_load).unwrap();

    assert_eq!(config.env, Env::Local);
    assert_eq!(config.bind_address, SocketAddr::from(([0, 0, 0, 0], 3000)));
    assert_eq!(config.jwt_secret, "super-secure-test-secret-value-local");
    assert_eq!(config.static_dirs, vec![PathBuf::from("static")]);
    // Local runs never cache.
    assert!(config.disable_cache);
    assert_eq!(config.cache_max_age, Duration::from_secs(3600));
}

#[test]
#[serial]
fn test_app_config_production_requires_secret() {
    let result = run_with_env(&[("APP_ENV", "production")], AppConfig::try_load);
    assert_eq!(result.unwrap_err(), ConfigError::Missing("JWT_SECRET"));
}

#[test]
#[serial]
fn test_app_config_production_fail_fast() {
    let result = run_with_env(&[("APP_ENV", "production")], || {
        panic::catch_unwind(AppConfig::load)
    });
    assert!(
        result.is_err(),
        "Production config loading should panic on a missing secret"
    );
}

#[test]
#[serial]
fn test_app_config_production_values() {
    let config = run_with_env(
        &[
            ("APP_ENV", "production"),
            ("JWT_SECRET", "prod-secret"),
            ("BIND_ADDRESS", "127.0.0.1:8080"),
            ("STATIC_DIRS", "public:assets:"),
            ("CACHE_MAX_AGE_SECS", "60"),
        ],
        AppConfig::try_load,
    )
    .unwrap();

    assert_eq!(config.env, Env::Production);
    assert_eq!(config.jwt_secret, "prod-secret");
    assert_eq!(config.bind_address, SocketAddr::from(([127, 0, 0, 1], 8080)));
    assert_eq!(
        config.static_dirs,
        vec![PathBuf::from("public"), PathBuf::from("assets")]
    );
    assert!(!config.disable_cache);
    assert_eq!(config.cache_max_age, Duration::from_secs(60));
}

#[test]
#[serial]
fn test_app_config_rejects_bad_values() {
    let result = run_with_env(&[("BIND_ADDRESS", "not an address")], AppConfig::try_load);
    assert!(matches!(
        result,
        Err(ConfigError::Invalid { name: "BIND_ADDRESS", .. })
    ));

    let result = run_with_env(&[("DISABLE_CACHE", "maybe")], AppConfig::try_load);
    assert!(matches!(
        result,
        Err(ConfigError::Invalid { name: "DISABLE_CACHE", .. })
    ));
}
