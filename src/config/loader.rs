//! Loads `Config` from CLI overrides, `BENCH_*` environment variables, a
//! TOML file, and built-in defaults, in that priority order.

use super::Config;
use crate::error::ConfigError;
use std::path::Path;

/// Assembles a `Config` value. Stateless; holds no cached state between
/// calls, matching §9's "immutable Config value" redesign flag.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads defaults, overlays a TOML file if present at `config_path`,
    /// then overlays `BENCH_*` environment variables on top.
    pub fn load(config_path: Option<&Path>) -> Result<Config, ConfigError> {
        let mut config = Config::default();

        if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.display().to_string()));
            }
            let contents = std::fs::read_to_string(path)?;
            config = toml::from_str(&contents)?;
        }

        Self::apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Overlays a small set of commonly-overridden scalar fields from the
    /// environment. Structural fields (devices, schedules) are file-only;
    /// env overrides are for the handful of knobs operators tune per-run.
    fn apply_env_overrides(config: &mut Config) {
        if let Ok(v) = std::env::var("BENCH_LOG_LEVEL") {
            config.log_level = v;
        }
        if let Ok(v) = std::env::var("BENCH_TICK_INTERVAL_SECS") {
            if let Ok(n) = v.parse() {
                config.tick_interval_secs = n;
            }
        }
        if let Ok(v) = std::env::var("BENCH_NETWORK_INTERFACE") {
            config.network_interface = v;
        }
        if let Ok(v) = std::env::var("BENCH_LOCAL_RPC_URL") {
            config.local_rpc.url = v;
        }
        if let Ok(v) = std::env::var("BENCH_MAINNET_RPC_URL") {
            config.mainnet_rpc.url = v;
        }
        if let Ok(v) = std::env::var("BENCH_CONSECUTIVE_K") {
            if let Ok(n) = v.parse() {
                config.consecutive_confirmations_k = n;
            }
        }
        if let Ok(v) = std::env::var("BENCH_ANALYSIS_WINDOW_SECS") {
            if let Ok(n) = v.parse() {
                config.analysis_window_secs = n;
            }
        }
        if let Ok(v) = std::env::var("BENCH_TARGETS_FILE") {
            config.paths.targets_file = v.into();
        }
        if let Ok(v) = std::env::var("BENCH_RUN_DIR_ROOT") {
            config.paths.run_dir_root = v.into();
        }
        if let Ok(v) = std::env::var("BENCH_ARCHIVES_ROOT") {
            config.paths.archives_root = v.into();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_with_no_file_returns_defaults_plus_env() {
        std::env::remove_var("BENCH_LOG_LEVEL");
        let cfg = ConfigLoader::load(None).unwrap();
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn load_missing_file_errors() {
        let err = ConfigLoader::load(Some(Path::new("/nonexistent/chainbench.toml")));
        assert!(matches!(err, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn env_override_applies() {
        std::env::set_var("BENCH_LOG_LEVEL", "debug");
        let cfg = ConfigLoader::load(None).unwrap();
        assert_eq!(cfg.log_level, "debug");
        std::env::remove_var("BENCH_LOG_LEVEL");
    }
}
