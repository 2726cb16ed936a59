//! Configuration for the `flowlab` binary.
//!
//! Loaded with the `config` crate from an optional file, overridden by
//! environment variables such as `FLOWLAB__TIMING__AI_MS=2500`.

use flowlab_simulation::{RunnerConfig, TimingConfig};
use flowlab_workflow::GridLayout;
use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FlowlabConfig {
    /// Virtual durations of every transition and effect.
    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub runner: RunnerConfig,

    /// Grid spacing for the built-in catalog.
    #[serde(default)]
    pub layout: GridLayout,

    /// Log filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for FlowlabConfig {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            runner: RunnerConfig::default(),
            layout: GridLayout::default(),
            log_filter: default_log_filter(),
        }
    }
}

impl FlowlabConfig {
    /// Loads configuration from `path` (if given) and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or unreadable, or a value
    /// has the wrong type.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        Self::load_with(path, config::Environment::default())
    }

    fn load_with(
        path: Option<&Path>,
        environment: config::Environment,
    ) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder
            .add_source(
                environment
                    .prefix("FLOWLAB")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn no_env() -> config::Environment {
        config::Environment::default().source(Some(config::Map::new()))
    }

    #[test]
    fn defaults_without_sources() {
        let config = FlowlabConfig::load_with(None, no_env()).expect("loads");
        assert_eq!(config, FlowlabConfig::default());
        assert_eq!(config.timing.lead_ms, 200);
        assert!((config.runner.speed - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp file");
        writeln!(
            file,
            "log_filter = \"debug\"\n\n[timing]\nai_ms = 2500\nauto_approve = false\n\n[runner]\nspeed = 4.0"
        )
        .expect("write config");

        let config = FlowlabConfig::load_with(Some(file.path()), no_env()).expect("loads");
        assert_eq!(config.log_filter, "debug");
        assert_eq!(config.timing.ai_ms, 2500);
        assert!(!config.timing.auto_approve);
        assert_eq!(config.timing.lead_ms, 200);
        assert!((config.runner.speed - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn environment_overrides_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .expect("temp file");
        write!(file, r#"{{ "timing": {{ "ai_ms": 2500 }} }}"#).expect("write config");

        let mut vars = config::Map::new();
        vars.insert("FLOWLAB__TIMING__AI_MS".to_string(), "3000".to_string());
        let env = config::Environment::default().source(Some(vars));

        let config = FlowlabConfig::load_with(Some(file.path()), env).expect("loads");
        assert_eq!(config.timing.ai_ms, 3000);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("absent.toml");
        assert!(FlowlabConfig::load_with(Some(&path), no_env()).is_err());
    }
}
