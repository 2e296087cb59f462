//! # Configuration Module
//!
//! Loads `ordo.toml`, merges `ORDO_*` environment variables into it and hands
//! out per-project settings: the base endpoint, transport timeout and retry
//! policy, and scenarios to skip.
//!
//! ## Configuration Loading Flow
//!
//! ```text
//! +-------------------+     +-------------------+     +-------------------+
//! | ORDO_CONFIG env   | --> | Path resolution   | --> | ordo.toml file    |
//! | (optional)        |     | or default ./     |     |                   |
//! +-------------------+     +-------------------+     +-------------------+
//!                                                              |
//!                                                              v
//! +-------------------+     +-------------------+     +-------------------+
//! | Environment vars  | --> | ORDO_* prefix     | --> | Config struct     |
//! | ORDO_KEY=value    |     | ORDO_PROJECT_*    |     | projects[].data   |
//! +-------------------+     +-------------------+     +-------------------+
//! ```
//!
//! ## Configuration Structure
//!
//! ```toml
//! [[projects]]
//! name = "staging"
//! base_url = "https://staging.petstore.example.com/v2"
//! timeout = "30s"
//! retry.count = 3
//! retry.factor = 2.0
//! scenario_ignore = ["user::delete_user::brud"]
//! ```
//!
//! `ORDO_CONFIG` is reserved for the config file path. Setting it to
//! something that does not look like a path (e.g. `ORDO_CONFIG=true`) is an
//! error.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{de::DeserializeOwned, Deserialize};
use std::{collections::HashMap, path::Path, sync::Arc, time::Duration};
use toml::Value as TomlValue;
use tracing::*;

use crate::{error::ConfigError, request::Endpoint};

type Result<T> = std::result::Result<T, ConfigError>;

/// Environment variable name for specifying the config file path.
const ORDO_CONFIG_ENV: &str = "ORDO_CONFIG";

const ENV_PREFIX: &str = "ORDO";

static CONFIG: Lazy<Config> = Lazy::new(|| {
    let _ = dotenv::dotenv();
    match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{e}");
            Config::default()
        }
    }
});

/// The process-wide configuration, loaded on first access.
pub fn get_ordo_config() -> &'static Config {
    &CONFIG
}

#[derive(Debug, Clone)]
pub struct Config {
    pub projects: Vec<Arc<ProjectConfig>>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            projects: vec![Arc::new(ProjectConfig {
                name: "default".to_string(),
                ..Default::default()
            })],
        }
    }
}

fn looks_like_path(value: &str) -> bool {
    let path = Path::new(value);
    path.extension().is_some_and(|ext| ext == "toml")
        || value.contains(std::path::MAIN_SEPARATOR)
        || value.contains('/')
}

impl Config {
    /// Load configuration from `path`. A missing file yields the default configuration.
    pub fn load_from(path: &Path) -> Result<Config> {
        let buf = match std::fs::read_to_string(path) {
            Ok(buf) => buf,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{path:?} not found, using default configuration");
                let mut cfg = Config::default();
                cfg.load_env(std::env::vars());
                return Ok(cfg);
            }
            Err(e) => return Err(ConfigError::LoadError(e.to_string())),
        };

        #[derive(Deserialize)]
        struct ConfigHelper {
            #[serde(default)]
            projects: Vec<ProjectConfig>,
        }

        let helper: ConfigHelper = toml::from_str(&buf).map_err(|e| {
            ConfigError::LoadError(format!("failed to deserialize ordo.toml: {e}"))
        })?;

        let mut cfg = if helper.projects.is_empty() {
            Config::default()
        } else {
            Config {
                projects: helper.projects.into_iter().map(Arc::new).collect(),
            }
        };
        debug!("ordo.toml was successfully loaded: {cfg:#?}");

        cfg.load_env(std::env::vars());
        Ok(cfg)
    }

    /// Load from `ORDO_CONFIG` if set, `./ordo.toml` otherwise.
    pub fn load() -> Result<Config> {
        match std::env::var(ORDO_CONFIG_ENV) {
            Ok(value) => {
                if !looks_like_path(&value) {
                    return Err(ConfigError::LoadError(format!(
                        "{ORDO_CONFIG_ENV} should be a path to a config file, not a config value. \
                         Got: {value:?}. Use {ENV_PREFIX}_<KEY>=value for config values instead."
                    )));
                }
                let path = Path::new(&value);
                if !path.exists() {
                    return Err(ConfigError::LoadError(format!(
                        "config file specified by {ORDO_CONFIG_ENV} not found: {path:?}"
                    )));
                }
                debug!("Loading config from {ORDO_CONFIG_ENV}={path:?}");
                Config::load_from(path)
            }
            Err(_) => Config::load_from(Path::new("ordo.toml")),
        }
    }

    /// Merge environment variables into project data.
    ///
    /// `ORDO_<KEY>` is visible to every project as `key`; `ORDO_<PROJECT>_<KEY>`
    /// only to that project, and wins over the global value.
    fn load_env(&mut self, vars: impl Iterator<Item = (String, String)>) {
        let global_prefix = format!("{ENV_PREFIX}_");
        let project_prefixes: Vec<String> = self
            .projects
            .iter()
            .map(|p| format!("{ENV_PREFIX}_{}_", p.name.to_uppercase()))
            .collect();

        let vars: Vec<(String, String)> = vars.collect();
        let global_vars: HashMap<String, TomlValue> = vars
            .iter()
            .filter(|(k, _)| k != ORDO_CONFIG_ENV)
            .filter(|(k, _)| !project_prefixes.iter().any(|pp| k.starts_with(pp)))
            .filter_map(|(k, v)| {
                let key = k.strip_prefix(&global_prefix)?;
                Some((key.to_lowercase(), TomlValue::String(v.clone())))
            })
            .collect();

        for (project_arc, prefix) in self.projects.iter_mut().zip(&project_prefixes) {
            let project_vars = vars.iter().filter_map(|(k, v)| {
                let key = k.strip_prefix(prefix.as_str())?;
                Some((key.to_lowercase(), TomlValue::String(v.clone())))
            });
            let project = Arc::make_mut(project_arc);
            project.data.extend(global_vars.clone());
            project.data.extend(project_vars);
        }

        trace!("ordo configuration merged with env: {self:#?}");
    }

    pub fn project(&self, name: &str) -> Option<&Arc<ProjectConfig>> {
        self.projects.iter().find(|p| p.name == name)
    }
}

/// Configuration of one target environment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    /// Per-request transport timeout.
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    /// Scenario names skipped in this project.
    #[serde(default)]
    pub scenario_ignore: Vec<String>,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Keys and values specified by user, `base_url` among them.
    #[serde(flatten)]
    pub data: HashMap<String, TomlValue>,
}

impl ProjectConfig {
    /// The base endpoint every scenario of a run is sent to.
    pub fn endpoint(&self) -> Result<Endpoint> {
        match self.get_str("base_url") {
            Ok(base) => Endpoint::parse(base),
            Err(ConfigError::ValueNotFound(_)) => Err(ConfigError::EmptyEndpoint),
            Err(e) => Err(e),
        }
    }

    pub fn get(&self, key: impl AsRef<str>) -> Result<&TomlValue> {
        let key = key.as_ref();
        self.data
            .get(key)
            .ok_or_else(|| ConfigError::ValueNotFound(key.to_string()))
    }

    pub fn get_str(&self, key: impl AsRef<str>) -> Result<&str> {
        let key = key.as_ref();
        self.get(key)?
            .as_str()
            .ok_or_else(|| ConfigError::ValueNotFound(key.to_string()))
    }

    pub fn get_int(&self, key: impl AsRef<str>) -> Result<i64> {
        let key = key.as_ref();
        match self.get(key)? {
            TomlValue::Integer(i) => Ok(*i),
            _ => self.get_str(key)?.parse().map_err(value_error),
        }
    }

    pub fn get_float(&self, key: impl AsRef<str>) -> Result<f64> {
        let key = key.as_ref();
        match self.get(key)? {
            TomlValue::Float(f) => Ok(*f),
            _ => self.get_str(key)?.parse().map_err(value_error),
        }
    }

    pub fn get_bool(&self, key: impl AsRef<str>) -> Result<bool> {
        let key = key.as_ref();
        match self.get(key)? {
            TomlValue::Boolean(b) => Ok(*b),
            _ => self.get_str(key)?.parse().map_err(value_error),
        }
    }

    pub fn get_datetime(&self, key: impl AsRef<str>) -> Result<DateTime<Utc>> {
        self.get_str(key)?
            .parse::<DateTime<Utc>>()
            .map_err(value_error)
    }

    pub fn get_array<T: DeserializeOwned>(&self, key: impl AsRef<str>) -> Result<Vec<T>> {
        serde_json::from_str(self.get_str(key)?).map_err(value_error)
    }

    pub fn get_object<T: DeserializeOwned>(&self, key: impl AsRef<str>) -> Result<T> {
        serde_json::from_str(self.get_str(key)?).map_err(value_error)
    }
}

fn value_error<E: std::error::Error + Send + Sync + 'static>(e: E) -> ConfigError {
    ConfigError::ValueError(eyre::Error::from(e))
}

/// Transport-level retry of connection failures and timeouts.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Number of retries.
    #[serde(default)]
    pub count: Option<usize>,
    /// Factor to multiply the delay between retries.
    #[serde(default)]
    pub factor: Option<f32>,
    /// Whether to add jitter to the delay between retries.
    #[serde(default)]
    pub jitter: Option<bool>,
    #[serde(default, with = "humantime_serde")]
    pub min_delay: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub max_delay: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            count: Some(0),
            factor: Some(2.0),
            jitter: Some(false),
            min_delay: Some(Duration::from_secs(1)),
            max_delay: Some(Duration::from_secs(60)),
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> backon::ExponentialBuilder {
        let builder = backon::ExponentialBuilder::default()
            .with_max_times(self.count.unwrap_or_default())
            .with_factor(self.factor.unwrap_or(2.0))
            .with_min_delay(self.min_delay.unwrap_or(Duration::from_secs(1)))
            .with_max_delay(self.max_delay.unwrap_or(Duration::from_secs(60)));

        if self.jitter.unwrap_or_default() {
            builder.with_jitter()
        } else {
            builder
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn sample_path() -> std::path::PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../ordo-sample.toml")
    }

    /// Sample config merged with the given variables instead of the process env.
    fn load_with_env(vars: &[(&str, &str)]) -> eyre::Result<ProjectConfig> {
        let mut cfg = Config::load_from(&sample_path())?;
        for project in &mut cfg.projects {
            Arc::make_mut(project).data.retain(|k, _| k == "base_url");
        }
        cfg.load_env(vars.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        Ok(Arc::unwrap_or_clone(cfg.projects.remove(0)))
    }

    #[test]
    fn load_config() -> eyre::Result<()> {
        let cfg = Config::load_from(&sample_path())?;
        assert_eq!(cfg.projects.len(), 1);

        let project = &cfg.projects[0];
        assert_eq!(project.name, "default");
        assert_eq!(project.timeout, Some(Duration::from_secs(30)));
        assert_eq!(project.scenario_ignore, Vec::<String>::new());
        assert_eq!(project.retry.count, Some(0));
        assert_eq!(project.retry.factor, Some(2.0));
        assert_eq!(project.retry.jitter, Some(false));
        assert_eq!(project.retry.min_delay, Some(Duration::from_secs(1)));
        assert_eq!(project.retry.max_delay, Some(Duration::from_secs(60)));
        assert_eq!(
            project.endpoint()?.as_str(),
            "https://petstore.swagger.io/v2"
        );
        Ok(())
    }

    #[test]
    fn missing_file_is_default() -> eyre::Result<()> {
        let cfg = Config::load_from(Path::new("/nonexistent/ordo.toml"))?;
        assert_eq!(cfg.projects.len(), 1);
        assert_eq!(cfg.projects[0].name, "default");
        assert!(matches!(
            cfg.projects[0].endpoint(),
            Err(ConfigError::EmptyEndpoint)
        ));
        Ok(())
    }

    #[test_case("ORDO_DEFAULT_STR_KEY"; "project config")]
    #[test_case("ORDO_STR_KEY"; "global config")]
    fn get_str(key: &str) -> eyre::Result<()> {
        let project = load_with_env(&[(key, "example_string")])?;
        assert_eq!(project.get_str("str_key")?, "example_string");
        Ok(())
    }

    #[test]
    fn project_var_wins_over_global() -> eyre::Result<()> {
        let project = load_with_env(&[
            ("ORDO_BASE_URL", "http://global"),
            ("ORDO_DEFAULT_BASE_URL", "http://project"),
        ])?;
        assert_eq!(project.endpoint()?.as_str(), "http://project/");
        Ok(())
    }

    #[test]
    fn project_vars_do_not_leak_as_global() -> eyre::Result<()> {
        let project = load_with_env(&[("ORDO_DEFAULT_TOKEN", "x")])?;
        assert_eq!(project.get_str("token")?, "x");
        assert!(project.get_str("default_token").is_err());
        Ok(())
    }

    #[test_case("ORDO_DEFAULT_INT_KEY"; "project config")]
    #[test_case("ORDO_INT_KEY"; "global config")]
    fn get_int(key: &str) -> eyre::Result<()> {
        let project = load_with_env(&[(key, "42")])?;
        assert_eq!(project.get_int("int_key")?, 42);
        Ok(())
    }

    #[test]
    fn get_float_and_bool() -> eyre::Result<()> {
        let project = load_with_env(&[("ORDO_FLOAT_KEY", "5.5"), ("ORDO_BOOL_KEY", "true")])?;
        assert_eq!(project.get_float("float_key")?, 5.5);
        assert!(project.get_bool("bool_key")?);
        Ok(())
    }

    #[test]
    fn get_datetime() -> eyre::Result<()> {
        let datetime_str = "2025-03-08T12:00:00Z";
        let project = load_with_env(&[("ORDO_DATETIME_KEY", datetime_str)])?;
        assert_eq!(
            project
                .get_datetime("datetime_key")?
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            datetime_str
        );
        Ok(())
    }

    #[test]
    fn get_array_and_object() -> eyre::Result<()> {
        #[derive(Debug, Deserialize, PartialEq)]
        struct User {
            username: String,
        }
        let project = load_with_env(&[
            ("ORDO_ARRAY_KEY", "[1, 2, 3]"),
            ("ORDO_OBJECT_KEY", r#"{"username": "Brud"}"#),
        ])?;
        assert_eq!(project.get_array::<i64>("array_key")?, vec![1, 2, 3]);
        assert_eq!(
            project.get_object::<User>("object_key")?,
            User {
                username: "Brud".into()
            }
        );
        Ok(())
    }

    #[test]
    fn bad_value_is_value_error() -> eyre::Result<()> {
        let project = load_with_env(&[("ORDO_INT_KEY", "forty-two")])?;
        assert!(matches!(
            project.get_int("int_key"),
            Err(ConfigError::ValueError(_))
        ));
        Ok(())
    }

    #[test]
    fn retry_backoff_is_built() {
        let retry = RetryConfig {
            count: Some(3),
            jitter: Some(true),
            ..RetryConfig::default()
        };
        // three delays, then exhausted
        let delays: Vec<_> = backon::BackoffBuilder::build(retry.backoff()).collect();
        assert_eq!(delays.len(), 3);
    }

    mod ordo_config_env {
        use super::{Config, ORDO_CONFIG_ENV};
        use pretty_assertions::assert_eq;
        use serial_test::serial;

        #[test]
        #[serial]
        fn load_from_ordo_config_env() {
            let path = super::sample_path();
            std::env::set_var(ORDO_CONFIG_ENV, path.to_str().unwrap());
            let cfg = Config::load().unwrap();
            std::env::remove_var(ORDO_CONFIG_ENV);

            assert_eq!(cfg.projects.len(), 1);
            assert_eq!(cfg.projects[0].name, "default");
        }

        #[test]
        #[serial]
        fn error_when_file_not_found() {
            std::env::set_var(ORDO_CONFIG_ENV, "/nonexistent/path/ordo.toml");
            let result = Config::load();
            std::env::remove_var(ORDO_CONFIG_ENV);

            let err = result.unwrap_err().to_string();
            assert!(err.contains("not found"), "{err}");
        }

        #[test]
        #[serial]
        fn error_when_value_looks_like_config_value() {
            for value in ["true", "123", "some_value"] {
                std::env::set_var(ORDO_CONFIG_ENV, value);
                let result = Config::load();
                std::env::remove_var(ORDO_CONFIG_ENV);

                let err = result.unwrap_err().to_string();
                assert!(err.contains("should be a path"), "{value}: {err}");
            }
        }
    }
}
