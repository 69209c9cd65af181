//! Service configuration.
//!
//! Layered: built-in defaults, then an optional YAML file, then environment
//! variables such as `KEYSTONE__APP__PORT=9090` or
//! `KEYSTONE__APP__CORS_ORIGINS=^https://a\.example$,^https://b\.example$`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use keystone_auth::HashingCost;
use keystone_infra::StoreOptions;
use keystone_observability::{LogSettings, RunMode};

/// Names the config file; defaults to [`DEFAULT_CONFIG_PATH`].
pub const CONFIG_PATH_VAR: &str = "KEYSTONE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/keystone.yaml";
const ENV_PREFIX: &str = "KEYSTONE";

/// `database.url` value selecting the non-durable in-memory stores.
pub const MEMORY_DATABASE: &str = "memory";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app: AppSettings,
    pub log: LogFileSettings,
    pub database: DatabaseSettings,
    pub users: UserSettings,
    pub security: SecuritySettings,
    pub bootstrap: BootstrapSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub name: String,
    pub run_mode: RunMode,
    pub addr: String,
    pub port: u16,
    /// Regular expressions; an origin is allowed when it fully matches one.
    pub cors_origins: Vec<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: "keystone".to_string(),
            run_mode: RunMode::Dev,
            addr: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogFileSettings {
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// `memory`, or a SQLite url such as `sqlite://keystone.db`.
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        let store = StoreOptions::default();
        Self {
            url: "sqlite://keystone.db".to_string(),
            max_connections: store.max_connections,
            timeout_secs: store.timeout.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    /// Password given to users created without one.
    pub base_password: String,
    pub page_size: u32,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            base_password: "changeme".to_string(),
            page_size: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    pub hashing: HashingCost,
    pub session_ttl_secs: u64,
    pub session_cleanup_secs: u64,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            hashing: HashingCost::default(),
            session_ttl_secs: 7 * 24 * 3600,
            session_cleanup_secs: 3600,
        }
    }
}

/// Initial superuser, created at startup when no account has that name.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BootstrapSettings {
    pub superuser: Option<String>,
    pub password: Option<String>,
}

impl Settings {
    /// Load from the file named by `KEYSTONE_CONFIG` (or the default path).
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(Path::new(&path))
    }

    /// Load `path` if it exists, then apply `KEYSTONE__*` overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with(path, Environment::with_prefix(ENV_PREFIX))
    }

    fn load_with(path: &Path, environment: Environment) -> Result<Self, ConfigError> {
        let defaults = Settings::default();
        let mut builder = Config::builder()
            .set_default("app.addr", defaults.app.addr)?
            .set_default("app.port", defaults.app.port)?
            .set_default("database.url", defaults.database.url)?;

        if path.exists() {
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(
            environment
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("app.cors_origins"),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.users.page_size == 0 {
            return Err(ConfigError::Invalid("users.page_size must be positive".into()));
        }
        if self.security.session_ttl_secs == 0 {
            return Err(ConfigError::Invalid("security.session_ttl_secs must be positive".into()));
        }
        if self.security.session_cleanup_secs == 0 {
            return Err(ConfigError::Invalid(
                "security.session_cleanup_secs must be positive".into(),
            ));
        }
        if self.database.timeout_secs == 0 {
            return Err(ConfigError::Invalid("database.timeout_secs must be positive".into()));
        }
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Invalid("database.url is empty".into()));
        }
        if self.bootstrap.superuser.is_some() != self.bootstrap.password.is_some() {
            return Err(ConfigError::Invalid(
                "bootstrap.superuser and bootstrap.password must be set together".into(),
            ));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.app.addr, self.app.port)
    }

    pub fn log_settings(&self) -> LogSettings {
        LogSettings {
            run_mode: self.app.run_mode,
            file: self.log.file.clone(),
        }
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            timeout: Duration::from_secs(self.database.timeout_secs),
            max_connections: self.database.max_connections,
        }
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database.url.trim().eq_ignore_ascii_case(MEMORY_DATABASE)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.security.session_ttl_secs)
    }

    pub fn session_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.security.session_cleanup_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn no_env() -> Environment {
        Environment::with_prefix(ENV_PREFIX).source(Some(HashMap::new()))
    }

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        Environment::with_prefix(ENV_PREFIX).source(Some(map))
    }

    #[test]
    fn defaults_apply_without_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_with(&dir.path().join("missing.yaml"), no_env()).unwrap();

        assert_eq!(settings.bind_addr(), "0.0.0.0:8080");
        assert_eq!(settings.app.run_mode, RunMode::Dev);
        assert_eq!(settings.users.page_size, 20);
        assert_eq!(settings.session_cleanup_interval(), Duration::from_secs(3600));
        assert!(!settings.uses_memory_store());
        assert!(settings.bootstrap.superuser.is_none());
    }

    #[test]
    fn yaml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keystone.yaml");
        std::fs::write(
            &path,
            r#"
app:
  run_mode: release
  port: 9090
  cors_origins:
    - "^https://admin\\.example\\.com$"
database:
  url: memory
users:
  base_password: "s3cret"
  page_size: 50
bootstrap:
  superuser: root
  password: toor
"#,
        )
        .unwrap();

        let settings = Settings::load_with(&path, no_env()).unwrap();
        assert_eq!(settings.app.run_mode, RunMode::Release);
        assert_eq!(settings.app.port, 9090);
        assert_eq!(settings.app.addr, "0.0.0.0");
        assert_eq!(settings.app.cors_origins.len(), 1);
        assert!(settings.uses_memory_store());
        assert_eq!(settings.users.base_password, "s3cret");
        assert_eq!(settings.users.page_size, 50);
        assert_eq!(settings.bootstrap.superuser.as_deref(), Some("root"));
    }

    #[test]
    fn environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keystone.yaml");
        std::fs::write(&path, "app:\n  port: 9090\n").unwrap();

        let settings = Settings::load_with(
            &path,
            env(&[
                ("KEYSTONE__APP__PORT", "7070"),
                ("KEYSTONE__APP__CORS_ORIGINS", "^https://a$,^https://b$"),
                ("KEYSTONE__SECURITY__SESSION_TTL_SECS", "60"),
            ]),
        )
        .unwrap();

        assert_eq!(settings.app.port, 7070);
        assert_eq!(settings.app.cors_origins, vec!["^https://a$", "^https://b$"]);
        assert_eq!(settings.session_ttl(), Duration::from_secs(60));
    }

    #[test]
    fn shipped_config_leaves_bootstrap_to_the_environment() {
        let shipped = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/keystone.yaml");

        let settings = Settings::load_with(&shipped, no_env()).unwrap();
        assert!(settings.bootstrap.superuser.is_none());
        assert!(settings.bootstrap.password.is_none());

        let settings = Settings::load_with(
            &shipped,
            env(&[
                ("KEYSTONE__BOOTSTRAP__SUPERUSER", "admin"),
                ("KEYSTONE__BOOTSTRAP__PASSWORD", "long-random-secret"),
            ]),
        )
        .unwrap();
        assert_eq!(settings.bootstrap.superuser.as_deref(), Some("admin"));
        assert_eq!(settings.bootstrap.password.as_deref(), Some("long-random-secret"));
    }

    #[test]
    fn half_configured_bootstrap_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keystone.yaml");
        std::fs::write(&path, "bootstrap:\n  superuser: root\n").unwrap();

        let err = Settings::load_with(&path, no_env()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let mut settings = Settings::default();
        settings.users.page_size = 0;
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
    }
}
