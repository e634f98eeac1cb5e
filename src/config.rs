use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::nav_structs::{AddressError, ServerAddress, Vec3};

pub const MIN_USERNAME_LEN: usize = 3;
pub const MAX_USERNAME_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to write config {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Server(#[from] AddressError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: SocketAddr,
    pub static_dir: PathBuf,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            static_dir: PathBuf::from("public"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub server: ServerAddress,
    pub username: String,
    pub center: Option<Vec3>,
    pub radius: f64,
    pub wander_enabled: bool,
    pub wait_min_ms: u64,
    pub wait_max_ms: u64,
    pub move_timeout_ms: u64,
    pub retry_delay_ms: u64,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
    pub teleport_threshold: f64,
    pub chat_commands: bool,
    pub seed: Option<u64>,
    pub http: HttpConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        BotConfig {
            server: ServerAddress::default(),
            username: "WanderBot".to_string(),
            center: None,
            radius: 16.0,
            wander_enabled: true,
            wait_min_ms: 2_000,
            wait_max_ms: 6_000,
            move_timeout_ms: 60_000,
            retry_delay_ms: 3_000,
            reconnect_delay_ms: 5_000,
            max_reconnect_delay_ms: 60_000,
            teleport_threshold: 8.0,
            chat_commands: true,
            seed: None,
            http: HttpConfig::default(),
        }
    }
}

impl BotConfig {
    pub fn from_json_str(json: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: BotConfig =
            serde_json::from_str(json).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents, path)
    }

    /// Loads `path`, writing the defaults there first if it doesn't exist yet.
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Self::load(path);
        }
        let config = BotConfig::default();
        config.save(path)?;
        info!(path = %path.display(), "wrote default config");
        Ok(config)
    }

    /// Writes to a sibling temp file and renames it over `path`, so a crash
    /// mid-write never leaves a truncated config behind.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(&tmp, json + "\n").map_err(write_err)?;
        fs::rename(&tmp, path).map_err(write_err)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        validate_username(&self.username)?;
        if !self.radius.is_finite() || self.radius <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "radius must be a positive number, got {}",
                self.radius
            )));
        }
        if let Some(center) = self.center {
            if !center.is_finite() {
                return Err(ConfigError::Invalid("center must be finite".to_string()));
            }
        }
        if self.wait_min_ms > self.wait_max_ms {
            return Err(ConfigError::Invalid(format!(
                "wait_min_ms ({}) exceeds wait_max_ms ({})",
                self.wait_min_ms, self.wait_max_ms
            )));
        }
        if self.move_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "move_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.max_reconnect_delay_ms < self.reconnect_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "max_reconnect_delay_ms ({}) is below reconnect_delay_ms ({})",
                self.max_reconnect_delay_ms, self.reconnect_delay_ms
            )));
        }
        if !self.teleport_threshold.is_finite() || self.teleport_threshold <= 0.0 {
            return Err(ConfigError::Invalid(
                "teleport_threshold must be a positive number".to_string(),
            ));
        }
        Ok(())
    }

    /// Delay before reconnect attempt number `failures` (0 for the first retry).
    pub fn reconnect_delay(&self, failures: u32) -> Duration {
        let factor = 1u64.checked_shl(failures.min(32)).unwrap_or(u64::MAX);
        let delay = self
            .reconnect_delay_ms
            .saturating_mul(factor)
            .min(self.max_reconnect_delay_ms);
        Duration::from_millis(delay)
    }
}

pub fn validate_username(username: &str) -> Result<(), ConfigError> {
    let len = username.chars().count();
    if !(MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&len) {
        return Err(ConfigError::Invalid(format!(
            "username must be {MIN_USERNAME_LEN}-{MAX_USERNAME_LEN} characters, got {len}"
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(ConfigError::Invalid(format!(
            "username '{username}' may only contain letters, digits and '_'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static NEXT_DIR: AtomicU32 = AtomicU32::new(0);

    fn scratch_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "wander_bot_config_{}_{}",
            std::process::id(),
            NEXT_DIR.fetch_add(1, Ordering::SeqCst)
        ));
        fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config =
            BotConfig::from_json_str(r#"{"username": "Scout_1"}"#, Path::new("x.json")).unwrap();
        assert_eq!(config.username, "Scout_1");
        assert_eq!(config.radius, 16.0);
        assert_eq!(config.server, ServerAddress::default());
        assert!(config.center.is_none());
    }

    #[test]
    fn server_port_defaults_when_omitted() {
        let config =
            BotConfig::from_json_str(r#"{"server": {"host": "mc.local"}}"#, Path::new("x.json"))
                .unwrap();
        assert_eq!(config.server.port, 25565);
    }

    #[test]
    fn load_or_create_writes_defaults_then_round_trips() {
        let path = scratch_path("config.json");
        let created = BotConfig::load_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(created, BotConfig::default());

        let mut changed = created.clone();
        changed.center = Some(Vec3::new(10.5, 64.0, -3.5));
        changed.wander_enabled = false;
        changed.save(&path).unwrap();
        assert_eq!(BotConfig::load_or_create(&path).unwrap(), changed);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn rejects_bad_values() {
        let path = Path::new("x.json");
        assert!(BotConfig::from_json_str(r#"{"radius": 0}"#, path).is_err());
        assert!(BotConfig::from_json_str(r#"{"username": "a b c"}"#, path).is_err());
        assert!(BotConfig::from_json_str(r#"{"username": "ab"}"#, path).is_err());
        assert!(
            BotConfig::from_json_str(r#"{"wait_min_ms": 10, "wait_max_ms": 5}"#, path).is_err()
        );
        assert!(BotConfig::from_json_str(r#"{"server": {"host": ""}}"#, path).is_err());
        assert!(matches!(
            BotConfig::from_json_str("{", path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn reconnect_delay_doubles_up_to_cap() {
        let config = BotConfig {
            reconnect_delay_ms: 1_000,
            max_reconnect_delay_ms: 5_000,
            ..BotConfig::default()
        };
        assert_eq!(config.reconnect_delay(0), Duration::from_secs(1));
        assert_eq!(config.reconnect_delay(1), Duration::from_secs(2));
        assert_eq!(config.reconnect_delay(2), Duration::from_secs(4));
        assert_eq!(config.reconnect_delay(3), Duration::from_secs(5));
        assert_eq!(config.reconnect_delay(200), Duration::from_secs(5));
    }
}
