//! Configuration types.
//!
//! Two layers: [`ServerConfig`] comes from environment variables at startup,
//! [`BotConfig`] lives in a JSON file that the dashboard edits at runtime
//! through [`ConfigStore`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::engine::FillOptions;
use crate::error::ConfigError;

/// Runtime bot settings, persisted as `config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BotConfig {
    /// Groups the bot is allowed to act in.
    pub selected_groups: Vec<String>,
    /// Global roster.
    pub members_to_add: Vec<String>,
    /// Words that mark a message as a sign-up list.
    pub keywords: Vec<String>,
    /// Quote the original message instead of posting a fresh one.
    pub reply_mode: bool,
    /// Pause before sending, in milliseconds.
    pub delay_ms: u64,
    /// Queue results for dashboard approval instead of sending.
    pub require_confirmation: bool,
    pub add_to_waitlist: bool,
    /// Process the bot account's own messages (for testing in a live group).
    pub self_test_mode: bool,
    /// Per-group rosters; an entry replaces the global roster for that group.
    pub group_members: HashMap<String, Vec<String>>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            selected_groups: Vec::new(),
            members_to_add: vec!["Your name".into(), "Friend 2".into(), "Friend 3".into()],
            keywords: vec!["כדורגל".into(), "מגרש".into(), "יום".into()],
            reply_mode: true,
            delay_ms: 2000,
            require_confirmation: false,
            add_to_waitlist: true,
            self_test_mode: false,
            group_members: HashMap::new(),
        }
    }
}

impl BotConfig {
    /// The roster for a group: its override if one exists, else the global list.
    pub fn roster_for(&self, group_id: Option<&str>) -> &[String] {
        match group_id.and_then(|id| self.group_members.get(id)) {
            Some(members) => {
                debug!(group_id = ?group_id, "Using group-specific roster");
                members
            }
            None => {
                debug!(group_id = ?group_id, "Using global roster");
                &self.members_to_add
            }
        }
    }

    pub fn is_selected(&self, group_id: &str) -> bool {
        self.selected_groups.iter().any(|g| g == group_id)
    }

    pub fn fill_options(&self) -> FillOptions {
        FillOptions {
            add_to_waitlist: self.add_to_waitlist,
        }
    }
}

/// File-backed, lock-protected [`BotConfig`].
pub struct ConfigStore {
    path: PathBuf,
    config: RwLock<BotConfig>,
}

impl ConfigStore {
    /// Load the config file, writing defaults if it is missing or unreadable.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Arc<Self>, ConfigError> {
        let path = path.into();
        let config = match tokio::fs::read_to_string(&path).await {
            Ok(data) => match serde_json::from_str::<BotConfig>(&data) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Config file unreadable, using defaults");
                    None
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "No config file, creating defaults");
                None
            }
        };

        let store = match config {
            Some(config) => Self {
                path,
                config: RwLock::new(config),
            },
            None => {
                let store = Self {
                    path,
                    config: RwLock::new(BotConfig::default()),
                };
                store.save().await?;
                store
            }
        };

        info!(path = %store.path.display(), "Configuration loaded");
        Ok(Arc::new(store))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Owned copy of the current config. No lock is held afterwards.
    pub async fn snapshot(&self) -> BotConfig {
        self.config.read().await.clone()
    }

    /// Write the current config to disk.
    pub async fn save(&self) -> Result<(), ConfigError> {
        let config = self.config.read().await;
        write_config(&self.path, &config).await
    }

    /// Mutate under the write lock, then persist. Returns the new config.
    async fn update<F>(&self, f: F) -> Result<BotConfig, ConfigError>
    where
        F: FnOnce(&mut BotConfig) -> Result<(), ConfigError>,
    {
        let mut config = self.config.write().await;
        let mut next = config.clone();
        f(&mut next)?;
        write_config(&self.path, &next).await?;
        *config = next.clone();
        Ok(next)
    }

    /// Shallow-merge a partial JSON object over the current config.
    pub async fn apply_patch(&self, patch: serde_json::Value) -> Result<BotConfig, ConfigError> {
        let serde_json::Value::Object(fields) = patch else {
            return Err(ConfigError::InvalidValue {
                key: "config".into(),
                message: "expected a JSON object".into(),
            });
        };
        if fields.get("membersToAdd").is_some_and(|v| !v.is_array()) {
            return Err(ConfigError::InvalidValue {
                key: "membersToAdd".into(),
                message: "must be an array".into(),
            });
        }

        self.update(|config| {
            let mut merged = serde_json::to_value(&*config)?;
            if let Some(target) = merged.as_object_mut() {
                target.extend(fields);
            }
            let next: BotConfig = serde_json::from_value(merged)?;
            validate_roster("membersToAdd", &next.members_to_add)?;
            for members in next.group_members.values() {
                validate_roster("groupMembers", members)?;
            }
            *config = next;
            Ok(())
        })
        .await
    }

    /// Replace the global roster.
    pub async fn set_members(&self, members: Vec<String>) -> Result<BotConfig, ConfigError> {
        validate_roster("members", &members)?;
        self.update(|config| {
            config.members_to_add = members;
            Ok(())
        })
        .await
    }

    pub async fn set_selected_groups(&self, groups: Vec<String>) -> Result<BotConfig, ConfigError> {
        self.update(|config| {
            config.selected_groups = groups;
            Ok(())
        })
        .await
    }

    /// Set a group's roster override, or remove it with `None`.
    pub async fn set_group_members(
        &self,
        group_id: &str,
        members: Option<Vec<String>>,
    ) -> Result<BotConfig, ConfigError> {
        if let Some(members) = &members {
            validate_roster("members", members)?;
        }
        self.update(|config| {
            match members {
                Some(members) => {
                    config.group_members.insert(group_id.to_string(), members);
                }
                None => {
                    config.group_members.remove(group_id);
                }
            }
            Ok(())
        })
        .await
    }
}

/// Each roster name fills exactly one list line.
fn validate_roster(key: &str, members: &[String]) -> Result<(), ConfigError> {
    match members.iter().find(|m| m.contains(['\n', '\r'])) {
        Some(name) => Err(ConfigError::InvalidValue {
            key: key.into(),
            message: format!("name {name:?} contains a line break"),
        }),
        None => Ok(()),
    }
}

async fn write_config(path: &Path, config: &BotConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(config)?;
    tokio::fs::write(path, json).await?;
    debug!(path = %path.display(), "Configuration saved");
    Ok(())
}

/// Process-level settings read from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub config_path: PathBuf,
    pub groups_path: PathBuf,
    /// Directory for daily rolling log files, if file logging is wanted.
    pub log_dir: Option<PathBuf>,
    pub telegram_token: Option<SecretString>,
    pub cli_enabled: bool,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let port: u16 = std::env::var("LINEUP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .unwrap_or(3000);

        let cli_enabled = std::env::var("LINEUP_CLI")
            .map(|v| !matches!(v.trim().to_lowercase().as_str(), "0" | "false" | "off"))
            .unwrap_or(true);

        Self {
            host: std::env::var("LINEUP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port,
            config_path: std::env::var("LINEUP_CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./config.json")),
            groups_path: std::env::var("LINEUP_GROUPS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./groups.json")),
            log_dir: std::env::var("LINEUP_LOG_DIR").ok().map(PathBuf::from),
            telegram_token: std::env::var("TELEGRAM_BOT_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty())
                .map(SecretString::from),
            cli_enabled,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
