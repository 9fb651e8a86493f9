//! Known groups: every group the bot has seen a message from, persisted
//! to `groups.json` so the dashboard can offer them for selection.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::GroupsError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    pub id: String,
    pub name: String,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub is_selected: bool,
}

pub struct GroupCache {
    path: PathBuf,
    groups: RwLock<Vec<GroupInfo>>,
}

impl GroupCache {
    /// Load the cache file; a missing or corrupt file starts an empty cache.
    pub async fn load(path: impl Into<PathBuf>) -> Arc<Self> {
        let path = path.into();
        let groups: Vec<GroupInfo> = match tokio::fs::read_to_string(&path).await {
            Ok(data) => serde_json::from_str(&data).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Groups file unreadable, starting empty");
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };

        info!(count = groups.len(), "Known groups loaded");
        Arc::new(Self {
            path,
            groups: RwLock::new(groups),
        })
    }

    /// Note a group seen in an incoming message. New groups and renames are
    /// persisted; returns whether the group was new.
    pub async fn record(&self, id: &str, name: &str) -> Result<bool, GroupsError> {
        let mut groups = self.groups.write().await;
        let now = Utc::now();
        let is_new = !groups.iter().any(|g| g.id == id);

        if let Some(group) = groups.iter_mut().find(|g| g.id == id) {
            group.last_seen = now;
            if group.name == name {
                return Ok(false);
            }
            info!(group_id = id, group_name = name, "Group renamed");
            group.name = name.to_string();
        } else {
            info!(group_id = id, group_name = name, "New group added to cache");
            groups.push(GroupInfo {
                id: id.to_string(),
                name: name.to_string(),
                last_seen: now,
                is_selected: false,
            });
        }

        let json = serde_json::to_string_pretty(&*groups)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, json).await?;

        Ok(is_new)
    }

    /// All known groups, most recently seen first, with `is_selected`
    /// computed against the given selection.
    pub async fn list(&self, selected: &[String]) -> Vec<GroupInfo> {
        let mut groups: Vec<GroupInfo> = self
            .groups
            .read()
            .await
            .iter()
            .cloned()
            .map(|mut g| {
                g.is_selected = selected.contains(&g.id);
                g
            })
            .collect();
        groups.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        groups
    }
}
