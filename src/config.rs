use crate::errors::ConfigError;
use crate::models::DEFAULT_ROLE;
use crate::records::NormalizeOptions;
use crate::storage::{Backend, StorageConfig};
use crate::summary::AccountingPolicy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::{env, fs};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default = "default_users")]
    pub users: Vec<String>,
    #[serde(default = "default_tasks")]
    pub tasks: Vec<String>,
    #[serde(default)]
    pub roles: BTreeMap<String, String>,
    #[serde(default)]
    pub accounting: AccountingPolicy,
    #[serde(default)]
    pub backfill_date_from_timestamp: bool,
    #[serde(default = "default_allow_backfill")]
    pub allow_backfill: bool,
    #[serde(default = "default_inactivity_days")]
    pub inactivity_days: u32,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_users() -> Vec<String> {
    vec!["MQ".to_string(), "Samo".to_string(), "Bashe".to_string()]
}

fn default_tasks() -> Vec<String> {
    vec![
        "10 YouTube Comment Replies".to_string(),
        "Market Research".to_string(),
    ]
}

fn default_allow_backfill() -> bool {
    true
}

fn default_inactivity_days() -> u32 {
    3
}

fn default_port() -> u16 {
    8080
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            users: default_users(),
            tasks: default_tasks(),
            roles: BTreeMap::new(),
            accounting: AccountingPolicy::default(),
            backfill_date_from_timestamp: false,
            allow_backfill: default_allow_backfill(),
            inactivity_days: default_inactivity_days(),
            storage: StorageConfig::default(),
            port: default_port(),
        }
    }
}

impl TrackerConfig {
    /// Reads the JSON file named by `TRACKER_CONFIG` (defaults otherwise),
    /// then applies `APP_DATA_PATH`, `TRACKER_BACKEND` and `PORT`.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match env::var("TRACKER_CONFIG") {
            Ok(path) => {
                let text = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?;
                Self::from_json(&text)?
            }
            Err(_) => Self::default(),
        };
        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("APP_DATA_PATH") {
            self.storage.path = Some(PathBuf::from(path));
        }
        if let Some(value) = lookup("TRACKER_BACKEND") {
            self.storage.backend = Backend::parse(&value)
                .ok_or_else(|| ConfigError::Invalid(format!("unknown backend {value:?}")))?;
        }
        if let Some(port) = lookup("PORT").and_then(|value| value.parse::<u16>().ok()) {
            self.port = port;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tasks.is_empty() {
            return Err(ConfigError::Invalid("at least one task is required".into()));
        }
        if let Some(dup) = first_duplicate(&self.tasks) {
            return Err(ConfigError::Invalid(format!("duplicate task {dup:?}")));
        }
        if let Some(dup) = first_duplicate(&self.users) {
            return Err(ConfigError::Invalid(format!("duplicate user {dup:?}")));
        }
        Ok(())
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn role_for(&self, user: &str) -> &str {
        self.roles
            .get(user)
            .map(String::as_str)
            .unwrap_or(DEFAULT_ROLE)
    }

    pub fn is_known_user(&self, user: &str) -> bool {
        self.users.iter().any(|u| u == user)
    }

    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            task_count: self.task_count(),
            backfill_date_from_timestamp: self.backfill_date_from_timestamp,
        }
    }
}

fn first_duplicate(items: &[String]) -> Option<&String> {
    let mut seen = BTreeSet::new();
    items.iter().find(|item| !seen.insert(item.as_str()))
}
