//! Desired-state configuration (`keys.toml`)
//!
//! ```toml
//! [[key]]
//! name = "alice@laptop"
//! type = "ssh-ed25519"
//! key = "AAAAC3NzaC1lZDI1NTE5AAAAIOMqqnkVzrm0SdG6UOoqKLsabgH5C9okWi0dh2l9GKJl"
//! options = ["no-agent-forwarding"]
//! users = ["alice", "deploy"]
//! targets = ["/home/alice/.ssh/authorized_keys", "/srv/deploy/.ssh/authorized_keys"]
//!
//! [[key]]
//! name = "old-laptop"
//! type = "ssh-rsa"
//! key = "AAAAB3NzaC1yc2EAAAADAQABAAABAQC7"
//! ensure = "absent"
//! users = ["alice"]
//! ```
//!
//! `targets` may be omitted, in which case each user's
//! `~/.ssh/authorized_keys` is used.

use anyhow::{Context, Result, bail};
use authkeys::{Ensure, KeyRecord, ReconciliationRequest};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;

/// The whole keys file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeysConfig {
    #[serde(default, rename = "key")]
    pub keys: Vec<KeyEntry>,
}

/// Desired state as written in the config
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnsureSetting {
    #[default]
    Present,
    Absent,
}

impl From<EnsureSetting> for Ensure {
    fn from(setting: EnsureSetting) -> Self {
        match setting {
            EnsureSetting::Present => Ensure::Present,
            EnsureSetting::Absent => Ensure::Absent,
        }
    }
}

/// One `[[key]]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyEntry {
    /// Identifies the entry; written as the key comment
    pub name: String,
    #[serde(rename = "type")]
    pub key_type: String,
    /// Base64 key blob
    pub key: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub ensure: EnsureSetting,
    /// Owner of each target, in target order
    pub users: Vec<String>,
    #[serde(default)]
    pub targets: Vec<String>,
    /// Mode for a created `.ssh` directory
    #[serde(default)]
    pub dir_mode: Option<u32>,
    /// Mode for a created key file
    #[serde(default)]
    pub file_mode: Option<u32>,
}

impl KeysConfig {
    /// Load and validate the keys file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Parse and validate TOML content.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Invalid TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for entry in &self.keys {
            if !seen.insert(entry.name.as_str()) {
                bail!("duplicate key name '{}'", entry.name);
            }
            entry
                .record()
                .with_context(|| format!("key '{}'", entry.name))?;
            if !entry.targets.is_empty() && entry.targets.len() != entry.users.len() {
                bail!(
                    "key '{}': {} target(s) but {} user(s)",
                    entry.name,
                    entry.targets.len(),
                    entry.users.len()
                );
            }
            if entry.users.is_empty() {
                bail!("key '{}': at least one user is required", entry.name);
            }
        }
        Ok(())
    }
}

impl KeyEntry {
    /// The record this entry describes.
    pub fn record(&self) -> Result<KeyRecord> {
        let record = KeyRecord::new(&self.key_type, &self.key)?
            .with_options(&self.options)?
            .with_comment(&self.name)?;
        Ok(record)
    }

    /// Target paths, expanded, or each user's default file.
    pub fn target_paths<F>(&self, home_of: F) -> Result<Vec<PathBuf>>
    where
        F: Fn(&str) -> Result<PathBuf>,
    {
        if self.targets.is_empty() {
            return self
                .users
                .iter()
                .map(|user| Ok(home_of(user)?.join(".ssh").join("authorized_keys")))
                .collect();
        }
        Ok(self.targets.iter().map(|t| paths::expand(t)).collect())
    }

    /// Build the reconciliation request for this entry.
    pub fn to_request<F>(&self, home_of: F) -> Result<ReconciliationRequest>
    where
        F: Fn(&str) -> Result<PathBuf>,
    {
        let targets = self
            .target_paths(home_of)
            .with_context(|| format!("key '{}': could not resolve targets", self.name))?;
        let request = ReconciliationRequest::new(
            targets,
            self.users.clone(),
            self.ensure.into(),
            self.record()?,
        );
        request
            .validate()
            .with_context(|| format!("key '{}'", self.name))?;
        Ok(request)
    }
}

/// Home directory lookup through the account database.
#[cfg(unix)]
pub fn account_home(user: &str) -> Result<PathBuf> {
    Ok(authkeys::home_dir_of(user)?)
}

#[cfg(not(unix))]
pub fn account_home(user: &str) -> Result<PathBuf> {
    bail!("cannot look up the home of '{user}' on this platform; set `targets` explicitly")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[key]]
name = "alice@laptop"
type = "ssh-ed25519"
key = "AAAAC3NzaC1lZDI1NTE5"
options = ["no-pty", "from=10.0.0.1,10.0.0.2"]
users = ["alice", "deploy"]
targets = ["/home/alice/.ssh/authorized_keys", "/srv/deploy/.ssh/authorized_keys"]
file_mode = 0o640

[[key]]
name = "old-laptop"
type = "ssh-rsa"
key = "AAAAB3NzaC1yc2E"
options = ["no-pty"]
ensure = "absent"
users = ["alice"]
"#;

    fn fake_home(user: &str) -> Result<PathBuf> {
        Ok(PathBuf::from("/home").join(user))
    }

    #[test]
    fn test_parse_sample() {
        let config = KeysConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.keys.len(), 2);
        assert_eq!(config.keys[0].ensure, EnsureSetting::Present);
        assert_eq!(config.keys[0].file_mode, Some(0o640));
        assert_eq!(config.keys[1].ensure, EnsureSetting::Absent);
    }

    #[test]
    fn test_entry_to_request() {
        let config = KeysConfig::parse(SAMPLE).unwrap();
        let request = config.keys[0].to_request(fake_home).unwrap();

        assert_eq!(request.ensure, Ensure::Present);
        assert_eq!(request.owners, ["alice", "deploy"]);
        assert_eq!(
            request.targets[1],
            PathBuf::from("/srv/deploy/.ssh/authorized_keys")
        );
        assert_eq!(request.key.comment(), "alice@laptop");
        assert_eq!(request.key.options(), ["no-pty", "from=\"10.0.0.1,10.0.0.2\""]);
    }

    #[test]
    fn test_default_targets_come_from_home() {
        let config = KeysConfig::parse(SAMPLE).unwrap();
        let request = config.keys[1].to_request(fake_home).unwrap();

        assert_eq!(
            request.targets,
            [PathBuf::from("/home/alice/.ssh/authorized_keys")]
        );
        assert!(request.key.options().is_empty());
    }

    #[test]
    fn test_rejects_target_user_mismatch() {
        let content = r#"
[[key]]
name = "k"
type = "ssh-rsa"
key = "AAAAB3NzaC1yc2E"
users = ["alice"]
targets = ["/a", "/b"]
"#;
        let err = KeysConfig::parse(content).unwrap_err();
        assert!(err.to_string().contains("2 target(s) but 1 user(s)"));
    }

    #[test]
    fn test_rejects_bad_record_and_unknown_fields() {
        let bad_type = r#"
[[key]]
name = "k"
type = "ssh-foo"
key = "AAAA"
users = ["alice"]
"#;
        assert!(KeysConfig::parse(bad_type).is_err());

        let unknown = r#"
[[key]]
name = "k"
type = "ssh-rsa"
key = "AAAA"
user = ["alice"]
"#;
        assert!(KeysConfig::parse(unknown).is_err());
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let content = r#"
[[key]]
name = "k"
type = "ssh-rsa"
key = "AAAA"
users = ["alice"]

[[key]]
name = "k"
type = "ssh-rsa"
key = "BBBB"
users = ["bob"]
"#;
        let err = KeysConfig::parse(content).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_empty_config() {
        let config = KeysConfig::parse("").unwrap();
        assert!(config.keys.is_empty());
    }
}
