//! Agent configuration
//!
//! Handles:
//! - registry tunables (`[cache]`)
//! - profile and match file locations (`[files]`)
//! - static whitelist and local interface exemption (`[whitelist]`)
//! - job intervals (`[schedule]`) and the upload endpoint (`[upload]`)

use anyhow::{Context, Result};
use devmatch_core::CacheSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "DEVMATCH_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub cache: CacheSettings,
    pub files: FilesConfig,
    pub whitelist: WhitelistConfig,
    pub schedule: ScheduleConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    pub device_profiles: PathBuf,
    pub device_matches: PathBuf,
    /// Include evidence details in the match export.
    pub export_detailed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhitelistConfig {
    pub ipv4: Vec<String>,
    pub ipv6: Vec<String>,
    pub mac: Vec<String>,
    pub whitelist_local_interfaces: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub match_interval_secs: u64,
    pub prune_interval_secs: u64,
    pub export_interval_secs: u64,
    pub upload_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub enabled: bool,
    pub api_base: String,
    pub client_cert_fingerprint: String,
    /// Look-back window of the traffic stats report.
    pub traffic_interval_secs: i64,
    pub timeout_secs: u64,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            device_profiles: PathBuf::from("/var/lib/devmatch/DeviceProfiles.json"),
            device_matches: PathBuf::from("/var/lib/devmatch/DeviceMatches.json"),
            export_detailed: false,
        }
    }
}

impl Default for WhitelistConfig {
    fn default() -> Self {
        Self {
            ipv4: Vec::new(),
            ipv6: Vec::new(),
            mac: Vec::new(),
            whitelist_local_interfaces: true,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            match_interval_secs: 300,
            prune_interval_secs: 3600,
            export_interval_secs: 600,
            upload_interval_secs: 3600,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_base: String::new(),
            client_cert_fingerprint: String::new(),
            traffic_interval_secs: 3600,
            timeout_secs: 30,
        }
    }
}

impl ScheduleConfig {
    pub fn match_every(&self) -> Duration {
        every(self.match_interval_secs)
    }

    pub fn prune_every(&self) -> Duration {
        every(self.prune_interval_secs)
    }

    pub fn export_every(&self) -> Duration {
        every(self.export_interval_secs)
    }

    pub fn upload_every(&self) -> Duration {
        every(self.upload_interval_secs)
    }
}

// tokio intervals panic on a zero period
fn every(secs: u64) -> Duration {
    Duration::from_secs(secs.max(1))
}

impl UploadConfig {
    pub fn traffic_interval(&self) -> chrono::Duration {
        devmatch_core::settings::seconds(self.traffic_interval_secs)
    }

    /// Uploads need an endpoint; a missing one disables them.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.api_base.trim().is_empty()
    }
}

impl AgentConfig {
    /// `$DEVMATCH_CONFIG`, else the OS config location, else defaults.
    pub async fn load() -> Result<Self> {
        let path = match std::env::var_os(CONFIG_ENV) {
            Some(path) => PathBuf::from(path),
            None => match Self::config_file_path() {
                Ok(path) => path,
                Err(_) => return Ok(Self::default()),
            },
        };
        Self::load_from(&path).await
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn config_file_path() -> Result<PathBuf> {
        let mut path =
            dirs::config_dir().ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        path.push("devmatch");
        path.push("config.toml");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AgentConfig::load_from(&dir.path().join("absent.toml")).await.unwrap();
        assert_eq!(config.cache.arp_retries, 1);
        assert_eq!(config.schedule.match_interval_secs, 300);
        assert!(config.whitelist.whitelist_local_interfaces);
        assert!(!config.upload.is_active());
    }

    #[tokio::test]
    async fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[cache]
arp_retries = 3

[whitelist]
ipv4 = ["192.168.1.1"]
mac = ["AA:BB:CC:DD:EE:FF"]
whitelist_local_interfaces = false

[upload]
enabled = true
api_base = "https://uploads.example.net"
"#,
        )
        .unwrap();

        let config = AgentConfig::load_from(&path).await.unwrap();
        assert_eq!(config.cache.arp_retries, 3);
        assert_eq!(config.cache.probe_port, 1900);
        assert_eq!(config.whitelist.ipv4, vec!["192.168.1.1"]);
        assert!(!config.whitelist.whitelist_local_interfaces);
        assert!(config.upload.is_active());
        assert_eq!(config.upload.traffic_interval_secs, 3600);
        assert_eq!(
            config.files.device_matches,
            PathBuf::from("/var/lib/devmatch/DeviceMatches.json")
        );
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[cache\narp_retries = ").unwrap();
        assert!(AgentConfig::load_from(&path).await.is_err());
    }

    #[test]
    fn test_zero_interval_clamped() {
        let schedule = ScheduleConfig {
            match_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(schedule.match_every(), Duration::from_secs(1));
    }

    #[test]
    fn test_traffic_interval_saturates() {
        let mut upload = UploadConfig {
            traffic_interval_secs: i64::MAX,
            ..Default::default()
        };
        assert_eq!(upload.traffic_interval(), chrono::Duration::MAX);
        upload.traffic_interval_secs = -5;
        assert_eq!(upload.traffic_interval(), chrono::Duration::zero());
    }
}
