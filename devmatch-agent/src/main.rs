//! devmatch agent - keeps the device registry current
//!
//! Runs the periodic jobs around the host registry:
//! - device profile matching
//! - expiry of DNS and flow evidence
//! - export of the device matches file
//! - optional upload of device and traffic statistics

mod config;
mod discovery;
mod uploader;

use anyhow::{Context, Result};
use config::AgentConfig;
use devmatch_core::{HostCache, SharedHostCache};
use discovery::LocalAddresses;
use serde_json::Value;
use std::path::Path;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use uploader::Uploader;

const DEFAULT_LOG_FILTER: &str = "devmatch_core=info,devmatch_agent=info";

struct Agent {
    config: AgentConfig,
    cache: SharedHostCache,
    uploader: Option<Uploader>,
}

impl Agent {
    async fn new(config: AgentConfig) -> Result<Self> {
        info!("Initializing devmatch agent v{}", env!("CARGO_PKG_VERSION"));

        let cache = SharedHostCache::new(HostCache::with_settings(config.cache.clone()));
        let uploader = if config.upload.is_active() {
            Some(Uploader::new(&config.upload)?)
        } else {
            None
        };
        let agent = Self { config, cache, uploader };

        agent.load_profiles().await;
        agent.apply_whitelist();
        agent.import_matches().await;
        Ok(agent)
    }

    async fn load_profiles(&self) -> usize {
        let path = &self.config.files.device_profiles;
        match read_document(path).await {
            Ok(Some(document)) => self.cache.load_profiles(&document),
            Ok(None) => {
                warn!(path = %path.display(), "No device profiles file, nothing will match");
                0
            }
            Err(e) => {
                error!("Failed to load device profiles: {:#}", e);
                0
            }
        }
    }

    fn apply_whitelist(&self) -> usize {
        let configured = &self.config.whitelist;
        let local = if configured.whitelist_local_interfaces {
            LocalAddresses::discover().unwrap_or_else(|e| {
                warn!("Local interfaces not whitelisted: {:#}", e);
                LocalAddresses::default()
            })
        } else {
            LocalAddresses::default()
        };
        let (ipv4, ipv6, macs) =
            local.merged_with(&configured.ipv4, &configured.ipv6, &configured.mac);
        self.cache.set_whitelist(&ipv4, &ipv6, &macs)
    }

    async fn import_matches(&self) -> usize {
        let path = &self.config.files.device_matches;
        match read_document(path).await {
            Ok(Some(document)) => self.cache.import_matches(&document),
            Ok(None) => {
                debug!(path = %path.display(), "No previous device matches to import");
                0
            }
            Err(e) => {
                error!("Failed to import device matches: {:#}", e);
                0
            }
        }
    }

    fn export_matches(&self) {
        let path = &self.config.files.device_matches;
        match self.cache.export_matches_file(path, self.config.files.export_detailed) {
            Ok(count) => debug!(path = %path.display(), count, "Device matches exported"),
            Err(e) => error!("Failed to export device matches: {}", e),
        }
    }

    async fn upload_stats(&self) {
        let Some(uploader) = &self.uploader else { return };
        let reports = [
            self.cache.device_stats_report(),
            self.cache.traffic_stats_report(self.config.upload.traffic_interval()),
        ];
        for report in &reports {
            if let Err(e) = uploader.upload(report).await {
                error!("Failed to upload {}: {:#}", report.api, e);
            }
        }
    }

    async fn run(&self) -> Result<()> {
        info!("Starting agent main loop...");
        let schedule = &self.config.schedule;
        let mut match_timer = interval(schedule.match_every());
        let mut prune_timer = interval(schedule.prune_every());
        let mut export_timer = interval(schedule.export_every());
        let mut upload_timer = interval(schedule.upload_every());
        for timer in [&mut match_timer, &mut prune_timer, &mut export_timer, &mut upload_timer] {
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        loop {
            tokio::select! {
                _ = match_timer.tick() => {
                    self.cache.match_all();
                }
                _ = prune_timer.tick() => {
                    self.cache.prune(false);
                }
                _ = export_timer.tick() => {
                    self.export_matches();
                }
                _ = upload_timer.tick() => {
                    self.upload_stats().await;
                }
                signal = tokio::signal::ctrl_c() => {
                    signal.context("Failed to listen for shutdown signal")?;
                    info!("Shutdown requested, writing final device matches");
                    self.export_matches();
                    return Ok(());
                }
            }
        }
    }
}

/// `None` when the file does not exist.
async fn read_document(path: &Path) -> Result<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let document = serde_json::from_str(&content)
        .with_context(|| format!("Invalid JSON in {}", path.display()))?;
    Ok(Some(document))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    info!("devmatch agent starting...");
    let config = AgentConfig::load().await.context("Failed to load configuration")?;
    let agent = Agent::new(config).await.context("Failed to create agent")?;
    agent.run().await.context("Agent execution failed")?;
    Ok(())
}
