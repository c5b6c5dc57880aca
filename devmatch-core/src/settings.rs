use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Tunables for the registry and its resolver. Loaded as the `[cache]`
/// section of the agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Extra neighbor-table scans after the first miss, each preceded by a probe.
    pub arp_retries: u32,
    /// Pause between a probe and the next scan.
    pub settle_delay_ms: u64,
    pub probe_port: u16,
    pub neighbor_table: PathBuf,
    pub dns_expiry_secs: i64,
    pub flow_expiry_secs: i64,
    pub device_stats_window_secs: i64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            arp_retries: 1,
            settle_delay_ms: 5,
            probe_port: 1900,
            neighbor_table: PathBuf::from("/proc/net/arp"),
            dns_expiry_secs: 86400,
            flow_expiry_secs: 14400,
            device_stats_window_secs: 604800,
        }
    }
}

impl CacheSettings {
    pub fn settle_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.settle_delay_ms)
    }

    pub fn dns_expiry(&self) -> Duration {
        seconds(self.dns_expiry_secs)
    }

    pub fn flow_expiry(&self) -> Duration {
        seconds(self.flow_expiry_secs)
    }

    pub fn device_stats_window(&self) -> Duration {
        seconds(self.device_stats_window_secs)
    }

    /// Expiry stamped on a DNS entry observed at `now`.
    pub fn dns_expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        expires_at(now, self.dns_expiry())
    }

    /// Expiry stamped on a flow observed at `now`.
    pub fn flow_expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        expires_at(now, self.flow_expiry())
    }
}

/// Negative values count as zero; values past chrono's range saturate.
pub fn seconds(secs: i64) -> Duration {
    Duration::try_seconds(secs.max(0)).unwrap_or(Duration::MAX)
}

pub fn expires_at(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Start of a look-back window, saturating at the earliest representable time.
pub fn window_start(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC)
}
