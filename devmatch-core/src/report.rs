use serde::Serialize;
use serde_json::Value;

pub const DEVICE_STATS_API: &str = "/v1/uploaddevices";
pub const TRAFFIC_STATS_API: &str = "/v1/uploadstats";

/// Bulk payload for the upload transport, built under the registry lock and
/// sent after it is released.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub api: &'static str,
    pub entries: Vec<Value>,
}

impl StatsReport {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
