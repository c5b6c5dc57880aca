/*!
Test harness for the host registry

- HostCache wired to a ScriptedNeighborTable (no settle delay)
- log capture through the libtest writer
- the DNS ingestion regression fixture
*/

use crate::neighbor_stub::ScriptedNeighborTable;
use chrono::{DateTime, Duration, Utc};
use devmatch_core::{CacheSettings, HostCache, Resolver, SharedHostCache};
use std::sync::Arc;

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct CacheHarness {
    pub cache: HostCache,
    pub table: Arc<ScriptedNeighborTable>,
}

impl CacheHarness {
    pub fn new() -> Self {
        Self::with_table(ScriptedNeighborTable::new())
    }

    pub fn with_table(table: ScriptedNeighborTable) -> Self {
        Self::with_settings(table, quick_settings(1))
    }

    pub fn with_settings(table: ScriptedNeighborTable, settings: CacheSettings) -> Self {
        init_test_logging();
        let table = Arc::new(table);
        let resolver = Resolver::new(table.clone(), &settings);
        Self {
            cache: HostCache::new(resolver, settings),
            table,
        }
    }

    pub fn shared(self) -> (SharedHostCache, Arc<ScriptedNeighborTable>) {
        (SharedHostCache::new(self.cache), self.table)
    }
}

impl Default for CacheHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Default settings with no settle delay.
pub fn quick_settings(arp_retries: u32) -> CacheSettings {
    CacheSettings {
        arp_retries,
        settle_delay_ms: 0,
        ..Default::default()
    }
}

/// DNS expiry one day out, as the log ingestion uses.
pub fn dns_expiry() -> DateTime<Utc> {
    Utc::now() + Duration::seconds(86400)
}

/// Captured DNS traffic from a home network replayed as ingestion calls.
///
/// Five hosts are registered by MAC up front; two later registration
/// attempts reuse a MAC and are refused. Three clients are only reachable
/// through the neighbor table.
pub struct DnsFixture {
    pub harness: CacheHarness,
    pub add_by_mac_results: Vec<bool>,
    pub accepted_queries: usize,
    pub expected_hosts: usize,
    pub expected_counts: Vec<(&'static str, usize)>,
}

const BOOTSTRAP: &[(&str, &str)] = &[
    ("00:00:00:00:00:01", "192.168.1.232"),
    ("00:00:00:00:00:02", "192.168.1.98"),
    ("00:00:00:00:00:03", "192.168.1.99"),
    ("00:00:00:00:00:04", "192.168.1.235"),
    ("00:00:00:00:00:05", "192.168.1.241"),
    ("00:00:00:00:00:05", "192.168.1.251"),
    ("00:00:00:00:00:05", "192.168.1.234"),
];

const NEIGHBORS: &[(&str, &str)] = &[
    ("192.168.1.234", "00:00:00:00:00:06"),
    ("192.168.1.251", "00:00:00:00:00:07"),
    ("192.168.1.240", "00:00:00:00:00:08"),
];

/// (client, queried name, answer) in capture order.
const QUERIES: &[(&str, &str, &str)] = &[
    ("192.168.1.241", "clients4.google.com", "172.217.6.46"),
    ("192.168.1.241", "www.google.com", "172.217.5.100"),
    ("192.168.1.232", "api.amazon.com", "54.239.25.200"),
    ("192.168.1.241", "clients4.google.com", "172.217.6.46"),
    ("192.168.1.98", "time.apple.com", "17.253.4.125"),
    ("192.168.1.241", "mtalk.google.com", "74.125.28.188"),
    ("192.168.1.235", "diagnostics.meethue.com", "52.44.246.12"),
    ("192.168.1.241", "android.clients.google.com", "172.217.6.78"),
    ("192.168.1.241", "play.googleapis.com", "172.217.6.42"),
    ("192.168.1.232", "device-metrics-us.amazon.com", "52.94.233.98"),
    ("192.168.1.98", "gsp-ssl.ls.apple.com", "17.253.21.204"),
    ("192.168.1.241", "www.gstatic.com", "172.217.6.35"),
    ("192.168.1.234", "updates.sonos.com", "54.192.7.88"),
    ("192.168.1.241", "connectivitycheck.gstatic.com", "172.217.6.67"),
    ("192.168.1.251", "ntp.ubuntu.com", "91.189.89.199"),
    ("192.168.1.241", "clients4.google.com", "172.217.6.46"),
    ("192.168.1.99", "pool.ntp.org", "45.79.1.70"),
    ("192.168.1.241", "www.googleapis.com", "172.217.6.42"),
    ("192.168.1.240", "wpad.home", ""),
    ("192.168.1.235", "ws.meethue.com", "52.44.246.13"),
    ("192.168.1.241", "fonts.gstatic.com", "172.217.6.35"),
    ("192.168.1.232", "api.amazonalexa.com", "52.94.228.167"),
    ("192.168.1.241", "clients1.google.com", "172.217.6.46"),
    ("192.168.1.98", "init.itunes.apple.com", "23.45.180.155"),
    ("192.168.1.241", "ssl.gstatic.com", "172.217.6.35"),
    ("192.168.1.241", "www.google.com", "172.217.5.100"),
    ("192.168.1.251", "archive.ubuntu.com", "91.189.88.149"),
    ("192.168.1.241", "accounts.google.com", "172.217.6.45"),
    ("192.168.1.240", "wpad.home", ""),
    ("192.168.1.235", "bridge.meethue.com", "52.44.246.14"),
    ("192.168.1.241", "mtalk.google.com", "74.125.28.188"),
    ("192.168.1.232", "spectrum.s3.amazonaws.com", "52.216.225.64"),
    ("192.168.1.241", "clients4.google.com", "172.217.6.46"),
    ("192.168.1.98", "configuration.apple.com", "23.45.181.11"),
    ("192.168.1.241", "www.gstatic.com", "172.217.6.35"),
    ("192.168.1.241", "youtubei.googleapis.com", "172.217.6.42"),
    ("192.168.1.241", "i.ytimg.com", "172.217.6.54"),
    ("192.168.1.240", "wpad.home", ""),
    ("192.168.1.241", "clients4.google.com", "172.217.6.46"),
];

/// Registry after replaying the capture; counts are per client IP.
pub fn dns_regression_fixture() -> DnsFixture {
    let mut table = ScriptedNeighborTable::new();
    for (ip, mac) in NEIGHBORS {
        table = table.with_entry(ip, mac);
    }
    let mut harness = CacheHarness::with_table(table);

    let add_by_mac_results = BOOTSTRAP
        .iter()
        .map(|(mac, ip)| harness.cache.add_by_mac(mac, ip))
        .collect();

    let expire = dns_expiry();
    let accepted_queries = QUERIES
        .iter()
        .filter(|(client, fqdn, answer)| {
            harness.cache.add_dns_query_ip(client, fqdn, answer, expire)
        })
        .count();

    DnsFixture {
        harness,
        add_by_mac_results,
        accepted_queries,
        expected_hosts: 8,
        expected_counts: vec![
            ("192.168.1.232", 4),
            ("192.168.1.98", 4),
            ("192.168.1.241", 21),
            ("192.168.1.99", 1),
            ("192.168.1.234", 1),
            ("192.168.1.235", 3),
            ("192.168.1.251", 2),
            ("192.168.1.240", 3),
        ],
    }
}
