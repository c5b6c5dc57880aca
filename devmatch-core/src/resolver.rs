//! IP -> MAC resolution through the system neighbor table.
//!
//! A miss triggers a single UDP probe to the target (port 1900 by default) so
//! the kernel populates its ARP entry, then a short pause and another scan.

use crate::error::{CoreError, Result};
use crate::evidence::normalize_mac;
use crate::settings::CacheSettings;
use std::fs;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Non-functional probe payload; only the ARP side effect matters.
pub const PROBE_PAYLOAD: &[u8] = b"devmatch neighbor probe";

const ZERO_MAC: &str = "00:00:00:00:00:00";

/// Source of neighbor entries.
pub trait NeighborTable: Send + Sync {
    /// One scan of the table for `ip`; `None` when there is no usable entry.
    fn scan(&self, ip: &IpAddr) -> Result<Option<String>>;

    /// Best-effort packet meant to populate the table for `ip`.
    fn probe(&self, ip: &IpAddr, port: u16) -> Result<()>;
}

/// Linux `/proc/net/arp` reader.
#[derive(Debug, Clone)]
pub struct ProcNeighborTable {
    path: PathBuf,
}

impl ProcNeighborTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for ProcNeighborTable {
    fn default() -> Self {
        Self::new("/proc/net/arp")
    }
}

impl NeighborTable for ProcNeighborTable {
    fn scan(&self, ip: &IpAddr) -> Result<Option<String>> {
        let content = fs::read_to_string(&self.path).map_err(|source| CoreError::FileRead {
            path: self.path.clone(),
            source,
        })?;
        Ok(parse_neighbor_table(&content, ip))
    }

    fn probe(&self, ip: &IpAddr, port: u16) -> Result<()> {
        send_udp_probe(ip, port)
    }
}

/// Finds the hardware address for `ip` in `/proc/net/arp` formatted text.
///
/// ```text
/// IP address       HW type     Flags       HW address            Mask     Device
/// 192.168.1.1      0x1         0x2         aa:bb:cc:dd:ee:ff     *        eth0
/// ```
pub fn parse_neighbor_table(content: &str, ip: &IpAddr) -> Option<String> {
    content.lines().skip(1).find_map(|line| {
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() < 4 {
            return None;
        }
        let entry_ip = cols[0].parse::<IpAddr>().ok()?;
        let mac = normalize_mac(cols[3]);
        (entry_ip == *ip && mac != ZERO_MAC).then_some(mac)
    })
}

/// Sends `PROBE_PAYLOAD` to `ip:port`. The socket lives for this call only.
pub fn send_udp_probe(ip: &IpAddr, port: u16) -> Result<()> {
    let bind_addr: SocketAddr = match ip {
        IpAddr::V4(_) => ([0, 0, 0, 0], 0).into(),
        IpAddr::V6(_) => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let sock = UdpSocket::bind(bind_addr)?;
    let sent = sock.send_to(PROBE_PAYLOAD, SocketAddr::new(*ip, port))?;
    if sent != PROBE_PAYLOAD.len() {
        warn!(ip = %ip, sent, "Mismatch in number of bytes sent");
    }
    Ok(())
}

pub fn parse_ip(ip: &str) -> Result<IpAddr> {
    ip.trim()
        .parse::<IpAddr>()
        .map_err(|_| CoreError::InvalidAddress(ip.to_string()))
}

/// Result of a resolution attempt; `scans` counts table reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub mac: Option<String>,
    pub scans: u32,
}

impl Resolution {
    fn miss(scans: u32) -> Self {
        Self { mac: None, scans }
    }
}

#[derive(Clone)]
pub struct Resolver {
    table: Arc<dyn NeighborTable>,
    retries: u32,
    settle: Duration,
    probe_port: u16,
}

impl Resolver {
    pub fn new(table: Arc<dyn NeighborTable>, settings: &CacheSettings) -> Self {
        Self {
            table,
            retries: settings.arp_retries,
            settle: settings.settle_delay(),
            probe_port: settings.probe_port,
        }
    }

    /// Resolver over the configured `/proc/net/arp` path.
    pub fn system(settings: &CacheSettings) -> Self {
        Self::new(Arc::new(ProcNeighborTable::new(&settings.neighbor_table)), settings)
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Resolves with the configured retry count.
    pub fn lookup(&self, ip: &str) -> Resolution {
        self.resolve(ip, self.retries)
    }

    /// At most `retries + 1` scans. Blocks for the settle delay between them.
    pub fn resolve(&self, ip: &str, retries: u32) -> Resolution {
        let addr = match parse_ip(ip) {
            Ok(addr) => addr,
            Err(e) => {
                error!("Cannot resolve: {}", e);
                return Resolution::miss(0);
            }
        };

        let mut scans = 0;
        let mut remaining = retries;
        loop {
            scans += 1;
            match self.table.scan(&addr) {
                Ok(Some(mac)) => return Resolution { mac: Some(mac), scans },
                Ok(None) => {}
                Err(e) => {
                    error!(ip = %ip, "Neighbor table lookup failed: {}", e);
                    return Resolution::miss(scans);
                }
            }

            if remaining == 0 {
                debug!(ip = %ip, scans, "Couldn't find ARP entry");
                return Resolution::miss(scans);
            }
            remaining -= 1;

            debug!(ip = %ip, "Additional ARP lookup");
            if let Err(e) = self.table.probe(&addr, self.probe_port) {
                debug!(ip = %ip, "Probe failed: {}", e);
            }
            if !self.settle.is_zero() {
                std::thread::sleep(self.settle);
            }
        }
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("retries", &self.retries)
            .field("settle", &self.settle)
            .field("probe_port", &self.probe_port)
            .finish()
    }
}
