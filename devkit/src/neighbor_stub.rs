/*!
Scripted neighbor table

Stands in for /proc/net/arp. Entries can be present from the start or only
show up after a number of probes, which mimics the kernel learning the MAC
once the probe packet went out. Every scan and probe is recorded.
*/

use devmatch_core::{normalize_mac, NeighborTable, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;

#[derive(Debug, Clone)]
struct ScriptedEntry {
    mac: String,
    probes_needed: u32,
}

#[derive(Debug, Default)]
pub struct ScriptedNeighborTable {
    entries: Mutex<HashMap<IpAddr, ScriptedEntry>>,
    probes: Mutex<HashMap<IpAddr, u32>>,
    scans: Mutex<Vec<IpAddr>>,
    probe_log: Mutex<Vec<(IpAddr, u16)>>,
}

impl ScriptedNeighborTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry visible on the first scan.
    pub fn with_entry(self, ip: &str, mac: &str) -> Self {
        self.insert(ip, mac, 0);
        self
    }

    /// Entry visible only after `probes` probes were sent to `ip`.
    pub fn with_late_entry(self, ip: &str, mac: &str, probes: u32) -> Self {
        self.insert(ip, mac, probes);
        self
    }

    pub fn insert(&self, ip: &str, mac: &str, probes_needed: u32) {
        let Ok(addr) = ip.parse::<IpAddr>() else { return };
        self.entries.lock().insert(
            addr,
            ScriptedEntry {
                mac: normalize_mac(mac),
                probes_needed,
            },
        );
    }

    pub fn remove(&self, ip: &str) {
        if let Ok(addr) = ip.parse::<IpAddr>() {
            self.entries.lock().remove(&addr);
        }
    }

    pub fn scan_count(&self) -> usize {
        self.scans.lock().len()
    }

    pub fn scans_for(&self, ip: &str) -> usize {
        let Ok(addr) = ip.parse::<IpAddr>() else { return 0 };
        self.scans.lock().iter().filter(|scanned| **scanned == addr).count()
    }

    pub fn probes_sent(&self) -> Vec<(IpAddr, u16)> {
        self.probe_log.lock().clone()
    }

    pub fn reset_counters(&self) {
        self.scans.lock().clear();
        self.probe_log.lock().clear();
        self.probes.lock().clear();
    }
}

impl NeighborTable for ScriptedNeighborTable {
    fn scan(&self, ip: &IpAddr) -> Result<Option<String>> {
        self.scans.lock().push(*ip);
        let probed = self.probes.lock().get(ip).copied().unwrap_or(0);
        Ok(self
            .entries
            .lock()
            .get(ip)
            .filter(|entry| probed >= entry.probes_needed)
            .map(|entry| entry.mac.clone()))
    }

    fn probe(&self, ip: &IpAddr, port: u16) -> Result<()> {
        *self.probes.lock().entry(*ip).or_insert(0) += 1;
        self.probe_log.lock().push((*ip, port));
        Ok(())
    }
}
