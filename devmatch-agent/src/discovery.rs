//! Local interface discovery
//!
//! The agent's own addresses are whitelisted so the machine running it is
//! never tracked as a device.

use anyhow::{Context, Result};
use devmatch_core::normalize_mac;
use if_addrs::{get_if_addrs, IfAddr};
use std::collections::BTreeSet;
use std::net::IpAddr;
use tracing::{debug, info};

/// One address of a local interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAddress {
    pub name: String,
    pub ip: IpAddr,
    pub mac: Option<String>,
    pub loopback: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalAddresses {
    pub ipv4: BTreeSet<String>,
    pub ipv6: BTreeSet<String>,
    pub macs: BTreeSet<String>,
}

impl LocalAddresses {
    /// Enumerates the host's interfaces.
    pub fn discover() -> Result<Self> {
        debug!("Enumerating network interfaces...");
        let if_addrs = get_if_addrs().context("Failed to enumerate network interfaces")?;

        let interfaces: Vec<InterfaceAddress> = if_addrs
            .into_iter()
            .map(|if_addr| {
                let ip = match &if_addr.addr {
                    IfAddr::V4(v4) => IpAddr::V4(v4.ip),
                    IfAddr::V6(v6) => IpAddr::V6(v6.ip),
                };
                InterfaceAddress {
                    mac: interface_mac(&if_addr.name),
                    loopback: if_addr.is_loopback(),
                    name: if_addr.name,
                    ip,
                }
            })
            .collect();

        let local = Self::from_interfaces(&interfaces);
        info!(
            ipv4 = local.ipv4.len(),
            ipv6 = local.ipv6.len(),
            macs = local.macs.len(),
            "Local interface addresses discovered"
        );
        Ok(local)
    }

    /// Loopback addresses are skipped.
    pub fn from_interfaces(interfaces: &[InterfaceAddress]) -> Self {
        let mut local = Self::default();
        for interface in interfaces.iter().filter(|i| !i.loopback) {
            debug!(interface = %interface.name, ip = %interface.ip, "Local address");
            match interface.ip {
                IpAddr::V4(v4) => {
                    local.ipv4.insert(v4.to_string());
                }
                IpAddr::V6(v6) => {
                    local.ipv6.insert(v6.to_string());
                }
            }
            if let Some(mac) = &interface.mac {
                local.macs.insert(normalize_mac(mac));
            }
        }
        local
    }

    /// Merged with the statically configured lists.
    pub fn merged_with(
        &self,
        ipv4: &[String],
        ipv6: &[String],
        macs: &[String],
    ) -> (Vec<String>, Vec<String>, Vec<String>) {
        let merge = |local: &BTreeSet<String>, configured: &[String]| -> Vec<String> {
            local
                .iter()
                .chain(configured)
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        };
        (merge(&self.ipv4, ipv4), merge(&self.ipv6, ipv6), merge(&self.macs, macs))
    }
}

fn interface_mac(interface_name: &str) -> Option<String> {
    match mac_address::mac_address_by_name(interface_name) {
        Ok(Some(mac)) if mac.bytes() != [0u8; 6] => Some(mac.to_string()),
        Ok(_) => {
            debug!("No MAC found for interface: {}", interface_name);
            None
        }
        Err(e) => {
            debug!("Error getting MAC for {}: {}", interface_name, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(name: &str, ip: &str, mac: Option<&str>, loopback: bool) -> InterfaceAddress {
        InterfaceAddress {
            name: name.to_string(),
            ip: ip.parse().unwrap(),
            mac: mac.map(str::to_string),
            loopback,
        }
    }

    #[test]
    fn test_loopback_skipped_and_macs_normalized() {
        let local = LocalAddresses::from_interfaces(&[
            iface("lo", "127.0.0.1", None, true),
            iface("eth0", "192.168.1.2", Some("AA:BB:CC:00:11:22"), false),
            iface("eth0", "fe80::1", Some("AA:BB:CC:00:11:22"), false),
        ]);
        assert_eq!(local.ipv4.iter().collect::<Vec<_>>(), vec!["192.168.1.2"]);
        assert_eq!(local.ipv6.iter().collect::<Vec<_>>(), vec!["fe80::1"]);
        assert_eq!(local.macs.iter().collect::<Vec<_>>(), vec!["aa:bb:cc:00:11:22"]);
    }

    #[test]
    fn test_merge_deduplicates() {
        let local = LocalAddresses::from_interfaces(&[iface("eth0", "192.168.1.2", None, false)]);
        let (ipv4, ipv6, macs) = local.merged_with(
            &["192.168.1.2".to_string(), "192.168.1.1".to_string()],
            &[],
            &["00:11:22:33:44:55".to_string()],
        );
        assert_eq!(ipv4, vec!["192.168.1.1", "192.168.1.2"]);
        assert!(ipv6.is_empty());
        assert_eq!(macs, vec!["00:11:22:33:44:55"]);
    }
}
