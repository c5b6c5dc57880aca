use crate::evidence::normalize_mac;
use crate::host::Host;
use std::collections::HashSet;

/// Addresses (IPv4, IPv6, MAC) exempt from tracking.
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    entries: HashSet<String>,
}

impl Whitelist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole set with the union of the three inputs. MACs are
    /// stored normalized. Returns the new size.
    pub fn set<I4, I6, M>(&mut self, ipv4s: I4, ipv6s: I6, macs: M) -> usize
    where
        I4: IntoIterator,
        I4::Item: AsRef<str>,
        I6: IntoIterator,
        I6::Item: AsRef<str>,
        M: IntoIterator,
        M::Item: AsRef<str>,
    {
        self.entries.clear();
        self.entries.extend(ipv4s.into_iter().map(|ip| ip.as_ref().trim().to_string()));
        self.entries.extend(ipv6s.into_iter().map(|ip| ip.as_ref().trim().to_ascii_lowercase()));
        self.entries.extend(macs.into_iter().map(|mac| normalize_mac(mac.as_ref())));
        self.entries.retain(|entry| !entry.is_empty());
        self.entries.len()
    }

    /// Matches an IP literal or a MAC in any case/separator form.
    pub fn contains(&self, address: &str) -> bool {
        if address.is_empty() {
            return false;
        }
        self.entries.contains(address) || self.entries.contains(&normalize_mac(address))
    }

    pub fn contains_host(&self, host: &Host) -> bool {
        self.contains(host.mac_address()) || host.ip_addresses().iter().any(|ip| self.contains(ip))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
