//! Evidence records attached to a host, and the fixed table of field names a
//! profile may reference.

use crate::error::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One DNS query observed from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsLogEntry {
    pub queried_name: String,
    pub resolved_ip: String,
    pub seen: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
}

/// Flow identity on the source host: (src port, dst ip, dst port, protocol).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowKey {
    pub src_port: u16,
    pub dst_ip: String,
    pub dst_port: u16,
    pub protocol: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEntry {
    pub last_seen: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
}

/// DHCP observation. Empty strings count as "not supplied".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DhcpRequest {
    pub ip_address: Option<String>,
    pub mac_address: Option<String>,
    pub hostname: Option<String>,
    pub dhcp_hostname: Option<String>,
    pub dhcp_vendor: Option<String>,
}

impl DhcpRequest {
    pub fn ip(&self) -> Option<&str> {
        non_empty(&self.ip_address)
    }

    pub fn mac(&self) -> Option<&str> {
        non_empty(&self.mac_address)
    }

    /// Last-write-wins per field: only supplied fields overwrite.
    pub fn merge(&mut self, other: &DhcpRequest) {
        merge_field(&mut self.ip_address, &other.ip_address);
        merge_field(&mut self.mac_address, &other.mac_address);
        merge_field(&mut self.hostname, &other.hostname);
        merge_field(&mut self.dhcp_hostname, &other.dhcp_hostname);
        merge_field(&mut self.dhcp_vendor, &other.dhcp_vendor);
    }
}

/// SSDP device description as announced by a host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SsdpHost {
    pub ip_address: String,
    pub friendly_name: Option<String>,
    pub manufacturer: Option<String>,
    pub manufacturer_url: Option<String>,
    pub model_name: Option<String>,
    pub model_url: Option<String>,
    pub serial_number: Option<String>,
    pub user_agent: Option<String>,
    pub server: Option<String>,
    pub location: Option<String>,
}

/// Evidence attribute a `MatchCondition` can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvidenceField {
    Hostname,
    DhcpHostname,
    DhcpVendor,
    MacOid,
    Ipv4Address,
    SsdpFriendlyName,
    SsdpManufacturer,
    SsdpManufacturerUrl,
    SsdpModelName,
    SsdpModelUrl,
    SsdpSerialNumber,
    SsdpServer,
    SsdpUserAgent,
    SsdpLocation,
    DnsQueriedName,
}

const FIELD_NAMES: &[(EvidenceField, &str)] = &[
    (EvidenceField::Hostname, "Hostname"),
    (EvidenceField::DhcpHostname, "DhcpHostname"),
    (EvidenceField::DhcpVendor, "DhcpVendor"),
    (EvidenceField::MacOid, "MacOid"),
    (EvidenceField::Ipv4Address, "Ipv4Address"),
    (EvidenceField::SsdpFriendlyName, "SsdpFriendlyName"),
    (EvidenceField::SsdpManufacturer, "SsdpManufacturer"),
    (EvidenceField::SsdpManufacturerUrl, "SsdpManufacturerUrl"),
    (EvidenceField::SsdpModelName, "SsdpModelName"),
    (EvidenceField::SsdpModelUrl, "SsdpModelUrl"),
    (EvidenceField::SsdpSerialNumber, "SsdpSerialNumber"),
    (EvidenceField::SsdpServer, "SsdpServer"),
    (EvidenceField::SsdpUserAgent, "SsdpUserAgent"),
    (EvidenceField::SsdpLocation, "SsdpLocation"),
    (EvidenceField::DnsQueriedName, "DnsQueriedName"),
];

impl EvidenceField {
    pub fn as_str(&self) -> &'static str {
        FIELD_NAMES
            .iter()
            .find(|(field, _)| field == self)
            .map(|(_, name)| *name)
            .unwrap_or("unknown")
    }
}

impl FromStr for EvidenceField {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FIELD_NAMES
            .iter()
            .find(|(_, name)| *name == s)
            .map(|(field, _)| *field)
            .ok_or_else(|| CoreError::UnknownField(s.to_string()))
    }
}

impl fmt::Display for EvidenceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercase, colon separated form used as the registry key.
pub fn normalize_mac(mac: &str) -> String {
    mac.trim().to_ascii_lowercase().replace('-', ":")
}

/// Vendor prefix (first three octets) of a MAC address.
pub fn mac_oid(mac: &str) -> Option<String> {
    let normalized = normalize_mac(mac);
    let octets: Vec<&str> = normalized.split(':').collect();
    if octets.len() != 6 {
        return None;
    }
    Some(octets[..3].join(":"))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

fn merge_field(target: &mut Option<String>, source: &Option<String>) {
    if let Some(value) = non_empty(source) {
        *target = Some(value.to_string());
    }
}
