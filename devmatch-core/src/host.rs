//! Per-device state: identity, accumulated evidence, last match outcome.

use crate::confidence::ConfidenceLevel;
use crate::evidence::{
    mac_oid, normalize_mac, DhcpRequest, DnsLogEntry, EvidenceField, FlowEntry, FlowKey, SsdpHost,
};
use crate::profile::ProfileMatch;
use crate::settings::window_start;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};
use std::net::Ipv4Addr;

/// Profile assignment recorded on a host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostMatch {
    pub profile_uuid: String,
    pub confidence: ConfidenceLevel,
    pub enforce_level: ConfidenceLevel,
    pub matched_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Host {
    mac_address: String,
    ip_addresses: Vec<String>, // most recent first
    dns_log: Vec<DnsLogEntry>,
    dhcp: DhcpRequest,
    ssdp: Option<SsdpHost>,
    flows: HashMap<FlowKey, FlowEntry>,
    matched: Option<HostMatch>,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

impl Host {
    pub fn new(mac_address: &str) -> Self {
        let now = Utc::now();
        Self {
            mac_address: normalize_mac(mac_address),
            ip_addresses: Vec::new(),
            dns_log: Vec::new(),
            dhcp: DhcpRequest::default(),
            ssdp: None,
            flows: HashMap::new(),
            matched: None,
            first_seen: now,
            last_seen: now,
        }
    }

    pub fn mac_address(&self) -> &str {
        &self.mac_address
    }

    pub fn ip_addresses(&self) -> &[String] {
        &self.ip_addresses
    }

    pub fn first_seen(&self) -> DateTime<Utc> {
        self.first_seen
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        self.last_seen
    }

    /// Moves `ip` to the front of the address list.
    pub fn ip_address_set(&mut self, ip: &str) {
        if ip.is_empty() {
            return;
        }
        self.ip_addresses.retain(|existing| existing != ip);
        self.ip_addresses.insert(0, ip.to_string());
        self.touch();
    }

    pub fn ip_address_remove(&mut self, ip: &str) {
        self.ip_addresses.retain(|existing| existing != ip);
    }

    pub fn dns_log_entry_set(&mut self, fqdn: &str, resolved_ip: &str, expiry: DateTime<Utc>) {
        let now = Utc::now();
        self.dns_log.push(DnsLogEntry {
            queried_name: fqdn.to_string(),
            resolved_ip: resolved_ip.to_string(),
            seen: now,
            expiry,
        });
        self.last_seen = now;
    }

    pub fn dns_log(&self) -> &[DnsLogEntry] {
        &self.dns_log
    }

    pub fn dns_log_entry_count(&self) -> usize {
        self.dns_log.len()
    }

    /// Stores or refreshes a flow.
    pub fn flow_entry_set(
        &mut self,
        src_port: u16,
        dst_ip: &str,
        dst_port: u16,
        protocol: u8,
        expiry: DateTime<Utc>,
    ) {
        let now = Utc::now();
        let key = FlowKey {
            src_port,
            dst_ip: dst_ip.to_string(),
            dst_port,
            protocol,
        };
        self.flows.insert(key, FlowEntry { last_seen: now, expiry });
        self.last_seen = now;
    }

    pub fn flows(&self) -> &HashMap<FlowKey, FlowEntry> {
        &self.flows
    }

    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    pub fn dhcp_set(&mut self, request: &DhcpRequest) {
        self.dhcp.merge(request);
        self.touch();
    }

    pub fn dhcp(&self) -> &DhcpRequest {
        &self.dhcp
    }

    pub fn ssdp_info_set(&mut self, ssdp: SsdpHost) {
        self.ssdp = Some(ssdp);
        self.touch();
    }

    pub fn ssdp(&self) -> Option<&SsdpHost> {
        self.ssdp.as_ref()
    }

    /// Drops DNS and flow entries with `expiry <= now` (all of them if `force`).
    /// Returns whether anything was removed.
    pub fn prune(&mut self, now: DateTime<Utc>, force: bool) -> bool {
        let dns_before = self.dns_log.len();
        let flows_before = self.flows.len();
        if force {
            self.dns_log.clear();
            self.flows.clear();
        } else {
            self.dns_log.retain(|entry| entry.expiry > now);
            self.flows.retain(|_, entry| entry.expiry > now);
        }
        self.dns_log.len() != dns_before || self.flows.len() != flows_before
    }

    /// Values currently observed for `field`; empty when never observed.
    pub fn evidence_values(&self, field: EvidenceField) -> Vec<Cow<'_, str>> {
        match field {
            EvidenceField::Hostname => single_value(&self.dhcp.hostname),
            EvidenceField::DhcpHostname => single_value(&self.dhcp.dhcp_hostname),
            EvidenceField::DhcpVendor => single_value(&self.dhcp.dhcp_vendor),
            EvidenceField::MacOid => {
                mac_oid(&self.mac_address).map(Cow::Owned).into_iter().collect()
            }
            EvidenceField::Ipv4Address => self
                .ip_addresses
                .iter()
                .filter(|ip| ip.parse::<Ipv4Addr>().is_ok())
                .map(|ip| Cow::Borrowed(ip.as_str()))
                .collect(),
            EvidenceField::SsdpFriendlyName => self.ssdp_value(|s| &s.friendly_name),
            EvidenceField::SsdpManufacturer => self.ssdp_value(|s| &s.manufacturer),
            EvidenceField::SsdpManufacturerUrl => self.ssdp_value(|s| &s.manufacturer_url),
            EvidenceField::SsdpModelName => self.ssdp_value(|s| &s.model_name),
            EvidenceField::SsdpModelUrl => self.ssdp_value(|s| &s.model_url),
            EvidenceField::SsdpSerialNumber => self.ssdp_value(|s| &s.serial_number),
            EvidenceField::SsdpServer => self.ssdp_value(|s| &s.server),
            EvidenceField::SsdpUserAgent => self.ssdp_value(|s| &s.user_agent),
            EvidenceField::SsdpLocation => self.ssdp_value(|s| &s.location),
            EvidenceField::DnsQueriedName => self
                .dns_log
                .iter()
                .map(|entry| Cow::Borrowed(entry.queried_name.as_str()))
                .collect(),
        }
    }

    pub fn matched(&self) -> Option<&HostMatch> {
        self.matched.as_ref()
    }

    pub fn is_matched(&self) -> bool {
        self.matched.is_some()
    }

    pub fn matched_profile_uuid(&self) -> Option<&str> {
        self.matched.as_ref().map(|m| m.profile_uuid.as_str())
    }

    pub fn matched_confidence(&self) -> ConfidenceLevel {
        self.matched.as_ref().map(|m| m.confidence).unwrap_or_default()
    }

    pub fn last_match_time(&self) -> Option<DateTime<Utc>> {
        self.matched.as_ref().map(|m| m.matched_at)
    }

    pub fn record_match(&mut self, uuid: &str, result: ProfileMatch, now: DateTime<Utc>) {
        self.matched = Some(HostMatch {
            profile_uuid: uuid.to_string(),
            confidence: result.confidence,
            enforce_level: result.enforce_level,
            matched_at: now,
        });
    }

    /// Assignment coming from an imported match document.
    pub fn assign_profile(
        &mut self,
        uuid: &str,
        confidence: ConfidenceLevel,
        enforce_level: ConfidenceLevel,
    ) {
        self.matched = Some(HostMatch {
            profile_uuid: uuid.to_string(),
            confidence,
            enforce_level,
            matched_at: Utc::now(),
        });
    }

    /// Enforcement needs a non-`None` enforce level reached by the identify level.
    pub fn enforce_permitted(&self) -> bool {
        self.matched.as_ref().is_some_and(|m| {
            m.enforce_level != ConfidenceLevel::None && m.confidence >= m.enforce_level
        })
    }

    /// One entry of the match export document.
    pub fn export_device_info(&self, detailed: bool) -> Value {
        let mut j = Map::new();
        j.insert("MacAddress".into(), json!(self.mac_address));
        if let Some(m) = &self.matched {
            j.insert("DeviceProfileUuid".into(), json!(m.profile_uuid));
            j.insert("EnforceConfidenceLevel".into(), json!(m.enforce_level));
            j.insert("MatchTime".into(), json!(m.matched_at.to_rfc3339()));
        }
        j.insert("Confidence".into(), json!(self.matched_confidence()));

        if detailed {
            j.insert("IpAddresses".into(), json!(self.ip_addresses));
            self.insert_dhcp_fields(&mut j);
            if let Some(ssdp) = &self.ssdp {
                j.insert("Ssdp".into(), ssdp_json(ssdp));
            }
            let queries: BTreeSet<&str> =
                self.dns_log.iter().map(|e| e.queried_name.as_str()).collect();
            j.insert("DnsQueries".into(), json!(queries));
            let mut flows: Vec<&FlowKey> = self.flows.keys().collect();
            flows.sort();
            let flows: Vec<Value> = flows
                .into_iter()
                .map(|k| json!({"DstIp": k.dst_ip, "DstPort": k.dst_port, "Protocol": k.protocol}))
                .collect();
            j.insert("Flows".into(), Value::Array(flows));
        }
        Value::Object(j)
    }

    /// Stats for an unidentified device, limited to DNS names seen within `window`.
    pub fn device_stats(&self, window: Duration, now: DateTime<Utc>) -> Value {
        let mut j = Map::new();
        if let Some(oid) = mac_oid(&self.mac_address) {
            j.insert("MacOid".into(), json!(oid));
        }
        self.insert_dhcp_fields(&mut j);
        if let Some(ssdp) = &self.ssdp {
            j.insert("Ssdp".into(), ssdp_json(ssdp));
        }
        j.insert("DnsQueries".into(), json!(self.recent_queries(window_start(now, window))));
        Value::Object(j)
    }

    /// Traffic summary for an identified device over the last `interval`.
    pub fn traffic_stats(&self, interval: Duration, now: DateTime<Utc>) -> Value {
        let since = window_start(now, interval);
        let destinations: BTreeSet<String> = self
            .flows
            .iter()
            .filter(|(_, entry)| entry.last_seen >= since)
            .map(|(key, _)| format!("{}:{}", key.dst_ip, key.dst_port))
            .collect();
        json!({
            "MacAddress": self.mac_address,
            "DeviceProfileUuid": self.matched_profile_uuid(),
            "DnsQueries": self.recent_queries(since),
            "FlowDestinations": destinations,
        })
    }

    fn recent_queries(&self, since: DateTime<Utc>) -> BTreeSet<&str> {
        self.dns_log
            .iter()
            .filter(|e| e.seen >= since)
            .map(|e| e.queried_name.as_str())
            .collect()
    }

    fn insert_dhcp_fields(&self, j: &mut Map<String, Value>) {
        for (key, value) in [
            ("Hostname", &self.dhcp.hostname),
            ("DhcpHostname", &self.dhcp.dhcp_hostname),
            ("DhcpVendor", &self.dhcp.dhcp_vendor),
        ] {
            if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
                j.insert(key.into(), json!(v));
            }
        }
    }

    fn ssdp_value(&self, pick: fn(&SsdpHost) -> &Option<String>) -> Vec<Cow<'_, str>> {
        self.ssdp
            .as_ref()
            .map(|s| single_value(pick(s)))
            .unwrap_or_default()
    }

    fn touch(&mut self) {
        self.last_seen = Utc::now();
    }
}

fn single_value(value: &Option<String>) -> Vec<Cow<'_, str>> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .map(Cow::Borrowed)
        .into_iter()
        .collect()
}

fn ssdp_json(ssdp: &SsdpHost) -> Value {
    let mut j = Map::new();
    for (key, value) in [
        ("FriendlyName", &ssdp.friendly_name),
        ("Manufacturer", &ssdp.manufacturer),
        ("ManufacturerUrl", &ssdp.manufacturer_url),
        ("ModelName", &ssdp.model_name),
        ("ModelUrl", &ssdp.model_url),
        ("SerialNumber", &ssdp.serial_number),
        ("Server", &ssdp.server),
        ("UserAgent", &ssdp.user_agent),
        ("Location", &ssdp.location),
    ] {
        if let Some(v) = value {
            j.insert(key.into(), json!(v));
        }
    }
    Value::Object(j)
}
