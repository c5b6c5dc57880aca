/**
 * HOST CACHE - registry of tracked devices
 *
 * RÔLE : owns every Host (keyed by MAC), the IP -> MAC index, the whitelist and
 * the device profile catalog. All evidence enters through the add_* methods;
 * matching, pruning and match import/export run over the whole registry.
 *
 * INVARIANTS :
 * - `hosts` is the only owner of Host values; `ip_to_mac` holds keys only
 * - every MAC in `ip_to_mac` exists in `hosts`, an IP maps to one MAC (last wins)
 * - a whitelisted address is never inserted as a new host
 *
 * Operations never fail loudly: rejected input is logged and reported as
 * false / None / 0.
 */

use crate::confidence::ConfidenceLevel;
use crate::error::{CoreError, Result};
use crate::evidence::{normalize_mac, DhcpRequest, SsdpHost};
use crate::host::Host;
use crate::profile::ProfileCatalog;
use crate::report::{StatsReport, DEVICE_STATS_API, TRAFFIC_STATS_API};
use crate::resolver::Resolver;
use crate::settings::CacheSettings;
use crate::whitelist::Whitelist;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, error, info, warn};

pub type HostsMap = HashMap<String, Host>;

pub struct HostCache {
    hosts: HostsMap,
    ip_to_mac: HashMap<String, String>,
    whitelist: Whitelist,
    profiles: ProfileCatalog,
    resolver: Resolver,
    settings: CacheSettings,
}

impl HostCache {
    pub fn new(resolver: Resolver, settings: CacheSettings) -> Self {
        Self {
            hosts: HashMap::new(),
            ip_to_mac: HashMap::new(),
            whitelist: Whitelist::new(),
            profiles: ProfileCatalog::new(),
            resolver,
            settings,
        }
    }

    /// Registry backed by the system neighbor table.
    pub fn with_settings(settings: CacheSettings) -> Self {
        let resolver = Resolver::system(&settings);
        Self::new(resolver, settings)
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    // ------------------------------------------------------------------
    // Identity resolution
    // ------------------------------------------------------------------

    /// Existing or new host for `mac`. `None` for empty or whitelisted MACs.
    /// A non-empty `uuid` assigns that profile to a newly created host.
    pub fn find_or_create_host_by_mac(&mut self, mac: &str, uuid: &str) -> Option<&mut Host> {
        let key = self.host_key_for_mac(mac, uuid)?;
        self.hosts.get_mut(&key)
    }

    /// Host owning `ip`, resolving and indexing the MAC on an index miss.
    pub fn find_or_create_host_by_ip(&mut self, ip: &str, uuid: &str) -> Option<&mut Host> {
        let key = self.host_key_for_ip(ip, uuid)?;
        self.hosts.get_mut(&key)
    }

    fn host_key_for_mac(&mut self, mac: &str, uuid: &str) -> Option<String> {
        if mac.is_empty() {
            warn!("empty Mac Address provided");
            return None;
        }
        if self.whitelist.contains(mac) {
            return None;
        }
        let key = normalize_mac(mac);
        if !self.hosts.contains_key(&key) {
            debug!(mac = %key, "Adding new Host");
            let mut host = Host::new(&key);
            if !uuid.is_empty() {
                host.assign_profile(uuid, ConfidenceLevel::Low, ConfidenceLevel::None);
            }
            self.hosts.insert(key.clone(), host);
        }
        Some(key)
    }

    fn host_key_for_ip(&mut self, ip: &str, uuid: &str) -> Option<String> {
        if ip.is_empty() || self.whitelist.contains(ip) {
            return None;
        }
        let mac = match self.ip_to_mac.get(ip) {
            Some(mac) => mac.clone(),
            None => {
                let resolution = self.resolver.lookup(ip);
                let Some(mac) = resolution.mac else {
                    debug!(ip = %ip, scans = resolution.scans, "Couldn't find ARP entry");
                    return None;
                };
                mac
            }
        };
        let key = self.host_key_for_mac(&mac, uuid)?;
        self.bind_ip(ip, &key);
        Some(key)
    }

    /// Points `ip` at `mac` in the index and on the host, detaching it from
    /// any host that held it before.
    fn bind_ip(&mut self, ip: &str, mac: &str) {
        if let Some(previous) = self.ip_to_mac.insert(ip.to_string(), mac.to_string()) {
            if previous != mac {
                debug!(ip = %ip, from = %previous, to = %mac, "IP address moved to another host");
                if let Some(old) = self.hosts.get_mut(&previous) {
                    old.ip_address_remove(ip);
                }
            }
        }
        if let Some(host) = self.hosts.get_mut(mac) {
            if host.ip_addresses().first().map(String::as_str) != Some(ip) {
                host.ip_address_set(ip);
            }
        }
    }

    /// True when `ip` would need a neighbor table lookup before ingestion.
    pub fn needs_resolution(&self, ip: &str) -> bool {
        !ip.is_empty() && !self.whitelist.contains(ip) && !self.ip_to_mac.contains_key(ip)
    }

    /// Records a resolution done outside the registry. Creates the host.
    pub fn bind_resolved(&mut self, ip: &str, mac: &str) -> bool {
        if self.whitelist.contains(ip) {
            return false;
        }
        match self.host_key_for_mac(mac, "") {
            Some(key) => {
                self.bind_ip(ip, &key);
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Evidence ingestion
    // ------------------------------------------------------------------

    /// Deterministic registration. Does nothing if `mac` is already tracked.
    pub fn add_by_mac(&mut self, mac: &str, ip: &str) -> bool {
        let key = normalize_mac(mac);
        if key.is_empty() || self.hosts.contains_key(&key) {
            return false;
        }
        if self.whitelist.contains(&key) || self.whitelist.contains(ip) {
            return false;
        }
        let mut host = Host::new(&key);
        host.ip_address_set(ip);
        self.hosts.insert(key.clone(), host);
        if !ip.is_empty() {
            self.bind_ip(ip, &key);
        }
        true
    }

    pub fn add_flow(
        &mut self,
        src_ip: &str,
        src_port: u16,
        dst_ip: &str,
        dst_port: u16,
        protocol: u8,
        expiration: DateTime<Utc>,
    ) -> bool {
        if self.whitelist.contains(src_ip) {
            return false;
        }
        match self.find_or_create_host_by_ip(src_ip, "") {
            Some(host) => {
                host.flow_entry_set(src_port, dst_ip, dst_port, protocol, expiration);
                true
            }
            None => false,
        }
    }

    pub fn add_dns_query_ip(
        &mut self,
        client_ip: &str,
        fqdn: &str,
        resolved_ip: &str,
        expire: DateTime<Utc>,
    ) -> bool {
        if self.whitelist.contains(client_ip) {
            return false;
        }
        match self.find_or_create_host_by_ip(client_ip, "") {
            Some(host) => {
                host.dns_log_entry_set(fqdn, resolved_ip, expire);
                true
            }
            None => false,
        }
    }

    /// MAC based lookup is preferred; the IP is only resolved when no MAC was
    /// supplied.
    pub fn add_dhcp_request(&mut self, request: &DhcpRequest) -> bool {
        let (ip, mac) = (request.ip(), request.mac());
        if ip.is_none() && mac.is_none() {
            warn!("No IpAddress or MacAddress in DHCP request");
            return false;
        }
        if ip.is_some_and(|ip| self.whitelist.contains(ip))
            || mac.is_some_and(|mac| self.whitelist.contains(mac))
        {
            return false;
        }

        let key = match mac {
            Some(mac) => self.host_key_for_mac(mac, ""),
            None => ip.and_then(|ip| self.host_key_for_ip(ip, "")),
        };
        let Some(key) = key else { return false };

        if let Some(ip) = ip {
            self.bind_ip(ip, &key);
        }
        match self.hosts.get_mut(&key) {
            Some(host) => {
                host.dhcp_set(request);
                true
            }
            None => false,
        }
    }

    pub fn add_ssdp_info(&mut self, ssdp: SsdpHost) -> bool {
        if ssdp.ip_address.is_empty() {
            warn!("AddSsdpInfo: no IP address provided");
            return false;
        }
        if self.whitelist.contains(&ssdp.ip_address) {
            return false;
        }
        let ip = ssdp.ip_address.clone();
        match self.find_or_create_host_by_ip(&ip, "") {
            Some(host) => {
                host.ssdp_info_set(ssdp);
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Matching, pruning
    // ------------------------------------------------------------------

    /// Evaluates every host against the catalog. A host with no match keeps
    /// its previous assignment. Returns the number of hosts matched now.
    pub fn match_all(&mut self) -> usize {
        let now = Utc::now();
        let mut matched = 0;
        for host in self.hosts.values_mut() {
            if Self::match_host(&self.profiles, host, now) {
                matched += 1;
            }
        }
        info!(matched, hosts = self.hosts.len(), "Matched hosts against device profiles");
        matched
    }

    pub fn match_by_mac(&mut self, mac: &str) -> bool {
        let key = normalize_mac(mac);
        match self.hosts.get_mut(&key) {
            Some(host) => Self::match_host(&self.profiles, host, Utc::now()),
            None => false,
        }
    }

    /// Index lookup only; never resolves.
    pub fn match_by_ip(&mut self, ip: &str) -> bool {
        match self.ip_to_mac.get(ip).cloned() {
            Some(mac) => self.match_by_mac(&mac),
            None => false,
        }
    }

    fn match_host(profiles: &ProfileCatalog, host: &mut Host, now: DateTime<Utc>) -> bool {
        match profiles.best_match(host) {
            Some((profile, result)) => {
                debug!(
                    mac = %host.mac_address(),
                    uuid = %profile.uuid(),
                    confidence = %result.confidence,
                    "Host matched device profile"
                );
                let uuid = profile.uuid().to_string();
                host.record_match(&uuid, result, now);
                true
            }
            None => false,
        }
    }

    pub fn prune(&mut self, force: bool) -> usize {
        self.prune_at(Utc::now(), force)
    }

    /// Removes expired DNS and flow entries; hosts themselves stay.
    pub fn prune_at(&mut self, now: DateTime<Utc>, force: bool) -> usize {
        let pruned = self
            .hosts
            .values_mut()
            .map(|host| host.prune(now, force))
            .filter(|pruned| *pruned)
            .count();
        info!(pruned, force, "Pruned hosts");
        pruned
    }

    // ------------------------------------------------------------------
    // Catalog & whitelist
    // ------------------------------------------------------------------

    /// Replaces the catalog with the profiles in `document`. The previous
    /// catalog stays if the document is not an array.
    pub fn load_profiles(&mut self, document: &Value) -> usize {
        let catalog = match ProfileCatalog::from_document(document) {
            Ok(catalog) => catalog,
            Err(e) => {
                error!("Cannot load device profiles: {}", e);
                return 0;
            }
        };

        let removed: Vec<String> = self
            .profiles
            .uuids()
            .filter(|uuid| !catalog.contains(uuid))
            .map(str::to_string)
            .collect();
        self.profiles = catalog;
        for uuid in &removed {
            debug!(uuid = %uuid, "Profile no longer in DeviceProfiles file");
        }

        let loaded = self.profiles.len();
        info!(loaded, removed = removed.len(), "Device profiles imported");
        loaded
    }

    pub fn load_profiles_str(&mut self, document: &str) -> usize {
        match serde_json::from_str::<Value>(document) {
            Ok(value) => self.load_profiles(&value),
            Err(e) => {
                error!("Device profiles are not valid JSON: {}", e);
                0
            }
        }
    }

    pub fn load_profiles_file(&mut self, path: &Path) -> Result<usize> {
        debug!(path = %path.display(), "Opening & reading device profiles");
        let document = read_json(path)?;
        Ok(self.load_profiles(&document))
    }

    pub fn profiles(&self) -> &ProfileCatalog {
        &self.profiles
    }

    pub fn profile_count(&self) -> usize {
        self.profiles.len()
    }

    /// Replaces the whitelist. Hosts already tracked are kept even when they
    /// become whitelisted; they are only left out of exports and reports.
    pub fn set_whitelist<I4, I6, M>(&mut self, ipv4s: I4, ipv6s: I6, macs: M) -> usize
    where
        I4: IntoIterator,
        I4::Item: AsRef<str>,
        I6: IntoIterator,
        I6::Item: AsRef<str>,
        M: IntoIterator,
        M::Item: AsRef<str>,
    {
        let size = self.whitelist.set(ipv4s, ipv6s, macs);
        info!(size, "Whitelist updated");
        size
    }

    pub fn is_whitelisted(&self, address: &str) -> bool {
        self.whitelist.contains(address)
    }

    pub fn whitelist(&self) -> &Whitelist {
        &self.whitelist
    }

    // ------------------------------------------------------------------
    // Match export / import
    // ------------------------------------------------------------------

    /// One object per non-whitelisted host, ordered by MAC.
    pub fn export_matches(&self, detailed: bool) -> Value {
        let entries = self
            .sorted_hosts()
            .filter(|host| !self.whitelist.contains_host(host))
            .map(|host| host.export_device_info(detailed))
            .collect();
        Value::Array(entries)
    }

    pub fn export_matches_file(&self, path: &Path, detailed: bool) -> Result<usize> {
        let document = self.export_matches(detailed);
        let count = document.as_array().map_or(0, Vec::len);
        write_json(path, &document)?;
        debug!(path = %path.display(), count, "Exported device profile matches");
        Ok(count)
    }

    /// Applies each entry of a match document; returns how many were accepted.
    pub fn import_matches(&mut self, document: &Value) -> usize {
        let Some(entries) = document.as_array() else {
            error!("Device matches document is not a JSON array");
            return 0;
        };
        let imported = entries.iter().filter(|entry| self.import_device_info(entry)).count();
        info!(imported, total = entries.len(), "DeviceMatches read");
        imported
    }

    pub fn import_matches_file(&mut self, path: &Path) -> Result<usize> {
        debug!(path = %path.display(), "Opening & reading device matches");
        let document = read_json(path)?;
        Ok(self.import_matches(&document))
    }

    pub fn import_device_info(&mut self, j: &Value) -> bool {
        let Some(uuid) = required_string(j, "DeviceProfileUuid") else {
            return false;
        };
        let Some(mac) = required_string(j, "MacAddress") else {
            return false;
        };
        let confidence = optional_level(j, "Confidence").unwrap_or(ConfidenceLevel::Low);
        let enforce_level =
            optional_level(j, "EnforceConfidenceLevel").unwrap_or(ConfidenceLevel::None);
        debug!(uuid = %uuid, mac = %mac, "Importing Device Profile");

        let existing = self
            .hosts
            .get(&normalize_mac(mac))
            .and_then(Host::matched_profile_uuid);
        if let Some(existing) = existing {
            if existing != uuid {
                warn!(
                    mac = %mac,
                    existing = %existing,
                    imported = %uuid,
                    "Conflicting Uuid for imported device with existing Host Cache"
                );
                return false;
            }
        }

        match self.find_or_create_host_by_mac(mac, uuid) {
            Some(host) => {
                host.assign_profile(uuid, confidence, enforce_level);
                true
            }
            None => {
                warn!(mac = %mac, uuid = %uuid, "Failed to create Host for imported match");
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Upload reports
    // ------------------------------------------------------------------

    /// Non-whitelisted hosts that no profile identifies yet.
    pub fn device_stats_report(&self) -> StatsReport {
        let now = Utc::now();
        let window = self.settings.device_stats_window();
        let entries = self
            .sorted_hosts()
            .filter(|host| !self.whitelist.contains_host(host) && !host.is_matched())
            .map(|host| host.device_stats(window, now))
            .collect();
        StatsReport { api: DEVICE_STATS_API, entries }
    }

    /// Non-whitelisted matched hosts, traffic seen within `interval`.
    pub fn traffic_stats_report(&self, interval: Duration) -> StatsReport {
        let now = Utc::now();
        let entries = self
            .sorted_hosts()
            .filter(|host| !self.whitelist.contains_host(host) && host.is_matched())
            .map(|host| host.traffic_stats(interval, now))
            .collect();
        StatsReport { api: TRAFFIC_STATS_API, entries }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    pub fn host(&self, mac: &str) -> Option<&Host> {
        self.hosts.get(&normalize_mac(mac))
    }

    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.values()
    }

    pub fn mac_for_ip(&self, ip: &str) -> Option<&str> {
        self.ip_to_mac.get(ip).map(String::as_str)
    }

    pub fn host_by_ip(&self, ip: &str) -> Option<&Host> {
        self.mac_for_ip(ip).and_then(|mac| self.hosts.get(mac))
    }

    /// DNS log length of the host indexed under `ip`; 0 when not indexed.
    pub fn host_dns_query_count(&self, ip: &str) -> usize {
        self.host_by_ip(ip).map_or(0, Host::dns_log_entry_count)
    }

    /// `(mac, profile uuid)` of hosts whose match permits enforcement.
    pub fn enforceable_hosts(&self) -> Vec<(String, String)> {
        self.sorted_hosts()
            .filter(|host| !self.whitelist.contains_host(host) && host.enforce_permitted())
            .filter_map(|host| {
                host.matched_profile_uuid()
                    .map(|uuid| (host.mac_address().to_string(), uuid.to_string()))
            })
            .collect()
    }

    fn sorted_hosts(&self) -> impl Iterator<Item = &Host> {
        let mut hosts: Vec<&Host> = self.hosts.values().collect();
        hosts.sort_by(|a, b| a.mac_address().cmp(b.mac_address()));
        hosts.into_iter()
    }
}

impl std::fmt::Debug for HostCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostCache")
            .field("hosts", &self.hosts.len())
            .field("indexed_ips", &self.ip_to_mac.len())
            .field("whitelist", &self.whitelist.len())
            .field("profiles", &self.profiles.len())
            .finish()
    }
}

fn required_string<'a>(j: &'a Value, key: &str) -> Option<&'a str> {
    match j.get(key) {
        None => {
            error!("No {} set, ignoring this Object", key);
            None
        }
        Some(Value::String(s)) => Some(s.as_str()),
        Some(_) => {
            error!("{} is not a string, ignoring this Object", key);
            None
        }
    }
}

fn optional_level(j: &Value, key: &str) -> Option<ConfidenceLevel> {
    j.get(key).and_then(Value::as_str).and_then(|s| s.parse().ok())
}

pub(crate) fn read_json(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path).map_err(|source| CoreError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}

/// Pretty JSON with 4-space indentation.
pub(crate) fn write_json(path: &Path, document: &Value) -> Result<()> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    serde::Serialize::serialize(document, &mut ser)?;
    buf.push(b'\n');
    fs::write(path, buf).map_err(|source| CoreError::FileWrite {
        path: path.to_path_buf(),
        source,
    })
}
