/**
 * SHARED HOST CACHE - thread-safe handle on the registry
 *
 * RÔLE : wraps HostCache in Arc<Mutex<..>> for the ingestion tasks and the
 * periodic match / prune / export jobs.
 *
 * FONCTIONNEMENT :
 * - one mutex around the whole registry, each operation is one critical section
 * - IP -> MAC resolution (probe + settle delay) runs with the lock released,
 *   the result is then bound under the lock before ingestion
 */

use crate::cache::{write_json, HostCache};
use crate::error::Result;
use crate::evidence::{DhcpRequest, SsdpHost};
use crate::report::StatsReport;
use crate::resolver::Resolver;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_shared<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

#[derive(Clone)]
pub struct SharedHostCache {
    inner: Shared<HostCache>,
    resolver: Resolver,
}

impl SharedHostCache {
    pub fn new(cache: HostCache) -> Self {
        let resolver = cache.resolver().clone();
        Self {
            inner: new_shared(cache),
            resolver,
        }
    }

    /// Direct access for multi-step work; do not resolve while holding it.
    pub fn lock(&self) -> MutexGuard<'_, HostCache> {
        self.inner.lock()
    }

    /// Makes sure `ip` is indexed before an ingestion call. `false` means the
    /// call would fail anyway (no neighbor entry or whitelisted MAC).
    fn ensure_resolved(&self, ip: &str) -> bool {
        if !self.inner.lock().needs_resolution(ip) {
            return true;
        }
        let resolution = self.resolver.lookup(ip);
        match resolution.mac {
            Some(mac) => self.inner.lock().bind_resolved(ip, &mac),
            None => {
                debug!(ip = %ip, scans = resolution.scans, "Couldn't find ARP entry");
                false
            }
        }
    }

    pub fn add_by_mac(&self, mac: &str, ip: &str) -> bool {
        self.inner.lock().add_by_mac(mac, ip)
    }

    pub fn add_flow(
        &self,
        src_ip: &str,
        src_port: u16,
        dst_ip: &str,
        dst_port: u16,
        protocol: u8,
        expiration: DateTime<Utc>,
    ) -> bool {
        self.ensure_resolved(src_ip)
            && self
                .inner
                .lock()
                .add_flow(src_ip, src_port, dst_ip, dst_port, protocol, expiration)
    }

    pub fn add_dns_query_ip(
        &self,
        client_ip: &str,
        fqdn: &str,
        resolved_ip: &str,
        expire: DateTime<Utc>,
    ) -> bool {
        self.ensure_resolved(client_ip)
            && self
                .inner
                .lock()
                .add_dns_query_ip(client_ip, fqdn, resolved_ip, expire)
    }

    /// Flow observed now, kept for `flow_expiry_secs`.
    pub fn record_flow(
        &self,
        src_ip: &str,
        src_port: u16,
        dst_ip: &str,
        dst_port: u16,
        protocol: u8,
    ) -> bool {
        let expiration = self.inner.lock().settings().flow_expires_at(Utc::now());
        self.add_flow(src_ip, src_port, dst_ip, dst_port, protocol, expiration)
    }

    /// DNS answer observed now, kept for `dns_expiry_secs`.
    pub fn record_dns_query(&self, client_ip: &str, fqdn: &str, resolved_ip: &str) -> bool {
        let expire = self.inner.lock().settings().dns_expires_at(Utc::now());
        self.add_dns_query_ip(client_ip, fqdn, resolved_ip, expire)
    }

    pub fn add_dhcp_request(&self, request: &DhcpRequest) -> bool {
        if request.mac().is_none() {
            if let Some(ip) = request.ip() {
                if !self.ensure_resolved(ip) {
                    return false;
                }
            }
        }
        self.inner.lock().add_dhcp_request(request)
    }

    pub fn add_ssdp_info(&self, ssdp: SsdpHost) -> bool {
        self.ensure_resolved(&ssdp.ip_address) && self.inner.lock().add_ssdp_info(ssdp)
    }

    pub fn match_all(&self) -> usize {
        self.inner.lock().match_all()
    }

    pub fn match_by_mac(&self, mac: &str) -> bool {
        self.inner.lock().match_by_mac(mac)
    }

    pub fn match_by_ip(&self, ip: &str) -> bool {
        self.inner.lock().match_by_ip(ip)
    }

    pub fn prune(&self, force: bool) -> usize {
        self.inner.lock().prune(force)
    }

    pub fn load_profiles(&self, document: &Value) -> usize {
        self.inner.lock().load_profiles(document)
    }

    pub fn set_whitelist(&self, ipv4s: &[String], ipv6s: &[String], macs: &[String]) -> usize {
        self.inner.lock().set_whitelist(ipv4s, ipv6s, macs)
    }

    pub fn export_matches(&self, detailed: bool) -> Value {
        self.inner.lock().export_matches(detailed)
    }

    /// Document is built under the lock, the file is written after release.
    pub fn export_matches_file(&self, path: &Path, detailed: bool) -> Result<usize> {
        let document = self.export_matches(detailed);
        write_json(path, &document)?;
        Ok(document.as_array().map_or(0, Vec::len))
    }

    pub fn import_matches(&self, document: &Value) -> usize {
        self.inner.lock().import_matches(document)
    }

    pub fn device_stats_report(&self) -> StatsReport {
        self.inner.lock().device_stats_report()
    }

    pub fn traffic_stats_report(&self, interval: Duration) -> StatsReport {
        self.inner.lock().traffic_stats_report(interval)
    }

    pub fn host_count(&self) -> usize {
        self.inner.lock().host_count()
    }

    pub fn host_dns_query_count(&self, ip: &str) -> usize {
        self.inner.lock().host_dns_query_count(ip)
    }
}

impl std::fmt::Debug for SharedHostCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedHostCache").field("resolver", &self.resolver).finish()
    }
}
