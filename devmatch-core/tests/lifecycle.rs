use chrono::{Duration, Utc};
use devmatch_core::{ConfidenceLevel, DhcpRequest, SsdpHost};
use devmatch_devkit::{
    CacheHarness, IdentifierBuilder, MatchEntryBuilder, ProfileBuilder, ScriptedNeighborTable,
};
use serde_json::{json, Value};

fn catalog() -> Value {
    ProfileBuilder::catalog(vec![
        ProfileBuilder::new("hue-bridge")
            .device("Signify", "Hue Bridge")
            .identifier(
                IdentifierBuilder::new()
                    .identify("Low")
                    .must_contain("DnsQueriedName", "meethue.com"),
            )
            .identifier(
                IdentifierBuilder::new()
                    .identify("High")
                    .enforce("Medium")
                    .must_contain("DnsQueriedName", "meethue.com")
                    .must_match("SsdpModelName", "Philips hue bridge 2015"),
            ),
        ProfileBuilder::new("sonos-one")
            .identifier(
                IdentifierBuilder::new()
                    .identify("Medium")
                    .enforce("High")
                    .must_contain("SsdpServer", "Sonos"),
            ),
        ProfileBuilder::new("android-phone").identifier(
            IdentifierBuilder::new()
                .identify("Low")
                .must_match("DhcpVendor", "android-dhcp-9"),
        ),
    ])
}

fn harness() -> CacheHarness {
    CacheHarness::with_table(
        ScriptedNeighborTable::new()
            .with_entry("192.168.1.10", "00:17:88:00:00:10")
            .with_entry("192.168.1.11", "00:0e:58:00:00:11"),
    )
}

fn expire() -> chrono::DateTime<Utc> {
    Utc::now() + Duration::hours(4)
}

#[test]
fn ingest_match_and_enforce() {
    let mut h = harness();
    assert_eq!(h.cache.load_profiles(&catalog()), 3);

    assert!(h.cache.add_dns_query_ip(
        "192.168.1.10",
        "diagnostics.meethue.com",
        "52.44.246.12",
        expire()
    ));
    assert!(h.cache.add_ssdp_info(SsdpHost {
        ip_address: "192.168.1.10".into(),
        model_name: Some("Philips hue bridge 2015".into()),
        ..Default::default()
    }));
    assert!(h.cache.add_ssdp_info(SsdpHost {
        ip_address: "192.168.1.11".into(),
        server: Some("Linux UPnP/1.0 Sonos/57.3-77280 (ZPS12)".into()),
        ..Default::default()
    }));
    assert!(h.cache.add_dhcp_request(&DhcpRequest {
        ip_address: Some("192.168.1.12".into()),
        mac_address: Some("3C:28:6D:00:00:12".into()),
        dhcp_vendor: Some("android-dhcp-9".into()),
        ..Default::default()
    }));

    assert_eq!(h.cache.match_all(), 3);

    let hue = h.cache.host("00:17:88:00:00:10").unwrap();
    assert_eq!(hue.matched_profile_uuid(), Some("hue-bridge"));
    assert_eq!(hue.matched_confidence(), ConfidenceLevel::High);

    let sonos = h.cache.host_by_ip("192.168.1.11").unwrap();
    assert_eq!(sonos.matched_confidence(), ConfidenceLevel::Medium);
    assert!(!sonos.enforce_permitted());

    let phone = h.cache.host("3c:28:6d:00:00:12").unwrap();
    assert_eq!(phone.matched_profile_uuid(), Some("android-phone"));

    assert_eq!(
        h.cache.enforceable_hosts(),
        vec![("00:17:88:00:00:10".to_string(), "hue-bridge".to_string())]
    );
}

#[test]
fn partial_evidence_drops_to_lower_identifier() {
    let mut h = harness();
    h.cache.load_profiles(&catalog());
    h.cache.add_dns_query_ip("192.168.1.10", "www.meethue.com", "52.44.246.12", expire());
    h.cache.match_all();
    let hue = h.cache.host("00:17:88:00:00:10").unwrap();
    assert_eq!(hue.matched_confidence(), ConfidenceLevel::Low);
    assert!(!hue.enforce_permitted());
}

#[test]
fn export_then_import_restores_assignments() {
    let mut h = harness();
    h.cache.load_profiles(&catalog());
    h.cache.add_dns_query_ip("192.168.1.10", "www.meethue.com", "52.44.246.12", expire());
    h.cache.match_all();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("DeviceMatches.json");
    assert_eq!(h.cache.export_matches_file(&path, false).unwrap(), 1);

    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains("\n    {"));

    let mut fresh = CacheHarness::new();
    assert_eq!(fresh.cache.import_matches_file(&path).unwrap(), 1);
    let host = fresh.cache.host("00:17:88:00:00:10").unwrap();
    assert_eq!(host.matched_profile_uuid(), Some("hue-bridge"));
    assert_eq!(host.matched_confidence(), ConfidenceLevel::Low);
    // imported hosts need no neighbor lookup
    assert_eq!(fresh.table.scan_count(), 0);
}

#[test]
fn import_rejects_conflicting_uuid() {
    let mut h = CacheHarness::new();
    let first = json!([MatchEntryBuilder::new("aa:bb:cc:00:00:01", "hue-bridge")
        .confidence("medium")
        .build()]);
    assert_eq!(h.cache.import_matches(&first), 1);

    let conflicting = json!([
        MatchEntryBuilder::new("AA:BB:CC:00:00:01", "sonos-one").build(),
        MatchEntryBuilder::new("aa:bb:cc:00:00:01", "hue-bridge").enforce("low").build(),
    ]);
    assert_eq!(h.cache.import_matches(&conflicting), 1);
    let host = h.cache.host("aa:bb:cc:00:00:01").unwrap();
    assert_eq!(host.matched_profile_uuid(), Some("hue-bridge"));
    assert_eq!(host.matched().unwrap().enforce_level, ConfidenceLevel::Low);
}

#[test]
fn missing_files_report_errors() {
    let mut h = CacheHarness::new();
    let dir = tempfile::tempdir().unwrap();
    assert!(h.cache.load_profiles_file(&dir.path().join("absent.json")).is_err());
    assert!(h.cache.import_matches_file(&dir.path().join("absent.json")).is_err());
    assert!(h.cache.export_matches_file(&dir.path().join("no/such/dir/out.json"), true).is_err());
}

#[test]
fn profiles_file_replaces_catalog() {
    let mut h = CacheHarness::new();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("DeviceProfiles.json");
    std::fs::write(&path, serde_json::to_string(&catalog()).unwrap()).unwrap();
    assert_eq!(h.cache.load_profiles_file(&path).unwrap(), 3);

    let smaller = ProfileBuilder::catalog(vec![ProfileBuilder::new("sonos-one")]);
    std::fs::write(&path, serde_json::to_string(&smaller).unwrap()).unwrap();
    assert_eq!(h.cache.load_profiles_file(&path).unwrap(), 1);
    assert!(!h.cache.profiles().contains("hue-bridge"));
}

#[test]
fn prune_keeps_identity() {
    let mut h = harness();
    let now = Utc::now();
    h.cache.add_dns_query_ip("192.168.1.10", "a.example", "1.1.1.1", now - Duration::seconds(1));
    h.cache.add_flow("192.168.1.10", 40000, "1.1.1.1", 443, 6, now + Duration::hours(1));

    assert_eq!(h.cache.prune_at(now, false), 1);
    let host = h.cache.host("00:17:88:00:00:10").unwrap();
    assert_eq!(host.dns_log_entry_count(), 0);
    assert_eq!(host.flow_count(), 1);

    h.cache.prune(true);
    assert_eq!(h.cache.host_count(), 1);
    assert_eq!(h.cache.host("00:17:88:00:00:10").unwrap().flow_count(), 0);
    assert_eq!(h.cache.mac_for_ip("192.168.1.10"), Some("00:17:88:00:00:10"));
}

#[test]
fn shared_cache_matches_owned_behaviour() {
    let (shared, table) = harness().shared();
    shared.load_profiles(&catalog());
    assert!(shared.add_dns_query_ip("192.168.1.10", "www.meethue.com", "1.1.1.1", expire()));
    assert!(!shared.add_dns_query_ip("192.168.1.99", "www.meethue.com", "1.1.1.1", expire()));
    assert_eq!(shared.match_all(), 1);
    assert_eq!(shared.host_count(), 1);
    assert_eq!(table.scans_for("192.168.1.99"), 2);

    let report = shared.traffic_stats_report(Duration::hours(1));
    assert_eq!(report.len(), 1);
    assert!(shared.device_stats_report().is_empty());
}
