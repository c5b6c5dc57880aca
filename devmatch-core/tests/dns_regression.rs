use devmatch_devkit::dns_regression_fixture;

#[test]
fn dns_capture_counts_per_client() {
    let fixture = dns_regression_fixture();
    assert_eq!(fixture.add_by_mac_results, vec![true, true, true, true, true, false, false]);

    let cache = &fixture.harness.cache;
    assert_eq!(cache.host_count(), fixture.expected_hosts);
    for (ip, expected) in &fixture.expected_counts {
        assert_eq!(cache.host_dns_query_count(ip), *expected, "DNS queries by {}", ip);
    }
    assert_eq!(fixture.accepted_queries, 39);
}

#[test]
fn refused_bootstrap_does_not_rebind_ip() {
    let fixture = dns_regression_fixture();
    let cache = &fixture.harness.cache;

    let host = cache.host("00:00:00:00:00:05").unwrap();
    assert_eq!(host.ip_addresses(), &["192.168.1.241".to_string()]);
    assert_eq!(cache.mac_for_ip("192.168.1.251"), Some("00:00:00:00:00:07"));
    assert_eq!(cache.mac_for_ip("192.168.1.234"), Some("00:00:00:00:00:06"));
}

#[test]
fn resolved_clients_scanned_once() {
    let fixture = dns_regression_fixture();
    let table = &fixture.harness.table;
    assert_eq!(table.scans_for("192.168.1.240"), 1);
    assert_eq!(table.scans_for("192.168.1.251"), 1);
    assert_eq!(table.scans_for("192.168.1.241"), 0);
    assert!(table.probes_sent().is_empty());
}

#[test]
fn unknown_ip_has_no_queries() {
    let fixture = dns_regression_fixture();
    assert_eq!(fixture.harness.cache.host_dns_query_count("192.168.1.7"), 0);
}
