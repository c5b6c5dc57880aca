use devmatch_core::{CacheSettings, Resolver};
use devmatch_devkit::ScriptedNeighborTable;
use std::sync::Arc;

fn resolver(table: Arc<ScriptedNeighborTable>, retries: u32) -> Resolver {
    let settings = CacheSettings {
        arp_retries: retries,
        settle_delay_ms: 0,
        probe_port: 1900,
        ..Default::default()
    };
    Resolver::new(table, &settings)
}

#[test]
fn retry_bound_is_one_plus_retries() {
    let table = Arc::new(ScriptedNeighborTable::new());
    let resolution = resolver(table.clone(), 2).resolve("192.168.1.50", 2);
    assert_eq!(resolution.mac, None);
    assert_eq!(resolution.scans, 3);
    assert_eq!(table.scan_count(), 3);
    assert_eq!(table.probes_sent().len(), 2);
}

#[test]
fn zero_retries_scans_once_without_probe() {
    let table = Arc::new(ScriptedNeighborTable::new());
    let resolution = resolver(table.clone(), 0).lookup("192.168.1.50");
    assert_eq!(resolution.scans, 1);
    assert!(table.probes_sent().is_empty());
}

#[test]
fn probe_populates_entry_for_rescan() {
    let table = Arc::new(ScriptedNeighborTable::new().with_late_entry(
        "192.168.1.60",
        "AA:BB:CC:DD:EE:60",
        1,
    ));
    let resolution = resolver(table.clone(), 2).lookup("192.168.1.60");
    assert_eq!(resolution.mac.as_deref(), Some("aa:bb:cc:dd:ee:60"));
    assert_eq!(resolution.scans, 2);
    let probes = table.probes_sent();
    assert_eq!(probes.len(), 1);
    assert_eq!(probes[0].1, 1900);
}

#[test]
fn immediate_hit_sends_nothing() {
    let table = Arc::new(ScriptedNeighborTable::new().with_entry("10.0.0.2", "00:11:22:33:44:55"));
    let resolution = resolver(table.clone(), 3).lookup("10.0.0.2");
    assert_eq!(resolution.scans, 1);
    assert_eq!(resolution.mac.as_deref(), Some("00:11:22:33:44:55"));
    assert!(table.probes_sent().is_empty());
}
