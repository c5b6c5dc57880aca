//! Host-state registry and device identification engine.
//!
//! Network evidence (DNS queries, flows, DHCP requests, SSDP announcements)
//! is attributed to hosts keyed by MAC address. Device profiles loaded from
//! JSON describe how to recognise a kind of device from that evidence;
//! matching assigns each host its best profile together with a confidence
//! level and the level required before enforcement may act on it.

pub mod cache;
pub mod confidence;
pub mod error;
pub mod evidence;
pub mod host;
pub mod profile;
pub mod report;
pub mod resolver;
pub mod settings;
pub mod shared;
pub mod whitelist;

pub use cache::HostCache;
pub use confidence::ConfidenceLevel;
pub use error::{CoreError, Result};
pub use evidence::{normalize_mac, DhcpRequest, EvidenceField, SsdpHost};
pub use host::{Host, HostMatch};
pub use profile::{DeviceProfile, Identifier, MatchCondition, ProfileCatalog, ProfileMatch};
pub use report::StatsReport;
pub use resolver::{NeighborTable, ProcNeighborTable, Resolution, Resolver};
pub use settings::CacheSettings;
pub use shared::SharedHostCache;
pub use whitelist::Whitelist;
