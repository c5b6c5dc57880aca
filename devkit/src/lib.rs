/*!
# devmatch DevKit - test doubles and fixtures

Helpers for exercising the registry without touching the host system:
- scripted neighbor table (no /proc, no UDP probes)
- JSON builders for device profiles and match documents
- ready-made HostCache harness and the DNS regression fixture
*/

pub mod neighbor_stub;
pub mod profile_builders;
pub mod test_utils;

pub use neighbor_stub::ScriptedNeighborTable;
pub use profile_builders::{IdentifierBuilder, MatchEntryBuilder, ProfileBuilder};
pub use test_utils::{dns_regression_fixture, CacheHarness, DnsFixture};
