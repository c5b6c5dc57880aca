/**
 * DEVICE PROFILES - match rules loaded from the profile catalog document
 *
 * RÔLE : turns the catalog JSON into MatchCondition / Identifier / DeviceProfile
 * values and evaluates them against a host's evidence.
 *
 * FONCTIONNEMENT :
 * - MatchCondition = one field compared exactly (MustMatch) or by substring (MustContain)
 * - Identifier = every condition must hold; grants IdentifyConfidenceLevel
 * - DeviceProfile = any identifier may hold; the highest identify level wins
 * - ProfileCatalog = uuid -> profile, in document order for deterministic tie-breaks
 */

use crate::confidence::ConfidenceLevel;
use crate::error::{CoreError, Result};
use crate::evidence::EvidenceField;
use crate::host::Host;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, error, warn};

/// Single predicate over one evidence field.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCondition {
    field: EvidenceField,
    expected: String,
    containment: bool,
}

impl MatchCondition {
    pub fn new(field: EvidenceField, expected: impl Into<String>, containment: bool) -> Self {
        Self {
            field,
            expected: expected.into(),
            containment,
        }
    }

    pub fn field(&self) -> EvidenceField {
        self.field
    }

    pub fn expected(&self) -> &str {
        &self.expected
    }

    pub fn is_containment(&self) -> bool {
        self.containment
    }

    /// Absent evidence never matches.
    pub fn evaluate(&self, value: Option<&str>) -> bool {
        match value {
            None => false,
            Some(v) if self.containment => v.contains(self.expected.as_str()),
            Some(v) => v == self.expected,
        }
    }

    /// Multi-valued fields hold if any observed value satisfies the predicate.
    pub fn matches(&self, host: &Host) -> bool {
        host.evidence_values(self.field)
            .iter()
            .any(|v| self.evaluate(Some(v.as_ref())))
    }
}

/// Rule group with its confidence tags.
#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    identify_level: ConfidenceLevel,
    enforce_level: ConfidenceLevel,
    conditions: Vec<MatchCondition>,
}

impl Identifier {
    pub fn new(
        identify_level: ConfidenceLevel,
        enforce_level: ConfidenceLevel,
        conditions: Vec<MatchCondition>,
    ) -> Self {
        Self {
            identify_level,
            enforce_level,
            conditions,
        }
    }

    /// Parses one `Identifiers[]` entry. Unknown field names and invalid
    /// confidence values reject the identifier; missing predicate groups leave
    /// it empty, and an empty identifier never matches.
    pub fn from_json(j: &Value) -> Result<Self> {
        let identify_level = ConfidenceLevel::parse_identify(j.get("IdentifyConfidenceLevel"))?;
        let enforce_level = ConfidenceLevel::parse_enforce(j.get("EnforceConfidenceLevel"))?;

        let must_match = j.get("MustMatch");
        let must_contain = j.get("MustContain");
        if must_match.is_none() && must_contain.is_none() {
            error!("Identifier has no MustMatch and no MustContain restrictions");
        }

        let mut conditions = Vec::new();
        let groups = [
            ("MustMatch", must_match, false),
            ("MustContain", must_contain, true),
        ];
        for (group, value, containment) in groups {
            let Some(value) = value else { continue };
            let Some(object) = value.as_object() else {
                error!("{group} condition is not a JSON Object");
                continue;
            };
            for (key, expected) in object {
                let field: EvidenceField = key.parse()?;
                let Some(expected) = expected.as_str() else {
                    return Err(CoreError::InvalidIdentifier(format!(
                        "{group}.{key} is not a string"
                    )));
                };
                conditions.push(MatchCondition::new(field, expected, containment));
            }
        }

        Ok(Self::new(identify_level, enforce_level, conditions))
    }

    pub fn identify_level(&self) -> ConfidenceLevel {
        self.identify_level
    }

    pub fn enforce_level(&self) -> ConfidenceLevel {
        self.enforce_level
    }

    pub fn conditions(&self) -> &[MatchCondition] {
        &self.conditions
    }

    pub fn evaluate(&self, host: &Host) -> bool {
        !self.conditions.is_empty() && self.conditions.iter().all(|c| c.matches(host))
    }
}

/// Outcome of evaluating one profile against a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileMatch {
    pub confidence: ConfidenceLevel,
    pub enforce_level: ConfidenceLevel,
    /// Position of the winning identifier in the profile.
    pub identifier: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceProfile {
    uuid: String,
    version: Option<u64>,
    manufacturer: Option<String>,
    model: Option<String>,
    identifiers: Vec<Identifier>,
}

impl DeviceProfile {
    pub fn new(uuid: impl Into<String>, identifiers: Vec<Identifier>) -> Self {
        Self {
            uuid: uuid.into(),
            version: None,
            manufacturer: None,
            model: None,
            identifiers,
        }
    }

    /// Parses one catalog entry. A bad identifier is dropped with a logged
    /// error; the rest of the profile is kept.
    pub fn from_json(j: &Value) -> Result<Self> {
        let uuid = match j.get("DeviceProfileUuid") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(_) => {
                return Err(CoreError::MissingProfileUuid(
                    "DeviceProfileUuid is not a string".into(),
                ))
            }
            None => {
                return Err(CoreError::MissingProfileUuid("no DeviceProfileUuid set".into()))
            }
        };

        let mut identifiers = Vec::new();
        match j.get("Identifiers").and_then(Value::as_array) {
            Some(entries) => {
                for entry in entries {
                    match Identifier::from_json(entry) {
                        Ok(identifier) => identifiers.push(identifier),
                        Err(e) => error!(uuid = %uuid, "Dropping identifier: {}", e),
                    }
                }
            }
            None => warn!(uuid = %uuid, "Device profile has no Identifiers array"),
        }

        Ok(Self {
            uuid,
            version: j.get("DeviceProfileVersion").and_then(Value::as_u64),
            manufacturer: j.get("Manufacturer").and_then(Value::as_str).map(str::to_string),
            model: j.get("Model").and_then(Value::as_str).map(str::to_string),
            identifiers,
        })
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn version(&self) -> Option<u64> {
        self.version
    }

    pub fn manufacturer(&self) -> Option<&str> {
        self.manufacturer.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn identifiers(&self) -> &[Identifier] {
        &self.identifiers
    }

    /// Highest identify level among satisfied identifiers; first declared wins ties.
    pub fn evaluate(&self, host: &Host) -> Option<ProfileMatch> {
        let mut best: Option<ProfileMatch> = None;
        for (index, identifier) in self.identifiers.iter().enumerate() {
            if !identifier.evaluate(host) {
                continue;
            }
            let better = best.map_or(true, |b| identifier.identify_level() > b.confidence);
            if better {
                best = Some(ProfileMatch {
                    confidence: identifier.identify_level(),
                    enforce_level: identifier.enforce_level(),
                    identifier: index,
                });
            }
        }
        best
    }
}

/// Loaded catalog, keyed by uuid and remembering document order.
#[derive(Debug, Clone, Default)]
pub struct ProfileCatalog {
    profiles: HashMap<String, DeviceProfile>,
    order: Vec<String>,
}

impl ProfileCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a catalog document (JSON array). Malformed entries are skipped.
    pub fn from_document(document: &Value) -> Result<Self> {
        let entries = document.as_array().ok_or(CoreError::NotAnArray)?;
        let mut catalog = Self::new();
        for entry in entries {
            match DeviceProfile::from_json(entry) {
                Ok(profile) => catalog.insert(profile),
                Err(e) => error!("Rejecting device profile: {}", e),
            }
        }
        Ok(catalog)
    }

    /// A duplicate uuid replaces the earlier definition in place.
    pub fn insert(&mut self, profile: DeviceProfile) {
        let uuid = profile.uuid().to_string();
        if self.profiles.insert(uuid.clone(), profile).is_some() {
            debug!(uuid = %uuid, "Replacing duplicate device profile");
        } else {
            self.order.push(uuid);
        }
    }

    pub fn get(&self, uuid: &str) -> Option<&DeviceProfile> {
        self.profiles.get(uuid)
    }

    pub fn contains(&self, uuid: &str) -> bool {
        self.profiles.contains_key(uuid)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn uuids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Best profile for a host; earlier profiles win confidence ties.
    pub fn best_match(&self, host: &Host) -> Option<(&DeviceProfile, ProfileMatch)> {
        let mut best: Option<(&DeviceProfile, ProfileMatch)> = None;
        for uuid in &self.order {
            let Some(profile) = self.profiles.get(uuid) else { continue };
            let Some(candidate) = profile.evaluate(host) else { continue };
            if best.map_or(true, |(_, b)| candidate.confidence > b.confidence) {
                best = Some((profile, candidate));
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{DhcpRequest, SsdpHost};
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn host_with_evidence() -> Host {
        let mut host = Host::new("00:11:22:33:44:55");
        host.dhcp_set(&DhcpRequest {
            dhcp_vendor: Some("udhcp 1.24.1".into()),
            dhcp_hostname: Some("Philips-hue".into()),
            ..Default::default()
        });
        host.ssdp_info_set(SsdpHost {
            ip_address: "192.168.1.40".into(),
            server: Some("Linux/3.14.0 UPnP/1.0 IpBridge/1.19.0".into()),
            manufacturer: Some("Royal Philips Electronics".into()),
            ..Default::default()
        });
        let expiry = Utc::now() + Duration::hours(1);
        host.dns_log_entry_set("www.meethue.com", "1.2.3.4", expiry);
        host
    }

    #[test]
    fn test_condition_modes() {
        let exact = MatchCondition::new(EvidenceField::DhcpVendor, "udhcp", false);
        let contains = MatchCondition::new(EvidenceField::DhcpVendor, "udhcp", true);
        assert!(!exact.evaluate(Some("udhcp 1.24.1")));
        assert!(exact.evaluate(Some("udhcp")));
        assert!(contains.evaluate(Some("udhcp 1.24.1")));
        assert!(!contains.evaluate(None));
        assert!(!exact.evaluate(None));
    }

    #[test]
    fn test_identifier_requires_every_condition() {
        let host = host_with_evidence();
        let satisfied = Identifier::from_json(&json!({
            "MustMatch": {"DhcpHostname": "Philips-hue"},
            "MustContain": {"SsdpServer": "IpBridge", "DnsQueriedName": "meethue.com"}
        }))
        .unwrap();
        assert!(satisfied.evaluate(&host));

        // SsdpModelName was never observed
        let missing_field = Identifier::from_json(&json!({
            "MustMatch": {"DhcpHostname": "Philips-hue"},
            "MustContain": {"SsdpServer": "IpBridge", "SsdpModelName": "Bridge"}
        }))
        .unwrap();
        assert!(!missing_field.evaluate(&host));
    }

    #[test]
    fn test_empty_identifier_fails_closed() {
        let host = host_with_evidence();
        let empty = Identifier::from_json(&json!({"IdentifyConfidenceLevel": "High"})).unwrap();
        assert!(empty.conditions().is_empty());
        assert!(!empty.evaluate(&host));
    }

    #[test]
    fn test_unknown_field_rejected_at_load() {
        let err = Identifier::from_json(&json!({"MustMatch": {"DhcpVendr": "x"}})).unwrap_err();
        assert!(matches!(err, CoreError::UnknownField(ref f) if f == "DhcpVendr"));
    }

    #[test]
    fn test_load_errors_name_the_problem() {
        let err = Identifier::from_json(&json!({"MustMatch": {"DhcpVendor": 7}})).unwrap_err();
        assert!(matches!(err, CoreError::InvalidIdentifier(_)));
        assert_eq!(err.to_string(), "Invalid identifier: MustMatch.DhcpVendor is not a string");

        let err = DeviceProfile::from_json(&json!({"Identifiers": []})).unwrap_err();
        assert_eq!(err.to_string(), "Device profile rejected: no DeviceProfileUuid set");
        let err = DeviceProfile::from_json(&json!({"DeviceProfileUuid": 42})).unwrap_err();
        assert!(matches!(err, CoreError::MissingProfileUuid(_)));

        // a bad identifier is dropped, the profile survives
        let profile = DeviceProfile::from_json(&json!({
            "DeviceProfileUuid": "p0",
            "Identifiers": [
                {"MustMatch": {"DhcpVendor": 7}},
                {"MustContain": {"DhcpVendor": "udhcp"}}
            ]
        }))
        .unwrap();
        assert_eq!(profile.identifiers().len(), 1);
    }

    #[test]
    fn test_profile_prefers_highest_confidence_regardless_of_order() {
        let host = host_with_evidence();
        let low_first = DeviceProfile::from_json(&json!({
            "DeviceProfileUuid": "p1",
            "Identifiers": [
                {"IdentifyConfidenceLevel": "Low", "MustContain": {"DhcpVendor": "udhcp"}},
                {"IdentifyConfidenceLevel": "High", "EnforceConfidenceLevel": "Medium",
                 "MustContain": {"SsdpServer": "IpBridge"}}
            ]
        }))
        .unwrap();
        let m = low_first.evaluate(&host).unwrap();
        assert_eq!(m.confidence, ConfidenceLevel::High);
        assert_eq!(m.enforce_level, ConfidenceLevel::Medium);
        assert_eq!(m.identifier, 1);

        let high_first = DeviceProfile::from_json(&json!({
            "DeviceProfileUuid": "p2",
            "Identifiers": [
                {"IdentifyConfidenceLevel": "high", "MustContain": {"SsdpServer": "IpBridge"}},
                {"IdentifyConfidenceLevel": "low", "MustContain": {"DhcpVendor": "udhcp"}}
            ]
        }))
        .unwrap();
        assert_eq!(high_first.evaluate(&host).unwrap().confidence, ConfidenceLevel::High);
    }

    #[test]
    fn test_equal_confidence_first_declared_wins() {
        let host = host_with_evidence();
        let profile = DeviceProfile::from_json(&json!({
            "DeviceProfileUuid": "p3",
            "Identifiers": [
                {"IdentifyConfidenceLevel": "medium", "MustContain": {"DhcpVendor": "udhcp"}},
                {"IdentifyConfidenceLevel": "medium", "MustContain": {"SsdpServer": "IpBridge"}}
            ]
        }))
        .unwrap();
        assert_eq!(profile.evaluate(&host).unwrap().identifier, 0);
    }

    #[test]
    fn test_catalog_skips_malformed_entries() {
        let catalog = ProfileCatalog::from_document(&json!([
            {"DeviceProfileUuid": "a", "Identifiers": []},
            {"DeviceProfileUuid": 42, "Identifiers": []},
            {"Identifiers": []},
            {"DeviceProfileUuid": "b", "Identifiers": []}
        ]))
        .unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.uuids().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(ProfileCatalog::from_document(&json!({"not": "an array"})).is_err());
    }

    #[test]
    fn test_catalog_duplicate_uuid_replaces() {
        let catalog = ProfileCatalog::from_document(&json!([
            {"DeviceProfileUuid": "a", "DeviceProfileVersion": 1, "Identifiers": []},
            {"DeviceProfileUuid": "a", "DeviceProfileVersion": 2, "Identifiers": []}
        ]))
        .unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("a").unwrap().version(), Some(2));
    }
}
