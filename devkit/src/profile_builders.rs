/*!
Builders for device profile and match documents

Produce the JSON shapes the registry loads, so tests don't hand-write them.
*/

use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Default)]
pub struct IdentifierBuilder {
    identify: Option<String>,
    enforce: Option<String>,
    must_match: Map<String, Value>,
    must_contain: Map<String, Value>,
}

impl IdentifierBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identify(mut self, level: &str) -> Self {
        self.identify = Some(level.to_string());
        self
    }

    pub fn enforce(mut self, level: &str) -> Self {
        self.enforce = Some(level.to_string());
        self
    }

    pub fn must_match(mut self, field: &str, value: &str) -> Self {
        self.must_match.insert(field.to_string(), json!(value));
        self
    }

    pub fn must_contain(mut self, field: &str, value: &str) -> Self {
        self.must_contain.insert(field.to_string(), json!(value));
        self
    }

    pub fn build(self) -> Value {
        let mut j = Map::new();
        if let Some(level) = self.identify {
            j.insert("IdentifyConfidenceLevel".into(), json!(level));
        }
        if let Some(level) = self.enforce {
            j.insert("EnforceConfidenceLevel".into(), json!(level));
        }
        if !self.must_match.is_empty() {
            j.insert("MustMatch".into(), Value::Object(self.must_match));
        }
        if !self.must_contain.is_empty() {
            j.insert("MustContain".into(), Value::Object(self.must_contain));
        }
        Value::Object(j)
    }
}

#[derive(Debug, Clone)]
pub struct ProfileBuilder {
    uuid: String,
    version: Option<u64>,
    manufacturer: Option<String>,
    model: Option<String>,
    identifiers: Vec<Value>,
}

impl ProfileBuilder {
    pub fn new(uuid: &str) -> Self {
        Self {
            uuid: uuid.to_string(),
            version: None,
            manufacturer: None,
            model: None,
            identifiers: Vec::new(),
        }
    }

    pub fn version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn device(mut self, manufacturer: &str, model: &str) -> Self {
        self.manufacturer = Some(manufacturer.to_string());
        self.model = Some(model.to_string());
        self
    }

    pub fn identifier(mut self, identifier: IdentifierBuilder) -> Self {
        self.identifiers.push(identifier.build());
        self
    }

    /// Raw identifier object, for malformed input cases.
    pub fn raw_identifier(mut self, identifier: Value) -> Self {
        self.identifiers.push(identifier);
        self
    }

    pub fn build(self) -> Value {
        let mut j = Map::new();
        j.insert("DeviceProfileUuid".into(), json!(self.uuid));
        if let Some(version) = self.version {
            j.insert("DeviceProfileVersion".into(), json!(version));
        }
        if let Some(manufacturer) = self.manufacturer {
            j.insert("Manufacturer".into(), json!(manufacturer));
        }
        if let Some(model) = self.model {
            j.insert("Model".into(), json!(model));
        }
        j.insert("Identifiers".into(), Value::Array(self.identifiers));
        Value::Object(j)
    }

    /// Catalog document from several profiles.
    pub fn catalog(profiles: Vec<ProfileBuilder>) -> Value {
        Value::Array(profiles.into_iter().map(ProfileBuilder::build).collect())
    }
}

/// One entry of a match import document.
#[derive(Debug, Clone)]
pub struct MatchEntryBuilder {
    entry: Map<String, Value>,
}

impl MatchEntryBuilder {
    pub fn new(mac: &str, uuid: &str) -> Self {
        let mut entry = Map::new();
        entry.insert("MacAddress".into(), json!(mac));
        entry.insert("DeviceProfileUuid".into(), json!(uuid));
        Self { entry }
    }

    pub fn confidence(mut self, level: &str) -> Self {
        self.entry.insert("Confidence".into(), json!(level));
        self
    }

    pub fn enforce(mut self, level: &str) -> Self {
        self.entry.insert("EnforceConfidenceLevel".into(), json!(level));
        self
    }

    pub fn build(self) -> Value {
        Value::Object(self.entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devmatch_core::DeviceProfile;

    #[test]
    fn test_built_profile_parses() {
        let j = ProfileBuilder::new("a1")
            .version(3)
            .device("Signify", "Hue Bridge")
            .identifier(
                IdentifierBuilder::new()
                    .identify("High")
                    .enforce("Medium")
                    .must_contain("DnsQueriedName", "meethue.com"),
            )
            .build();
        let profile = DeviceProfile::from_json(&j).unwrap();
        assert_eq!(profile.uuid(), "a1");
        assert_eq!(profile.version(), Some(3));
        assert_eq!(profile.identifiers().len(), 1);
    }

    #[test]
    fn test_raw_identifier_kept_verbatim() {
        let catalog = ProfileBuilder::catalog(vec![ProfileBuilder::new("b2")
            .identifier(IdentifierBuilder::new().must_match("DhcpVendor", "udhcp"))
            .raw_identifier(json!({"MustMatch": {"Bogus": "x"}}))]);
        assert_eq!(catalog[0]["Identifiers"][1]["MustMatch"]["Bogus"], "x");

        let profile = DeviceProfile::from_json(&catalog[0]).unwrap();
        assert_eq!(profile.identifiers().len(), 1);
    }
}
