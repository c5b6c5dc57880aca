//! Confidence tiers used by identifiers and match results.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Ordered certainty tier: `None < Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::None => "none",
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::High => "high",
        }
    }

    /// Level granted when an identifier matches. Missing = `Low`; `none` is
    /// not a valid identify level.
    pub fn parse_identify(value: Option<&Value>) -> Result<Self> {
        let level = Self::parse_field("IdentifyConfidenceLevel", value, ConfidenceLevel::Low)?;
        if level == ConfidenceLevel::None {
            return Err(CoreError::InvalidConfidence {
                field: "IdentifyConfidenceLevel".into(),
                value: "none".into(),
            });
        }
        Ok(level)
    }

    /// Level required before enforcement. Missing = `None`.
    pub fn parse_enforce(value: Option<&Value>) -> Result<Self> {
        Self::parse_field("EnforceConfidenceLevel", value, ConfidenceLevel::None)
    }

    fn parse_field(field: &str, value: Option<&Value>, default: Self) -> Result<Self> {
        match value {
            None => Ok(default),
            Some(Value::String(s)) => s.parse().map_err(|_| CoreError::InvalidConfidence {
                field: field.to_string(),
                value: s.clone(),
            }),
            Some(other) => Err(CoreError::InvalidConfidence {
                field: field.to_string(),
                value: other.to_string(),
            }),
        }
    }
}

impl FromStr for ConfidenceLevel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(ConfidenceLevel::None),
            "low" => Ok(ConfidenceLevel::Low),
            "medium" => Ok(ConfidenceLevel::Medium),
            "high" => Ok(ConfidenceLevel::High),
            _ => Err(CoreError::InvalidConfidence {
                field: "confidence".into(),
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_total_order() {
        assert!(ConfidenceLevel::None < ConfidenceLevel::Low);
        assert!(ConfidenceLevel::Low < ConfidenceLevel::Medium);
        assert!(ConfidenceLevel::Medium < ConfidenceLevel::High);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("HiGh".parse::<ConfidenceLevel>().unwrap(), ConfidenceLevel::High);
        assert_eq!("MEDIUM".parse::<ConfidenceLevel>().unwrap(), ConfidenceLevel::Medium);
        assert!("certain".parse::<ConfidenceLevel>().is_err());
    }

    #[test]
    fn test_field_defaults() {
        assert_eq!(ConfidenceLevel::parse_identify(None).unwrap(), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::parse_enforce(None).unwrap(), ConfidenceLevel::None);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(ConfidenceLevel::parse_identify(Some(&json!("none"))).is_err());
        assert!(ConfidenceLevel::parse_identify(Some(&json!(3))).is_err());
        assert!(ConfidenceLevel::parse_enforce(Some(&json!("sometimes"))).is_err());
        assert_eq!(
            ConfidenceLevel::parse_enforce(Some(&json!("None"))).unwrap(),
            ConfidenceLevel::None
        );
    }
}
