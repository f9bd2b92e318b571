use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;

/// One arm of an A/B test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub name: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub name: String,
    pub variants: Vec<Variant>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Experiment {
    pub fn total_weight(&self) -> u64 {
        self.variants.iter().map(|v| u64::from(v.weight)).sum()
    }

    /// The variant served when the test is switched off
    pub fn control(&self) -> Option<&Variant> {
        self.variants.first()
    }
}

/// Sticky variant for one client in one test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantAssignment {
    pub test_name: String,
    pub client_id: Uuid,
    pub variant: String,
    pub assigned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Impression,
    Click,
    Conversion,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Impression => "impression",
            EventKind::Click => "click",
            EventKind::Conversion => "conversion",
        }
    }
}

impl FromStr for EventKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "impression" => Ok(EventKind::Impression),
            "click" => Ok(EventKind::Click),
            "conversion" => Ok(EventKind::Conversion),
            other => Err(AppError::Internal(format!("Unknown event kind: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentEvent {
    pub test_name: String,
    pub client_id: Uuid,
    pub variant: String,
    pub kind: EventKind,
    pub occurred_at: DateTime<Utc>,
}

/// Raw per-variant counters as stored
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariantCounts {
    pub variant: String,
    pub assignments: i64,
    pub impressions: i64,
    pub clicks: i64,
    pub conversions: i64,
}

/// Per-variant outcome of a test
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantStats {
    pub variant: String,
    pub assignments: i64,
    pub impressions: i64,
    pub clicks: i64,
    pub conversions: i64,
    pub click_rate: f64,
    pub conversion_rate: f64,
}

impl From<VariantCounts> for VariantStats {
    fn from(counts: VariantCounts) -> Self {
        let rate = |n: i64| {
            if counts.impressions == 0 {
                0.0
            } else {
                n as f64 / counts.impressions as f64
            }
        };
        Self {
            click_rate: rate(counts.clicks),
            conversion_rate: rate(counts.conversions),
            variant: counts.variant,
            assignments: counts.assignments,
            impressions: counts.impressions,
            clicks: counts.clicks,
            conversions: counts.conversions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates_zero_without_impressions() {
        let stats: VariantStats = VariantCounts {
            variant: "a".to_string(),
            assignments: 3,
            clicks: 2,
            ..VariantCounts::default()
        }
        .into();
        assert_eq!(stats.click_rate, 0.0);
        assert_eq!(stats.conversion_rate, 0.0);
    }

    #[test]
    fn test_rates_relative_to_impressions() {
        let stats: VariantStats = VariantCounts {
            variant: "b".to_string(),
            assignments: 4,
            impressions: 4,
            clicks: 2,
            conversions: 1,
        }
        .into();
        assert_eq!(stats.click_rate, 0.5);
        assert_eq!(stats.conversion_rate, 0.25);
    }

    #[test]
    fn test_variant_weight_defaults_to_one() {
        let variant: Variant = serde_json::from_str(r#"{"name":"control"}"#).unwrap();
        assert_eq!(variant.weight, 1);
    }
}
