use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{normalize_county, PropertyType};

/// Optional filters attached to a search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_type: Option<PropertyType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub county: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.property_type.is_none()
            && self.county.is_none()
            && self.min_price.is_none()
            && self.max_price.is_none()
    }

    fn normalized(&self) -> Self {
        Self {
            property_type: self.property_type,
            county: self
                .county
                .as_deref()
                .map(normalize_county)
                .filter(|c| !c.is_empty()),
            min_price: self.min_price,
            max_price: self.max_price,
        }
    }
}

/// A remembered search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHistoryEntry {
    pub query: String,
    #[serde(default)]
    pub filters: SearchFilters,
    pub searched_at: DateTime<Utc>,
    #[serde(default = "default_search_count")]
    pub search_count: i64,
}

fn default_search_count() -> i64 {
    1
}

impl SearchHistoryEntry {
    /// Builds a fresh entry with a normalized query and filters
    pub fn new(query: &str, filters: SearchFilters, searched_at: DateTime<Utc>) -> Self {
        Self {
            query: collapse_whitespace(query),
            filters: filters.normalized(),
            searched_at,
            search_count: 1,
        }
    }

    /// Identity of a search: same key means same search
    pub fn key(&self) -> String {
        let filters = &self.filters;
        let mut parts = vec![collapse_whitespace(&self.query).to_lowercase()];
        parts.push(
            filters
                .property_type
                .map(|t| t.as_str().to_string())
                .unwrap_or_default(),
        );
        parts.push(
            filters
                .county
                .as_deref()
                .map(|c| normalize_county(c).to_lowercase())
                .unwrap_or_default(),
        );
        parts.push(filters.min_price.map(format_price).unwrap_or_default());
        parts.push(filters.max_price.map(format_price).unwrap_or_default());
        parts.join("|")
    }
}

fn format_price(price: f64) -> String {
    format!("{}", price)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
