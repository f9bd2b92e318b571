use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};
use uuid::Uuid;

use crate::error::AppError;

/// Kind of property a listing advertises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Apartment,
    House,
    Bungalow,
    Townhouse,
    Villa,
    Land,
    Commercial,
    Office,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::Apartment => "apartment",
            PropertyType::House => "house",
            PropertyType::Bungalow => "bungalow",
            PropertyType::Townhouse => "townhouse",
            PropertyType::Villa => "villa",
            PropertyType::Land => "land",
            PropertyType::Commercial => "commercial",
            PropertyType::Office => "office",
        }
    }
}

impl Display for PropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "apartment" => Ok(PropertyType::Apartment),
            "house" => Ok(PropertyType::House),
            "bungalow" => Ok(PropertyType::Bungalow),
            "townhouse" => Ok(PropertyType::Townhouse),
            "villa" => Ok(PropertyType::Villa),
            "land" => Ok(PropertyType::Land),
            "commercial" => Ok(PropertyType::Commercial),
            "office" => Ok(PropertyType::Office),
            other => Err(AppError::InvalidInput(format!(
                "Unknown property type: {}",
                other
            ))),
        }
    }
}

/// A property listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Property {
    pub id: Uuid,
    /// Account that owns the listing and receives its notifications
    pub owner_id: Uuid,
    pub agent_name: String,
    pub agent_email: String,
    pub title: String,
    pub property_type: PropertyType,
    pub county: String,
    pub price: f64,
    pub is_active: bool,
    /// End of the paid visibility window
    pub expires_at: Option<DateTime<Utc>>,
    /// Threshold (in days) of the last expiry warning sent for the current window
    pub last_expiry_warning_days: Option<i64>,
    pub views: i64,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a listing
#[derive(Debug, Clone, Deserialize)]
pub struct NewProperty {
    pub owner_id: Uuid,
    pub agent_name: String,
    pub agent_email: String,
    pub title: String,
    pub property_type: PropertyType,
    pub county: String,
    pub price: f64,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewProperty {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.title.trim().is_empty() {
            return Err(AppError::InvalidInput("title must not be empty".to_string()));
        }
        if self.county.trim().is_empty() {
            return Err(AppError::InvalidInput("county must not be empty".to_string()));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(AppError::InvalidInput(
                "price must be a non-negative number".to_string(),
            ));
        }
        if !self.agent_email.contains('@') {
            return Err(AppError::InvalidInput("agent_email is invalid".to_string()));
        }
        Ok(())
    }

    pub fn into_property(self, now: DateTime<Utc>) -> Property {
        Property {
            id: Uuid::new_v4(),
            owner_id: self.owner_id,
            agent_name: self.agent_name.trim().to_string(),
            agent_email: self.agent_email.trim().to_string(),
            title: self.title.trim().to_string(),
            property_type: self.property_type,
            county: normalize_county(&self.county),
            price: self.price,
            is_active: true,
            expires_at: self.expires_at,
            last_expiry_warning_days: None,
            views: 0,
            created_at: now,
        }
    }
}

/// Counties are compared case-insensitively; store them in title case
pub fn normalize_county(county: &str) -> String {
    county
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Weight of a ranked category: 1.0 for the top entry, falling linearly with
/// rank; 0.0 when the value is not ranked at all
fn rank_weight(position: Option<usize>, len: usize) -> f64 {
    match position {
        Some(rank) if len > 0 => (len - rank) as f64 / len as f64,
        _ => 0.0,
    }
}

/// Preference-driven listing lookup.
///
/// `property_types` and `counties` are in rank order. Stores return matches
/// ordered by [`PropertyQuery::score`] before applying `limit`.
#[derive(Debug, Clone, Default)]
pub struct PropertyQuery {
    pub property_types: Vec<PropertyType>,
    pub counties: Vec<String>,
    /// Inclusive `(min, max)`; a listing priced inside it scores one extra point
    pub price_range: Option<(f64, f64)>,
    pub exclude: Vec<Uuid>,
    pub limit: usize,
}

impl PropertyQuery {
    pub fn matches(&self, property: &Property) -> bool {
        self.property_types.contains(&property.property_type)
            || self
                .counties
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&property.county))
    }

    /// Type rank weight plus county rank weight plus the price bonus
    pub fn score(&self, property: &Property) -> f64 {
        let type_weight = rank_weight(
            self.property_types
                .iter()
                .position(|t| *t == property.property_type),
            self.property_types.len(),
        );
        let county_weight = rank_weight(
            self.counties
                .iter()
                .position(|c| c.eq_ignore_ascii_case(&property.county)),
            self.counties.len(),
        );
        let price_bonus = match self.price_range {
            Some((min, max)) if property.price >= min && property.price <= max => 1.0,
            _ => 0.0,
        };
        type_weight + county_weight + price_bonus
    }
}
