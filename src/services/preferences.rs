//! Preference aggregation
//!
//! Turns a user's liked/viewed/saved history into ranked categories. Pure
//! functions over already-loaded data; loading happens in the
//! recommendation service.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use uuid::Uuid;

use crate::models::{
    normalize_county, normalize_topic, BlogPost, EntityKind, Interaction, Property, PropertyQuery,
    PropertyType,
};

/// A category value and how often it appeared
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCategory<T> {
    pub value: T,
    pub count: usize,
}

/// Preferred price range derived from the historical mean
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceBand {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl PriceBand {
    pub fn around(mean: f64, tolerance: f64) -> Self {
        Self {
            mean,
            min: mean * (1.0 - tolerance),
            max: mean * (1.0 + tolerance),
        }
    }

    pub fn contains(&self, price: f64) -> bool {
        price >= self.min && price <= self.max
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PropertyPreferences {
    pub property_types: Vec<RankedCategory<PropertyType>>,
    pub counties: Vec<RankedCategory<String>>,
    pub price_band: Option<PriceBand>,
    /// Listings the user already interacted with
    #[serde(skip)]
    pub seen: HashSet<Uuid>,
}

impl PropertyPreferences {
    pub fn is_empty(&self) -> bool {
        self.property_types.is_empty() && self.counties.is_empty()
    }

    /// Store lookup for unseen listings matching these preferences, ranked
    /// by [`PropertyPreferences::score`]
    pub fn query(&self, limit: usize) -> PropertyQuery {
        PropertyQuery {
            property_types: self.property_types.iter().map(|c| c.value).collect(),
            counties: self.counties.iter().map(|c| c.value.clone()).collect(),
            price_range: self.price_band.map(|band| (band.min, band.max)),
            exclude: self.seen.iter().copied().collect(),
            limit,
        }
    }

    /// Relevance of a candidate listing
    pub fn score(&self, property: &Property) -> f64 {
        self.query(0).score(property)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BlogPreferences {
    pub topics: Vec<RankedCategory<String>>,
    #[serde(skip)]
    pub seen: HashSet<Uuid>,
}

impl BlogPreferences {
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn topic_names(&self) -> Vec<String> {
        self.topics.iter().map(|t| t.value.clone()).collect()
    }

    /// How many preferred topics the post carries
    pub fn matching_topics(&self, post: &BlogPost) -> usize {
        post.topics
            .iter()
            .filter(|t| self.topics.iter().any(|p| &p.value == *t))
            .count()
    }
}

/// Sorts by count descending, ties by name ascending, keeps `top_k`
fn rank<T, F>(counts: HashMap<T, usize>, top_k: usize, name: F) -> Vec<RankedCategory<T>>
where
    T: Eq + Hash,
    F: Fn(&T) -> String,
{
    let mut ranked: Vec<RankedCategory<T>> = counts
        .into_iter()
        .map(|(value, count)| RankedCategory { value, count })
        .collect();
    ranked.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| name(&a.value).cmp(&name(&b.value)))
    });
    ranked.truncate(top_k);
    ranked
}

/// Tallies property type and county across property interactions and derives
/// a price band from the distinct interacted listings
pub fn aggregate_property_preferences(
    interactions: &[Interaction],
    properties: &[Property],
    top_k: usize,
    tolerance: f64,
) -> PropertyPreferences {
    let by_id: HashMap<Uuid, &Property> = properties.iter().map(|p| (p.id, p)).collect();

    let mut types: HashMap<PropertyType, usize> = HashMap::new();
    let mut counties: HashMap<String, usize> = HashMap::new();
    let mut seen: HashSet<Uuid> = HashSet::new();

    for interaction in interactions
        .iter()
        .filter(|i| i.entity.kind == EntityKind::Property)
    {
        let Some(property) = by_id.get(&interaction.entity.id) else {
            continue;
        };
        *types.entry(property.property_type).or_default() += 1;
        *counties.entry(normalize_county(&property.county)).or_default() += 1;
        seen.insert(property.id);
    }

    let price_band = if seen.is_empty() {
        None
    } else {
        let total: f64 = seen.iter().filter_map(|id| by_id.get(id)).map(|p| p.price).sum();
        Some(PriceBand::around(total / seen.len() as f64, tolerance))
    };

    PropertyPreferences {
        property_types: rank(types, top_k, |t| t.as_str().to_string()),
        counties: rank(counties, top_k, |c| c.clone()),
        price_band,
        seen,
    }
}

/// Tallies topics across blog-post interactions
pub fn aggregate_blog_preferences(
    interactions: &[Interaction],
    posts: &[BlogPost],
    top_k: usize,
) -> BlogPreferences {
    let by_id: HashMap<Uuid, &BlogPost> = posts.iter().map(|p| (p.id, p)).collect();

    let mut topics: HashMap<String, usize> = HashMap::new();
    let mut seen: HashSet<Uuid> = HashSet::new();

    for interaction in interactions
        .iter()
        .filter(|i| i.entity.kind == EntityKind::BlogPost)
    {
        let Some(post) = by_id.get(&interaction.entity.id) else {
            continue;
        };
        seen.insert(post.id);
        for topic in &post.topics {
            let topic = normalize_topic(topic);
            if !topic.is_empty() {
                *topics.entry(topic).or_default() += 1;
            }
        }
    }

    BlogPreferences {
        topics: rank(topics, top_k, |t| t.clone()),
        seen,
    }
}
