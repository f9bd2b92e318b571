use serde::{Deserialize, Serialize};

pub mod blog;
pub mod experiment;
pub mod interaction;
pub mod notification;
pub mod property;
pub mod search_history;

pub use blog::{normalize_topic, normalize_topics, BlogPost, NewBlogPost};
pub use experiment::{
    EventKind, Experiment, ExperimentEvent, Variant, VariantAssignment, VariantCounts,
    VariantStats,
};
pub use interaction::{EntityKind, EntityRef, Interaction, InteractionKind};
pub use notification::{Notification, NotificationKind};
pub use property::{normalize_county, NewProperty, Property, PropertyQuery, PropertyType};
pub use search_history::{SearchFilters, SearchHistoryEntry};

// ============================================================================
// Recommendation Types
// ============================================================================

/// Why an item ended up in a recommendation list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationSource {
    /// Matched the caller's aggregated preferences
    Preference,
    /// Filled from the global popular list
    Popular,
}

/// A recommended entity together with its provenance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommended<T> {
    #[serde(flatten)]
    pub item: T,
    pub source: RecommendationSource,
}

impl<T> Recommended<T> {
    pub fn preference(item: T) -> Self {
        Self {
            item,
            source: RecommendationSource::Preference,
        }
    }

    pub fn popular(item: T) -> Self {
        Self {
            item,
            source: RecommendationSource::Popular,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Every item came from preferences
    Personalized,
    /// Preferences plus popular fill
    Mixed,
    /// No preference matches at all
    Popular,
}

impl Strategy {
    /// Classifies a set of sources; an empty feed counts as popular
    pub fn from_sources<'a>(sources: impl IntoIterator<Item = &'a RecommendationSource>) -> Self {
        let mut preference = false;
        let mut popular = false;
        for source in sources {
            match source {
                RecommendationSource::Preference => preference = true,
                RecommendationSource::Popular => popular = true,
            }
        }
        match (preference, popular) {
            (true, false) => Strategy::Personalized,
            (true, true) => Strategy::Mixed,
            (false, _) => Strategy::Popular,
        }
    }
}

/// Combined personalized feed
#[derive(Debug, Clone, Serialize)]
pub struct Recommendations {
    pub properties: Vec<Recommended<Property>>,
    pub blog_posts: Vec<Recommended<BlogPost>>,
    pub strategy: Strategy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_personalized_when_only_preferences() {
        let sources = [RecommendationSource::Preference, RecommendationSource::Preference];
        assert_eq!(Strategy::from_sources(sources.iter()), Strategy::Personalized);
    }

    #[test]
    fn test_strategy_mixed() {
        let sources = [RecommendationSource::Preference, RecommendationSource::Popular];
        assert_eq!(Strategy::from_sources(sources.iter()), Strategy::Mixed);
    }

    #[test]
    fn test_strategy_popular_when_empty() {
        let sources: [RecommendationSource; 0] = [];
        assert_eq!(Strategy::from_sources(sources.iter()), Strategy::Popular);
    }

    #[test]
    fn test_recommended_flattens_item() {
        #[derive(Serialize)]
        struct Item {
            name: &'static str,
        }
        let json = serde_json::to_value(Recommended::popular(Item { name: "x" })).unwrap();
        assert_eq!(json["name"], "x");
        assert_eq!(json["source"], "popular");
    }
}
