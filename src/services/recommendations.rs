use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    cached,
    db::{Cache, CacheKey, Store},
    error::{AppError, AppResult},
    models::{
        BlogPost, EntityKind, Property, Recommendations, Recommended, Strategy,
    },
    services::preferences::{
        aggregate_blog_preferences, aggregate_property_preferences, BlogPreferences,
        PropertyPreferences,
    },
};

/// Largest list a caller may request
pub const MAX_LIMIT: usize = 50;

/// How much recent interaction history feeds the category tallies. The seen
/// set is loaded separately and is not bounded by this.
const HISTORY_SCAN: usize = 500;

/// Popular lists are fetched in pages of this size so cache keys stay few
const POPULAR_PAGE: usize = 50;
const POPULAR_FETCH_CAP: usize = 600;

#[derive(Debug, Clone, Copy)]
pub struct RecommendationSettings {
    pub top_k: usize,
    pub price_tolerance: f64,
    pub popular_cache_ttl_secs: u64,
}

/// Personalized property and blog-post selection
#[derive(Clone)]
pub struct RecommendationService {
    store: Arc<dyn Store>,
    cache: Option<Cache>,
    settings: RecommendationSettings,
}

fn validate_limit(limit: usize) -> AppResult<()> {
    if limit > MAX_LIMIT {
        return Err(AppError::InvalidInput(format!(
            "limit must be at most {}",
            MAX_LIMIT
        )));
    }
    Ok(())
}

fn popular_fetch_size(needed: usize) -> usize {
    (needed.div_ceil(POPULAR_PAGE) * POPULAR_PAGE).clamp(POPULAR_PAGE, POPULAR_FETCH_CAP)
}

/// Every cache key a popular-listings fetch can use
pub fn popular_property_cache_keys() -> Vec<CacheKey> {
    (POPULAR_PAGE..=POPULAR_FETCH_CAP)
        .step_by(POPULAR_PAGE)
        .map(CacheKey::PopularProperties)
        .collect()
}

fn unique_ids(ids: impl Iterator<Item = Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}

impl RecommendationService {
    pub fn new(
        store: Arc<dyn Store>,
        cache: Option<Cache>,
        settings: RecommendationSettings,
    ) -> Self {
        Self {
            store,
            cache,
            settings,
        }
    }

    /// Aggregated property preferences of a user
    pub async fn property_preferences(&self, user_id: Uuid) -> AppResult<PropertyPreferences> {
        let interactions = self
            .store
            .interactions_for_user(user_id, Some(EntityKind::Property), HISTORY_SCAN)
            .await?;
        let ids = unique_ids(interactions.iter().map(|i| i.entity.id));
        let properties = self.store.get_properties(&ids).await?;

        let mut prefs = aggregate_property_preferences(
            &interactions,
            &properties,
            self.settings.top_k,
            self.settings.price_tolerance,
        );
        prefs.seen.extend(
            self.store
                .interacted_entity_ids(user_id, EntityKind::Property)
                .await?,
        );
        Ok(prefs)
    }

    /// Aggregated blog topic preferences of a user
    pub async fn blog_preferences(&self, user_id: Uuid) -> AppResult<BlogPreferences> {
        let interactions = self
            .store
            .interactions_for_user(user_id, Some(EntityKind::BlogPost), HISTORY_SCAN)
            .await?;
        let ids = unique_ids(interactions.iter().map(|i| i.entity.id));
        let posts = self.store.get_posts(&ids).await?;

        let mut prefs = aggregate_blog_preferences(&interactions, &posts, self.settings.top_k);
        prefs.seen.extend(
            self.store
                .interacted_entity_ids(user_id, EntityKind::BlogPost)
                .await?,
        );
        Ok(prefs)
    }

    /// Listings matching the user's preferred types/counties, topped up with
    /// popular listings. Anonymous callers get the popular list.
    pub async fn personalized_properties(
        &self,
        user_id: Option<Uuid>,
        limit: usize,
    ) -> AppResult<Vec<Recommended<Property>>> {
        validate_limit(limit)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let prefs = match user_id {
            Some(user_id) => self.property_preferences(user_id).await?,
            None => PropertyPreferences::default(),
        };

        let mut picked: Vec<Recommended<Property>> = Vec::with_capacity(limit);

        if !prefs.is_empty() {
            // The store ranks by score then views before applying the limit
            let candidates = self
                .store
                .find_matching_properties(&prefs.query(limit))
                .await?;
            picked.extend(
                candidates
                    .into_iter()
                    .filter(|p| !prefs.seen.contains(&p.id))
                    .take(limit)
                    .map(Recommended::preference),
            );
        }

        if picked.len() < limit {
            let mut exclude: HashSet<Uuid> = prefs.seen.clone();
            exclude.extend(picked.iter().map(|r| r.item.id));

            let popular = self.popular_properties(limit + exclude.len()).await?;
            let missing = limit - picked.len();
            picked.extend(
                popular
                    .into_iter()
                    .filter(|p| p.is_active && !exclude.contains(&p.id))
                    .take(missing)
                    .map(Recommended::popular),
            );
        }

        tracing::debug!(
            user_id = ?user_id,
            requested = limit,
            returned = picked.len(),
            "Selected property recommendations"
        );

        Ok(picked)
    }

    /// Posts sharing the user's preferred topics, topped up with popular posts
    pub async fn personalized_blog_posts(
        &self,
        user_id: Option<Uuid>,
        limit: usize,
    ) -> AppResult<Vec<Recommended<BlogPost>>> {
        validate_limit(limit)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let prefs = match user_id {
            Some(user_id) => self.blog_preferences(user_id).await?,
            None => BlogPreferences::default(),
        };

        let mut picked: Vec<Recommended<BlogPost>> = Vec::with_capacity(limit);

        if !prefs.is_empty() {
            let exclude: Vec<Uuid> = prefs.seen.iter().copied().collect();
            let candidates = self
                .store
                .find_posts_by_topics(&prefs.topic_names(), &exclude, limit)
                .await?;
            picked.extend(
                candidates
                    .into_iter()
                    .filter(|p| !prefs.seen.contains(&p.id))
                    .take(limit)
                    .map(Recommended::preference),
            );
        }

        if picked.len() < limit {
            let mut exclude: HashSet<Uuid> = prefs.seen.clone();
            exclude.extend(picked.iter().map(|r| r.item.id));

            let popular = self.popular_posts(limit + exclude.len()).await?;
            let missing = limit - picked.len();
            picked.extend(
                popular
                    .into_iter()
                    .filter(|p| !exclude.contains(&p.id))
                    .take(missing)
                    .map(Recommended::popular),
            );
        }

        Ok(picked)
    }

    /// Combined feed of listings and posts
    pub async fn personalized_recommendations(
        &self,
        user_id: Option<Uuid>,
        property_limit: usize,
        post_limit: usize,
    ) -> AppResult<Recommendations> {
        let (properties, blog_posts) = tokio::try_join!(
            self.personalized_properties(user_id, property_limit),
            self.personalized_blog_posts(user_id, post_limit),
        )?;

        let strategy = Strategy::from_sources(
            properties
                .iter()
                .map(|r| &r.source)
                .chain(blog_posts.iter().map(|r| &r.source)),
        );

        tracing::info!(
            user_id = ?user_id,
            properties = properties.len(),
            blog_posts = blog_posts.len(),
            strategy = ?strategy,
            "Built personalized recommendations"
        );

        Ok(Recommendations {
            properties,
            blog_posts,
            strategy,
        })
    }

    async fn popular_properties(&self, needed: usize) -> AppResult<Vec<Property>> {
        let fetch = popular_fetch_size(needed);
        let store = self.store.clone();
        cached!(
            self.cache,
            CacheKey::PopularProperties(fetch),
            self.settings.popular_cache_ttl_secs,
            async move { store.popular_properties(fetch).await }
        )
    }

    async fn popular_posts(&self, needed: usize) -> AppResult<Vec<BlogPost>> {
        let fetch = popular_fetch_size(needed);
        let store = self.store.clone();
        cached!(
            self.cache,
            CacheKey::PopularPosts(fetch),
            self.settings.popular_cache_ttl_secs,
            async move { store.popular_posts(fetch).await }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{BlogStore, InteractionStore, ListingStore, MemoryStore};
    use crate::models::{EntityRef, Interaction, InteractionKind, PropertyType, RecommendationSource};
    use chrono::Utc;

    fn service(store: &MemoryStore) -> RecommendationService {
        RecommendationService::new(
            Arc::new(store.clone()),
            None,
            RecommendationSettings {
                top_k: 3,
                price_tolerance: 0.2,
                popular_cache_ttl_secs: 60,
            },
        )
    }

    fn listing(property_type: PropertyType, county: &str, price: f64, views: i64) -> Property {
        Property {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            agent_name: "Agent".to_string(),
            agent_email: "agent@example.com".to_string(),
            title: format!("{} in {}", property_type, county),
            property_type,
            county: county.to_string(),
            price,
            is_active: true,
            expires_at: None,
            last_expiry_warning_days: None,
            views,
            created_at: Utc::now(),
        }
    }

    fn post(topics: &[&str], views: i64) -> BlogPost {
        BlogPost {
            id: Uuid::new_v4(),
            title: "Post".to_string(),
            slug: "post".to_string(),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            views,
            likes: 0,
            published_at: Utc::now(),
        }
    }

    #[test]
    fn test_popular_fetch_size_rounds_to_pages() {
        assert_eq!(popular_fetch_size(1), 50);
        assert_eq!(popular_fetch_size(50), 50);
        assert_eq!(popular_fetch_size(51), 100);
        assert_eq!(popular_fetch_size(10_000), POPULAR_FETCH_CAP);
    }

    #[test]
    fn test_popular_cache_keys_cover_every_fetch_size() {
        let keys = popular_property_cache_keys();
        for needed in [1, 49, 120, 599, 5_000] {
            assert!(keys.contains(&CacheKey::PopularProperties(popular_fetch_size(needed))));
        }
        assert_eq!(keys.len(), POPULAR_FETCH_CAP / POPULAR_PAGE);
    }

    #[tokio::test]
    async fn test_anonymous_gets_popular() {
        let store = MemoryStore::new();
        let low = listing(PropertyType::House, "Kiambu", 10.0, 1);
        let high = listing(PropertyType::Villa, "Kwale", 10.0, 99);
        store.insert_property(&low).await.unwrap();
        store.insert_property(&high).await.unwrap();

        let recs = service(&store).personalized_properties(None, 5).await.unwrap();

        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].item.id, high.id);
        assert!(recs.iter().all(|r| r.source == RecommendationSource::Popular));
    }

    #[tokio::test]
    async fn test_preferences_excludes_seen_and_fills_with_popular() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();

        let seen = listing(PropertyType::Apartment, "Nairobi", 100.0, 5);
        let match_in_band = listing(PropertyType::Apartment, "Nairobi", 110.0, 1);
        let match_out_of_band = listing(PropertyType::Apartment, "Nairobi", 900.0, 50);
        let unrelated = listing(PropertyType::Land, "Turkana", 5.0, 500);
        for p in [&seen, &match_in_band, &match_out_of_band, &unrelated] {
            store.insert_property(p).await.unwrap();
        }
        store
            .record_interaction(&Interaction::new(
                user,
                EntityRef::property(seen.id),
                InteractionKind::Like,
            ))
            .await
            .unwrap();

        let recs = service(&store)
            .personalized_properties(Some(user), 3)
            .await
            .unwrap();

        let ids: Vec<Uuid> = recs.iter().map(|r| r.item.id).collect();
        // Price band lifts the less viewed listing above the popular one
        assert_eq!(ids, vec![match_in_band.id, match_out_of_band.id, unrelated.id]);
        assert_eq!(recs[0].source, RecommendationSource::Preference);
        assert_eq!(recs[2].source, RecommendationSource::Popular);
        assert!(!ids.contains(&seen.id));
    }

    async fn view(store: &MemoryStore, user: Uuid, entity: EntityRef) {
        store
            .record_interaction(&Interaction::new(user, entity, InteractionKind::View))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_best_match_beats_heavily_viewed_weak_matches() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();

        let history = [
            listing(PropertyType::Apartment, "Nairobi", 100.0, 0),
            listing(PropertyType::Apartment, "Nairobi", 100.0, 0),
            listing(PropertyType::House, "Kiambu", 100.0, 0),
        ];
        for p in &history {
            store.insert_property(p).await.unwrap();
            view(&store, user, EntityRef::property(p.id)).await;
        }

        // County-only matches far outside the price band, but heavily viewed
        for _ in 0..3 {
            store
                .insert_property(&listing(PropertyType::Land, "Kiambu", 9999.0, 1000))
                .await
                .unwrap();
        }
        let best = listing(PropertyType::Apartment, "Nairobi", 100.0, 1);
        store.insert_property(&best).await.unwrap();

        let recs = service(&store)
            .personalized_properties(Some(user), 1)
            .await
            .unwrap();

        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].item.id, best.id);
        assert_eq!(recs[0].source, RecommendationSource::Preference);
    }

    #[tokio::test]
    async fn test_old_interactions_still_count_as_seen() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();

        let liked_long_ago = listing(PropertyType::Villa, "Kilifi", 50.0, 10);
        let recent = listing(PropertyType::Villa, "Kilifi", 50.0, 10);
        store.insert_property(&liked_long_ago).await.unwrap();
        store.insert_property(&recent).await.unwrap();

        store
            .record_interaction(&Interaction::new(
                user,
                EntityRef::property(liked_long_ago.id),
                InteractionKind::Like,
            ))
            .await
            .unwrap();
        for _ in 0..HISTORY_SCAN {
            view(&store, user, EntityRef::property(recent.id)).await;
        }

        let recs = service(&store)
            .personalized_properties(Some(user), 5)
            .await
            .unwrap();

        assert!(recs.iter().all(|r| r.item.id != liked_long_ago.id));
        assert!(recs.iter().all(|r| r.item.id != recent.id));
    }

    #[tokio::test]
    async fn test_best_topic_match_beats_engaged_single_topic_posts() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();

        let liked = post(&["mortgages", "investing"], 0);
        store.insert_post(&liked).await.unwrap();
        view(&store, user, EntityRef::blog_post(liked.id)).await;

        for _ in 0..3 {
            store.insert_post(&post(&["mortgages"], 1000)).await.unwrap();
        }
        let best = post(&["investing", "mortgages"], 0);
        store.insert_post(&best).await.unwrap();

        let recs = service(&store)
            .personalized_blog_posts(Some(user), 1)
            .await
            .unwrap();

        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].item.id, best.id);
    }

    #[tokio::test]
    async fn test_inactive_listings_never_recommended() {
        let store = MemoryStore::new();
        let mut inactive = listing(PropertyType::House, "Nakuru", 10.0, 1000);
        inactive.is_active = false;
        store.insert_property(&inactive).await.unwrap();

        let recs = service(&store).personalized_properties(None, 5).await.unwrap();
        assert!(recs.is_empty());
    }

    #[tokio::test]
    async fn test_limit_zero_and_over_max() {
        let store = MemoryStore::new();
        let svc = service(&store);
        assert!(svc.personalized_properties(None, 0).await.unwrap().is_empty());
        assert!(matches!(
            svc.personalized_blog_posts(None, MAX_LIMIT + 1).await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_blog_posts_rank_by_topic_overlap() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();

        let liked = post(&["mortgages", "investing"], 0);
        let both = post(&["mortgages", "investing"], 1);
        let one = post(&["mortgages"], 100);
        let other = post(&["gardening"], 1000);
        for p in [&liked, &both, &one, &other] {
            store.insert_post(p).await.unwrap();
        }
        store
            .record_interaction(&Interaction::new(
                user,
                EntityRef::blog_post(liked.id),
                InteractionKind::Like,
            ))
            .await
            .unwrap();

        let recs = service(&store)
            .personalized_blog_posts(Some(user), 2)
            .await
            .unwrap();

        let ids: Vec<Uuid> = recs.iter().map(|r| r.item.id).collect();
        assert_eq!(ids, vec![both.id, one.id]);
    }

    #[tokio::test]
    async fn test_combined_feed_strategy() {
        let store = MemoryStore::new();
        store
            .insert_property(&listing(PropertyType::House, "Kiambu", 10.0, 1))
            .await
            .unwrap();
        store.insert_post(&post(&["news"], 1)).await.unwrap();

        let feed = service(&store)
            .personalized_recommendations(Some(Uuid::new_v4()), 4, 4)
            .await
            .unwrap();

        assert_eq!(feed.properties.len(), 1);
        assert_eq!(feed.blog_posts.len(), 1);
        assert_eq!(feed.strategy, Strategy::Popular);
    }
}
