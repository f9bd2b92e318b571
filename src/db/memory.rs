use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::store::{
    BlogStore, ExperimentStore, InteractionStore, ListingStore, NotificationStore,
    SearchHistoryStore,
};
use crate::{
    error::AppResult,
    models::{
        BlogPost, EntityKind, EventKind, Experiment, ExperimentEvent, Interaction, Notification,
        Property, PropertyQuery, SearchHistoryEntry, VariantAssignment, VariantCounts,
    },
};

/// In-process store used for development and tests
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryInner>>,
}

#[derive(Default)]
struct MemoryInner {
    properties: HashMap<Uuid, Property>,
    posts: HashMap<Uuid, BlogPost>,
    interactions: Vec<Interaction>,
    /// user -> search key -> entry
    searches: HashMap<Uuid, HashMap<String, SearchHistoryEntry>>,
    experiments: HashMap<String, Experiment>,
    assignments: HashMap<(String, Uuid), VariantAssignment>,
    events: Vec<ExperimentEvent>,
    notifications: Vec<Notification>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn by_popularity(a: &Property, b: &Property) -> std::cmp::Ordering {
    b.views
        .cmp(&a.views)
        .then_with(|| b.created_at.cmp(&a.created_at))
}

fn by_engagement(a: &BlogPost, b: &BlogPost) -> std::cmp::Ordering {
    b.engagement()
        .cmp(&a.engagement())
        .then_with(|| b.published_at.cmp(&a.published_at))
}

#[async_trait]
impl ListingStore for MemoryStore {
    async fn insert_property(&self, property: &Property) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        inner.properties.insert(property.id, property.clone());
        Ok(())
    }

    async fn get_property(&self, id: Uuid) -> AppResult<Option<Property>> {
        let inner = self.inner.read().await;
        Ok(inner.properties.get(&id).cloned())
    }

    async fn get_properties(&self, ids: &[Uuid]) -> AppResult<Vec<Property>> {
        let inner = self.inner.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| inner.properties.get(id).cloned())
            .collect())
    }

    async fn increment_property_views(&self, id: Uuid) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(property) = inner.properties.get_mut(&id) {
            property.views += 1;
        }
        Ok(())
    }

    async fn find_matching_properties(&self, query: &PropertyQuery) -> AppResult<Vec<Property>> {
        let inner = self.inner.read().await;
        let exclude: HashSet<&Uuid> = query.exclude.iter().collect();

        let mut matches: Vec<(f64, Property)> = inner
            .properties
            .values()
            .filter(|p| p.is_active && !exclude.contains(&p.id) && query.matches(p))
            .map(|p| (query.score(p), p.clone()))
            .collect();

        matches.sort_by(|(sa, a), (sb, b)| sb.total_cmp(sa).then_with(|| by_popularity(a, b)));
        matches.truncate(query.limit);
        Ok(matches.into_iter().map(|(_, p)| p).collect())
    }

    async fn popular_properties(&self, limit: usize) -> AppResult<Vec<Property>> {
        let inner = self.inner.read().await;
        let mut active: Vec<Property> = inner
            .properties
            .values()
            .filter(|p| p.is_active)
            .cloned()
            .collect();
        active.sort_by(by_popularity);
        active.truncate(limit);
        Ok(active)
    }

    async fn find_expired_properties(&self, now: DateTime<Utc>) -> AppResult<Vec<Property>> {
        let inner = self.inner.read().await;
        let mut expired: Vec<Property> = inner
            .properties
            .values()
            .filter(|p| p.is_active && p.expires_at.is_some_and(|at| at <= now))
            .cloned()
            .collect();
        expired.sort_by_key(|p| p.expires_at);
        Ok(expired)
    }

    async fn find_expiring_properties(
        &self,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> AppResult<Vec<Property>> {
        let inner = self.inner.read().await;
        let mut expiring: Vec<Property> = inner
            .properties
            .values()
            .filter(|p| p.is_active && p.expires_at.is_some_and(|at| at > now && at <= until))
            .cloned()
            .collect();
        expiring.sort_by_key(|p| p.expires_at);
        Ok(expiring)
    }

    async fn deactivate_listings(
        &self,
        now: DateTime<Utc>,
        notifications: &[Notification],
    ) -> AppResult<Vec<Uuid>> {
        // A single write guard makes the batch atomic for readers
        let mut inner = self.inner.write().await;
        let mut deactivated = Vec::new();

        for notification in notifications {
            let Some(property_id) = notification.property_id else {
                continue;
            };
            let Some(property) = inner.properties.get_mut(&property_id) else {
                continue;
            };
            if !property.is_active || !property.expires_at.is_some_and(|at| at <= now) {
                continue;
            }
            property.is_active = false;
            deactivated.push(property_id);
            inner.notifications.push(notification.clone());
        }

        Ok(deactivated)
    }

    async fn mark_expiry_warning(
        &self,
        property_id: Uuid,
        threshold_days: i64,
        notification: &Notification,
    ) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        let Some(property) = inner.properties.get_mut(&property_id) else {
            return Ok(false);
        };
        if !property.is_active {
            return Ok(false);
        }
        if property
            .last_expiry_warning_days
            .is_some_and(|last| last <= threshold_days)
        {
            return Ok(false);
        }
        property.last_expiry_warning_days = Some(threshold_days);
        inner.notifications.push(notification.clone());
        Ok(true)
    }
}

#[async_trait]
impl BlogStore for MemoryStore {
    async fn insert_post(&self, post: &BlogPost) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        inner.posts.insert(post.id, post.clone());
        Ok(())
    }

    async fn get_post(&self, id: Uuid) -> AppResult<Option<BlogPost>> {
        let inner = self.inner.read().await;
        Ok(inner.posts.get(&id).cloned())
    }

    async fn get_posts(&self, ids: &[Uuid]) -> AppResult<Vec<BlogPost>> {
        let inner = self.inner.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| inner.posts.get(id).cloned())
            .collect())
    }

    async fn increment_post_views(&self, id: Uuid) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(post) = inner.posts.get_mut(&id) {
            post.views += 1;
        }
        Ok(())
    }

    async fn increment_post_likes(&self, id: Uuid) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(post) = inner.posts.get_mut(&id) {
            post.likes += 1;
        }
        Ok(())
    }

    async fn find_posts_by_topics(
        &self,
        topics: &[String],
        exclude: &[Uuid],
        limit: usize,
    ) -> AppResult<Vec<BlogPost>> {
        let inner = self.inner.read().await;
        let exclude: HashSet<&Uuid> = exclude.iter().collect();
        let mut matches: Vec<(usize, BlogPost)> = inner
            .posts
            .values()
            .filter(|p| !exclude.contains(&p.id))
            .map(|p| (p.topics.iter().filter(|t| topics.contains(t)).count(), p))
            .filter(|(shared, _)| *shared > 0)
            .map(|(shared, p)| (shared, p.clone()))
            .collect();
        matches.sort_by(|(sa, a), (sb, b)| sb.cmp(sa).then_with(|| by_engagement(a, b)));
        matches.truncate(limit);
        Ok(matches.into_iter().map(|(_, p)| p).collect())
    }

    async fn popular_posts(&self, limit: usize) -> AppResult<Vec<BlogPost>> {
        let inner = self.inner.read().await;
        let mut posts: Vec<BlogPost> = inner.posts.values().cloned().collect();
        posts.sort_by(by_engagement);
        posts.truncate(limit);
        Ok(posts)
    }
}

#[async_trait]
impl InteractionStore for MemoryStore {
    async fn record_interaction(&self, interaction: &Interaction) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        inner.interactions.push(interaction.clone());
        Ok(())
    }

    async fn interactions_for_user(
        &self,
        user_id: Uuid,
        kind: Option<EntityKind>,
        limit: usize,
    ) -> AppResult<Vec<Interaction>> {
        let inner = self.inner.read().await;
        // Stored in insertion order, so reversing yields newest first
        Ok(inner
            .interactions
            .iter()
            .rev()
            .filter(|i| i.user_id == user_id)
            .filter(|i| kind.map_or(true, |k| i.entity.kind == k))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn interacted_entity_ids(
        &self,
        user_id: Uuid,
        kind: EntityKind,
    ) -> AppResult<Vec<Uuid>> {
        let inner = self.inner.read().await;
        let ids: HashSet<Uuid> = inner
            .interactions
            .iter()
            .filter(|i| i.user_id == user_id && i.entity.kind == kind)
            .map(|i| i.entity.id)
            .collect();
        Ok(ids.into_iter().collect())
    }
}

#[async_trait]
impl SearchHistoryStore for MemoryStore {
    async fn upsert_search(&self, user_id: Uuid, entry: &SearchHistoryEntry) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let rows = inner.searches.entry(user_id).or_default();
        rows.entry(entry.key())
            .and_modify(|existing| {
                existing.query = entry.query.clone();
                existing.filters = entry.filters.clone();
                existing.searched_at = entry.searched_at;
                existing.search_count += 1;
            })
            .or_insert_with(|| entry.clone());
        Ok(())
    }

    async fn trim_searches(&self, user_id: Uuid, keep: usize) -> AppResult<u64> {
        let mut inner = self.inner.write().await;
        let Some(rows) = inner.searches.get_mut(&user_id) else {
            return Ok(0);
        };
        if rows.len() <= keep {
            return Ok(0);
        }
        let mut ordered: Vec<(String, DateTime<Utc>)> = rows
            .iter()
            .map(|(key, entry)| (key.clone(), entry.searched_at))
            .collect();
        ordered.sort_by(|a, b| b.1.cmp(&a.1));
        let mut removed = 0;
        for (key, _) in ordered.into_iter().skip(keep) {
            rows.remove(&key);
            removed += 1;
        }
        Ok(removed)
    }

    async fn list_searches(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> AppResult<Vec<SearchHistoryEntry>> {
        let inner = self.inner.read().await;
        let mut entries: Vec<SearchHistoryEntry> = inner
            .searches
            .get(&user_id)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| b.searched_at.cmp(&a.searched_at));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn delete_search(&self, user_id: Uuid, key: &str) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .searches
            .get_mut(&user_id)
            .is_some_and(|rows| rows.remove(key).is_some()))
    }

    async fn clear_searches(&self, user_id: Uuid) -> AppResult<u64> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .searches
            .remove(&user_id)
            .map_or(0, |rows| rows.len() as u64))
    }
}

#[async_trait]
impl ExperimentStore for MemoryStore {
    async fn insert_experiment(&self, experiment: &Experiment) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        if inner.experiments.contains_key(&experiment.name) {
            return Ok(false);
        }
        inner
            .experiments
            .insert(experiment.name.clone(), experiment.clone());
        Ok(true)
    }

    async fn get_experiment(&self, name: &str) -> AppResult<Option<Experiment>> {
        let inner = self.inner.read().await;
        Ok(inner.experiments.get(name).cloned())
    }

    async fn set_experiment_active(&self, name: &str, active: bool) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        match inner.experiments.get_mut(name) {
            Some(experiment) => {
                experiment.active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_assignment(
        &self,
        test_name: &str,
        client_id: Uuid,
    ) -> AppResult<Option<VariantAssignment>> {
        let inner = self.inner.read().await;
        Ok(inner
            .assignments
            .get(&(test_name.to_string(), client_id))
            .cloned())
    }

    async fn insert_assignment_if_absent(
        &self,
        assignment: &VariantAssignment,
    ) -> AppResult<VariantAssignment> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .assignments
            .entry((assignment.test_name.clone(), assignment.client_id))
            .or_insert_with(|| assignment.clone());
        Ok(stored.clone())
    }

    async fn insert_event(&self, event: &ExperimentEvent) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        inner.events.push(event.clone());
        Ok(())
    }

    async fn variant_counts(&self, test_name: &str) -> AppResult<Vec<VariantCounts>> {
        let inner = self.inner.read().await;
        let mut counts: HashMap<String, VariantCounts> = HashMap::new();

        for assignment in inner.assignments.values() {
            if assignment.test_name == test_name {
                let entry = counts
                    .entry(assignment.variant.clone())
                    .or_insert_with(|| VariantCounts {
                        variant: assignment.variant.clone(),
                        ..VariantCounts::default()
                    });
                entry.assignments += 1;
            }
        }

        for event in inner.events.iter().filter(|e| e.test_name == test_name) {
            let entry = counts
                .entry(event.variant.clone())
                .or_insert_with(|| VariantCounts {
                    variant: event.variant.clone(),
                    ..VariantCounts::default()
                });
            match event.kind {
                EventKind::Impression => entry.impressions += 1,
                EventKind::Click => entry.clicks += 1,
                EventKind::Conversion => entry.conversions += 1,
            }
        }

        let mut counts: Vec<VariantCounts> = counts.into_values().collect();
        counts.sort_by(|a, b| a.variant.cmp(&b.variant));
        Ok(counts)
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert_notification(&self, notification: &Notification) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        inner.notifications.push(notification.clone());
        Ok(())
    }

    async fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
    ) -> AppResult<Vec<Notification>> {
        let inner = self.inner.read().await;
        let mut notifications: Vec<Notification> = inner
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && (!unread_only || !n.read))
            .cloned()
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notifications)
    }

    async fn mark_notification_read(&self, user_id: Uuid, id: Uuid) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        match inner
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user_id)
        {
            Some(notification) => {
                notification.read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NotificationKind, PropertyType, SearchFilters};
    use chrono::Duration;

    fn property(views: i64, expires_at: Option<DateTime<Utc>>) -> Property {
        Property {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            agent_name: "Agent".to_string(),
            agent_email: "agent@example.com".to_string(),
            title: "Listing".to_string(),
            property_type: PropertyType::Apartment,
            county: "Nairobi".to_string(),
            price: 1000.0,
            is_active: true,
            expires_at,
            last_expiry_warning_days: None,
            views,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_popular_properties_skips_inactive() {
        let store = MemoryStore::new();
        let busy = property(50, None);
        let mut hidden = property(500, None);
        hidden.is_active = false;
        store.insert_property(&busy).await.unwrap();
        store.insert_property(&hidden).await.unwrap();

        let popular = store.popular_properties(10).await.unwrap();
        assert_eq!(popular.len(), 1);
        assert_eq!(popular[0].id, busy.id);
    }

    #[tokio::test]
    async fn test_deactivate_listings_skips_already_inactive() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let expired = property(0, Some(now - Duration::hours(1)));
        let mut gone = property(0, Some(now - Duration::hours(1)));
        gone.is_active = false;
        store.insert_property(&expired).await.unwrap();
        store.insert_property(&gone).await.unwrap();

        let notifications: Vec<Notification> = [&expired, &gone]
            .iter()
            .map(|p| {
                Notification::new(
                    p.owner_id,
                    Some(p.id),
                    NotificationKind::ListingExpired,
                    "expired".to_string(),
                    now,
                )
            })
            .collect();

        let deactivated = store.deactivate_listings(now, &notifications).await.unwrap();
        assert_eq!(deactivated, vec![expired.id]);

        let stored = store.list_notifications(gone.owner_id, false).await.unwrap();
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_search_bumps_count() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let entry = SearchHistoryEntry::new("land in kajiado", SearchFilters::default(), Utc::now());
        store.upsert_search(user, &entry).await.unwrap();
        store.upsert_search(user, &entry).await.unwrap();

        let rows = store.list_searches(user, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].search_count, 2);
    }

    #[tokio::test]
    async fn test_trim_searches_keeps_most_recent() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let base = Utc::now();
        for i in 0..5 {
            let entry = SearchHistoryEntry::new(
                &format!("query {}", i),
                SearchFilters::default(),
                base + Duration::seconds(i),
            );
            store.upsert_search(user, &entry).await.unwrap();
        }

        let removed = store.trim_searches(user, 3).await.unwrap();
        assert_eq!(removed, 2);
        let rows = store.list_searches(user, 10).await.unwrap();
        let queries: Vec<&str> = rows.iter().map(|r| r.query.as_str()).collect();
        assert_eq!(queries, vec!["query 4", "query 3", "query 2"]);
    }

    #[tokio::test]
    async fn test_mark_expiry_warning_only_once_per_threshold() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let listing = property(0, Some(now + Duration::days(2)));
        store.insert_property(&listing).await.unwrap();
        let notification = Notification::new(
            listing.owner_id,
            Some(listing.id),
            NotificationKind::ListingExpiring,
            "soon".to_string(),
            now,
        );

        assert!(store.mark_expiry_warning(listing.id, 3, &notification).await.unwrap());
        assert!(!store.mark_expiry_warning(listing.id, 3, &notification).await.unwrap());
        assert!(store.mark_expiry_warning(listing.id, 1, &notification).await.unwrap());
    }
}
