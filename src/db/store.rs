//! Persistence seams
//!
//! Each concern gets its own trait so services only name what they touch.
//! `Store` bundles them for the shared application state; both
//! `MemoryStore` and `PgStore` implement every trait. An `Arc<dyn Store>`
//! upcasts to any single-concern trait object.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        BlogPost, EntityKind, Experiment, ExperimentEvent, Interaction, Notification, Property,
        PropertyQuery, SearchHistoryEntry, VariantAssignment, VariantCounts,
    },
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn insert_property(&self, property: &Property) -> AppResult<()>;

    async fn get_property(&self, id: Uuid) -> AppResult<Option<Property>>;

    /// Fetches the given listings; unknown ids are skipped
    async fn get_properties(&self, ids: &[Uuid]) -> AppResult<Vec<Property>>;

    async fn increment_property_views(&self, id: Uuid) -> AppResult<()>;

    /// Active listings matching any preferred type or county, highest
    /// `PropertyQuery::score` first, then most viewed
    async fn find_matching_properties(&self, query: &PropertyQuery) -> AppResult<Vec<Property>>;

    /// Active listings ordered by views, newest first on ties
    async fn popular_properties(&self, limit: usize) -> AppResult<Vec<Property>>;

    /// Active listings with `expires_at <= now`
    async fn find_expired_properties(&self, now: DateTime<Utc>) -> AppResult<Vec<Property>>;

    /// Active listings with `now < expires_at <= until`
    async fn find_expiring_properties(
        &self,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> AppResult<Vec<Property>>;

    /// Atomically deactivates the listings referenced by `notifications` that
    /// are still active and expired at `now`, storing the notifications of the
    /// ones actually deactivated. Returns their ids.
    async fn deactivate_listings(
        &self,
        now: DateTime<Utc>,
        notifications: &[Notification],
    ) -> AppResult<Vec<Uuid>>;

    /// Atomically records that `property_id` was warned at `threshold_days`
    /// and stores the notification. No-op (returns false) when the listing is
    /// inactive or was already warned at this or a smaller threshold.
    async fn mark_expiry_warning(
        &self,
        property_id: Uuid,
        threshold_days: i64,
        notification: &Notification,
    ) -> AppResult<bool>;
}

#[async_trait]
pub trait BlogStore: Send + Sync {
    async fn insert_post(&self, post: &BlogPost) -> AppResult<()>;

    async fn get_post(&self, id: Uuid) -> AppResult<Option<BlogPost>>;

    async fn get_posts(&self, ids: &[Uuid]) -> AppResult<Vec<BlogPost>>;

    async fn increment_post_views(&self, id: Uuid) -> AppResult<()>;

    async fn increment_post_likes(&self, id: Uuid) -> AppResult<()>;

    /// Posts sharing at least one topic; most shared topics first, then most
    /// engaged
    async fn find_posts_by_topics(
        &self,
        topics: &[String],
        exclude: &[Uuid],
        limit: usize,
    ) -> AppResult<Vec<BlogPost>>;

    async fn popular_posts(&self, limit: usize) -> AppResult<Vec<BlogPost>>;
}

#[async_trait]
pub trait InteractionStore: Send + Sync {
    async fn record_interaction(&self, interaction: &Interaction) -> AppResult<()>;

    /// Most recent first
    async fn interactions_for_user(
        &self,
        user_id: Uuid,
        kind: Option<EntityKind>,
        limit: usize,
    ) -> AppResult<Vec<Interaction>>;

    /// Every distinct entity of `kind` the user ever interacted with
    async fn interacted_entity_ids(&self, user_id: Uuid, kind: EntityKind)
        -> AppResult<Vec<Uuid>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchHistoryStore: Send + Sync {
    /// Insert or refresh the row keyed by `(user_id, entry.key())`, bumping its count
    async fn upsert_search(&self, user_id: Uuid, entry: &SearchHistoryEntry) -> AppResult<()>;

    /// Keeps the `keep` most recent rows of the user; returns rows deleted
    async fn trim_searches(&self, user_id: Uuid, keep: usize) -> AppResult<u64>;

    /// Most recent first
    async fn list_searches(&self, user_id: Uuid, limit: usize)
        -> AppResult<Vec<SearchHistoryEntry>>;

    async fn delete_search(&self, user_id: Uuid, key: &str) -> AppResult<bool>;

    async fn clear_searches(&self, user_id: Uuid) -> AppResult<u64>;
}

#[async_trait]
pub trait ExperimentStore: Send + Sync {
    /// Returns false when an experiment with that name exists
    async fn insert_experiment(&self, experiment: &Experiment) -> AppResult<bool>;

    async fn get_experiment(&self, name: &str) -> AppResult<Option<Experiment>>;

    async fn set_experiment_active(&self, name: &str, active: bool) -> AppResult<bool>;

    async fn get_assignment(
        &self,
        test_name: &str,
        client_id: Uuid,
    ) -> AppResult<Option<VariantAssignment>>;

    /// Stores the assignment unless one exists; returns whichever is stored
    async fn insert_assignment_if_absent(
        &self,
        assignment: &VariantAssignment,
    ) -> AppResult<VariantAssignment>;

    async fn insert_event(&self, event: &ExperimentEvent) -> AppResult<()>;

    /// Counters for every variant that has assignments or events
    async fn variant_counts(&self, test_name: &str) -> AppResult<Vec<VariantCounts>>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert_notification(&self, notification: &Notification) -> AppResult<()>;

    /// Newest first
    async fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
    ) -> AppResult<Vec<Notification>>;

    async fn mark_notification_read(&self, user_id: Uuid, id: Uuid) -> AppResult<bool>;
}

/// Everything the service persists
pub trait Store:
    ListingStore + BlogStore + InteractionStore + SearchHistoryStore + ExperimentStore + NotificationStore
{
}

impl<T> Store for T where
    T: ListingStore
        + BlogStore
        + InteractionStore
        + SearchHistoryStore
        + ExperimentStore
        + NotificationStore
{
}
