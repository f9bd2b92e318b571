use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, types::Json, FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::store::{
    BlogStore, ExperimentStore, InteractionStore, ListingStore, NotificationStore,
    SearchHistoryStore,
};
use crate::{
    error::{AppError, AppResult},
    models::{
        BlogPost, EntityKind, EntityRef, Experiment, ExperimentEvent, Interaction, Notification,
        Property, PropertyQuery, SearchFilters, SearchHistoryEntry, Variant, VariantAssignment,
        VariantCounts,
    },
};

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Applies the bundled schema migrations
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn to_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Postgres-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_notification_tx(
        tx: &mut Transaction<'_, Postgres>,
        notification: &Notification,
    ) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO notifications (id, user_id, property_id, kind, message, read, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(notification.id)
        .bind(notification.user_id)
        .bind(notification.property_id)
        .bind(notification.kind.as_str())
        .bind(&notification.message)
        .bind(notification.read)
        .bind(notification.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

// ============================================================================
// Row Types
// ============================================================================

#[derive(FromRow)]
struct PropertyRow {
    id: Uuid,
    owner_id: Uuid,
    agent_name: String,
    agent_email: String,
    title: String,
    property_type: String,
    county: String,
    price: f64,
    is_active: bool,
    expires_at: Option<DateTime<Utc>>,
    last_expiry_warning_days: Option<i64>,
    views: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<PropertyRow> for Property {
    type Error = AppError;

    fn try_from(row: PropertyRow) -> Result<Self, Self::Error> {
        Ok(Property {
            id: row.id,
            owner_id: row.owner_id,
            agent_name: row.agent_name,
            agent_email: row.agent_email,
            title: row.title,
            property_type: row.property_type.parse()?,
            county: row.county,
            price: row.price,
            is_active: row.is_active,
            expires_at: row.expires_at,
            last_expiry_warning_days: row.last_expiry_warning_days,
            views: row.views,
            created_at: row.created_at,
        })
    }
}

fn into_properties(rows: Vec<PropertyRow>) -> AppResult<Vec<Property>> {
    rows.into_iter().map(Property::try_from).collect()
}

const PROPERTY_COLUMNS: &str = "id, owner_id, agent_name, agent_email, title, property_type, \
     county, price, is_active, expires_at, last_expiry_warning_days, views, created_at";

#[derive(FromRow)]
struct BlogPostRow {
    id: Uuid,
    title: String,
    slug: String,
    topics: Vec<String>,
    views: i64,
    likes: i64,
    published_at: DateTime<Utc>,
}

impl From<BlogPostRow> for BlogPost {
    fn from(row: BlogPostRow) -> Self {
        BlogPost {
            id: row.id,
            title: row.title,
            slug: row.slug,
            topics: row.topics,
            views: row.views,
            likes: row.likes,
            published_at: row.published_at,
        }
    }
}

const POST_COLUMNS: &str = "id, title, slug, topics, views, likes, published_at";

#[derive(FromRow)]
struct InteractionRow {
    user_id: Uuid,
    entity_kind: String,
    entity_id: Uuid,
    kind: String,
    occurred_at: DateTime<Utc>,
}

impl TryFrom<InteractionRow> for Interaction {
    type Error = AppError;

    fn try_from(row: InteractionRow) -> Result<Self, Self::Error> {
        Ok(Interaction {
            user_id: row.user_id,
            entity: EntityRef {
                kind: row.entity_kind.parse()?,
                id: row.entity_id,
            },
            kind: row.kind.parse()?,
            occurred_at: row.occurred_at,
        })
    }
}

#[derive(FromRow)]
struct SearchRow {
    query: String,
    filters: Json<SearchFilters>,
    searched_at: DateTime<Utc>,
    search_count: i64,
}

impl From<SearchRow> for SearchHistoryEntry {
    fn from(row: SearchRow) -> Self {
        SearchHistoryEntry {
            query: row.query,
            filters: row.filters.0,
            searched_at: row.searched_at,
            search_count: row.search_count,
        }
    }
}

#[derive(FromRow)]
struct ExperimentRow {
    name: String,
    variants: Json<Vec<Variant>>,
    active: bool,
    created_at: DateTime<Utc>,
}

impl From<ExperimentRow> for Experiment {
    fn from(row: ExperimentRow) -> Self {
        Experiment {
            name: row.name,
            variants: row.variants.0,
            active: row.active,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct AssignmentRow {
    test_name: String,
    client_id: Uuid,
    variant: String,
    assigned_at: DateTime<Utc>,
}

impl From<AssignmentRow> for VariantAssignment {
    fn from(row: AssignmentRow) -> Self {
        VariantAssignment {
            test_name: row.test_name,
            client_id: row.client_id,
            variant: row.variant,
            assigned_at: row.assigned_at,
        }
    }
}

#[derive(FromRow)]
struct CountsRow {
    variant: String,
    assignments: i64,
    impressions: i64,
    clicks: i64,
    conversions: i64,
}

#[derive(FromRow)]
struct NotificationRow {
    id: Uuid,
    user_id: Uuid,
    property_id: Option<Uuid>,
    kind: String,
    message: String,
    read: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = AppError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        Ok(Notification {
            id: row.id,
            user_id: row.user_id,
            property_id: row.property_id,
            kind: row.kind.parse()?,
            message: row.message,
            read: row.read,
            created_at: row.created_at,
        })
    }
}

// ============================================================================
// Store Implementations
// ============================================================================

#[async_trait]
impl ListingStore for PgStore {
    async fn insert_property(&self, property: &Property) -> AppResult<()> {
        sqlx::query(&format!(
            "INSERT INTO properties ({PROPERTY_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        ))
        .bind(property.id)
        .bind(property.owner_id)
        .bind(&property.agent_name)
        .bind(&property.agent_email)
        .bind(&property.title)
        .bind(property.property_type.as_str())
        .bind(&property.county)
        .bind(property.price)
        .bind(property.is_active)
        .bind(property.expires_at)
        .bind(property.last_expiry_warning_days)
        .bind(property.views)
        .bind(property.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_property(&self, id: Uuid) -> AppResult<Option<Property>> {
        let row: Option<PropertyRow> =
            sqlx::query_as(&format!("SELECT {PROPERTY_COLUMNS} FROM properties WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Property::try_from).transpose()
    }

    async fn get_properties(&self, ids: &[Uuid]) -> AppResult<Vec<Property>> {
        let rows: Vec<PropertyRow> = sqlx::query_as(&format!(
            "SELECT {PROPERTY_COLUMNS} FROM properties WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        into_properties(rows)
    }

    async fn increment_property_views(&self, id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE properties SET views = views + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_matching_properties(&self, query: &PropertyQuery) -> AppResult<Vec<Property>> {
        let types: Vec<String> = query
            .property_types
            .iter()
            .map(|t| t.as_str().to_string())
            .collect();
        let counties: Vec<String> = query.counties.iter().map(|c| c.to_lowercase()).collect();

        // Rank weight of position p among n entries is (n - p + 1) / n with
        // 1-based p; unranked values contribute 0
        let rows: Vec<PropertyRow> = sqlx::query_as(&format!(
            "SELECT {PROPERTY_COLUMNS} FROM properties
             WHERE is_active
               AND (property_type = ANY($1) OR lower(county) = ANY($2))
               AND NOT (id = ANY($3))
             ORDER BY
                COALESCE((cardinality($1::TEXT[]) - array_position($1::TEXT[], property_type) + 1)::FLOAT8
                    / NULLIF(cardinality($1::TEXT[]), 0), 0)
              + COALESCE((cardinality($2::TEXT[]) - array_position($2::TEXT[], lower(county)) + 1)::FLOAT8
                    / NULLIF(cardinality($2::TEXT[]), 0), 0)
              + CASE WHEN price BETWEEN $4::FLOAT8 AND $5::FLOAT8 THEN 1 ELSE 0 END DESC,
                views DESC, created_at DESC
             LIMIT $6"
        ))
        .bind(&types)
        .bind(&counties)
        .bind(&query.exclude)
        .bind(query.price_range.map(|(min, _)| min))
        .bind(query.price_range.map(|(_, max)| max))
        .bind(to_limit(query.limit))
        .fetch_all(&self.pool)
        .await?;
        into_properties(rows)
    }

    async fn popular_properties(&self, limit: usize) -> AppResult<Vec<Property>> {
        let rows: Vec<PropertyRow> = sqlx::query_as(&format!(
            "SELECT {PROPERTY_COLUMNS} FROM properties
             WHERE is_active
             ORDER BY views DESC, created_at DESC
             LIMIT $1"
        ))
        .bind(to_limit(limit))
        .fetch_all(&self.pool)
        .await?;
        into_properties(rows)
    }

    async fn find_expired_properties(&self, now: DateTime<Utc>) -> AppResult<Vec<Property>> {
        let rows: Vec<PropertyRow> = sqlx::query_as(&format!(
            "SELECT {PROPERTY_COLUMNS} FROM properties
             WHERE is_active AND expires_at <= $1
             ORDER BY expires_at"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        into_properties(rows)
    }

    async fn find_expiring_properties(
        &self,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> AppResult<Vec<Property>> {
        let rows: Vec<PropertyRow> = sqlx::query_as(&format!(
            "SELECT {PROPERTY_COLUMNS} FROM properties
             WHERE is_active AND expires_at > $1 AND expires_at <= $2
             ORDER BY expires_at"
        ))
        .bind(now)
        .bind(until)
        .fetch_all(&self.pool)
        .await?;
        into_properties(rows)
    }

    async fn deactivate_listings(
        &self,
        now: DateTime<Utc>,
        notifications: &[Notification],
    ) -> AppResult<Vec<Uuid>> {
        let ids: Vec<Uuid> = notifications.iter().filter_map(|n| n.property_id).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;

        let deactivated: Vec<Uuid> = sqlx::query_scalar(
            "UPDATE properties SET is_active = FALSE
             WHERE id = ANY($1) AND is_active AND expires_at <= $2
             RETURNING id",
        )
        .bind(&ids)
        .bind(now)
        .fetch_all(&mut *tx)
        .await?;

        for notification in notifications
            .iter()
            .filter(|n| n.property_id.is_some_and(|id| deactivated.contains(&id)))
        {
            Self::insert_notification_tx(&mut tx, notification).await?;
        }

        tx.commit().await?;
        Ok(deactivated)
    }

    async fn mark_expiry_warning(
        &self,
        property_id: Uuid,
        threshold_days: i64,
        notification: &Notification,
    ) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE properties SET last_expiry_warning_days = $2
             WHERE id = $1 AND is_active
               AND (last_expiry_warning_days IS NULL OR last_expiry_warning_days > $2)",
        )
        .bind(property_id)
        .bind(threshold_days)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        Self::insert_notification_tx(&mut tx, notification).await?;
        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl BlogStore for PgStore {
    async fn insert_post(&self, post: &BlogPost) -> AppResult<()> {
        sqlx::query(&format!(
            "INSERT INTO blog_posts ({POST_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
        ))
        .bind(post.id)
        .bind(&post.title)
        .bind(&post.slug)
        .bind(&post.topics)
        .bind(post.views)
        .bind(post.likes)
        .bind(post.published_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_post(&self, id: Uuid) -> AppResult<Option<BlogPost>> {
        let row: Option<BlogPostRow> =
            sqlx::query_as(&format!("SELECT {POST_COLUMNS} FROM blog_posts WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(BlogPost::from))
    }

    async fn get_posts(&self, ids: &[Uuid]) -> AppResult<Vec<BlogPost>> {
        let rows: Vec<BlogPostRow> =
            sqlx::query_as(&format!("SELECT {POST_COLUMNS} FROM blog_posts WHERE id = ANY($1)"))
                .bind(ids)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(BlogPost::from).collect())
    }

    async fn increment_post_views(&self, id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE blog_posts SET views = views + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn increment_post_likes(&self, id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE blog_posts SET likes = likes + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_posts_by_topics(
        &self,
        topics: &[String],
        exclude: &[Uuid],
        limit: usize,
    ) -> AppResult<Vec<BlogPost>> {
        let rows: Vec<BlogPostRow> = sqlx::query_as(&format!(
            "SELECT {POST_COLUMNS} FROM blog_posts
             WHERE topics && $1 AND NOT (id = ANY($2))
             ORDER BY cardinality(ARRAY(SELECT unnest(topics) INTERSECT SELECT unnest($1::TEXT[]))) DESC,
                views + likes DESC, published_at DESC
             LIMIT $3"
        ))
        .bind(topics)
        .bind(exclude)
        .bind(to_limit(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(BlogPost::from).collect())
    }

    async fn popular_posts(&self, limit: usize) -> AppResult<Vec<BlogPost>> {
        let rows: Vec<BlogPostRow> = sqlx::query_as(&format!(
            "SELECT {POST_COLUMNS} FROM blog_posts
             ORDER BY views + likes DESC, published_at DESC
             LIMIT $1"
        ))
        .bind(to_limit(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(BlogPost::from).collect())
    }
}

#[async_trait]
impl InteractionStore for PgStore {
    async fn record_interaction(&self, interaction: &Interaction) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO interactions (user_id, entity_kind, entity_id, kind, occurred_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(interaction.user_id)
        .bind(interaction.entity.kind.as_str())
        .bind(interaction.entity.id)
        .bind(interaction.kind.as_str())
        .bind(interaction.occurred_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn interactions_for_user(
        &self,
        user_id: Uuid,
        kind: Option<EntityKind>,
        limit: usize,
    ) -> AppResult<Vec<Interaction>> {
        let rows: Vec<InteractionRow> = sqlx::query_as(
            "SELECT user_id, entity_kind, entity_id, kind, occurred_at FROM interactions
             WHERE user_id = $1 AND ($2::TEXT IS NULL OR entity_kind = $2)
             ORDER BY occurred_at DESC, id DESC
             LIMIT $3",
        )
        .bind(user_id)
        .bind(kind.map(|k| k.as_str()))
        .bind(to_limit(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Interaction::try_from).collect()
    }

    async fn interacted_entity_ids(
        &self,
        user_id: Uuid,
        kind: EntityKind,
    ) -> AppResult<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT DISTINCT entity_id FROM interactions
             WHERE user_id = $1 AND entity_kind = $2",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

#[async_trait]
impl SearchHistoryStore for PgStore {
    async fn upsert_search(&self, user_id: Uuid, entry: &SearchHistoryEntry) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO search_history (user_id, search_key, query, filters, searched_at, search_count)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (user_id, search_key) DO UPDATE SET
                query = EXCLUDED.query,
                filters = EXCLUDED.filters,
                searched_at = EXCLUDED.searched_at,
                search_count = search_history.search_count + 1",
        )
        .bind(user_id)
        .bind(entry.key())
        .bind(&entry.query)
        .bind(Json(&entry.filters))
        .bind(entry.searched_at)
        .bind(entry.search_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn trim_searches(&self, user_id: Uuid, keep: usize) -> AppResult<u64> {
        let deleted = sqlx::query(
            "DELETE FROM search_history
             WHERE user_id = $1 AND search_key IN (
                SELECT search_key FROM search_history
                WHERE user_id = $1
                ORDER BY searched_at DESC
                OFFSET $2
             )",
        )
        .bind(user_id)
        .bind(to_limit(keep))
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(deleted)
    }

    async fn list_searches(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> AppResult<Vec<SearchHistoryEntry>> {
        let rows: Vec<SearchRow> = sqlx::query_as(
            "SELECT query, filters, searched_at, search_count FROM search_history
             WHERE user_id = $1
             ORDER BY searched_at DESC
             LIMIT $2",
        )
        .bind(user_id)
        .bind(to_limit(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SearchHistoryEntry::from).collect())
    }

    async fn delete_search(&self, user_id: Uuid, key: &str) -> AppResult<bool> {
        let deleted = sqlx::query("DELETE FROM search_history WHERE user_id = $1 AND search_key = $2")
            .bind(user_id)
            .bind(key)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted > 0)
    }

    async fn clear_searches(&self, user_id: Uuid) -> AppResult<u64> {
        let deleted = sqlx::query("DELETE FROM search_history WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted)
    }
}

#[async_trait]
impl ExperimentStore for PgStore {
    async fn insert_experiment(&self, experiment: &Experiment) -> AppResult<bool> {
        let inserted = sqlx::query(
            "INSERT INTO experiments (name, variants, active, created_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (name) DO NOTHING",
        )
        .bind(&experiment.name)
        .bind(Json(&experiment.variants))
        .bind(experiment.active)
        .bind(experiment.created_at)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(inserted > 0)
    }

    async fn get_experiment(&self, name: &str) -> AppResult<Option<Experiment>> {
        let row: Option<ExperimentRow> = sqlx::query_as(
            "SELECT name, variants, active, created_at FROM experiments WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Experiment::from))
    }

    async fn set_experiment_active(&self, name: &str, active: bool) -> AppResult<bool> {
        let updated = sqlx::query("UPDATE experiments SET active = $2 WHERE name = $1")
            .bind(name)
            .bind(active)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(updated > 0)
    }

    async fn get_assignment(
        &self,
        test_name: &str,
        client_id: Uuid,
    ) -> AppResult<Option<VariantAssignment>> {
        let row: Option<AssignmentRow> = sqlx::query_as(
            "SELECT test_name, client_id, variant, assigned_at FROM experiment_assignments
             WHERE test_name = $1 AND client_id = $2",
        )
        .bind(test_name)
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(VariantAssignment::from))
    }

    async fn insert_assignment_if_absent(
        &self,
        assignment: &VariantAssignment,
    ) -> AppResult<VariantAssignment> {
        sqlx::query(
            "INSERT INTO experiment_assignments (test_name, client_id, variant, assigned_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (test_name, client_id) DO NOTHING",
        )
        .bind(&assignment.test_name)
        .bind(assignment.client_id)
        .bind(&assignment.variant)
        .bind(assignment.assigned_at)
        .execute(&self.pool)
        .await?;

        self.get_assignment(&assignment.test_name, assignment.client_id)
            .await?
            .ok_or_else(|| AppError::Internal("Assignment vanished after insert".to_string()))
    }

    async fn insert_event(&self, event: &ExperimentEvent) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO experiment_events (test_name, client_id, variant, kind, occurred_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&event.test_name)
        .bind(event.client_id)
        .bind(&event.variant)
        .bind(event.kind.as_str())
        .bind(event.occurred_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn variant_counts(&self, test_name: &str) -> AppResult<Vec<VariantCounts>> {
        let rows: Vec<CountsRow> = sqlx::query_as(
            "WITH a AS (
                SELECT variant, COUNT(*) AS assignments
                FROM experiment_assignments WHERE test_name = $1 GROUP BY variant
             ), e AS (
                SELECT variant,
                       COUNT(*) FILTER (WHERE kind = 'impression') AS impressions,
                       COUNT(*) FILTER (WHERE kind = 'click') AS clicks,
                       COUNT(*) FILTER (WHERE kind = 'conversion') AS conversions
                FROM experiment_events WHERE test_name = $1 GROUP BY variant
             )
             SELECT COALESCE(a.variant, e.variant) AS variant,
                    COALESCE(a.assignments, 0) AS assignments,
                    COALESCE(e.impressions, 0) AS impressions,
                    COALESCE(e.clicks, 0) AS clicks,
                    COALESCE(e.conversions, 0) AS conversions
             FROM a FULL OUTER JOIN e ON a.variant = e.variant
             ORDER BY 1",
        )
        .bind(test_name)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| VariantCounts {
                variant: row.variant,
                assignments: row.assignments,
                impressions: row.impressions,
                clicks: row.clicks,
                conversions: row.conversions,
            })
            .collect())
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn insert_notification(&self, notification: &Notification) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::insert_notification_tx(&mut tx, notification).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
    ) -> AppResult<Vec<Notification>> {
        let rows: Vec<NotificationRow> = sqlx::query_as(
            "SELECT id, user_id, property_id, kind, message, read, created_at FROM notifications
             WHERE user_id = $1 AND (NOT $2 OR NOT read)
             ORDER BY created_at DESC",
        )
        .bind(user_id)
        .bind(unread_only)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Notification::try_from).collect()
    }

    async fn mark_notification_read(&self, user_id: Uuid, id: Uuid) -> AppResult<bool> {
        let updated =
            sqlx::query("UPDATE notifications SET read = TRUE WHERE id = $1 AND user_id = $2")
                .bind(id)
                .bind(user_id)
                .execute(&self.pool)
                .await?
                .rows_affected();
        Ok(updated > 0)
    }
}
