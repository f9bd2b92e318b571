//! Search history tracking
//!
//! Every visitor keeps a capped, most-recent-first list in a cookie. Signed-in
//! users additionally get a server-side copy keyed by `(user_id, search key)`.
//! The cookie is always written, so a failing database only costs the
//! cross-device copy.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    db::SearchHistoryStore,
    error::{AppError, AppResult},
    models::{SearchFilters, SearchHistoryEntry},
};

pub const SEARCH_HISTORY_COOKIE: &str = "search_history";

/// Browsers reject cookies over 4096 bytes; leave room for the attributes
const MAX_COOKIE_VALUE_BYTES: usize = 3800;

/// Upserts `entry` into a most-recent-first list: an entry with the same key
/// is replaced and its count carried over, then the list is capped
pub fn push_entry(
    mut entries: Vec<SearchHistoryEntry>,
    mut entry: SearchHistoryEntry,
    cap: usize,
) -> Vec<SearchHistoryEntry> {
    let key = entry.key();
    if let Some(pos) = entries.iter().position(|e| e.key() == key) {
        let previous = entries.remove(pos);
        entry.search_count = previous.search_count + 1;
    }
    entries.insert(0, entry);
    entries.truncate(cap);
    entries
}

/// Merges two histories, keeping the most recent entry per key
pub fn merge_histories(
    primary: Vec<SearchHistoryEntry>,
    secondary: Vec<SearchHistoryEntry>,
    cap: usize,
) -> Vec<SearchHistoryEntry> {
    let mut merged: Vec<SearchHistoryEntry> = Vec::with_capacity(primary.len() + secondary.len());

    for entry in primary.into_iter().chain(secondary) {
        let key = entry.key();
        match merged.iter_mut().find(|e| e.key() == key) {
            Some(existing) => {
                let count = existing.search_count.max(entry.search_count);
                if entry.searched_at > existing.searched_at {
                    *existing = entry;
                }
                existing.search_count = count;
            }
            None => merged.push(entry),
        }
    }

    merged.sort_by(|a, b| b.searched_at.cmp(&a.searched_at));
    merged.truncate(cap);
    merged
}

/// Serializes the list for the cookie, dropping the oldest entries until the
/// value fits a browser cookie
pub fn encode_cookie(entries: &[SearchHistoryEntry]) -> String {
    let mut len = entries.len();
    loop {
        let json = serde_json::to_vec(&entries[..len]).unwrap_or_default();
        let encoded = URL_SAFE_NO_PAD.encode(json);
        if encoded.len() <= MAX_COOKIE_VALUE_BYTES || len == 0 {
            return encoded;
        }
        len -= 1;
    }
}

/// Parses a cookie value; anything malformed reads as an empty history
pub fn decode_cookie(value: &str) -> Vec<SearchHistoryEntry> {
    URL_SAFE_NO_PAD
        .decode(value.trim())
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .unwrap_or_default()
}

#[derive(Clone)]
pub struct SearchHistoryService {
    store: Arc<dyn SearchHistoryStore>,
    limit: usize,
}

impl SearchHistoryService {
    pub fn new(store: Arc<dyn SearchHistoryStore>, limit: usize) -> Self {
        Self { store, limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Records a search and returns the new cookie list
    pub async fn record(
        &self,
        user_id: Option<Uuid>,
        cookie_entries: Vec<SearchHistoryEntry>,
        query: &str,
        filters: SearchFilters,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<SearchHistoryEntry>> {
        let entry = SearchHistoryEntry::new(query, filters, now);
        if entry.query.is_empty() && entry.filters.is_empty() {
            return Err(AppError::InvalidInput(
                "a search needs a query or at least one filter".to_string(),
            ));
        }

        if let Some(user_id) = user_id {
            if let Err(e) = self.write_server_copy(user_id, &entry).await {
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    "Search history database write failed, keeping cookie copy only"
                );
            }
        }

        Ok(push_entry(cookie_entries, entry, self.limit))
    }

    async fn write_server_copy(&self, user_id: Uuid, entry: &SearchHistoryEntry) -> AppResult<()> {
        self.store.upsert_search(user_id, entry).await?;
        let trimmed = self.store.trim_searches(user_id, self.limit).await?;
        if trimmed > 0 {
            tracing::debug!(user_id = %user_id, trimmed, "Trimmed search history");
        }
        Ok(())
    }

    /// Server rows merged with the cookie for signed-in users, the cookie
    /// alone otherwise or when the database is unavailable
    pub async fn list(
        &self,
        user_id: Option<Uuid>,
        cookie_entries: Vec<SearchHistoryEntry>,
    ) -> Vec<SearchHistoryEntry> {
        let Some(user_id) = user_id else {
            return merge_histories(cookie_entries, Vec::new(), self.limit);
        };

        match self.store.list_searches(user_id, self.limit).await {
            Ok(rows) => merge_histories(rows, cookie_entries, self.limit),
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    "Search history database read failed, serving cookie copy"
                );
                merge_histories(cookie_entries, Vec::new(), self.limit)
            }
        }
    }

    /// Removes one search from both copies; returns the new cookie list
    pub async fn remove(
        &self,
        user_id: Option<Uuid>,
        cookie_entries: Vec<SearchHistoryEntry>,
        key: &str,
    ) -> AppResult<Vec<SearchHistoryEntry>> {
        if let Some(user_id) = user_id {
            self.store.delete_search(user_id, key).await?;
        }
        Ok(cookie_entries
            .into_iter()
            .filter(|e| e.key() != key)
            .collect())
    }

    /// Drops the server copy; the caller expires the cookie
    pub async fn clear(&self, user_id: Option<Uuid>) -> AppResult<()> {
        if let Some(user_id) = user_id {
            let removed = self.store.clear_searches(user_id).await?;
            tracing::info!(user_id = %user_id, removed, "Cleared search history");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::MockSearchHistoryStore;
    use crate::db::{MemoryStore, SearchHistoryStore};
    use crate::models::PropertyType;
    use chrono::Duration;

    fn entry(query: &str, at: DateTime<Utc>) -> SearchHistoryEntry {
        SearchHistoryEntry::new(query, SearchFilters::default(), at)
    }

    #[test]
    fn test_push_entry_moves_duplicate_to_front() {
        let now = Utc::now();
        let list = vec![entry("villa", now), entry("land", now)];
        let list = push_entry(list, entry("LAND", now + Duration::seconds(5)), 10);

        assert_eq!(list.len(), 2);
        assert_eq!(list[0].query, "LAND");
        assert_eq!(list[0].search_count, 2);
        assert_eq!(list[1].query, "villa");
    }

    #[test]
    fn test_push_entry_caps_list() {
        let now = Utc::now();
        let mut list = Vec::new();
        for i in 0..5 {
            list = push_entry(list, entry(&format!("q{}", i), now), 3);
        }
        let queries: Vec<&str> = list.iter().map(|e| e.query.as_str()).collect();
        assert_eq!(queries, vec!["q4", "q3", "q2"]);
    }

    #[test]
    fn test_merge_keeps_most_recent_per_key() {
        let now = Utc::now();
        let server = vec![entry("villa", now - Duration::hours(1))];
        let cookie = vec![entry("Villa", now), entry("land", now - Duration::hours(2))];

        let merged = merge_histories(server, cookie, 10);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].query, "Villa");
        assert_eq!(merged[1].query, "land");
    }

    #[test]
    fn test_cookie_round_trip_and_garbage() {
        let now = Utc::now();
        let list = vec![SearchHistoryEntry::new(
            "3 bedroom",
            SearchFilters {
                property_type: Some(PropertyType::Apartment),
                ..SearchFilters::default()
            },
            now,
        )];
        let encoded = encode_cookie(&list);
        assert!(!encoded.contains(';'));
        assert_eq!(decode_cookie(&encoded), list);
        assert!(decode_cookie("%%%not-base64").is_empty());
        assert!(decode_cookie(&URL_SAFE_NO_PAD.encode("{\"x\":1}")).is_empty());
    }

    #[test]
    fn test_encode_cookie_drops_oldest_when_too_large() {
        let now = Utc::now();
        let list: Vec<SearchHistoryEntry> = (0..50)
            .map(|i| entry(&format!("{} {}", "long query text".repeat(10), i), now))
            .collect();
        let encoded = encode_cookie(&list);
        assert!(encoded.len() <= MAX_COOKIE_VALUE_BYTES);
        let decoded = decode_cookie(&encoded);
        assert!(!decoded.is_empty());
        assert_eq!(decoded[0], list[0]);
    }

    #[tokio::test]
    async fn test_record_dual_writes_for_signed_in_user() {
        let store = MemoryStore::new();
        let service = SearchHistoryService::new(Arc::new(store.clone()), 2);
        let user = Uuid::new_v4();
        let now = Utc::now();

        let mut cookie = Vec::new();
        for (i, q) in ["a", "b", "c"].iter().enumerate() {
            cookie = service
                .record(
                    Some(user),
                    cookie,
                    q,
                    SearchFilters::default(),
                    now + Duration::seconds(i as i64),
                )
                .await
                .unwrap();
        }

        assert_eq!(cookie.len(), 2);
        let rows = store.list_searches(user, 10).await.unwrap();
        let queries: Vec<&str> = rows.iter().map(|e| e.query.as_str()).collect();
        assert_eq!(queries, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn test_record_keeps_cookie_when_database_write_fails() {
        let mut store = MockSearchHistoryStore::new();
        store
            .expect_upsert_search()
            .times(1)
            .returning(|_, _| Err(AppError::Internal("connection refused".to_string())));
        store.expect_trim_searches().never();
        let service = SearchHistoryService::new(Arc::new(store), 5);
        let now = Utc::now();

        let cookie = vec![entry("land", now - Duration::minutes(5))];
        let cookie = service
            .record(
                Some(Uuid::new_v4()),
                cookie,
                "villa",
                SearchFilters::default(),
                now,
            )
            .await
            .unwrap();

        let queries: Vec<&str> = cookie.iter().map(|e| e.query.as_str()).collect();
        assert_eq!(queries, vec!["villa", "land"]);
    }

    #[tokio::test]
    async fn test_list_serves_cookie_when_database_read_fails() {
        let mut store = MockSearchHistoryStore::new();
        store
            .expect_list_searches()
            .times(1)
            .returning(|_, _| Err(AppError::Internal("connection refused".to_string())));
        let service = SearchHistoryService::new(Arc::new(store), 5);
        let now = Utc::now();

        let cookie = vec![
            entry("villa", now),
            entry("land", now - Duration::minutes(1)),
        ];
        let listed = service.list(Some(Uuid::new_v4()), cookie.clone()).await;
        assert_eq!(listed, cookie);
    }

    #[tokio::test]
    async fn test_record_rejects_empty_search() {
        let service = SearchHistoryService::new(Arc::new(MemoryStore::new()), 5);
        let result = service
            .record(None, Vec::new(), "   ", SearchFilters::default(), Utc::now())
            .await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_list_merges_cookie_for_signed_in_user() {
        let store = MemoryStore::new();
        let service = SearchHistoryService::new(Arc::new(store.clone()), 5);
        let user = Uuid::new_v4();
        let now = Utc::now();

        store
            .upsert_search(user, &entry("from another device", now))
            .await
            .unwrap();
        let cookie = vec![entry("from this browser", now - Duration::minutes(1))];

        let listed = service.list(Some(user), cookie).await;
        let queries: Vec<&str> = listed.iter().map(|e| e.query.as_str()).collect();
        assert_eq!(queries, vec!["from another device", "from this browser"]);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let store = MemoryStore::new();
        let service = SearchHistoryService::new(Arc::new(store.clone()), 5);
        let user = Uuid::new_v4();
        let now = Utc::now();

        let cookie = service
            .record(Some(user), Vec::new(), "villa", SearchFilters::default(), now)
            .await
            .unwrap();
        let key = cookie[0].key();

        let cookie = service.remove(Some(user), cookie, &key).await.unwrap();
        assert!(cookie.is_empty());
        assert!(store.list_searches(user, 5).await.unwrap().is_empty());

        service
            .record(Some(user), Vec::new(), "land", SearchFilters::default(), now)
            .await
            .unwrap();
        service.clear(Some(user)).await.unwrap();
        assert!(store.list_searches(user, 5).await.unwrap().is_empty());
    }
}
