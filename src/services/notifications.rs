use std::sync::Arc;
use uuid::Uuid;

use crate::{
    db::Store,
    error::{AppError, AppResult},
    models::Notification,
};

/// In-app notification inbox
#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn Store>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Newest first
    pub async fn list(&self, user_id: Uuid, unread_only: bool) -> AppResult<Vec<Notification>> {
        self.store.list_notifications(user_id, unread_only).await
    }

    /// Marking someone else's notification reads as not found
    pub async fn mark_read(&self, user_id: Uuid, notification_id: Uuid) -> AppResult<()> {
        if !self
            .store
            .mark_notification_read(user_id, notification_id)
            .await?
        {
            return Err(AppError::NotFound(format!(
                "notification {}",
                notification_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, NotificationStore};
    use crate::models::NotificationKind;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_mark_read_is_scoped_to_owner() {
        let store = MemoryStore::new();
        let service = NotificationService::new(Arc::new(store.clone()));
        let owner = Uuid::new_v4();
        let now = Utc::now();

        let older = Notification::new(
            owner,
            None,
            NotificationKind::ListingExpiring,
            "expires soon".to_string(),
            now - Duration::hours(1),
        );
        let newer = Notification::new(
            owner,
            None,
            NotificationKind::ListingExpired,
            "expired".to_string(),
            now,
        );
        store.insert_notification(&older).await.unwrap();
        store.insert_notification(&newer).await.unwrap();

        let listed = service.list(owner, false).await.unwrap();
        assert_eq!(listed[0].id, newer.id);

        let stranger = service.mark_read(Uuid::new_v4(), newer.id).await;
        assert!(matches!(stranger, Err(AppError::NotFound(_))));

        service.mark_read(owner, newer.id).await.unwrap();
        let unread = service.list(owner, true).await.unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].id, older.id);
    }
}
