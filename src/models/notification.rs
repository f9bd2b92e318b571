use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ListingExpired,
    ListingExpiring,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::ListingExpired => "listing_expired",
            NotificationKind::ListingExpiring => "listing_expiring",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "listing_expired" => Ok(NotificationKind::ListingExpired),
            "listing_expiring" => Ok(NotificationKind::ListingExpiring),
            other => Err(AppError::Internal(format!(
                "Unknown notification kind: {}",
                other
            ))),
        }
    }
}

/// In-app notification shown on the owner's dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub property_id: Option<Uuid>,
    pub kind: NotificationKind,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: Uuid,
        property_id: Option<Uuid>,
        kind: NotificationKind,
        message: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            property_id,
            kind,
            message,
            read: false,
            created_at,
        }
    }
}
