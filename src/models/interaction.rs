use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Property,
    BlogPost,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Property => "property",
            EntityKind::BlogPost => "blog_post",
        }
    }
}

impl FromStr for EntityKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "property" => Ok(EntityKind::Property),
            "blog_post" => Ok(EntityKind::BlogPost),
            other => Err(AppError::Internal(format!("Unknown entity kind: {}", other))),
        }
    }
}

/// Reference to a liked/viewed/saved entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: Uuid,
}

impl EntityRef {
    pub fn property(id: Uuid) -> Self {
        Self {
            kind: EntityKind::Property,
            id,
        }
    }

    pub fn blog_post(id: Uuid) -> Self {
        Self {
            kind: EntityKind::BlogPost,
            id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    View,
    Like,
    Save,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::View => "view",
            InteractionKind::Like => "like",
            InteractionKind::Save => "save",
        }
    }
}

impl FromStr for InteractionKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view" => Ok(InteractionKind::View),
            "like" => Ok(InteractionKind::Like),
            "save" => Ok(InteractionKind::Save),
            other => Err(AppError::Internal(format!(
                "Unknown interaction kind: {}",
                other
            ))),
        }
    }
}

/// One user interaction with a listing or post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub user_id: Uuid,
    pub entity: EntityRef,
    pub kind: InteractionKind,
    pub occurred_at: DateTime<Utc>,
}

impl Interaction {
    pub fn new(user_id: Uuid, entity: EntityRef, kind: InteractionKind) -> Self {
        Self {
            user_id,
            entity,
            kind,
            occurred_at: Utc::now(),
        }
    }
}
