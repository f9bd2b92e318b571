use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// A published blog post
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlogPost {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    /// Normalized topics (lower case, trimmed, deduplicated)
    pub topics: Vec<String>,
    pub views: i64,
    pub likes: i64,
    pub published_at: DateTime<Utc>,
}

impl BlogPost {
    /// Engagement used to rank popular posts
    pub fn engagement(&self) -> i64 {
        self.views + self.likes
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewBlogPost {
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

impl NewBlogPost {
    pub fn into_post(self, now: DateTime<Utc>) -> Result<BlogPost, AppError> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(AppError::InvalidInput("title must not be empty".to_string()));
        }
        let slug = match self.slug {
            Some(slug) if !slug.trim().is_empty() => slugify(&slug),
            _ => slugify(&title),
        };

        Ok(BlogPost {
            id: Uuid::new_v4(),
            title,
            slug,
            topics: normalize_topics(&self.topics),
            views: 0,
            likes: 0,
            published_at: now,
        })
    }
}

/// Lower-cases, trims and deduplicates topics, dropping empty ones
pub fn normalize_topics(topics: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(topics.len());
    for topic in topics {
        let normalized = normalize_topic(topic);
        if !normalized.is_empty() && !out.contains(&normalized) {
            out.push(normalized);
        }
    }
    out
}

pub fn normalize_topic(topic: &str) -> String {
    topic.trim().to_lowercase()
}

fn slugify(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
