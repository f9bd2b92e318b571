use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    db::Store,
    error::{AppError, AppResult},
    models::{
        BlogPost, EntityKind, EntityRef, Interaction, InteractionKind, NewBlogPost, NewProperty,
        Property,
    },
};

/// Listings, posts and the interactions that feed preference aggregation
#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create_property(&self, input: NewProperty) -> AppResult<Property> {
        input.validate()?;
        if input.expires_at.is_some_and(|at| at <= Utc::now()) {
            return Err(AppError::InvalidInput(
                "expires_at must be in the future".to_string(),
            ));
        }

        let property = input.into_property(Utc::now());
        self.store.insert_property(&property).await?;

        tracing::info!(
            property_id = %property.id,
            owner_id = %property.owner_id,
            property_type = %property.property_type,
            county = %property.county,
            "Created property"
        );
        Ok(property)
    }

    /// Fetches a listing; a signed-in viewer is recorded as a view
    pub async fn get_property(&self, id: Uuid, viewer: Option<Uuid>) -> AppResult<Property> {
        let mut property = self
            .store
            .get_property(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("property {}", id)))?;

        if let Some(user_id) = viewer {
            self.store
                .record_interaction(&Interaction::new(
                    user_id,
                    EntityRef::property(id),
                    InteractionKind::View,
                ))
                .await?;
            self.store.increment_property_views(id).await?;
            property.views += 1;
        }
        Ok(property)
    }

    pub async fn create_post(&self, input: NewBlogPost) -> AppResult<BlogPost> {
        let post = input.into_post(Utc::now())?;
        self.store.insert_post(&post).await?;
        tracing::info!(post_id = %post.id, slug = %post.slug, "Created blog post");
        Ok(post)
    }

    /// Fetches a post; a signed-in reader is recorded as a view
    pub async fn get_post(&self, id: Uuid, viewer: Option<Uuid>) -> AppResult<BlogPost> {
        let mut post = self
            .store
            .get_post(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("blog post {}", id)))?;

        if let Some(user_id) = viewer {
            self.store
                .record_interaction(&Interaction::new(
                    user_id,
                    EntityRef::blog_post(id),
                    InteractionKind::View,
                ))
                .await?;
            self.store.increment_post_views(id).await?;
            post.views += 1;
        }
        Ok(post)
    }

    /// Records an explicit interaction against an existing entity
    pub async fn record_interaction(
        &self,
        user_id: Uuid,
        entity: EntityRef,
        kind: InteractionKind,
    ) -> AppResult<Interaction> {
        match entity.kind {
            EntityKind::Property => {
                if self.store.get_property(entity.id).await?.is_none() {
                    return Err(AppError::NotFound(format!("property {}", entity.id)));
                }
                if kind == InteractionKind::View {
                    self.store.increment_property_views(entity.id).await?;
                }
            }
            EntityKind::BlogPost => {
                if self.store.get_post(entity.id).await?.is_none() {
                    return Err(AppError::NotFound(format!("blog post {}", entity.id)));
                }
                match kind {
                    InteractionKind::View => self.store.increment_post_views(entity.id).await?,
                    InteractionKind::Like => self.store.increment_post_likes(entity.id).await?,
                    InteractionKind::Save => {}
                }
            }
        }

        let interaction = Interaction::new(user_id, entity, kind);
        self.store.record_interaction(&interaction).await?;

        tracing::debug!(
            user_id = %user_id,
            entity_kind = entity.kind.as_str(),
            entity_id = %entity.id,
            kind = kind.as_str(),
            "Recorded interaction"
        );
        Ok(interaction)
    }
}
