use std::sync::Arc;

use crate::{
    config::Config,
    db::{Cache, Store},
    services::{
        CatalogService, ExperimentService, ExpirationService, ExpirationSettings, Mailer,
        NotificationService, RecommendationService, RecommendationSettings, SearchHistoryService,
    },
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub catalog: CatalogService,
    pub recommendations: RecommendationService,
    pub search_history: SearchHistoryService,
    pub experiments: ExperimentService,
    pub notifications: NotificationService,
    pub expiration: Arc<ExpirationService>,
}

impl AppState {
    /// Wires every service over one store; `cache` is optional
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        cache: Option<Cache>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let recommendation_settings = RecommendationSettings {
            top_k: config.preference_top_k,
            price_tolerance: config.price_tolerance,
            popular_cache_ttl_secs: config.popular_cache_ttl_secs,
        };
        let expiration_settings = ExpirationSettings {
            warning_days: config.warning_thresholds(),
            mail_from: config.mail_from.clone(),
            site_url: config.site_url.clone(),
        };

        Self {
            catalog: CatalogService::new(store.clone()),
            recommendations: RecommendationService::new(
                store.clone(),
                cache.clone(),
                recommendation_settings,
            ),
            search_history: SearchHistoryService::new(store.clone(), config.search_history_limit),
            experiments: ExperimentService::new(store.clone()),
            notifications: NotificationService::new(store.clone()),
            expiration: Arc::new(ExpirationService::new(
                store.clone(),
                mailer,
                cache,
                expiration_settings,
            )),
            config: Arc::new(config),
            store,
        }
    }
}
