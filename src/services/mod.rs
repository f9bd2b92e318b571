pub mod catalog;
pub mod experiments;
pub mod expiration;
pub mod mailer;
pub mod notifications;
pub mod preferences;
pub mod recommendations;
pub mod search_history;

pub use catalog::CatalogService;
pub use experiments::ExperimentService;
pub use expiration::{
    spawn_expiration_job, CycleReport, ExpirationJobHandle, ExpirationService,
    ExpirationSettings,
};
pub use mailer::{EmailMessage, EmailTemplate, LogMailer, Mailer, WebhookMailer};
pub use notifications::NotificationService;
pub use recommendations::{RecommendationService, RecommendationSettings};
pub use search_history::SearchHistoryService;
