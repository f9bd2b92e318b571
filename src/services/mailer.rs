use reqwest::Client as HttpClient;
use serde::Serialize;

use crate::{
    error::{AppError, AppResult},
    models::Property,
};

/// A rendered outgoing email
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Delivery channel for outgoing emails
///
/// Vendor SDKs stay behind this seam; the service only knows how to hand a
/// rendered message over.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> AppResult<()>;

    /// Mailer name for logging and debugging
    fn name(&self) -> &'static str;
}

/// Writes emails to the log instead of sending them
pub struct LogMailer;

#[async_trait::async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> AppResult<()> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            "Email (log only)"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// POSTs each email as JSON to an HTTP relay
pub struct WebhookMailer {
    http_client: HttpClient,
    url: String,
}

impl WebhookMailer {
    pub fn new(url: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            url,
        }
    }
}

#[async_trait::async_trait]
impl Mailer for WebhookMailer {
    async fn send(&self, message: &EmailMessage) -> AppResult<()> {
        let response = self.http_client.post(&self.url).json(message).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Mail relay rejected message");
            return Err(AppError::Mail(format!(
                "mail relay returned {}",
                status
            )));
        }

        tracing::debug!(to = %message.to, "Email handed to relay");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

/// Emails sent about a listing's visibility window
#[derive(Debug, Clone, Copy)]
pub enum EmailTemplate<'a> {
    ListingExpired { property: &'a Property },
    ListingExpiring { property: &'a Property, days_left: i64 },
}

impl EmailTemplate<'_> {
    fn property(&self) -> &Property {
        match self {
            EmailTemplate::ListingExpired { property }
            | EmailTemplate::ListingExpiring { property, .. } => *property,
        }
    }

    pub fn subject(&self) -> String {
        match self {
            EmailTemplate::ListingExpired { property } => {
                format!("Your listing \"{}\" has expired", property.title)
            }
            EmailTemplate::ListingExpiring {
                property,
                days_left,
            } => format!(
                "Your listing \"{}\" expires in {} {}",
                property.title,
                days_left,
                if *days_left == 1 { "day" } else { "days" }
            ),
        }
    }

    pub fn body(&self, site_url: &str) -> String {
        let property = self.property();
        let link = format!(
            "{}/properties/{}",
            site_url.trim_end_matches('/'),
            property.id
        );
        let status = match self {
            EmailTemplate::ListingExpired { .. } => {
                "has expired and is no longer visible to buyers. Renew it to publish it again."
                    .to_string()
            }
            EmailTemplate::ListingExpiring { days_left, .. } => format!(
                "will stop being visible to buyers in {} {}. Renew it to keep it online.",
                days_left,
                if *days_left == 1 { "day" } else { "days" }
            ),
        };

        format!(
            "Hello {},\n\nYour listing \"{}\" ({}, {}) {}\n\nManage it here: {}\n",
            property.agent_name, property.title, property.property_type, property.county, status, link
        )
    }

    pub fn render(&self, from: &str, site_url: &str) -> EmailMessage {
        EmailMessage {
            from: from.to_string(),
            to: self.property().agent_email.clone(),
            subject: self.subject(),
            body: self.body(site_url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PropertyType;
    use chrono::Utc;
    use uuid::Uuid;

    fn property() -> Property {
        Property {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            agent_name: "Wanjiku".to_string(),
            agent_email: "wanjiku@example.com".to_string(),
            title: "Garden Estate Maisonette".to_string(),
            property_type: PropertyType::Townhouse,
            county: "Nairobi".to_string(),
            price: 25_000_000.0,
            is_active: true,
            expires_at: None,
            last_expiry_warning_days: None,
            views: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_expired_template() {
        let p = property();
        let message = EmailTemplate::ListingExpired { property: &p }
            .render("no-reply@estate.local", "https://estate.example/");

        assert_eq!(message.to, "wanjiku@example.com");
        assert_eq!(
            message.subject,
            "Your listing \"Garden Estate Maisonette\" has expired"
        );
        assert!(message.body.starts_with("Hello Wanjiku,"));
        assert!(message
            .body
            .contains(&format!("https://estate.example/properties/{}", p.id)));
    }

    #[test]
    fn test_expiring_template_pluralizes() {
        let p = property();
        let one = EmailTemplate::ListingExpiring {
            property: &p,
            days_left: 1,
        };
        let three = EmailTemplate::ListingExpiring {
            property: &p,
            days_left: 3,
        };
        assert!(one.subject().ends_with("expires in 1 day"));
        assert!(three.subject().ends_with("expires in 3 days"));
        assert!(three.body("http://x").contains("in 3 days"));
    }

    #[tokio::test]
    async fn test_log_mailer_accepts_everything() {
        let p = property();
        let message = EmailTemplate::ListingExpired { property: &p }.render("a@b.c", "http://x");
        tokio_test::assert_ok!(LogMailer.send(&message).await);
        assert_eq!(LogMailer.name(), "log");
    }
}
