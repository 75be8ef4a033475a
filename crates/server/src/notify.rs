//! E-mail delivery for voucher workflow notifications.
//!
//! Bodies are rendered with tera and posted as JSON to the configured mail API:
//! `{ "from", "to": [..], "subject", "html", "tags": [{ "name": "action", "value" }] }`.
//! A JSON response carrying `id` is reported back as the message id.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use routetracker_core::config::NotificationsConfig;
use routetracker_core::notifications::{
    DispatchReceipt, Notification, NotificationDispatcher, NotificationError,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tera::{Context, Tera};
use thiserror::Error;
use tracing::debug;

const TEMPLATE_NAME: &str = "voucher_notification.html";

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("notifications are enabled but `{0}` is not configured")]
    MissingSetting(&'static str),
    #[error("failed to load e-mail template: {0}")]
    Template(#[from] tera::Error),
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Serialize)]
struct OutboundEmail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    tags: [EmailTag<'a>; 1],
}

#[derive(Debug, Serialize)]
struct EmailTag<'a> {
    name: &'static str,
    value: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderResponse {
    id: Option<String>,
}

pub fn load_templates() -> Result<Tera, tera::Error> {
    let mut tera = Tera::default();
    tera.add_raw_template(
        TEMPLATE_NAME,
        include_str!("../../../templates/email/voucher_notification.html"),
    )?;
    Ok(tera)
}

pub struct HttpEmailDispatcher {
    client: Client,
    endpoint: String,
    api_key: SecretString,
    from_address: String,
    app_url: String,
    templates: Arc<Tera>,
}

impl HttpEmailDispatcher {
    pub fn from_config(config: &NotificationsConfig) -> Result<Self, NotifierError> {
        let endpoint =
            config.endpoint.clone().ok_or(NotifierError::MissingSetting("notifications.endpoint"))?;
        let api_key =
            config.api_key.clone().ok_or(NotifierError::MissingSetting("notifications.api_key"))?;
        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            from_address: config.from_address.clone(),
            app_url: config.app_url.trim_end_matches('/').to_string(),
            templates: Arc::new(load_templates()?),
        })
    }

    pub fn render_html(&self, notification: &Notification) -> Result<String, NotificationError> {
        render_html(&self.templates, &self.app_url, notification)
    }
}

pub fn render_html(
    templates: &Tera,
    app_url: &str,
    notification: &Notification,
) -> Result<String, NotificationError> {
    let template = notification.template();
    let summary = &notification.summary;

    let mut context = Context::new();
    context.insert("subject", &template.subject);
    context.insert("heading", &template.heading);
    context.insert("message", &template.message);
    context.insert("cta_label", &template.cta_label);
    context.insert("cta_url", &format!("{app_url}{}", template.cta_path));
    context.insert("employee_name", &summary.employee_name);
    context.insert("month", &summary.month.display_name());
    context.insert("total_miles", &summary.miles_display());
    context.insert("rejection_reason", &summary.rejection_reason);

    templates
        .render(TEMPLATE_NAME, &context)
        .map_err(|error| NotificationError::Transport(format!("template render failed: {error}")))
}

#[async_trait]
impl NotificationDispatcher for HttpEmailDispatcher {
    async fn notify(
        &self,
        notification: &Notification,
    ) -> Result<DispatchReceipt, NotificationError> {
        let template = notification.template();
        let html = self.render_html(notification)?;
        let payload = OutboundEmail {
            from: &self.from_address,
            to: [notification.recipient.as_str()],
            subject: &template.subject,
            html: &html,
            tags: [EmailTag { name: "action", value: notification.kind.action() }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|error| NotificationError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::Rejected(format!("mail API returned {status}: {body}")));
        }

        let provider: ProviderResponse = response.json().await.unwrap_or_default();
        debug!(
            event_name = "notifications.delivered",
            action = notification.kind.action(),
            message_id = provider.id.as_deref().unwrap_or("none"),
            "notification accepted by mail API"
        );
        Ok(DispatchReceipt { message_id: provider.id })
    }
}
