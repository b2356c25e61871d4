//! Outbound alert transports.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{NotifyError, NotifyResult};
use crate::machine::Notification;
use crate::message::render;

/// Where and how alerts are delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Delivery is disabled when unset or empty.
    pub webhook_url: Option<String>,
    pub subject_prefix: String,
    /// Link appended to every alert body.
    pub ui_url: Option<String>,
    /// 0 disables the timeout.
    pub timeout_ms: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            subject_prefix: "[convoy] ".to_string(),
            ui_url: None,
            timeout_ms: 8_000,
        }
    }
}

impl NotifierConfig {
    pub fn is_enabled(&self) -> bool {
        self.webhook_url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }
}

/// Outcome of a delivery that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// No destination configured.
    Skipped,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Whether a destination is configured at all.
    fn is_enabled(&self) -> bool;

    async fn send(&self, notification: &Notification) -> NotifyResult<Delivery>;
}

/// Notifier used when no destination is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn send(&self, notification: &Notification) -> NotifyResult<Delivery> {
        debug!(service = %notification.service, status = %notification.status, "notifier disabled, alert skipped");
        Ok(Delivery::Skipped)
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    subject: String,
    text: String,
    alert: &'a Notification,
}

/// Posts alerts as JSON to a webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
    subject_prefix: String,
    ui_url: Option<String>,
    timeout_ms: u64,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, config: &NotifierConfig) -> NotifyResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent("convoy-alert/0.1")
            .build()
            .map_err(|e| NotifyError::Build(e.to_string()))?;
        Ok(Self {
            http,
            url: url.into(),
            subject_prefix: config.subject_prefix.clone(),
            ui_url: config.ui_url.clone(),
            timeout_ms: config.timeout_ms,
        })
    }

    async fn post(&self, payload: &WebhookPayload<'_>) -> NotifyResult<()> {
        let resp = self
            .http
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(NotifyError::Rejected(resp.status().as_u16()))
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn send(&self, notification: &Notification) -> NotifyResult<Delivery> {
        let message = render(notification, &self.subject_prefix, self.ui_url.as_deref());
        let payload = WebhookPayload {
            subject: message.subject,
            text: message.body,
            alert: notification,
        };

        if self.timeout_ms == 0 {
            self.post(&payload).await?;
        } else {
            tokio::time::timeout(Duration::from_millis(self.timeout_ms), self.post(&payload))
                .await
                .map_err(|_| NotifyError::Timeout(self.timeout_ms))??;
        }

        info!(service = %notification.service, status = %notification.status, "alert delivered");
        Ok(Delivery::Sent)
    }
}

/// Build the notifier a configuration asks for.
pub fn build_notifier(config: &NotifierConfig) -> NotifyResult<Arc<dyn Notifier>> {
    match config.webhook_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => Ok(Arc::new(WebhookNotifier::new(url, config)?)),
        _ => Ok(Arc::new(DisabledNotifier)),
    }
}

/// Lazily built notifier, rebuilt only when its configuration changes.
#[derive(Default)]
pub struct NotifierCache {
    current: Mutex<Option<(NotifierConfig, Arc<dyn Notifier>)>>,
}

impl NotifierCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifier for `config`, reusing the cached one when nothing changed.
    pub fn get(&self, config: &NotifierConfig) -> NotifyResult<Arc<dyn Notifier>> {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((cached, notifier)) = current.as_ref() {
            if cached == config {
                return Ok(Arc::clone(notifier));
            }
        }
        let notifier = build_notifier(config)?;
        debug!(enabled = notifier.is_enabled(), "notifier (re)built");
        *current = Some((config.clone(), Arc::clone(&notifier)));
        Ok(notifier)
    }
}
