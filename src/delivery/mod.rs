//! Outbound delivery of session reports
//!
//! A configured webhook receives `{subject, body}` as JSON. Without a webhook, or when the
//! webhook fails, the report is written to the outbox directory instead.

use crate::config::{expand_tilde, DeliveryConfig};
use crate::error::{GroundchatError, Result};
use crate::profile::SessionProfile;
use chrono::{SecondsFormat, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Result of one delivery attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub destination: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    subject: &'a str,
    body: &'a str,
}

#[derive(Deserialize)]
struct WebhookReceipt {
    #[serde(default)]
    id: Option<serde_json::Value>,
}

/// Subject and body describing one session
pub fn session_report(profile: &SessionProfile, subject_prefix: &str) -> (String, String) {
    let subject = format!("{} {}", subject_prefix, profile.id);
    let body = [
        format!("Session: {}", profile.id),
        format!(
            "Created: {}",
            profile
                .created_at
                .to_rfc3339_opts(SecondsFormat::Millis, true)
        ),
        format!("Name: {}", profile.name.as_deref().unwrap_or_default()),
        format!("Email: {}", profile.email.as_deref().unwrap_or_default()),
        format!("Income: {}", profile.income.as_deref().unwrap_or_default()),
    ]
    .join("\n");
    (subject, body)
}

pub struct Deliverer {
    client: Client,
    webhook_url: Option<String>,
    webhook_token: Option<String>,
    outbox_dir: PathBuf,
    subject_prefix: String,
}

impl Deliverer {
    pub fn from_config(config: &DeliveryConfig) -> Result<Self> {
        let webhook_token = config
            .webhook_token_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|token| !token.trim().is_empty());

        Self::new(
            config.webhook_url.clone().filter(|url| !url.trim().is_empty()),
            webhook_token,
            expand_tilde(&config.outbox_dir),
            config.subject_prefix.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn new(
        webhook_url: Option<String>,
        webhook_token: Option<String>,
        outbox_dir: PathBuf,
        subject_prefix: String,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            webhook_url,
            webhook_token,
            outbox_dir,
            subject_prefix,
        })
    }

    pub fn outbox_dir(&self) -> &Path {
        &self.outbox_dir
    }

    /// Deliver a report for `profile`
    pub async fn deliver_session(&self, profile: &SessionProfile) -> DeliveryOutcome {
        let (subject, body) = session_report(profile, &self.subject_prefix);
        self.deliver(&subject, &body).await
    }

    /// Send `subject`/`body`; failures are described in the outcome rather than returned
    pub async fn deliver(&self, subject: &str, body: &str) -> DeliveryOutcome {
        let transport_failure = match &self.webhook_url {
            Some(url) => match self.post_webhook(url, subject, body).await {
                Ok(id) => {
                    info!("Delivered report to {}", url);
                    return DeliveryOutcome {
                        ok: true,
                        id,
                        destination: format!("webhook:{}", url),
                        note: Some("Delivered to webhook".to_string()),
                    };
                }
                Err(e) => {
                    warn!("Webhook delivery failed, using outbox: {}", e);
                    Some(e.to_string())
                }
            },
            None => None,
        };

        match self.write_outbox(subject, body).await {
            Ok(path) => {
                info!("Wrote report to {}", path.display());
                let note = match transport_failure {
                    Some(reason) => format!("Written to outbox (webhook failed: {})", reason),
                    None => "Written to outbox (no webhook configured)".to_string(),
                };
                DeliveryOutcome {
                    ok: true,
                    id: None,
                    destination: path.display().to_string(),
                    note: Some(note),
                }
            }
            Err(e) => {
                warn!("Outbox write failed: {}", e);
                DeliveryOutcome {
                    ok: false,
                    id: None,
                    destination: self.outbox_dir.display().to_string(),
                    note: Some(e.to_string()),
                }
            }
        }
    }

    async fn post_webhook(&self, url: &str, subject: &str, body: &str) -> Result<Option<String>> {
        let mut request = self.client.post(url).json(&WebhookPayload { subject, body });
        if let Some(token) = &self.webhook_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?.error_for_status()?;
        let receipt = response.json::<WebhookReceipt>().await.ok();
        Ok(receipt.and_then(|r| r.id).map(|id| match id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        }))
    }

    async fn write_outbox(&self, subject: &str, body: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.outbox_dir)
            .await
            .map_err(|e| GroundchatError::Io {
                source: e,
                context: format!("Failed to create outbox: {}", self.outbox_dir.display()),
            })?;

        let path = self
            .outbox_dir
            .join(format!("{}-delivery.txt", Utc::now().timestamp_millis()));
        tokio::fs::write(&path, format!("Subject: {}\n\n{}", subject, body))
            .await
            .map_err(|e| GroundchatError::Io {
                source: e,
                context: format!("Failed to write outbox file: {}", path.display()),
            })?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::ExtractionResult;
    use tempfile::TempDir;

    fn deliverer(webhook: Option<&str>, outbox: PathBuf) -> Deliverer {
        Deliverer::new(
            webhook.map(String::from),
            None,
            outbox,
            "Groundchat Session".to_string(),
            Duration::from_millis(500),
        )
        .unwrap()
    }

    #[test]
    fn test_session_report() {
        let mut profile = SessionProfile::with_id("abc");
        profile.merge(&ExtractionResult {
            name: Some("Jane".to_string()),
            income: Some("85k".to_string()),
            ..Default::default()
        });

        let (subject, body) = session_report(&profile, "Groundchat Session");
        assert_eq!(subject, "Groundchat Session abc");
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines[0], "Session: abc");
        assert!(lines[1].starts_with("Created: ") && lines[1].ends_with('Z'));
        assert_eq!(&lines[2..], &["Name: Jane", "Email: ", "Income: 85k"]);
    }

    #[tokio::test]
    async fn test_outbox_without_webhook() {
        let temp = TempDir::new().unwrap();
        let outcome = deliverer(None, temp.path().join("outbox"))
            .deliver("Hello", "Line one")
            .await;

        assert!(outcome.ok);
        assert!(outcome.destination.ends_with("-delivery.txt"));
        assert!(outcome.note.unwrap().contains("no webhook"));
        let written = std::fs::read_to_string(&outcome.destination).unwrap();
        assert_eq!(written, "Subject: Hello\n\nLine one");
    }

    #[tokio::test]
    async fn test_failed_webhook_falls_back_to_outbox() {
        let temp = TempDir::new().unwrap();
        let outcome = deliverer(Some("http://127.0.0.1:9/hook"), temp.path().to_path_buf())
            .deliver("Hello", "Body")
            .await;

        assert!(outcome.ok);
        assert!(outcome.note.unwrap().contains("webhook failed"));
        assert!(Path::new(&outcome.destination).exists());
    }

    #[tokio::test]
    async fn test_unwritable_outbox_reports_failure() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let outcome = deliverer(None, blocker.join("outbox"))
            .deliver("Hello", "Body")
            .await;
        assert!(!outcome.ok);
        assert!(outcome.note.is_some());
    }
}
