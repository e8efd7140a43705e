//! API request and response models for webhook endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;

use crate::db::models::webhooks::{Webhook, WebhookId};
use crate::errors::Error;
use crate::types::UserId;
use crate::webhooks::WebhookEventType;

/// Require HTTPS, except for loopback hosts used during development.
pub fn validate_webhook_url(raw: &str) -> Result<String, Error> {
    let url = Url::parse(raw.trim()).map_err(|_| Error::BadRequest {
        message: format!("Invalid webhook URL: {raw}"),
    })?;
    let local = matches!(url.host_str(), Some("localhost") | Some("127.0.0.1") | Some("[::1]"));
    match url.scheme() {
        "https" => Ok(url.to_string()),
        "http" if local => Ok(url.to_string()),
        _ => Err(Error::BadRequest {
            message: "Webhook URL must use HTTPS".to_string(),
        }),
    }
}

/// Reject unknown event names in a filter. An empty list is treated as
/// "receive everything".
pub fn validate_event_types(event_types: Option<Vec<String>>) -> Result<Option<Vec<String>>, Error> {
    let Some(types) = event_types else {
        return Ok(None);
    };
    for t in &types {
        t.parse::<WebhookEventType>().map_err(|_| Error::BadRequest {
            message: format!("Unknown event type '{t}'"),
        })?;
    }
    Ok(if types.is_empty() { None } else { Some(types) })
}

/// Request to create a new webhook.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct WebhookCreate {
    /// HTTPS URL to receive webhook events
    pub url: String,
    /// Optional list of event types to receive (null for all events)
    #[serde(default)]
    pub event_types: Option<Vec<String>>,
    /// Optional description to identify this webhook
    #[serde(default)]
    pub description: Option<String>,
}

/// Request to update a webhook.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct WebhookUpdate {
    #[serde(default)]
    pub url: Option<String>,
    /// Enable/disable the webhook. Enabling resets the failure counter.
    #[serde(default)]
    pub enabled: Option<bool>,
    /// New event filter; null receives all events
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<Vec<String>>)]
    pub event_types: Option<Option<Vec<String>>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
}

fn parse_event_types(value: Option<serde_json::Value>) -> Option<Vec<String>> {
    value.and_then(|v| serde_json::from_value::<Vec<String>>(v).ok())
}

/// Response for a webhook (secret hidden except on create/rotate).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: WebhookId,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub url: String,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_types: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub consecutive_failures: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled_at: Option<DateTime<Utc>>,
}

impl From<Webhook> for WebhookResponse {
    fn from(webhook: Webhook) -> Self {
        Self {
            id: webhook.id,
            user_id: webhook.user_id,
            url: webhook.url,
            enabled: webhook.enabled,
            event_types: parse_event_types(webhook.event_types),
            description: webhook.description,
            created_at: webhook.created_at,
            updated_at: webhook.updated_at,
            consecutive_failures: webhook.consecutive_failures,
            disabled_at: webhook.disabled_at,
        }
    }
}

/// Response for webhook create/rotate that includes the secret (shown only once).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookWithSecretResponse {
    #[serde(flatten)]
    pub webhook: WebhookResponse,
    /// Signing secret, `whsec_` followed by base64
    pub secret: String,
}

impl From<Webhook> for WebhookWithSecretResponse {
    fn from(mut webhook: Webhook) -> Self {
        let secret = std::mem::take(&mut webhook.secret);
        Self {
            webhook: webhook.into(),
            secret,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_webhook_url() {
        assert!(validate_webhook_url("https://hooks.example.com/in").is_ok());
        assert!(validate_webhook_url("http://localhost:8080/hook").is_ok());
        assert!(validate_webhook_url("http://127.0.0.1/hook").is_ok());
        assert!(validate_webhook_url("http://hooks.example.com/in").is_err());
        assert!(validate_webhook_url("ftp://hooks.example.com").is_err());
        assert!(validate_webhook_url("nope").is_err());
    }

    #[test]
    fn test_validate_event_types() {
        assert_eq!(validate_event_types(None).unwrap(), None);
        assert_eq!(validate_event_types(Some(vec![])).unwrap(), None);
        assert!(validate_event_types(Some(vec!["bookmark.created".to_string()])).is_ok());
        assert!(validate_event_types(Some(vec!["bookmark.exploded".to_string()])).is_err());
    }
}
