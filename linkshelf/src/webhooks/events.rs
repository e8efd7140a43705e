//! Webhook event types and payload builders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::models::{
    affiliate_links::RedirectTarget,
    bookmarks::BookmarkDBResponse,
    collections::CollectionDBResponse,
    reports::{ReportDBResponse, ReportStatus, ReportTargetType},
};

/// Events a webhook can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum WebhookEventType {
    #[serde(rename = "bookmark.created")]
    BookmarkCreated,
    #[serde(rename = "bookmark.deleted")]
    BookmarkDeleted,
    #[serde(rename = "collection.created")]
    CollectionCreated,
    #[serde(rename = "affiliate_link.clicked")]
    AffiliateLinkClicked,
    #[serde(rename = "report.resolved")]
    ReportResolved,
}

impl WebhookEventType {
    pub const ALL: [WebhookEventType; 5] = [
        Self::BookmarkCreated,
        Self::BookmarkDeleted,
        Self::CollectionCreated,
        Self::AffiliateLinkClicked,
        Self::ReportResolved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BookmarkCreated => "bookmark.created",
            Self::BookmarkDeleted => "bookmark.deleted",
            Self::CollectionCreated => "collection.created",
            Self::AffiliateLinkClicked => "affiliate_link.clicked",
            Self::ReportResolved => "report.resolved",
        }
    }
}

impl std::fmt::Display for WebhookEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WebhookEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown event type: {s}"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookmarkEventData {
    pub bookmark_id: Uuid,
    pub url: String,
    pub title: String,
    pub tags: Vec<String>,
    pub is_public: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CollectionEventData {
    pub collection_id: Uuid,
    pub name: String,
    pub is_public: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClickEventData {
    pub affiliate_link_id: Uuid,
    pub short_code: String,
    pub target_url: String,
    pub click_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReportEventData {
    pub report_id: Uuid,
    pub target_type: ReportTargetType,
    pub target_id: Uuid,
    pub status: ReportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_note: Option<String>,
}

/// Event-specific payload
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum WebhookEventData {
    Bookmark(BookmarkEventData),
    Collection(CollectionEventData),
    Click(ClickEventData),
    Report(ReportEventData),
}

/// Complete webhook event payload: `{type, timestamp, data}`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: WebhookEventType,
    pub timestamp: DateTime<Utc>,
    pub data: WebhookEventData,
}

impl WebhookEvent {
    fn new(event_type: WebhookEventType, data: WebhookEventData) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            data,
        }
    }

    fn bookmark(event_type: WebhookEventType, bookmark: &BookmarkDBResponse) -> Self {
        Self::new(
            event_type,
            WebhookEventData::Bookmark(BookmarkEventData {
                bookmark_id: bookmark.id,
                url: bookmark.url.clone(),
                title: bookmark.title.clone(),
                tags: bookmark.tags.clone(),
                is_public: bookmark.is_public,
            }),
        )
    }

    pub fn bookmark_created(bookmark: &BookmarkDBResponse) -> Self {
        Self::bookmark(WebhookEventType::BookmarkCreated, bookmark)
    }

    pub fn bookmark_deleted(bookmark: &BookmarkDBResponse) -> Self {
        Self::bookmark(WebhookEventType::BookmarkDeleted, bookmark)
    }

    pub fn collection_created(collection: &CollectionDBResponse) -> Self {
        Self::new(
            WebhookEventType::CollectionCreated,
            WebhookEventData::Collection(CollectionEventData {
                collection_id: collection.id,
                name: collection.name.clone(),
                is_public: collection.is_public,
            }),
        )
    }

    pub fn affiliate_link_clicked(target: &RedirectTarget) -> Self {
        Self::new(
            WebhookEventType::AffiliateLinkClicked,
            WebhookEventData::Click(ClickEventData {
                affiliate_link_id: target.id,
                short_code: target.short_code.clone(),
                target_url: target.target_url.clone(),
                click_count: target.click_count,
            }),
        )
    }

    pub fn report_resolved(report: &ReportDBResponse) -> Self {
        Self::new(
            WebhookEventType::ReportResolved,
            WebhookEventData::Report(ReportEventData {
                report_id: report.id,
                target_type: report.target_type,
                target_id: report.target_id,
                status: report.status,
                resolution_note: report.resolution_note.clone(),
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_from_str() {
        assert_eq!(
            "affiliate_link.clicked".parse::<WebhookEventType>().unwrap(),
            WebhookEventType::AffiliateLinkClicked
        );
        assert!("batch.completed".parse::<WebhookEventType>().is_err());

        for event_type in WebhookEventType::ALL {
            let json = serde_json::to_value(event_type).unwrap();
            assert_eq!(json.as_str(), Some(event_type.as_str()));
        }
    }

    #[test]
    fn test_click_event_serialization() {
        let target = RedirectTarget {
            id: Uuid::nil(),
            owner_id: Uuid::nil(),
            short_code: "abc123".to_string(),
            target_url: "https://example.com/product".to_string(),
            click_count: 42,
        };

        let json = serde_json::to_value(WebhookEvent::affiliate_link_clicked(&target)).unwrap();
        assert_eq!(json["type"], "affiliate_link.clicked");
        assert_eq!(json["data"]["short_code"], "abc123");
        assert_eq!(json["data"]["click_count"], 42);
        assert!(json["timestamp"].is_string());
    }
}
