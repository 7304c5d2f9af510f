/// In-app notifications
///
/// Created as a side effect of likes, first comments, accepted connection
/// requests and direct messages. Each belongs to exactly one recipient.

mod manager;

pub use manager::NotificationManager;

use crate::account::PublicUser;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationType {
    Like,
    Comment,
    ConnectionAccepted,
    Message,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Like => "like",
            NotificationType::Comment => "comment",
            NotificationType::ConnectionAccepted => "connectionAccepted",
            NotificationType::Message => "message",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "like" => Some(NotificationType::Like),
            "comment" => Some(NotificationType::Comment),
            "connectionAccepted" => Some(NotificationType::ConnectionAccepted),
            "message" => Some(NotificationType::Message),
            _ => None,
        }
    }
}

/// Summary of the post a notification refers to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedPost {
    pub id: String,
    pub content: String,
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub recipient: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub related_user: Option<PublicUser>,
    pub related_post: Option<RelatedPost>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}
