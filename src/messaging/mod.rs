/// Direct messaging
///
/// Every pair of users shares at most one conversation. Messages are never
/// removed, only flagged deleted, and a deleted message is served with empty
/// content.

mod manager;

pub use manager::MessageManager;

use crate::account::PublicUser;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Send request body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SendMessageRequest {
    pub receiver_id: String,
    pub content: String,
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender: String,
    pub receiver: String,
    pub content: String,
    pub status: String,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub participants: Vec<PublicUser>,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Order a pair so it matches the stored `participant_a < participant_b`
pub fn ordered_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}
