/// Social graph
///
/// Connection requests between users and the symmetric connection set they
/// produce once accepted.

mod manager;

pub use manager::ConnectionManager;

use crate::account::PublicUser;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(RequestStatus::Pending),
            "accepted" => Some(RequestStatus::Accepted),
            "rejected" => Some(RequestStatus::Rejected),
            _ => None,
        }
    }
}

/// A connection request with both parties populated
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRequest {
    pub id: String,
    pub sender: PublicUser,
    pub recipient: PublicUser,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Pending requests received by a user, one page at a time
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPage {
    pub requests: Vec<ConnectionRequest>,
    pub current_page: i64,
    pub total_pages: i64,
    pub total: i64,
}

/// Relationship between the caller and another user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    /// The caller sent a request that is still pending
    Pending,
    /// The other user sent a request the caller has not answered
    Received {
        #[serde(rename = "requestId")]
        request_id: String,
    },
    NotConnected,
}
