/// Appointment scheduling
///
/// A slot is an exact timestamp built from a `YYYY-MM-DD` date and an
/// `HH:MM` time. A slot holds at most one appointment that is not cancelled.

mod manager;

pub use manager::AppointmentManager;

use crate::{
    account::PublicUser,
    error::{ApiError, ApiResult},
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentType {
    Installation,
    Discussion,
}

impl AppointmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentType::Installation => "installation",
            AppointmentType::Discussion => "discussion",
        }
    }

    /// Absent or blank means discussion
    pub fn parse(raw: Option<&str>) -> ApiResult<Self> {
        match raw.map(str::trim).unwrap_or("") {
            "" | "discussion" => Ok(AppointmentType::Discussion),
            "installation" => Ok(AppointmentType::Installation),
            other => Err(ApiError::Validation(format!(
                "Unknown appointment type: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Cancelled,
    Rescheduled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Rescheduled => "rescheduled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(AppointmentStatus::Pending),
            "confirmed" => Some(AppointmentStatus::Confirmed),
            "cancelled" => Some(AppointmentStatus::Cancelled),
            "rescheduled" => Some(AppointmentStatus::Rescheduled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    pub user: PublicUser,
    #[serde(rename = "type")]
    pub appointment_type: AppointmentType,
    pub status: AppointmentStatus,
    pub scheduled_at: DateTime<Utc>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Reservation request body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReserveRequest {
    pub date: String,
    pub time: String,
    #[serde(rename = "type")]
    pub appointment_type: Option<String>,
    pub notes: Option<String>,
}

/// Reschedule request body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RescheduleRequest {
    pub new_date: String,
    pub new_time: String,
}

/// Combine `YYYY-MM-DD` and `HH:MM` into a slot timestamp
pub fn parse_slot(date: &str, time: &str) -> ApiResult<DateTime<Utc>> {
    let invalid = || ApiError::Validation("Invalid date and/or time".to_string());
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").map_err(|_| invalid())?;
    let time = NaiveTime::parse_from_str(time.trim(), "%H:%M").map_err(|_| invalid())?;
    Ok(date.and_time(time).and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_slot() {
        let slot = parse_slot("2025-03-14", "09:30").unwrap();
        assert_eq!(slot.to_rfc3339(), "2025-03-14T09:30:00+00:00");

        assert!(parse_slot("2025-02-30", "09:30").is_err());
        assert!(parse_slot("2025-03-14", "25:00").is_err());
        assert!(parse_slot("14/03/2025", "09:30").is_err());
        assert!(parse_slot("", "").is_err());
    }

    #[test]
    fn test_appointment_type_default() {
        assert_eq!(AppointmentType::parse(None).unwrap(), AppointmentType::Discussion);
        assert_eq!(
            AppointmentType::parse(Some("installation")).unwrap(),
            AppointmentType::Installation
        );
        assert!(AppointmentType::parse(Some("visite")).is_err());
    }
}
