/// Reference and library data
///
/// Countries, search filters, legal pages, courses with their reviews, the
/// document library and the two mission pages. All writes here are staff
/// operations; reads are public.

mod country;
mod course;
mod document;
mod filter;
mod legal_text;
mod mission;
mod review;

pub use country::{Continent, Country, CountryInput, CountryManager};
pub use course::{Course, CourseInput, CourseManager, CourseRating};
pub use document::{
    Document, DocumentCategory, DocumentFiles, DocumentInput, DocumentManager, DocumentPage,
    DocumentQuery,
};
pub use filter::{Filter, FilterInput, FilterManager, FilterType, GroupedFilters};
pub use legal_text::{LegalText, LegalTextInput, LegalTextManager, LegalTextType};
pub use mission::{Mission, MissionInput, MissionKind, MissionManager};
pub use review::{Review, ReviewInput, ReviewManager};

use crate::error::{ApiError, ApiResult};
use chrono::{DateTime, NaiveDate, Utc};

/// Trimmed value of a required text field
pub(crate) fn required<'a>(value: Option<&'a str>, field: &str) -> ApiResult<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ApiError::Validation(format!("{} is required", field))),
    }
}

/// Trimmed value of an optional text field, `None` when blank
pub(crate) fn provided(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Optional date field: RFC 3339 timestamps and plain `YYYY-MM-DD` dates
pub(crate) fn parse_date(raw: Option<&str>, field: &str) -> ApiResult<Option<DateTime<Utc>>> {
    let Some(raw) = provided(raw) else {
        return Ok(None);
    };
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| Some(d.and_utc()))
        .ok_or_else(|| ApiError::Validation(format!("Invalid {}", field)))
}
