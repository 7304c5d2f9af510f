/// API routes and handlers
pub mod connections;
pub mod courses;
pub mod documents;
pub mod extract;
pub mod feed;
pub mod health;
pub mod identity;
pub mod messaging;
pub mod missions;
pub mod notifications;
pub mod reference;
pub mod scheduling;
pub mod shared;
pub mod upload;
pub mod users;

use crate::{context::AppContext, db::Pagination};
use axum::Router;
use serde::Deserialize;

/// Prefix every application route is mounted under
pub const API_PREFIX: &str = "/api/v1";

/// Build API routes, relative to [`API_PREFIX`]
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(identity::routes())
        .merge(users::routes())
        .merge(connections::routes())
        .merge(feed::post_routes())
        .merge(feed::panneau_routes())
        .merge(shared::routes())
        .merge(messaging::routes())
        .merge(notifications::routes())
        .merge(scheduling::routes())
        .merge(reference::routes())
        .merge(courses::routes())
        .merge(documents::routes())
        .merge(missions::routes())
}

/// `?page&limit` query pair
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl PageQuery {
    pub fn pagination(&self, default_limit: i64, max_limit: i64) -> Pagination {
        Pagination::from_query(
            self.page.as_deref(),
            self.limit.as_deref(),
            default_limit,
            max_limit,
        )
    }
}
