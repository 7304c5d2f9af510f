/// Appointment booking
use crate::{
    api::extract::ApiJson,
    auth::{AuthUser, RoleSet},
    context::AppContext,
    db,
    error::{ApiError, ApiResult},
    scheduling::{parse_slot, Appointment, AppointmentType, RescheduleRequest, ReserveRequest},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

/// Build scheduling routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/rendezvous/check-availability", get(check_availability))
        .route("/rendezvous/reserve", post(reserve))
        .route("/rendezvous/cancel/:appointment_id", patch(cancel))
        .route("/rendezvous/reschedule/:appointment_id", patch(reschedule))
        .route("/rendezvous/all", get(list_all))
        .route("/rendezvous/:appointment_id", get(get_appointment))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SlotQuery {
    date: String,
    time: String,
}

async fn check_availability(
    State(ctx): State<AppContext>,
    _auth: AuthUser,
    Query(query): Query<SlotQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let slot = parse_slot(&query.date, &query.time)?;
    if !ctx.appointment_manager.is_available(slot).await? {
        return Err(ApiError::Validation("This slot is already booked".to_string()));
    }
    Ok(Json(json!({ "available": true })))
}

async fn reserve(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    ApiJson(req): ApiJson<ReserveRequest>,
) -> ApiResult<impl IntoResponse> {
    let slot = parse_slot(&req.date, &req.time)?;
    let appointment_type = AppointmentType::parse(req.appointment_type.as_deref())?;

    let appointment = ctx
        .appointment_manager
        .reserve(
            auth.id(),
            slot,
            appointment_type,
            req.notes.as_deref().unwrap_or_default(),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Appointment booked successfully",
            "appointment": appointment
        })),
    ))
}

async fn cancel(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(appointment_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let appointment_id = db::parse_id(&appointment_id, "appointment")?;
    let appointment = ctx
        .appointment_manager
        .cancel(&appointment_id, auth.id(), auth.has_any(RoleSet::STAFF))
        .await?;

    Ok(Json(json!({
        "message": "Appointment cancelled successfully",
        "appointment": appointment
    })))
}

async fn reschedule(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(appointment_id): Path<String>,
    ApiJson(req): ApiJson<RescheduleRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let appointment_id = db::parse_id(&appointment_id, "appointment")?;
    let slot = parse_slot(&req.new_date, &req.new_time)?;
    let appointment = ctx
        .appointment_manager
        .reschedule(&appointment_id, auth.id(), slot)
        .await?;

    Ok(Json(json!({
        "message": "Appointment rescheduled successfully",
        "appointment": appointment
    })))
}

async fn list_all(State(ctx): State<AppContext>, auth: AuthUser) -> ApiResult<Json<Vec<Appointment>>> {
    auth.require(RoleSet::ADMIN)?;
    Ok(Json(ctx.appointment_manager.list_all().await?))
}

async fn get_appointment(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(appointment_id): Path<String>,
) -> ApiResult<Json<Appointment>> {
    let appointment_id = db::parse_id(&appointment_id, "appointment")?;
    let appointment = ctx.appointment_manager.get(&appointment_id).await?;
    auth.require_owner_or(&appointment.user.id, RoleSet::ADMIN)?;
    Ok(Json(appointment))
}
