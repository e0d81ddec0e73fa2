use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::handlers::check_auth;
use crate::models::{Booking, BookingStatus, ServiceSnapshot, WorkingHours};
use crate::services::booking::{self, BookingRequest, RejectReason};
use crate::services::{messages, scheduling};
use crate::state::AppState;

#[derive(Serialize)]
pub struct BookingResponse {
    pub id: String,
    pub business_id: String,
    pub customer_id: String,
    pub service: ServiceSnapshot,
    pub start_time: String,
    pub end_time: String,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Booking> for BookingResponse {
    fn from(b: Booking) -> Self {
        Self {
            start_time: b.start_time.format("%Y-%m-%d %H:%M:%S").to_string(),
            end_time: b.end_time().format("%Y-%m-%d %H:%M:%S").to_string(),
            status: b.status.as_str().to_string(),
            created_at: b.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            updated_at: b.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            id: b.id,
            business_id: b.business_id,
            customer_id: b.customer_id,
            service: b.service,
            notes: b.notes,
        }
    }
}

/// Rejections carry a machine-readable reason next to the user-facing
/// message, so the client can prompt for another time instead of showing a
/// generic failure.
fn rejection(reason: RejectReason) -> Response {
    let status = match reason {
        RejectReason::NotFound => StatusCode::NOT_FOUND,
        RejectReason::PastDate | RejectReason::InvalidDuration => StatusCode::UNPROCESSABLE_ENTITY,
        RejectReason::SlotNoLongerAvailable
        | RejectReason::Overlap
        | RejectReason::InvalidTransition => StatusCode::CONFLICT,
    };
    (
        status,
        Json(serde_json::json!({
            "error": reason.to_string(),
            "reason": reason.as_str(),
        })),
    )
        .into_response()
}

fn parse_start_time(s: &str) -> Result<NaiveDateTime, AppError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .map_err(|_| AppError::Validation(format!("invalid start_time: {s}")))
}

// GET /api/businesses/:id/slots
#[derive(Deserialize)]
pub struct SlotsQuery {
    pub date: String,
    pub service_id: Option<String>,
    pub duration: Option<i64>,
}

#[derive(Serialize)]
pub struct SlotsResponse {
    pub date: String,
    pub duration_minutes: i64,
    pub granularity_minutes: i64,
    pub slots: Vec<String>,
}

pub async fn list_slots(
    State(state): State<Arc<AppState>>,
    Path(business_id): Path<String>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<SlotsResponse>, AppError> {
    let date = NaiveDate::parse_from_str(&query.date, "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("invalid date: {}", query.date)))?;

    let db = state.db.lock().unwrap();

    let business = queries::get_business(&db, &business_id)?
        .ok_or_else(|| AppError::NotFound(format!("business {business_id}")))?;

    let duration_minutes = match (&query.service_id, query.duration) {
        (Some(service_id), _) => {
            let service = queries::get_service(&db, service_id)?
                .filter(|s| s.business_id == business_id && s.active)
                .ok_or_else(|| AppError::NotFound(format!("service {service_id}")))?;
            service.duration_minutes as i64
        }
        (None, Some(duration)) => duration,
        (None, None) => {
            return Err(AppError::Validation(
                "either service_id or duration is required".into(),
            ))
        }
    };

    let hours = match business.hours.as_deref() {
        Some(json) => WorkingHours::from_json(json)
            .map_err(|e| AppError::Validation(format!("stored hours are invalid: {e}")))?,
        None => WorkingHours { slots: vec![] },
    };

    let occupied = scheduling::occupied_intervals(&db, &business_id, date)?;
    let slots = scheduling::available_slots(
        &hours,
        &occupied,
        date,
        duration_minutes,
        state.config.slot_granularity_minutes,
        business.local_now(),
    );

    Ok(Json(SlotsResponse {
        date: query.date,
        duration_minutes,
        granularity_minutes: state.config.slot_granularity_minutes,
        slots: slots.iter().map(|t| t.format("%H:%M").to_string()).collect(),
    }))
}

// POST /api/bookings
#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub business_id: String,
    pub customer_id: String,
    pub service_id: String,
    pub start_time: String,
    pub notes: Option<String>,
}

pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateBookingRequest>,
) -> Result<Response, AppError> {
    let start_time = parse_start_time(&body.start_time)?;

    let outcome = {
        let mut db = state.db.lock().unwrap();

        let business = queries::get_business(&db, &body.business_id)?
            .ok_or_else(|| AppError::NotFound(format!("business {}", body.business_id)))?;

        // Snapshot the service at commit time; a later catalog edit must not
        // change this booking.
        let service = queries::get_service(&db, &body.service_id)?
            .filter(|s| s.business_id == body.business_id && s.active)
            .ok_or_else(|| AppError::NotFound(format!("service {}", body.service_id)))?;

        let req = BookingRequest {
            customer_id: body.customer_id.clone(),
            service: ServiceSnapshot {
                name: service.name,
                duration_minutes: service.duration_minutes,
                price_cents: service.price_cents,
            },
            start_time,
            notes: body.notes.clone(),
        };

        booking::try_book(&mut db, &business, state.config.slot_granularity_minutes, &req)?
    };

    match outcome {
        Ok(booking) => {
            messages::announce_booking(&state, &booking);
            Ok((StatusCode::CREATED, Json(BookingResponse::from(booking))).into_response())
        }
        Err(reason) => Ok(rejection(reason)),
    }
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = {
        let db = state.db.lock().unwrap();
        queries::get_booking_by_id(&db, &id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?
    };
    Ok(Json(booking.into()))
}

// POST /api/bookings/:id/confirm
pub async fn confirm_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    check_auth(&headers, &state.config.api_token)?;
    change_status(&state, &id, BookingStatus::Confirmed)
}

// POST /api/bookings/:id/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    change_status(&state, &id, BookingStatus::Cancelled)
}

fn change_status(
    state: &Arc<AppState>,
    id: &str,
    next: BookingStatus,
) -> Result<Response, AppError> {
    let outcome = {
        let mut db = state.db.lock().unwrap();
        booking::change_status(&mut db, id, next)?
    };

    match outcome {
        Ok(booking) => {
            messages::announce_status_change(state, &booking);
            Ok(Json(BookingResponse::from(booking)).into_response())
        }
        Err(reason) => Ok(rejection(reason)),
    }
}

// POST /api/bookings/:id/reschedule
#[derive(Deserialize)]
pub struct RescheduleRequest {
    pub start_time: String,
}

pub async fn reschedule_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<RescheduleRequest>,
) -> Result<Response, AppError> {
    let new_start = parse_start_time(&body.start_time)?;

    let outcome = {
        let mut db = state.db.lock().unwrap();

        let old = queries::get_booking_by_id(&db, &id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;
        let business = queries::get_business(&db, &old.business_id)?
            .ok_or_else(|| AppError::NotFound(format!("business {}", old.business_id)))?;

        booking::reschedule(
            &mut db,
            &business,
            state.config.slot_granularity_minutes,
            &old,
            new_start,
        )?
    };

    match outcome {
        Ok(booking) => {
            messages::announce_booking(&state, &booking);
            Ok(Json(BookingResponse::from(booking)).into_response())
        }
        Err(reason) => Ok(rejection(reason)),
    }
}

// GET /api/customers/:id/bookings
pub async fn customer_bookings(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    let bookings = {
        let db = state.db.lock().unwrap();
        queries::get_bookings_for_customer(&db, &id)?
    };
    Ok(Json(bookings.into_iter().map(Into::into).collect()))
}

// GET /api/businesses/:id/bookings
#[derive(Deserialize)]
pub struct RangeQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

pub async fn business_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    check_auth(&headers, &state.config.api_token)?;

    let parse_date = |s: &str| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|_| AppError::Validation(format!("invalid date: {s}")))
    };

    let today = chrono::Utc::now().naive_utc().date();
    let from = match query.from.as_deref() {
        Some(s) => parse_date(s)?,
        None => today,
    };
    let to = match query.to.as_deref() {
        Some(s) => parse_date(s)?,
        None => from + Duration::days(30),
    };

    let bookings = {
        let db = state.db.lock().unwrap();
        queries::get_bookings_for_business(
            &db,
            &id,
            &from.and_hms_opt(0, 0, 0).expect("midnight is valid"),
            &to.and_hms_opt(23, 59, 59).expect("end of day is valid"),
        )?
    };
    Ok(Json(bookings.into_iter().map(Into::into).collect()))
}
