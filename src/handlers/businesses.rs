use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::handlers::check_auth;
use crate::models::{Business, Service, WorkingHours};
use crate::state::AppState;

#[derive(Serialize)]
pub struct BusinessResponse {
    pub id: String,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub timezone: String,
    pub hours: Option<String>,
    pub hours_readable: Option<String>,
}

impl From<Business> for BusinessResponse {
    fn from(b: Business) -> Self {
        let hours_readable = b
            .hours
            .as_deref()
            .and_then(|h| WorkingHours::from_json(h).ok())
            .map(|h| h.to_human_readable());
        Self {
            id: b.id,
            name: b.name,
            category: b.category,
            description: b.description,
            address: b.address,
            phone: b.phone,
            timezone: b.timezone,
            hours: b.hours,
            hours_readable,
        }
    }
}

// GET /api/businesses
#[derive(Deserialize)]
pub struct ListQuery {
    pub category: Option<String>,
    pub search: Option<String>,
}

pub async fn list_businesses(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<BusinessResponse>>, AppError> {
    let businesses = {
        let db = state.db.lock().unwrap();
        queries::list_businesses(&db, query.category.as_deref(), query.search.as_deref())?
    };

    Ok(Json(businesses.into_iter().map(Into::into).collect()))
}

// GET /api/businesses/:id
#[derive(Serialize)]
pub struct BusinessProfileResponse {
    #[serde(flatten)]
    pub business: BusinessResponse,
    pub services: Vec<Service>,
}

pub async fn get_business(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BusinessProfileResponse>, AppError> {
    let (business, services) = {
        let db = state.db.lock().unwrap();
        let business = queries::get_business(&db, &id)?
            .ok_or_else(|| AppError::NotFound(format!("business {id}")))?;
        let services = queries::list_services(&db, &id)?;
        (business, services)
    };

    Ok(Json(BusinessProfileResponse {
        business: business.into(),
        services,
    }))
}

// POST /api/businesses
#[derive(Deserialize)]
pub struct CreateBusinessRequest {
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub timezone: Option<String>,
    pub utc_offset_minutes: Option<i64>,
    pub hours: Option<String>,
}

pub async fn create_business(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateBusinessRequest>,
) -> Result<(StatusCode, Json<BusinessResponse>), AppError> {
    check_auth(&headers, &state.config.api_token)?;

    if body.name.trim().is_empty() || body.category.trim().is_empty() {
        return Err(AppError::Validation("name and category are required".into()));
    }
    if let Some(hours) = body.hours.as_deref() {
        WorkingHours::from_json(hours)
            .map_err(|e| AppError::Validation(format!("invalid hours: {e}")))?;
    }

    let business = Business {
        id: uuid::Uuid::new_v4().to_string(),
        name: body.name.trim().to_string(),
        category: body.category.trim().to_string(),
        description: body.description,
        address: body.address,
        phone: body.phone,
        timezone: body.timezone.unwrap_or_else(|| "UTC".to_string()),
        utc_offset_minutes: body.utc_offset_minutes.unwrap_or(0),
        hours: body.hours,
    };

    {
        let db = state.db.lock().unwrap();
        queries::create_business(&db, &business)?;
    }

    tracing::info!(business_id = %business.id, name = %business.name, "business created");
    Ok((StatusCode::CREATED, Json(business.into())))
}

// PUT /api/businesses/:id/hours
#[derive(Deserialize)]
pub struct UpdateHoursRequest {
    pub hours: String,
}

pub async fn update_hours(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<UpdateHoursRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.api_token)?;

    WorkingHours::from_json(&body.hours)
        .map_err(|e| AppError::Validation(format!("invalid hours: {e}")))?;

    let updated = {
        let db = state.db.lock().unwrap();
        queries::update_business_hours(&db, &id, &body.hours)?
    };

    if updated {
        Ok(Json(serde_json::json!({"ok": true})))
    } else {
        Err(AppError::NotFound(format!("business {id}")))
    }
}

// POST /api/businesses/:id/services
#[derive(Deserialize)]
pub struct CreateServiceRequest {
    pub name: String,
    pub duration_minutes: i32,
    pub price_cents: i64,
}

pub async fn create_service(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(business_id): Path<String>,
    Json(body): Json<CreateServiceRequest>,
) -> Result<(StatusCode, Json<Service>), AppError> {
    check_auth(&headers, &state.config.api_token)?;

    if body.name.trim().is_empty() {
        return Err(AppError::Validation("service name is required".into()));
    }
    if body.duration_minutes <= 0 {
        return Err(AppError::Validation(
            "duration_minutes must be positive".into(),
        ));
    }

    let service = {
        let db = state.db.lock().unwrap();
        queries::get_business(&db, &business_id)?
            .ok_or_else(|| AppError::NotFound(format!("business {business_id}")))?;

        let service = Service {
            id: uuid::Uuid::new_v4().to_string(),
            business_id: business_id.clone(),
            name: body.name.trim().to_string(),
            duration_minutes: body.duration_minutes,
            price_cents: body.price_cents,
            active: true,
        };
        queries::create_service(&db, &service)?;
        service
    };

    Ok((StatusCode::CREATED, Json(service)))
}

// GET /api/businesses/:id/stats
#[derive(Serialize)]
pub struct StatsResponse {
    pub pending_count: i64,
    pub upcoming_confirmed_count: i64,
    pub unread_messages: i64,
}

pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<StatsResponse>, AppError> {
    check_auth(&headers, &state.config.api_token)?;

    let stats = {
        let db = state.db.lock().unwrap();
        let business = queries::get_business(&db, &id)?
            .ok_or_else(|| AppError::NotFound(format!("business {id}")))?;
        queries::get_business_stats(&db, &id, &business.local_now())?
    };

    Ok(Json(StatsResponse {
        pending_count: stats.pending_count,
        upcoming_confirmed_count: stats.upcoming_confirmed_count,
        unread_messages: stats.unread_messages,
    }))
}
