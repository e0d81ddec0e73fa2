use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use axum::Json;
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::db::queries;
use crate::errors::AppError;
use crate::handlers::check_auth;
use crate::models::{Message, Sender};
use crate::services::messages::record_message;
use crate::state::AppState;

// GET /api/bookings/:id/messages
#[derive(Deserialize)]
pub struct ThreadQuery {
    pub limit: Option<i64>,
}

pub async fn get_thread(
    State(state): State<Arc<AppState>>,
    Path(booking_id): Path<String>,
    Query(query): Query<ThreadQuery>,
) -> Result<Json<Vec<Message>>, AppError> {
    let limit = query.limit.unwrap_or(200);

    let messages = {
        let db = state.db.lock().unwrap();
        queries::get_booking_by_id(&db, &booking_id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;
        queries::get_thread_messages(&db, &booking_id, limit)?
    };

    Ok(Json(messages))
}

// POST /api/bookings/:id/messages
#[derive(Deserialize)]
pub struct PostMessageRequest {
    pub sender: String,
    pub body: String,
}

pub async fn post_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(booking_id): Path<String>,
    Json(body): Json<PostMessageRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let text = body.body.trim();
    if text.is_empty() {
        return Err(AppError::Validation("message body is required".into()));
    }

    let sender = match body.sender.as_str() {
        "customer" => Sender::Customer,
        "business" => {
            // Only the business side may speak as the business
            check_auth(&headers, &state.config.api_token)?;
            Sender::Business
        }
        other => {
            return Err(AppError::Validation(format!("invalid sender: {other}")));
        }
    };

    {
        let db = state.db.lock().unwrap();
        queries::get_booking_by_id(&db, &booking_id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;
    }

    record_message(&state, &booking_id, sender, text);
    Ok(Json(serde_json::json!({"ok": true})))
}

// POST /api/bookings/:id/read
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(booking_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.api_token)?;

    {
        let db = state.db.lock().unwrap();
        queries::get_booking_by_id(&db, &booking_id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;
        queries::mark_thread_read(&db, &booking_id)?;
    }

    Ok(Json(serde_json::json!({"ok": true})))
}

// GET /api/events — SSE stream of thread messages
#[derive(Deserialize)]
pub struct SseQuery {
    pub token: Option<String>,
    pub last_id: Option<i64>,
}

pub async fn events_stream(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SseQuery>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, AppError> {
    // Auth via query param (EventSource can't set headers)
    let token = query.token.as_deref().unwrap_or("");
    if token != state.config.api_token {
        return Err(AppError::Unauthorized);
    }

    let last_id = query.last_id.unwrap_or(0);

    // Catch up on missed events from the DB before tailing the broadcast
    let catchup_events = {
        let db = state.db.lock().unwrap();
        queries::get_messages_since(&db, last_id).unwrap_or_default()
    };

    let rx = state.events_tx.subscribe();

    let catchup_stream = tokio_stream::iter(catchup_events.into_iter().map(|message| {
        let data = serde_json::to_string(&message).unwrap_or_default();
        Ok::<_, Infallible>(Event::default().data(data).event("message"))
    }));

    let live_stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(message) => {
            let data = serde_json::to_string(&message).unwrap_or_default();
            Some(Ok(Event::default().data(data).event("message")))
        }
        Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(_)) => None,
    });

    let keepalive_stream = tokio_stream::StreamExt::map(
        tokio_stream::wrappers::IntervalStream::new(tokio::time::interval(Duration::from_secs(30))),
        |_| Ok(Event::default().comment("keepalive")),
    );

    let combined = catchup_stream.chain(live_stream);
    let merged = StreamExt::merge(combined, keepalive_stream);

    Ok(Sse::new(merged))
}
