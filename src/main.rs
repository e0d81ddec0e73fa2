use std::sync::{Arc, Mutex};

use axum::routing::{get, post, put};
use axum::Router;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use slotbook::config::AppConfig;
use slotbook::db;
use slotbook::handlers;
use slotbook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    let (events_tx, _) = broadcast::channel(256);

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        events_tx,
    });

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/businesses", get(handlers::businesses::list_businesses))
        .route("/api/businesses", post(handlers::businesses::create_business))
        .route("/api/businesses/:id", get(handlers::businesses::get_business))
        .route(
            "/api/businesses/:id/hours",
            put(handlers::businesses::update_hours),
        )
        .route(
            "/api/businesses/:id/services",
            post(handlers::businesses::create_service),
        )
        .route(
            "/api/businesses/:id/stats",
            get(handlers::businesses::get_stats),
        )
        .route(
            "/api/businesses/:id/slots",
            get(handlers::bookings::list_slots),
        )
        .route(
            "/api/businesses/:id/bookings",
            get(handlers::bookings::business_bookings),
        )
        .route("/api/bookings", post(handlers::bookings::create_booking))
        .route("/api/bookings/:id", get(handlers::bookings::get_booking))
        .route(
            "/api/bookings/:id/confirm",
            post(handlers::bookings::confirm_booking),
        )
        .route(
            "/api/bookings/:id/cancel",
            post(handlers::bookings::cancel_booking),
        )
        .route(
            "/api/bookings/:id/reschedule",
            post(handlers::bookings::reschedule_booking),
        )
        .route(
            "/api/customers/:id/bookings",
            get(handlers::bookings::customer_bookings),
        )
        .route(
            "/api/bookings/:id/messages",
            get(handlers::messages::get_thread),
        )
        .route(
            "/api/bookings/:id/messages",
            post(handlers::messages::post_message),
        )
        .route("/api/bookings/:id/read", post(handlers::messages::mark_read))
        .route("/api/events", get(handlers::messages::events_stream))
        .route("/calendar/:booking_id", get(handlers::calendar::download_ics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
