use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{delete, get, patch, post, put},
    Router,
};
use sqlx::PgPool;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use domain::services::events::EventBus;

use crate::config::Config;
use crate::routes::{devices, health, portal, sessions, settings, time_rules, users};
use crate::services::enforcement::EnforcementService;
use crate::services::plex::PlexClient;
use crate::services::settings::SettingsStore;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub settings: Arc<SettingsStore>,
    pub plex: Arc<PlexClient>,
    pub enforcement: Arc<EnforcementService>,
    pub events: Arc<EventBus>,
}

pub fn create_app(state: AppState) -> Router {
    let request_timeout = state.config.server.request_timeout_secs;

    // The admin UI and portal front-ends are separate origins.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Admin surface; authentication sits in front of the daemon.
    let admin_routes = Router::new()
        .route("/api/sessions", get(sessions::list_sessions))
        .route(
            "/api/sessions/:id/terminate",
            post(sessions::terminate_session),
        )
        .route("/api/devices", get(devices::list_devices))
        .route("/api/devices/:id", patch(devices::update_device))
        .route("/api/devices/:id", delete(devices::delete_device))
        .route("/api/users", get(users::list_users))
        .route("/api/users/:id/preference", post(users::set_preference))
        .route("/api/users/:id/ip-policy", post(users::set_ip_policy))
        .route(
            "/api/users/:id/concurrent-stream-limit",
            post(users::set_concurrent_limit),
        )
        .route("/api/users/:id/hide", post(users::hide_user))
        .route("/api/users/:id/show", post(users::show_user))
        .route("/api/users/:id/rules", get(time_rules::list_rules))
        .route("/api/users/:id/rules", post(time_rules::create_rule))
        .route(
            "/api/users/:id/rules/:rule_id",
            put(time_rules::update_rule),
        )
        .route(
            "/api/users/:id/rules/:rule_id",
            delete(time_rules::delete_rule),
        )
        .route("/api/settings", get(settings::list_settings))
        .route("/api/settings", patch(settings::update_settings));

    // Self-service portal, scoped to the caller's Plex user id.
    let portal_routes = Router::new()
        .route("/user-portal/devices", get(portal::my_devices))
        .route("/user-portal/rules", get(portal::my_rules))
        .route("/user-portal/settings", get(portal::my_settings))
        .route(
            "/user-portal/devices/:id/request",
            post(portal::submit_note),
        );

    let health_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live));

    Router::new()
        .merge(health_routes)
        .merge(admin_routes)
        .merge(portal_routes)
        // Global middleware (order matters: bottom layers run first)
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(request_timeout)))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
