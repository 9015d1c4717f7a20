use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::ApiState;

pub fn create_router(state: Arc<ApiState>) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)));

    Router::new()
        .route("/api/events", post(handlers::handle_event))
        .route(
            "/api/rules",
            get(handlers::list_rules).post(handlers::create_rule),
        )
        .route(
            "/api/rules/:rule_id",
            put(handlers::update_rule).delete(handlers::delete_rule),
        )
        .route(
            "/api/global-default",
            get(handlers::get_global_default)
                .put(handlers::set_global_default)
                .delete(handlers::clear_global_default),
        )
        .route("/api/blocked-channels", get(handlers::list_blocked_channels))
        .route(
            "/api/blocked-channels/:channel_id",
            put(handlers::block_channel).delete(handlers::unblock_channel),
        )
        .route("/api/usage", get(handlers::list_usage))
        .route(
            "/api/usage/:user_id/:channel_id",
            delete(handlers::forget_usage),
        )
        .route(
            "/api/usage/:user_id/:channel_id/reset",
            post(handlers::reset_usage),
        )
        .route("/api/reset/sweep", post(handlers::run_sweep))
        .route("/health", get(handlers::health_check))
        .with_state(state)
        .layer(middleware)
}
