//! Route definitions for the TerraView platform

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{
    handlers,
    middleware::{admin_middleware, auth_middleware},
    AppState,
};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Public leaderboard
        .nest("/rankings", ranking_routes())
        // Contribution list is public; submission needs a token
        .route("/contributions", get(handlers::list_contributions))
        .merge(protected_routes(state.clone()))
        .nest("/admin", admin_routes(state))
}

/// Public leaderboard routes
fn ranking_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_rankings))
        .route("/:farmer_id", get(handlers::get_ranking))
}

/// Routes for any authenticated caller; role checks live in the handlers
fn protected_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/me", get(handlers::me))
        .route("/contributions", post(handlers::create_contribution))
        .route(
            "/farm-locations",
            get(handlers::list_locations).post(handlers::create_location),
        )
        .route(
            "/farm-locations/:id",
            axum::routing::delete(handlers::delete_location),
        )
        .route(
            "/bloom-predictions",
            get(handlers::list_predictions).post(handlers::create_prediction),
        )
        .route(
            "/bloom-predictions/:id",
            get(handlers::get_prediction).delete(handlers::delete_prediction),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Admin routes
///
/// The last layer added runs first, so authentication wraps the admin check.
fn admin_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/contributions/:id/verify",
            get(handlers::verification_history).patch(handlers::verify_contribution),
        )
        .route_layer(middleware::from_fn(admin_middleware))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
