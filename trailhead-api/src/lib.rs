use axum::{http::Method, middleware::from_fn_with_state, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod auth;
pub mod availability;
pub mod bookings;
pub mod error;
pub mod health;
pub mod middleware;
pub mod params;
pub mod state;
pub mod tickets;
pub mod webhooks;
pub mod workflows;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    // CORS Middleware
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let customer = Router::new()
        .merge(bookings::routes())
        .merge(tickets::routes())
        .route_layer(from_fn_with_state(state.clone(), middleware::require_auth));

    let admin = admin::routes().route_layer(from_fn_with_state(state.clone(), middleware::require_admin));

    Router::new()
        .merge(health::routes())
        .nest("/auth", auth::routes())
        .merge(availability::routes())
        .merge(webhooks::routes())
        .merge(customer)
        .merge(admin)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
