use crate::models::AppState;
use axum::Router;

pub mod appointment_routes;
pub mod catalog_routes;
pub mod home_routes;
pub mod live_routes;
pub mod package_routes;
pub mod schedule_routes;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", appointment_routes::router())
        .nest("/api/v1", schedule_routes::router())
        .nest("/api/v1", package_routes::router())
        .nest("/api/v1", catalog_routes::router())
        .nest("/api/v1", live_routes::router())
        .merge(home_routes::router())
        .with_state(state)
}
