use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod handlers;
pub mod materializer;
pub mod repo_types;
pub mod services;

pub fn router() -> Router<AppState> {
    handlers::resource_routes()
}
