use crate::state::AppState;
use axum::Router;

mod claims;
mod dto;
pub mod error;
pub(crate) mod extractors;
pub mod handlers;
#[cfg(test)]
pub(crate) mod memory;
mod password;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod tokens;

#[cfg(test)]
mod tests;

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(handlers::anonymous_routes(state))
        .merge(handlers::verification_routes())
        .merge(handlers::me_routes())
        .merge(handlers::verified_routes(state))
}
