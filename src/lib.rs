//! Contacts manager: a REST API over a per-user contact store, plus the client side that drives it.
//!
//! The server half is [`router`] over [`handlers`] and [`store`]. The client half is
//! [`client::ApiClient`], the [`session::AuthContext`] that owns login state, and the
//! [`page::ContactsPage`] that orchestrates list and mutation flows.

pub mod auth;
pub mod client;
pub mod error;
pub mod handlers;
pub mod models;
pub mod page;
pub mod session;
pub mod store;

#[cfg(test)]
pub(crate) mod test_utils;

use std::sync::Arc;

use axum::{middleware, routing::get, routing::post, Router};
use tower_http::cors::{Any, CorsLayer};

use handlers::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    // CORS: allow all
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(handlers::health))
        // Users
        .route("/api/users/register", post(handlers::register))
        .route("/api/users/login", post(handlers::login))
        .route("/api/users/current", get(handlers::current_user))
        // Contacts
        .route(
            "/api/contacts",
            get(handlers::list_contacts).post(handlers::create_contact),
        )
        .route(
            "/api/contacts/",
            get(handlers::list_contacts).post(handlers::create_contact),
        )
        .route(
            "/api/contacts/:id",
            get(handlers::get_contact)
                .put(handlers::update_contact)
                .delete(handlers::delete_contact),
        )
        // Middleware
        .layer(middleware::from_fn(handlers::access_log))
        .layer(cors)
        .with_state(state)
}
