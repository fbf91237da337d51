pub mod auth;
pub mod conversations;
pub mod convert;
pub mod error;
pub mod groups;
pub mod health;
pub mod messages;
pub mod middleware;
pub mod reactions;
pub mod uploads;
pub mod users;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{delete, get, post, put},
};

use tether_db::Database;

pub use auth::{AppState, AppStateInner};
pub use error::ApiError;

/// Largest request body accepted on any route. Per-field limits in
/// [`uploads`] are tighter.
pub const MAX_BODY_SIZE: usize = 40 * 1024 * 1024;

pub fn app_state(db: Database) -> AppState {
    Arc::new(AppStateInner { db })
}

/// Every route of the service. `/session` and `/liveness` are public, the
/// rest require a bearer identity.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/session", post(auth::login))
        .route("/liveness", get(health::liveness));

    let protected_routes = Router::new()
        .route("/users/me", get(users::me).put(users::update_name))
        .route("/users/me/photo", put(users::update_photo))
        .route("/users/me/conversations", get(conversations::list))
        .route("/users/me/groups", get(groups::mine))
        .route("/users/search", get(users::search))
        .route("/conversations", post(conversations::start))
        .route("/conversations/{conversation_id}", get(conversations::detail))
        .route("/conversations/{conversation_id}/messages", post(messages::send))
        .route(
            "/conversations/{conversation_id}/messages/{message_id}",
            delete(messages::delete),
        )
        .route(
            "/conversations/{conversation_id}/messages/{message_id}/forward",
            post(messages::forward),
        )
        .route(
            "/conversations/{conversation_id}/messages/{message_id}/comments",
            post(reactions::add),
        )
        .route(
            "/conversations/{conversation_id}/messages/{message_id}/comments/{comment_id}",
            delete(reactions::remove),
        )
        .route("/groups", post(groups::create))
        .route("/groups/{group_id}", get(groups::show))
        .route("/groups/{group_id}/name", put(groups::rename))
        .route("/groups/{group_id}/photo", put(groups::update_photo))
        .route("/groups/{group_id}/members", post(groups::add_member))
        .route("/groups/{group_id}/members/me", delete(groups::leave))
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}
