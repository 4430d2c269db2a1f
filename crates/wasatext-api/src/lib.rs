pub mod blocking;
pub mod conversations;
pub mod convert;
pub mod error;
pub mod groups;
pub mod liveness;
pub mod messages;
pub mod middleware;
pub mod session;
pub mod state;
pub mod uploads;
pub mod users;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
};

pub use error::ApiError;
pub use state::{AppState, AppStateInner};

/// All routes. CORS and request tracing are layered on by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/liveness", get(liveness::liveness))
        .route("/session", post(session::login));

    let protected_routes = Router::new()
        .route("/me/name", put(users::set_my_name))
        .route("/me/photo", put(users::set_my_photo))
        .route("/users/search", get(users::search))
        .route(
            "/conversations",
            get(conversations::list_conversations).post(conversations::create_direct),
        )
        .route(
            "/conversations/{conversation_id}",
            get(conversations::get_conversation).post(messages::send_message),
        )
        .route("/messages/{message_id}", delete(messages::delete_message))
        .route("/messages/{message_id}/forward", post(messages::forward_message))
        .route(
            "/messages/{message_id}/reactions",
            post(messages::add_reaction).delete(messages::remove_reaction),
        )
        .route("/groups", post(groups::create_group))
        .route("/groups/{group_id}", get(groups::get_group))
        .route("/groups/{group_id}/name", put(groups::rename_group))
        .route("/groups/{group_id}/photo", put(groups::set_group_photo))
        .route("/groups/{group_id}/members", post(groups::add_members))
        .route("/groups/{group_id}/members/{user_id}", delete(groups::remove_member))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .with_state(state)
}
