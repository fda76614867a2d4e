use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::HeaderMap,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use parley_api::auth::{self, AppState};
use parley_api::middleware::{bearer_token, csrf_guard, require_auth};
use parley_api::{dm, friends};
use parley_gateway::connection;

/// Assemble the full application router. Exposed from the lib target so
/// integration tests can drive the stack in memory.
pub fn build_app(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(state.clone());

    // require_auth runs first, then the forgery guard, then the handler.
    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/friends/list", get(friends::list_friends))
        .route("/friends/request", post(friends::send_request))
        .route("/friends/requests", get(friends::list_requests))
        .route(
            "/friends/requests/accept/{request_id}",
            post(friends::accept_request),
        )
        .route(
            "/friends/requests/reject/{request_id}",
            post(friends::reject_request),
        )
        .route(
            "/friends/requests/cancel/{request_id}",
            post(friends::cancel_request),
        )
        .route("/dm/{username}", get(dm::conversation))
        .route("/dm/{username}/send", post(dm::send_message))
        .layer(middleware::from_fn(csrf_guard))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Deserialize)]
struct GatewayParams {
    token: Option<String>,
}

/// The handshake presents the same session credential as the REST surface:
/// the bearer header, or a `token` query parameter since browsers cannot
/// set headers on WebSocket requests. A connection that resolves a session
/// is bound to that identity's channel; one that does not stays
/// unsubscribed and receives nothing.
async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<GatewayParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let token = params
        .token
        .or_else(|| bearer_token(&headers).map(str::to_string));
    let session = token.and_then(|t| state.sessions.resolve(&t));

    let dispatcher = state.dispatcher.clone();
    ws.on_upgrade(move |socket| async move {
        match session {
            Some(session) => {
                connection::handle_connection_authenticated(
                    socket,
                    dispatcher,
                    session.user_id,
                    session.username,
                )
                .await
            }
            None => connection::handle_connection_anonymous(socket).await,
        }
    })
}
