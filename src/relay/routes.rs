use std::sync::Arc;
use warp::Filter;

use super::state::RelayState;
use super::ws;

/// All relay routes: WebSocket signaling plus the HTTP side endpoints
pub fn relay_routes() -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    relay_routes_with_state(RelayState::new())
}

/// Same, over a caller-supplied state (shared with tests)
pub fn relay_routes_with_state(
    state: Arc<RelayState>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    relay_websocket_route(state)
        .or(relay_health_check())
        .or(relay_config_endpoint())
}

pub fn relay_websocket_route(
    state: Arc<RelayState>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("meet")
        .and(warp::path::end())
        .and(warp::ws())
        .and(with_relay_state(state))
        .map(|ws: warp::ws::Ws, state: Arc<RelayState>| {
            ws.on_upgrade(move |websocket| ws::handle_relay_websocket(websocket, state))
        })
}

pub fn relay_health_check(
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("meet")
        .and(warp::path("health"))
        .and(warp::get())
        .map(|| {
            warp::reply::json(&serde_json::json!({
                "status": "healthy",
                "service": "Meeting Relay",
                "version": "1.0.0"
            }))
        })
}

pub fn relay_config_endpoint(
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("meet")
        .and(warp::path("config"))
        .and(warp::get())
        .map(|| {
            use std::env;

            let config = serde_json::json!({
                "RELAY_URL": env::var("RELAY_URL").ok(),
                "STUN_SERVER_URL": env::var("STUN_SERVER_URL").ok(),
            });

            warp::reply::json(&config)
        })
}

fn with_relay_state(
    state: Arc<RelayState>,
) -> impl Filter<Extract = (Arc<RelayState>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || state.clone())
}
