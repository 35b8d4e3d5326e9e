mod routes;
mod state;
mod ws;

pub use routes::{relay_routes, relay_routes_with_state};
pub use state::RelayState;
