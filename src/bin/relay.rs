use etutor_meet::config::Config;
use etutor_meet::relay::relay_routes;

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let config = Config::from_env();
    let bind_address = config.bind_address();

    tracing::info!(
        host = %config.relay.host,
        port = config.relay.port,
        "Starting meeting relay"
    );

    warp::serve(relay_routes()).run(bind_address).await;
}
