use backend::config::Config;
use backend::telemetry::init_tracing;
use backend::{app, AppState};
use tracing::{info, warn};

#[tokio::main]
async fn main() {
    let config = Config::load().expect("config");
    init_tracing();

    if config.api_key.is_none() {
        warn!("OPENAI_API_KEY is not set; every round will show the fallback question");
    }

    let addr = config.bind_addr();
    let app = app(AppState::from_config(&config));
    info!(%addr, model = %config.model, "starting trivia server");
    axum::serve(
        tokio::net::TcpListener::bind(&addr).await.expect("bind"),
        app,
    )
    .await
    .expect("server error");
}
