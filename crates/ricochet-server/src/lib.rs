pub mod config;
pub mod game_loop;
pub mod health;
pub mod match_manager;
pub mod state;
pub mod ws;

use axum::Router;
use axum::routing::get;

use config::ServerConfig;
use state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}

pub async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config.listen_addr.clone();
    let state = AppState::new(config);
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Ricochet server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
