use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("Ricochet server starting");

    let config = ricochet_server::config::ServerConfig::load();
    if let Err(e) = ricochet_server::run(config).await {
        tracing::error!(error = %e, "Server exited with error");
        std::process::exit(1);
    }
}
