use inkroom_server::{ServerConfig, ServerError};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inkroom_server=info,tower_http=info".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!("InkRoom relay server listening on {}", listener.local_addr()?);
    info!("WebSocket endpoint: ws://{}/ws", config.addr);

    inkroom_server::serve(listener, &config).await
}
