use mock_server::{MockStore, DEFAULT_ANON_KEY, DEFAULT_TABLE};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let anon_key = std::env::var("ANON_KEY").unwrap_or_else(|_| DEFAULT_ANON_KEY.to_string());
    let table = std::env::var("TABLE").unwrap_or_else(|_| DEFAULT_TABLE.to_string());
    let store = MockStore::new(&anon_key, &table);

    if let Ok(user) = std::env::var("DEMO_USER") {
        let token = store.issue_token(&user).await;
        tracing::info!(%user, %token, "issued demo token");
    }

    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, %table, "listening");
    mock_server::run_with(listener, store).await
}
