//! Replay server binary: binds a WebSocket listener, creates/loads replay
//! sessions on first connect, and streams frames to each client at the
//! fixed playback tick rate.

mod config;
mod error;
mod loader;
mod session_manager;
mod stream;

use cache::FileCache;
use model::{SessionIdentity, SessionKind};
use std::sync::Arc;
use telemetry_adapter::FixtureAdapter;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};

use session_manager::SessionManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env();
    std::fs::create_dir_all(&config.cache_dir)?;

    // The real upstream timing/telemetry library lives outside this
    // workspace; a fixture stands in for it until one is wired up.
    let adapter: Arc<dyn telemetry_adapter::UpstreamAdapter> = Arc::new(FixtureAdapter::new());
    let cache = Arc::new(FileCache::new(config.cache_dir.clone()));
    let manager = SessionManager::new(adapter, cache, config.clone());

    let listener = TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "replay server listening");

    loop {
        let (tcp_stream, peer_addr) = listener.accept().await?;
        let manager = manager.clone();
        tokio::spawn(async move {
            if let Err(err) = accept(manager, tcp_stream).await {
                tracing::warn!(%peer_addr, %err, "connection closed with error");
            }
        });
    }
}

/// Pulls `/ws/replay/{year}/{round}/{kind}` out of the handshake request
/// path, then upgrades and hands the socket to the streaming loop.
async fn accept(manager: Arc<SessionManager>, tcp_stream: tokio::net::TcpStream) -> anyhow::Result<()> {
    let path = Arc::new(parking_lot::Mutex::new(String::new()));
    let path_for_cb = path.clone();
    let callback = move |req: &Request, resp: Response| {
        *path_for_cb.lock() = req.uri().path().to_string();
        Ok(resp)
    };

    let ws = tokio_tungstenite::accept_hdr_async(tcp_stream, callback).await?;
    let path = path.lock().clone();

    let identity = match parse_identity(&path) {
        Some(id) => id,
        None => {
            tracing::warn!(%path, "rejecting connection with unrecognized path");
            return Ok(());
        }
    };

    let session_id = identity.session_id();
    manager.create_session(identity, false);
    stream::handle_connection(manager, ws, session_id).await;
    Ok(())
}

fn parse_identity(path: &str) -> Option<SessionIdentity> {
    let parts: Vec<&str> = path.trim_matches('/').split('/').collect();
    let (year, round, kind) = match parts.as_slice() {
        ["ws", "replay", year, round, kind] => (*year, *round, *kind),
        _ => return None,
    };
    let year: u16 = year.parse().ok()?;
    let round: u8 = round.parse().ok()?;
    let kind = match kind {
        "race" => SessionKind::Race,
        "sprint" => SessionKind::Sprint,
        "qualifying" => SessionKind::Qualifying,
        "sprint_qualifying" => SessionKind::SprintQualifying,
        _ => return None,
    };
    Some(SessionIdentity { year, round, kind })
}
