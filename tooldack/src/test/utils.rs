//! Helpers for tests that talk to a real listening server.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use url::Url;

use crate::{AppState, Config, background::BackgroundRemover, build_router, storage};

/// A server bound to an ephemeral port, running until the test's runtime shuts down.
pub struct LiveServer {
    pub addr: SocketAddr,
    pub config: Config,
}

impl LiveServer {
    pub fn base_url(&self) -> Url {
        format!("http://{}", self.addr).parse().expect("Failed to parse server URL")
    }
}

/// Bind `127.0.0.1:0`, point `public_base_url` at it and serve the full router.
pub async fn spawn_live_server(mut config: Config) -> LiveServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind listener");
    let addr = listener.local_addr().expect("Failed to read local address");
    config.public_base_url = Some(format!("http://{addr}").parse().expect("Failed to parse base URL"));

    tokio::fs::create_dir_all(&config.storage.uploads_dir)
        .await
        .expect("Failed to create uploads dir");

    let state = AppState::builder()
        .config(config.clone())
        .store(storage::create_store(&config).expect("Failed to create store"))
        .background(BackgroundRemover::new(&config.background_removal).expect("Failed to create remover"))
        .build();
    let router = build_router(&state).expect("Failed to build router");

    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .await
            .expect("Server failed");
    });

    LiveServer { addr, config }
}
