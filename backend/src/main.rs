use std::sync::Arc;

use artifact_backend::env_config;
use artifact_backend::server::ServerState;

#[tokio::main]
async fn main() {
    let threads = env_config::init_rayon_threads();
    let port = env_config::server_port();
    println!("Starting artifact policy server ({threads} solver threads)...");

    let state = Arc::new(ServerState::new());
    let app = artifact_backend::create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .unwrap();
    println!("Server is running on port {port}. Press Ctrl+C to stop.");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("\nStopping server...");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
}
