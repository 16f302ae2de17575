use axum::Router;
use log::info;
use tower_http::cors::CorsLayer;

use crate::integration::Config;
use crate::state::AppState;

mod auth;
mod chat;
mod event;
mod integration;
mod state;
mod user;

#[tokio::main]
async fn main() {
    let config = Config::default();

    let state = match AppState::init(&config).await {
        Ok(state) => state,
        Err(e) => panic!("Failed to initialize app state: {e}"),
    };

    let router = Router::new()
        .merge(event::endpoints(state.clone()))
        .nest("/api/chat", chat::api(state))
        .layer(
            CorsLayer::new()
                .allow_origin(config.env.allow_origin())
                .allow_methods(config.env.allow_methods())
                .allow_headers(config.env.allow_headers()),
        );

    let addr = config.env.addr();
    info!("Starting chat server on {addr} ({})", config.env);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");
    axum::serve(listener, router)
        .await
        .expect("Failed to start server");
}
