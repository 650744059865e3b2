use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use anyhow::Result;
use axum::routing::{get, post, put};
use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer, decompression::DecompressionLayer, trace::TraceLayer,
};

use state::AppState;

use crate::controllers::{attendees, episodes, uploads};

pub mod controllers;
pub mod datasource;
pub mod errors;
pub mod models;
pub mod publishing;
pub mod remote_files;
pub mod request_cache;
pub mod state;

const ADDRESS: SocketAddr = SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 8000);

pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/up", get(health))
        .route("/episodes", get(episodes::feed))
        .route("/episodes/:key", get(episodes::show))
        .route("/hosts/:id", get(attendees::show_host))
        .route("/guests/:id", get(attendees::show_guest))
        .route("/api/presigned_urls", post(uploads::create))
        .route(
            "/admin/episodes",
            get(episodes::index).post(episodes::create),
        )
        .route(
            "/admin/episodes/:id",
            put(episodes::update).delete(episodes::destroy),
        )
        .route(
            "/admin/attendees",
            get(attendees::index).post(attendees::create),
        )
        .route(
            "/admin/attendees/:id",
            put(attendees::update).delete(attendees::destroy),
        )
        .with_state(app_state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(DecompressionLayer::new()),
        )
}

pub async fn serve(app_state: AppState) -> Result<()> {
    let app = router(app_state);
    tracing::debug!("listening on {ADDRESS}");
    let listener = TcpListener::bind(ADDRESS).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}
