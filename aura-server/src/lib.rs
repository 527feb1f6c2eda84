mod auth;
mod channel;
mod context;
mod docs;
mod errors;
mod parties;
mod schemas;
mod serialized;
mod sse;

use std::{
    env,
    net::{Ipv6Addr, SocketAddr},
    sync::Arc,
    thread,
};

use aura_collab::Collab;
use axum::routing::get;
use log::info;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub use context::ServerContext;
pub use errors::StartError;

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9050;

pub type Router = axum::Router<ServerContext>;

/// Builds the application with every route
pub fn app(context: ServerContext) -> axum::Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let version_one_router = Router::new()
        .nest("/auth", auth::router())
        .nest("/parties", parties::router())
        .nest("/channel", channel::router())
        .nest("/events", sse::router());

    Router::new()
        .nest("/v1", version_one_router)
        .route("/api.json", get(docs::docs))
        .layer(cors)
        .with_state(context)
}

/// Starts the aura server
pub async fn run_server(collab: Arc<Collab>) -> Result<(), StartError> {
    let port = match env::var("AURA_SERVER_PORT") {
        Ok(port) => port.parse::<u16>().map_err(|_| StartError::InvalidPort(port))?,
        Err(_) => DEFAULT_PORT,
    };

    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();
    let context = ServerContext::new(collab.clone());

    // Lobby events are received blocking, so they get their own thread
    let sse = context.sse.clone();
    thread::spawn(move || {
        while let Some(event) = collab.wait_for_event() {
            sse.broadcast(event.into())
        }
    });

    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app(context).into_make_service()).await?;
    Ok(())
}
