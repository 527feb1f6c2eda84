use std::sync::Arc;

use aura_collab::Collab;
use axum::extract::FromRef;

use crate::sse::ServerSentEvents;

#[derive(Clone, FromRef)]
pub struct ServerContext {
    pub collab: Arc<Collab>,
    pub sse: Arc<ServerSentEvents>,
}

impl ServerContext {
    pub fn new(collab: Arc<Collab>) -> Self {
        Self {
            collab,
            sse: ServerSentEvents::new(),
        }
    }
}
