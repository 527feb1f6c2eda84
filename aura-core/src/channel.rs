use async_trait::async_trait;
use thiserror::Error;

use crate::ClientEvent;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Room channel is closed")]
    Closed,
    #[error("Failed to publish to room channel: {0}")]
    Publish(String),
}

/// The outbound half of a room channel, as seen by a client.
/// The inbound half is any stream of [crate::ServerEvent]s.
#[async_trait]
pub trait RoomChannel: Send + Sync {
    async fn publish(&self, event: ClientEvent) -> Result<(), ChannelError>;
}
