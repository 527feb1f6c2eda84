use async_trait::async_trait;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use aura_core::{ChannelError, ClientEvent, RoomChannel};

/// Implements [RoomChannel] over an in-process queue.
/// Whatever holds the receiver plays the part of the server.
#[derive(Debug, Clone)]
pub struct MemoryChannel {
    sender: UnboundedSender<ClientEvent>,
}

impl MemoryChannel {
    /// Creates a channel and the receiving end of everything published to it
    pub fn new() -> (Self, UnboundedReceiver<ClientEvent>) {
        let (sender, receiver) = unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl RoomChannel for MemoryChannel {
    async fn publish(&self, event: ClientEvent) -> Result<(), ChannelError> {
        self.sender.send(event).map_err(|_| ChannelError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_until_closed() {
        let (channel, mut receiver) = MemoryChannel::new();

        channel
            .publish(ClientEvent::RequestSync { party_id: 1 })
            .await
            .expect("publishes");

        assert_eq!(
            receiver.recv().await,
            Some(ClientEvent::RequestSync { party_id: 1 })
        );

        drop(receiver);

        let result = channel.publish(ClientEvent::LeaveParty { party_id: 1 }).await;
        assert!(matches!(result, Err(ChannelError::Closed)));
    }
}
