use aura_core::{Id, PartyId, ServerEvent};
use tokio::sync::mpsc::UnboundedSender;

use crate::{CollabContext, PrimaryKey};

pub type RoomConnectionId = Id<RoomConnection>;

/// Represents a user's presence in a party room
#[derive(Debug, Clone)]
pub struct RoomConnection {
    pub id: RoomConnectionId,
    pub user_id: PrimaryKey,
    sender: UnboundedSender<ServerEvent>,
}

/// A handle to a room subscription, which when dropped removes the [RoomConnection] from the party
pub struct RoomConnectionHandle {
    connection_id: RoomConnectionId,
    party_id: PartyId,
    user_id: PrimaryKey,
    context: CollabContext,
}

impl RoomConnection {
    pub fn new(user_id: PrimaryKey, sender: UnboundedSender<ServerEvent>) -> Self {
        Self {
            id: RoomConnectionId::new(),
            user_id,
            sender,
        }
    }

    /// Sends an event to this connection, returning false if the other end is gone
    pub fn send(&self, event: ServerEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

impl RoomConnectionHandle {
    pub fn new(
        context: &CollabContext,
        connection_id: RoomConnectionId,
        party_id: PartyId,
        user_id: PrimaryKey,
    ) -> Self {
        Self {
            connection_id,
            party_id,
            user_id,
            context: context.clone(),
        }
    }

    pub fn id(&self) -> RoomConnectionId {
        self.connection_id
    }

    pub fn party_id(&self) -> PartyId {
        self.party_id
    }

    pub fn user_id(&self) -> PrimaryKey {
        self.user_id
    }
}

impl Drop for RoomConnectionHandle {
    fn drop(&mut self) {
        let party = self
            .context
            .parties
            .get(&self.party_id)
            .map(|p| p.value().clone());

        // The party may already be gone, taking its connections with it
        if let Some(party) = party {
            party.remove_connection(self.connection_id)
        }
    }
}
