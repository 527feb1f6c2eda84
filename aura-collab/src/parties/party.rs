use std::sync::atomic::{AtomicBool, Ordering};

use aura_core::{MemberSummary, PartyId, PartySummary, ServerEvent};
use log::info;
use parking_lot::Mutex;
use tokio::sync::{mpsc::UnboundedSender, Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::{events::CollabEvent, CollabContext, PartyData, PartyMemberData, PrimaryKey};

use super::{PartyError, RoomConnection, RoomConnectionHandle, RoomConnectionId};

/// A live party, holding its members and the connections subscribed to its room.
pub struct Party {
    context: CollabContext,
    data: Mutex<PartyData>,
    /// The connections currently subscribed to this party's room
    connections: Mutex<Vec<RoomConnection>>,
    /// Held for the duration of any change to membership or the party itself
    operations: AsyncMutex<()>,
    /// Set once the party is deleted or deactivated
    closed: AtomicBool,
}

impl Party {
    pub fn new(context: &CollabContext, data: PartyData) -> Self {
        Self {
            context: context.clone(),
            data: data.into(),
            connections: Default::default(),
            operations: Default::default(),
            closed: Default::default(),
        }
    }

    pub fn data(&self) -> PartyData {
        self.data.lock().clone()
    }

    pub fn summary(&self) -> PartySummary {
        self.data.lock().summary()
    }

    pub fn id(&self) -> PartyId {
        self.data.lock().id
    }

    pub fn admin_id(&self) -> PrimaryKey {
        self.data.lock().admin_id
    }

    pub fn is_admin(&self, user_id: PrimaryKey) -> bool {
        self.admin_id() == user_id
    }

    pub fn is_member(&self, user_id: PrimaryKey) -> bool {
        self.data.lock().member_by_user_id(user_id).is_some()
    }

    pub fn members(&self) -> Vec<MemberSummary> {
        self.data
            .lock()
            .members
            .iter()
            .map(PartyMemberData::summary)
            .collect()
    }

    /// Returns the member if it exists in the party
    pub fn member_by_user_id(&self, user_id: PrimaryKey) -> Result<PartyMemberData, PartyError> {
        self.data
            .lock()
            .member_by_user_id(user_id)
            .cloned()
            .ok_or(PartyError::NotAMember)
    }

    /// Fails unless the user is the admin
    pub fn ensure_admin(&self, user_id: PrimaryKey) -> Result<(), PartyError> {
        if self.is_admin(user_id) {
            Ok(())
        } else {
            Err(PartyError::NotAuthorized)
        }
    }

    /// Subscribes a connection to this party's room. Only members can subscribe.
    pub fn connect(
        &self,
        user_id: PrimaryKey,
        sender: UnboundedSender<ServerEvent>,
    ) -> Result<RoomConnectionHandle, PartyError> {
        let member = self.member_by_user_id(user_id)?;

        let connection = RoomConnection::new(user_id, sender);
        let connection_id = connection.id;

        self.connections.lock().push(connection);

        info!(
            "User {} connected to party {}",
            member.user.display_name,
            self.data.lock().name
        );

        self.broadcast_except(
            connection_id,
            ServerEvent::MemberConnected {
                party_id: self.id(),
                user_id,
            },
        );

        Ok(RoomConnectionHandle::new(
            &self.context,
            connection_id,
            self.id(),
            user_id,
        ))
    }

    /// Called when a [RoomConnectionHandle] is dropped
    pub fn remove_connection(&self, connection_id: RoomConnectionId) {
        let removed = {
            let mut connections = self.connections.lock();
            let index = connections.iter().position(|c| c.id == connection_id);

            index.map(|i| connections.remove(i))
        };

        // Evicted connections are already gone
        let Some(connection) = removed else {
            return;
        };

        let name = self
            .member_by_user_id(connection.user_id)
            .map(|m| m.user.display_name)
            .unwrap_or_else(|_| "Unknown".to_string());

        info!("User {} disconnected from party {}", name, self.data.lock().name);

        self.broadcast(ServerEvent::MemberDisconnected {
            party_id: self.id(),
            user_id: connection.user_id,
        });
    }

    /// Returns the current connections. This can be the same member multiple times.
    pub fn current_connections(&self) -> Vec<RoomConnection> {
        self.connections.lock().clone()
    }

    /// Sends an event to every connection in the room
    pub fn broadcast(&self, event: ServerEvent) {
        for connection in self.connections.lock().iter() {
            connection.send(event.clone());
        }
    }

    /// Sends an event to every connection except the one it came from
    pub fn broadcast_except(&self, connection_id: RoomConnectionId, event: ServerEvent) {
        for connection in self.connections.lock().iter() {
            if connection.id != connection_id {
                connection.send(event.clone());
            }
        }
    }

    /// Sends an event to every connection a user has open
    pub fn send_to_user(&self, user_id: PrimaryKey, event: ServerEvent) {
        for connection in self.connections.lock().iter() {
            if connection.user_id == user_id {
                connection.send(event.clone());
            }
        }
    }

    /// Whether the party still accepts changes
    pub fn is_live(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    /// Serializes changes to this party.
    /// Operations queued behind a delete or deactivation find the party gone.
    pub(crate) async fn lock_operations(&self) -> Result<AsyncMutexGuard<'_, ()>, PartyError> {
        let guard = self.operations.lock().await;

        if !self.is_live() {
            return Err(PartyError::NotFound("party"));
        }

        Ok(guard)
    }

    /// Marks the party as gone. The caller holds the operation lock
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Registers an added member and tells the room
    pub(crate) fn add_member(&self, new_member: PartyMemberData) {
        let user_id = new_member.user.id;
        self.data.lock().members.push(new_member);

        let members = self.members();

        self.broadcast(ServerEvent::PartyJoined {
            party_id: self.id(),
            user_id,
            members: members.clone(),
        });

        self.emit_members_update(members);
    }

    /// Removes a member that left on their own, optionally handing admin to someone else
    pub(crate) fn remove_member(&self, user_id: PrimaryKey, new_admin_id: Option<PrimaryKey>) {
        {
            let mut data = self.data.lock();
            data.members.retain(|m| m.user.id != user_id);

            if let Some(new_admin_id) = new_admin_id {
                data.admin_id = new_admin_id;
            }
        }

        self.broadcast(ServerEvent::PartyLeft {
            party_id: self.id(),
            user_id,
            new_admin_id,
        });

        self.disconnect_user(user_id);
        self.emit_members_update(self.members());
    }

    /// Removes a kicked member. The target is told before its connections are closed
    pub(crate) fn remove_kicked_member(&self, user_id: PrimaryKey, kicked_by: PrimaryKey) {
        self.data.lock().members.retain(|m| m.user.id != user_id);

        self.broadcast(ServerEvent::UserKicked {
            party_id: self.id(),
            user_id,
            kicked_by,
        });

        self.disconnect_user(user_id);
        self.emit_members_update(self.members());
    }

    /// Drops every connection a user has open, without presence events
    pub(crate) fn disconnect_user(&self, user_id: PrimaryKey) {
        self.connections.lock().retain(|c| c.user_id != user_id)
    }

    /// Drops every connection in the room
    pub(crate) fn disconnect_all(&self) {
        self.connections.lock().clear()
    }

    fn emit_members_update(&self, members: Vec<MemberSummary>) {
        self.context.emit(CollabEvent::PartyMembersUpdate {
            party_id: self.id(),
            admin_id: self.admin_id(),
            members,
        });
    }
}
