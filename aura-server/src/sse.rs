use aura_collab::CollabEvent;
use aura_core::Id;
use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive},
        Sse,
    },
    routing::get,
};
use futures_util::Stream;
use log::error;
use parking_lot::Mutex;
use serde::Serialize;
use std::{
    collections::VecDeque,
    convert::Infallible,
    pin::Pin,
    sync::{Arc, Weak},
    task::{Context, Poll, Waker},
};
use utoipa::ToSchema;

use crate::{
    context::ServerContext,
    serialized::{Party, ToSerialized, User},
    Router,
};

type ConnectionId = Id<Connection>;

/// Events sent to everyone browsing the party list
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum LobbyEvent {
    /// A party was created
    PartyCreated { party: Party },
    /// A party was deleted, or deactivated because everyone left
    PartyDeleted {
        party_id: i32,
        deleted_by: Option<i32>,
    },
    /// The members of a party changed
    PartyMembersUpdate {
        party_id: i32,
        admin_id: i32,
        members: Vec<User>,
    },
}

impl From<CollabEvent> for LobbyEvent {
    fn from(value: CollabEvent) -> Self {
        match value {
            CollabEvent::PartyCreated { party } => Self::PartyCreated {
                party: party.to_serialized(),
            },
            CollabEvent::PartyDeleted {
                party_id,
                deleted_by,
            } => Self::PartyDeleted {
                party_id,
                deleted_by,
            },
            CollabEvent::PartyMembersUpdate {
                party_id,
                admin_id,
                members,
            } => Self::PartyMembersUpdate {
                party_id,
                admin_id,
                members: members.to_serialized(),
            },
        }
    }
}

/// Manages server sent event connections
pub struct ServerSentEvents {
    me: Weak<Self>,
    connections: Mutex<Vec<Connection>>,
}

struct Connection {
    id: ConnectionId,
    pending_messages: Arc<Mutex<VecDeque<LobbyEvent>>>,
    waker: Arc<Mutex<Option<Waker>>>,
}

pub struct ConnectionHandle {
    id: ConnectionId,
    /// A reference to [Connection]'s pending messages
    pending_messages: Arc<Mutex<VecDeque<LobbyEvent>>>,
    /// A reference to [Connection]'s stored [Waker]
    waker: Arc<Mutex<Option<Waker>>>,
    /// Required to remove connection when dropped
    manager: Weak<ServerSentEvents>,
}

impl ServerSentEvents {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            connections: Default::default(),
        })
    }

    pub fn broadcast(&self, event: LobbyEvent) {
        let connections = self.connections.lock();

        for connection in connections.iter() {
            connection.send(event.clone())
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn connect(&self) -> ConnectionHandle {
        let connection = Connection::new();
        let handle = connection.handle(self.me.clone());

        self.connections.lock().push(connection);
        handle
    }

    fn disconnect(&self, id: ConnectionId) {
        self.connections.lock().retain(|c| c.id != id)
    }
}

impl Connection {
    fn new() -> Self {
        Self {
            id: ConnectionId::new(),
            pending_messages: Default::default(),
            waker: Default::default(),
        }
    }

    fn send(&self, message: LobbyEvent) {
        self.pending_messages.lock().push_back(message);

        if let Some(waker) = self.waker.lock().take() {
            waker.wake()
        }
    }

    fn handle(&self, manager: Weak<ServerSentEvents>) -> ConnectionHandle {
        ConnectionHandle {
            id: self.id,
            pending_messages: self.pending_messages.clone(),
            waker: self.waker.clone(),
            manager,
        }
    }
}

impl Stream for ConnectionHandle {
    type Item = Result<Event, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut pending_messages = self.pending_messages.lock();

        while let Some(message) = pending_messages.pop_front() {
            match serde_json::to_string(&message) {
                Ok(data) => return Poll::Ready(Some(Ok(Event::default().data(data)))),
                Err(e) => error!("Failed to serialize lobby event: {}", e),
            }
        }

        *self.waker.lock() = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        // The manager is gone when the server shuts down
        if let Some(manager) = self.manager.upgrade() {
            manager.disconnect(self.id)
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/events",
    tag = "events",
    responses(
        (
            status = 200,
            content_type = "text/event-stream",
            description = "A stream of lobby events",
            body = LobbyEvent
        )
    )
)]
async fn event_stream(State(context): State<ServerContext>) -> Sse<ConnectionHandle> {
    Sse::new(context.sse.connect()).keep_alive(KeepAlive::default())
}

pub fn router() -> Router {
    Router::new().route("/", get(event_stream))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_queue_in_order() {
        let sse = ServerSentEvents::new();
        let handle = sse.connect();

        for party_id in [1, 2, 3] {
            sse.broadcast(LobbyEvent::PartyDeleted {
                party_id,
                deleted_by: None,
            });
        }

        let order: Vec<_> = handle
            .pending_messages
            .lock()
            .iter()
            .map(|e| match e {
                LobbyEvent::PartyDeleted { party_id, .. } => *party_id,
                _ => 0,
            })
            .collect();

        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_dropped_connection_is_removed() {
        let sse = ServerSentEvents::new();

        let first = sse.connect();
        let _second = sse.connect();
        assert_eq!(sse.connection_count(), 2);

        drop(first);
        assert_eq!(sse.connection_count(), 1);
    }
}
