//! The room channel. Clients subscribe to parties over a websocket, and publish
//! playback, chat, and reaction events to them.

use std::collections::HashMap;

use aura_collab::{PartyError, RoomConnectionHandle, UserData};
use aura_core::{ClientEvent, PartyId, ServerEvent};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

use crate::{auth::Session, context::ServerContext, Router};

/// The rooms one socket is subscribed to
struct Subscriptions {
    user: UserData,
    sender: UnboundedSender<ServerEvent>,
    rooms: HashMap<PartyId, RoomConnectionHandle>,
}

#[utoipa::path(
    get,
    path = "/v1/channel",
    tag = "channel",
    params(
        ("token" = Option<String>, Query, description = "Session token, for clients that can't set headers")
    ),
    responses(
        (status = 101, description = "Switches to the room channel websocket"),
        (status = 401, description = "Missing authorization")
    )
)]
async fn channel(
    session: Session,
    State(context): State<ServerContext>,
    ws: WebSocketUpgrade,
) -> Response {
    let user = session.user();
    ws.on_upgrade(move |socket| handle_socket(socket, context, user))
}

async fn handle_socket(socket: WebSocket, context: ServerContext, user: UserData) {
    info!("User {} opened the room channel", user.display_name);

    let (mut sink, mut stream) = socket.split();
    let (sender, mut receiver) = unbounded_channel();

    let mut subscriptions = Subscriptions {
        user,
        sender,
        rooms: HashMap::new(),
    };

    loop {
        tokio::select! {
            Some(event) = receiver.recv() => {
                subscriptions.observe(&event);

                if send(&mut sink, &event).await.is_err() {
                    break;
                }
            }
            message = stream.next() => {
                let text = match message {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!("Room channel of {} failed: {}", subscriptions.user.display_name, e);
                        break;
                    }
                    Some(Ok(_)) => continue,
                };

                if let Err(e) = subscriptions.handle(&context, &text).await {
                    debug!("Refused event from {}: {}", subscriptions.user.display_name, e);

                    let event = ServerEvent::Error {
                        message: e.to_string(),
                    };

                    if send(&mut sink, &event).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    info!("User {} closed the room channel", subscriptions.user.display_name);
}

async fn send(
    sink: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to serialize room event: {}", e);
            return Ok(());
        }
    };

    sink.send(Message::Text(text)).await
}

impl Subscriptions {
    async fn handle(&mut self, context: &ServerContext, text: &str) -> Result<(), PartyError> {
        let event: ClientEvent = serde_json::from_str(text)
            .map_err(|e| PartyError::Validation(format!("Invalid event: {e}")))?;

        match event {
            ClientEvent::JoinParty { party_id } => {
                if self.rooms.contains_key(&party_id) {
                    return Ok(());
                }

                let party = context.collab.parties.get(party_id)?;
                let handle = party.connect(self.user.id, self.sender.clone())?;

                self.rooms.insert(party_id, handle);
            }
            ClientEvent::LeaveParty { party_id } => {
                self.rooms.remove(&party_id);
            }
            event => {
                let connection = self.rooms.get(&event.party_id()).ok_or_else(|| {
                    PartyError::Validation("Join the party's room first".to_string())
                })?;

                context.collab.parties.relay(connection, event).await?;
            }
        }

        Ok(())
    }

    /// Drops subscriptions to rooms this user was removed from
    fn observe(&mut self, event: &ServerEvent) {
        let removed_from = match event {
            ServerEvent::UserKicked {
                party_id, user_id, ..
            }
            | ServerEvent::PartyLeft {
                party_id, user_id, ..
            } if *user_id == self.user.id => Some(*party_id),
            ServerEvent::PartyDeleted { party_id, .. } => Some(*party_id),
            _ => None,
        };

        if let Some(party_id) = removed_from {
            self.rooms.remove(&party_id);
        }
    }
}

pub fn router() -> Router {
    Router::new().route("/", get(channel))
}
