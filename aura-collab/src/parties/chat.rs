use aura_core::{ChatMessage, ClientEvent, Emoji, ReactionPayload, ServerEvent};
use chrono::Utc;
use log::warn;

use crate::{NewPartyMessage, PrimaryKey};

use super::{PartyError, PartyId, PartyManager, RoomConnectionHandle};

impl PartyManager {
    /// Stores a chat message and sends it to everyone in the room, including the sender
    pub async fn send_message(
        &self,
        party_id: PartyId,
        user_id: PrimaryKey,
        content: &str,
    ) -> Result<ChatMessage, PartyError> {
        let party = self.get(party_id)?;
        party.member_by_user_id(user_id)?;

        let content = content.trim();
        let max_length = self.context.config.max_message_length;

        if content.is_empty() {
            return Err(PartyError::Validation("Message content required".to_string()));
        }

        if content.chars().count() > max_length {
            return Err(PartyError::Validation(format!(
                "Message too long (max {max_length} characters)"
            )));
        }

        let message = self
            .context
            .database
            .create_party_message(NewPartyMessage {
                party_id,
                user_id,
                content: content.to_string(),
            })
            .await?
            .to_chat_message();

        party.broadcast(ServerEvent::PartyMessage(message.clone()));
        Ok(message)
    }

    /// Returns the most recent messages of a party, oldest first. Only members can read them
    pub async fn messages(
        &self,
        party_id: PartyId,
        user_id: PrimaryKey,
    ) -> Result<Vec<ChatMessage>, PartyError> {
        let party = self.get(party_id)?;
        party.member_by_user_id(user_id)?;

        let messages = self
            .context
            .database
            .list_party_messages(party_id, self.context.config.chat_history_limit)
            .await?
            .iter()
            .map(|m| m.to_chat_message())
            .collect();

        Ok(messages)
    }

    /// Sends a reaction to everyone in the room. Nothing is stored
    pub fn send_reaction(
        &self,
        party_id: PartyId,
        user_id: PrimaryKey,
        emoji: Emoji,
    ) -> Result<ReactionPayload, PartyError> {
        let party = self.get(party_id)?;
        let member = party.member_by_user_id(user_id)?;

        let reaction = ReactionPayload {
            party_id,
            emoji,
            user_id,
            username: member.user.username,
            timestamp: Utc::now(),
        };

        party.broadcast(ServerEvent::PartyReaction(reaction.clone()));
        Ok(reaction)
    }

    /// Handles an event published on a room connection.
    ///
    /// Playback broadcasts are only relayed from the admin, and never back to the connection they came from.
    /// Sync requests only reach the admin.
    pub async fn relay(
        &self,
        connection: &RoomConnectionHandle,
        event: ClientEvent,
    ) -> Result<(), PartyError> {
        let party_id = connection.party_id();
        let user_id = connection.user_id();

        if event.party_id() != party_id {
            return Err(PartyError::Validation(
                "Event is for a different party".to_string(),
            ));
        }

        let party = self.get(party_id)?;
        party.member_by_user_id(user_id)?;

        match event {
            ClientEvent::JoinParty { .. } | ClientEvent::LeaveParty { .. } => {
                // Subscriptions are handled by whoever owns the connection
            }
            ClientEvent::VideoStateChange {
                state,
                current_time,
                is_playing,
                stamp,
                ..
            } => {
                if !party.is_admin(user_id) {
                    warn!("Dropped playback change from non-admin {} in party {}", user_id, party_id);
                    return Ok(());
                }

                party.broadcast_except(
                    connection.id(),
                    ServerEvent::VideoSync {
                        party_id,
                        state,
                        current_time,
                        is_playing,
                        stamp,
                    },
                );
            }
            ClientEvent::AdminSync {
                current_time,
                is_playing,
                stamp,
                ..
            } => {
                if !party.is_admin(user_id) {
                    warn!("Dropped sync from non-admin {} in party {}", user_id, party_id);
                    return Ok(());
                }

                party.broadcast_except(
                    connection.id(),
                    ServerEvent::AdminSync {
                        party_id,
                        current_time,
                        is_playing,
                        stamp,
                    },
                );
            }
            ClientEvent::RequestSync { .. } => {
                party.send_to_user(party.admin_id(), ServerEvent::SyncRequested { party_id });
            }
            ClientEvent::PartyMessage { message, .. } => {
                self.send_message(party_id, user_id, &message).await?;
            }
            ClientEvent::PartyReaction { emoji, .. } => {
                self.send_reaction(party_id, user_id, emoji)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use aura_core::{
        Config, Delivery, PartySession, PlaybackChange, SyncStamp, VideoPlayer, Visibility,
    };
    use aura_impls::{MemoryChannel, VirtualPlayer};
    use std::sync::Arc;
    use tokio::sync::mpsc::unbounded_channel;

    use super::*;
    use crate::parties::tests::{drain, fixture, new_party, Fixture};

    #[tokio::test]
    async fn test_messages_reach_the_whole_room() {
        let Fixture {
            collab,
            admin,
            users,
        } = fixture();
        let parties = &collab.parties;

        let party = parties
            .create(admin.id, new_party(Visibility::Public))
            .await
            .expect("creates party");
        parties.join(party.id(), users[0].id).await.expect("joins");

        let (sender, mut admin_events) = unbounded_channel();
        let _admin = party.connect(admin.id, sender).expect("connects");

        let (sender, mut guest_events) = unbounded_channel();
        let _guest = party.connect(users[0].id, sender).expect("connects");

        let sent = parties
            .send_message(party.id(), users[0].id, "  hello there ")
            .await
            .expect("sends");

        assert_eq!(sent.message, "hello there");
        assert!(sent.id.is_some());

        for events in [drain(&mut admin_events), drain(&mut guest_events)] {
            assert!(events.contains(&ServerEvent::PartyMessage(sent.clone())));
        }

        let history = parties
            .messages(party.id(), admin.id)
            .await
            .expect("reads history");
        assert_eq!(history, vec![sent]);

        assert!(matches!(
            parties.messages(party.id(), users[1].id).await,
            Err(PartyError::NotAMember)
        ));
    }

    #[tokio::test]
    async fn test_message_limits() {
        let Fixture { collab, admin, users } = fixture();
        let parties = &collab.parties;

        let party = parties
            .create(admin.id, new_party(Visibility::Public))
            .await
            .expect("creates party");

        let too_long = "a".repeat(Config::default().max_message_length + 1);

        for content in ["", "    ", too_long.as_str()] {
            assert!(matches!(
                parties.send_message(party.id(), admin.id, content).await,
                Err(PartyError::Validation(_))
            ));
        }

        assert!(matches!(
            parties.send_message(party.id(), users[0].id, "hi").await,
            Err(PartyError::NotAMember)
        ));
    }

    #[tokio::test]
    async fn test_history_keeps_the_tail() {
        let Fixture { collab, admin, .. } = fixture();
        let parties = &collab.parties;
        let limit = Config::default().chat_history_limit;

        let party = parties
            .create(admin.id, new_party(Visibility::Public))
            .await
            .expect("creates party");

        for i in 0..limit + 5 {
            parties
                .send_message(party.id(), admin.id, &format!("message {i}"))
                .await
                .expect("sends");
        }

        let history = parties
            .messages(party.id(), admin.id)
            .await
            .expect("reads history");

        assert_eq!(history.len(), limit);
        assert_eq!(history[0].message, "message 5");
        assert_eq!(history[limit - 1].message, format!("message {}", limit + 4));
    }

    #[tokio::test]
    async fn test_only_admin_playback_is_relayed() {
        let Fixture {
            collab,
            admin,
            users,
        } = fixture();
        let parties = &collab.parties;

        let party = parties
            .create(admin.id, new_party(Visibility::Public))
            .await
            .expect("creates party");
        parties.join(party.id(), users[0].id).await.expect("joins");
        parties.join(party.id(), users[1].id).await.expect("joins");

        let (sender, mut admin_events) = unbounded_channel();
        let admin_connection = party.connect(admin.id, sender).expect("connects");

        let (sender, mut rogue_events) = unbounded_channel();
        let rogue_connection = party.connect(users[0].id, sender).expect("connects");

        let (sender, mut follower_events) = unbounded_channel();
        let _follower = party.connect(users[1].id, sender).expect("connects");

        drain(&mut admin_events);
        drain(&mut rogue_events);
        drain(&mut follower_events);

        let sync = |current_time| ClientEvent::AdminSync {
            party_id: party.id(),
            current_time,
            is_playing: true,
            stamp: Some(SyncStamp { session: 1, seq: 1 }),
        };

        parties
            .relay(&rogue_connection, sync(99.0))
            .await
            .expect("is dropped quietly");
        assert!(drain(&mut follower_events).is_empty());

        parties
            .relay(&admin_connection, sync(12.0))
            .await
            .expect("relays");

        let relayed = drain(&mut follower_events);
        assert!(matches!(
            relayed.as_slice(),
            [ServerEvent::AdminSync { current_time, .. }] if *current_time == 12.0
        ));
        assert_eq!(drain(&mut rogue_events).len(), 1);

        // Never echoed back to the admin
        assert!(drain(&mut admin_events).is_empty());

        parties
            .relay(
                &rogue_connection,
                ClientEvent::RequestSync {
                    party_id: party.id(),
                },
            )
            .await
            .expect("relays");

        assert_eq!(
            drain(&mut admin_events),
            vec![ServerEvent::SyncRequested {
                party_id: party.id()
            }]
        );
        assert!(drain(&mut follower_events).is_empty());
    }

    #[tokio::test]
    async fn test_reactions_carry_the_sender() {
        let Fixture {
            collab,
            admin,
            users,
        } = fixture();
        let parties = &collab.parties;

        let party = parties
            .create(admin.id, new_party(Visibility::Public))
            .await
            .expect("creates party");

        let (sender, mut admin_events) = unbounded_channel();
        let _admin = party.connect(admin.id, sender).expect("connects");

        let reaction = parties
            .send_reaction(party.id(), admin.id, Emoji::Heart)
            .expect("reacts");

        assert_eq!(reaction.username, admin.username);
        assert_eq!(
            drain(&mut admin_events),
            vec![ServerEvent::PartyReaction(reaction)]
        );

        assert!(matches!(
            parties.send_reaction(party.id(), users[0].id, Emoji::Sad),
            Err(PartyError::NotAMember)
        ));
    }

    /// An admin and a follower session talking through the manager, as they would over the wire
    #[tokio::test(start_paused = true)]
    async fn test_follower_catches_up_on_request() {
        let Fixture {
            collab,
            admin,
            users,
        } = fixture();
        let parties = &collab.parties;
        let follower = &users[0];

        let party = parties
            .create(admin.id, new_party(Visibility::Public))
            .await
            .expect("creates party");
        parties.join(party.id(), follower.id).await.expect("joins");

        let member = |id| {
            party
                .members()
                .into_iter()
                .find(|m| m.id == id)
                .expect("is a member")
        };

        let (admin_outbox, mut admin_published) = MemoryChannel::new();
        let (follower_outbox, mut follower_published) = MemoryChannel::new();

        let config = Config::default();
        let summary = party.summary();

        let admin_session = PartySession::new(
            &config,
            &summary,
            member(admin.id),
            Arc::new(admin_outbox),
            |id| VirtualPlayer::new(id, 600.),
        );
        let follower_session = PartySession::new(
            &config,
            &summary,
            member(follower.id),
            Arc::new(follower_outbox),
            |id| VirtualPlayer::new(id, 600.),
        );

        let (sender, mut admin_inbox) = unbounded_channel();
        let admin_connection = party.connect(admin.id, sender).expect("connects");

        let (sender, mut follower_inbox) = unbounded_channel();
        let follower_connection = party.connect(follower.id, sender).expect("connects");

        let admin_player = admin_session.player().expect("has a player").clone();
        assert_eq!(admin_player.video_id(), "JwRWf3ho4B8");
        admin_player.seek(42.);
        admin_player.play();

        // The follower's player is ready and asks for the admin's position
        follower_session.on_player_ready().await.expect("requests");
        while let Ok(event) = follower_published.try_recv() {
            parties
                .relay(&follower_connection, event)
                .await
                .expect("relays");
        }

        for event in drain(&mut admin_inbox) {
            admin_session.handle(event).await.expect("handles");
        }

        while let Ok(event) = admin_published.try_recv() {
            parties.relay(&admin_connection, event).await.expect("relays");
        }

        for event in drain(&mut follower_inbox) {
            follower_session.handle(event).await.expect("handles");
        }

        let follower_player = follower_session.player().expect("has a player");
        assert_eq!(follower_player.current_time(), 42.);
        assert!(follower_player.is_playing());

        // The admin's pause reaches the follower as a video sync
        admin_player.pause();
        admin_session
            .on_player_change(PlaybackChange::Pause)
            .await
            .expect("publishes");

        while let Ok(event) = admin_published.try_recv() {
            parties.relay(&admin_connection, event).await.expect("relays");
        }

        for event in drain(&mut follower_inbox) {
            follower_session.handle(event).await.expect("handles");
        }

        assert!(!follower_player.is_playing());

        // Chat sent by the follower shows up once on both sides
        let sent = follower_session.send_message("nice").await.expect("sends");
        while let Ok(event) = follower_published.try_recv() {
            parties
                .relay(&follower_connection, event)
                .await
                .expect("relays");
        }

        for event in drain(&mut follower_inbox) {
            follower_session.handle(event).await.expect("handles");
        }
        for event in drain(&mut admin_inbox) {
            admin_session.handle(event).await.expect("handles");
        }

        assert_eq!(follower_session.chat().len(), 1);
        assert_eq!(admin_session.chat().len(), 1);
        assert!(follower_session.chat().snapshot()[0].id.is_some());
        assert_eq!(
            follower_session.chat().deliver(sent),
            Delivery::Duplicate
        );
    }
}
