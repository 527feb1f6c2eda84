//! The client side of a party room.
//!
//! A [PartySession] is created when a user opens a party and dropped when they leave.
//! It owns everything scoped to "viewing this party": the admin clock or the follower
//! synchronizer, the chat view, and the active reactions.

use std::sync::Arc;

use chrono::Utc;
use futures_util::{Stream, StreamExt};
use log::{info, warn};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::{
    sync::mpsc::UnboundedSender,
    time::{interval, Instant, MissedTickBehavior},
};

use crate::{
    extract_video_id, AdminClock, ChannelError, ChatHistory, ChatMessage, ClientEvent, Config,
    Delivery, Emoji, FollowerState, JoinRequestSummary, MemberSummary, PartyId, PartySummary,
    PlaybackChange, Reaction, ReactionSet, Reconciliation, RoomChannel, ServerEvent, Snapshot,
    SyncOutcome, SyncUpdate, Synchronizer, UserId, VideoPlayer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Owns playback, only emits
    Admin,
    /// Reconciles against the admin, never originates playback state
    Follower,
}

/// Why a session stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveReason {
    /// The user left on their own
    Left,
    Kicked,
    /// The party was deleted or closed
    Deleted,
    /// The room channel went away
    ChannelClosed,
}

/// Something the presentation layer may want to react to
#[derive(Debug, Clone)]
pub enum RoomNotice {
    MembersChanged(Vec<MemberSummary>),
    MemberConnected(UserId),
    MemberDisconnected(UserId),
    /// The previous admin left and this user took over
    BecameAdmin,
    AdminChanged(UserId),
    Reconciled(Reconciliation),
    Message(ChatMessage),
    Reaction(Reaction),
    JoinRequested(JoinRequestSummary),
    Error(String),
    Ended(LeaveReason),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0}")]
    Validation(String),
    #[error("Session has ended")]
    Ended,
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// A user's view of one party room.
pub struct PartySession<C, P> {
    party_id: PartyId,
    user: MemberSummary,
    config: Config,

    channel: Arc<C>,
    /// None if the party's media couldn't be resolved. Chat and membership still work
    player: Option<Arc<P>>,

    admin_id: Mutex<UserId>,
    clock: Mutex<Option<AdminClock>>,
    sync: Mutex<Synchronizer>,

    members: Snapshot<MemberSummary>,
    chat: ChatHistory,
    reactions: Arc<ReactionSet>,

    ended: Mutex<Option<LeaveReason>>,
}

impl<C, P> PartySession<C, P>
where
    C: RoomChannel,
    P: VideoPlayer,
{
    /// Creates a session for a party.
    /// `create_player` is given the resolved video id, and is not called at all if the media can't be resolved.
    pub fn new<F>(
        config: &Config,
        party: &PartySummary,
        user: MemberSummary,
        channel: Arc<C>,
        create_player: F,
    ) -> Self
    where
        F: FnOnce(&str) -> P,
    {
        let player = match extract_video_id(&party.media_ref) {
            Ok(video_id) => Some(Arc::new(create_player(&video_id))),
            Err(e) => {
                warn!("Party {} has no video: {}", party.id, e);
                None
            }
        };

        let is_admin = party.admin_id == user.id;
        let members = Snapshot::default();
        members.update(|m| m.extend(party.members.iter().cloned()));

        Self {
            party_id: party.id,
            config: config.clone(),
            channel,
            player,
            admin_id: Mutex::new(party.admin_id),
            clock: Mutex::new(is_admin.then(|| AdminClock::new(party.id))),
            sync: Mutex::new(Synchronizer::new(config, Instant::now())),
            members,
            chat: ChatHistory::new(config),
            reactions: ReactionSet::new(config),
            ended: Default::default(),
            user,
        }
    }

    pub fn role(&self) -> Role {
        if *self.admin_id.lock() == self.user.id {
            Role::Admin
        } else {
            Role::Follower
        }
    }

    pub fn party_id(&self) -> PartyId {
        self.party_id
    }

    pub fn player(&self) -> Option<&Arc<P>> {
        self.player.as_ref()
    }

    pub fn members(&self) -> Arc<Vec<MemberSummary>> {
        self.members.get()
    }

    pub fn chat(&self) -> &ChatHistory {
        &self.chat
    }

    pub fn reactions(&self) -> &Arc<ReactionSet> {
        &self.reactions
    }

    pub fn follower_state(&self) -> FollowerState {
        self.sync.lock().state(Instant::now())
    }

    /// True if this is a follower and the admin hasn't been heard from in a while
    pub fn is_out_of_sync(&self) -> bool {
        self.role() == Role::Follower && self.sync.lock().is_stale(Instant::now())
    }

    pub fn ended(&self) -> Option<LeaveReason> {
        *self.ended.lock()
    }

    /// Subscribes to the room channel
    pub async fn join(&self) -> Result<(), SessionError> {
        self.publish(ClientEvent::JoinParty {
            party_id: self.party_id,
        })
        .await
    }

    /// Unsubscribes from the room channel and ends the session
    pub async fn leave(&self) -> Result<(), SessionError> {
        if self.end(LeaveReason::Left) {
            self.channel
                .publish(ClientEvent::LeaveParty {
                    party_id: self.party_id,
                })
                .await?;
        }

        Ok(())
    }

    /// Called once the local player can be controlled.
    /// Followers ask for the admin's position right away instead of waiting for the next tick.
    pub async fn on_player_ready(&self) -> Result<(), SessionError> {
        match self.role() {
            Role::Admin => self.broadcast_position().await,
            Role::Follower => self.request_sync().await,
        }
    }

    /// Called when the local player is played, paused, or seeked.
    /// Only the admin's changes are broadcast.
    pub async fn on_player_change(&self, change: PlaybackChange) -> Result<(), SessionError> {
        let event = {
            let clock = self.clock.lock();

            match (clock.as_ref(), self.player.as_ref()) {
                (Some(clock), Some(player)) => clock.state_change_event(player.as_ref(), change),
                _ => return Ok(()),
            }
        };

        self.publish(event).await
    }

    /// Broadcasts the admin's position. Does nothing for followers
    pub async fn broadcast_position(&self) -> Result<(), SessionError> {
        let event = {
            let clock = self.clock.lock();

            match (clock.as_ref(), self.player.as_ref()) {
                (Some(clock), Some(player)) => clock.sync_event(player.as_ref()),
                _ => return Ok(()),
            }
        };

        self.publish(event).await
    }

    /// Asks the admin to broadcast its position now
    pub async fn request_sync(&self) -> Result<(), SessionError> {
        if self.role() == Role::Admin {
            return Ok(());
        }

        self.publish(ClientEvent::RequestSync {
            party_id: self.party_id,
        })
        .await
    }

    /// Sends a chat message, showing it right away.
    /// The server's copy replaces the local one when it arrives.
    pub async fn send_message(&self, content: &str) -> Result<ChatMessage, SessionError> {
        let content = content.trim();

        if content.is_empty() {
            return Err(SessionError::Validation("Message content required".into()));
        }

        if content.chars().count() > self.config.max_message_length {
            return Err(SessionError::Validation(format!(
                "Message too long (max {} characters)",
                self.config.max_message_length
            )));
        }

        let message = ChatMessage {
            id: None,
            party_id: self.party_id,
            message: content.to_string(),
            user_id: self.user.id,
            username: self.user.username.clone(),
            timestamp: Utc::now(),
        };

        self.publish(ClientEvent::PartyMessage {
            party_id: self.party_id,
            message: message.message.clone(),
        })
        .await?;

        self.chat.deliver(message.clone());
        Ok(message)
    }

    /// Sends a reaction, showing it right away
    pub async fn send_reaction(&self, emoji: Emoji) -> Result<Reaction, SessionError> {
        self.publish(ClientEvent::PartyReaction {
            party_id: self.party_id,
            emoji,
        })
        .await?;

        Ok(self
            .reactions
            .add_and_schedule(emoji, self.user.id, self.user.username.clone()))
    }

    /// Applies an inbound event to local state.
    pub async fn handle(&self, event: ServerEvent) -> Result<Option<RoomNotice>, SessionError> {
        if self.ended().is_some() {
            return Ok(None);
        }

        // Lobby events and events for other rooms can share the connection
        if let ServerEvent::PartyCreated { .. } = event {
            return Ok(None);
        }

        if event.party_id().is_some_and(|id| id != self.party_id) {
            return Ok(None);
        }

        let notice = match event {
            ServerEvent::PartyCreated { .. } => None,
            ServerEvent::PartyJoined { members, .. } => {
                self.members.update(|m| *m = members.clone());
                Some(RoomNotice::MembersChanged(members))
            }
            ServerEvent::PartyLeft {
                user_id,
                new_admin_id,
                ..
            } => {
                if user_id == self.user.id {
                    self.end(LeaveReason::Left);
                    return Ok(Some(RoomNotice::Ended(LeaveReason::Left)));
                }

                self.members.update(|m| m.retain(|m| m.id != user_id));

                match new_admin_id {
                    Some(new_admin_id) => Some(self.change_admin(new_admin_id)),
                    None => Some(RoomNotice::MembersChanged(self.members().to_vec())),
                }
            }
            ServerEvent::UserKicked { user_id, .. } => {
                if user_id == self.user.id {
                    info!("Kicked from party {}", self.party_id);

                    self.end(LeaveReason::Kicked);
                    return Ok(Some(RoomNotice::Ended(LeaveReason::Kicked)));
                }

                self.members.update(|m| m.retain(|m| m.id != user_id));
                Some(RoomNotice::MembersChanged(self.members().to_vec()))
            }
            ServerEvent::PartyDeleted { .. } => {
                info!("Party {} was deleted", self.party_id);

                self.end(LeaveReason::Deleted);
                Some(RoomNotice::Ended(LeaveReason::Deleted))
            }
            ServerEvent::JoinRequested { request, .. } => {
                (self.role() == Role::Admin).then_some(RoomNotice::JoinRequested(request))
            }
            ServerEvent::MemberConnected { user_id, .. } => Some(RoomNotice::MemberConnected(user_id)),
            ServerEvent::MemberDisconnected { user_id, .. } => {
                Some(RoomNotice::MemberDisconnected(user_id))
            }
            ServerEvent::VideoSync { .. } | ServerEvent::AdminSync { .. } => {
                self.reconcile(&event)
            }
            ServerEvent::SyncRequested { .. } => {
                self.broadcast_position().await?;
                None
            }
            ServerEvent::PartyMessage(message) => match self.chat.deliver(message.clone()) {
                Delivery::Appended => Some(RoomNotice::Message(message)),
                Delivery::Duplicate => None,
            },
            ServerEvent::PartyReaction(reaction) => {
                // The sender already shows its own reaction
                if reaction.user_id == self.user.id {
                    return Ok(None);
                }

                let reaction =
                    self.reactions
                        .add_and_schedule(reaction.emoji, reaction.user_id, reaction.username);

                Some(RoomNotice::Reaction(reaction))
            }
            ServerEvent::Error { message } => Some(RoomNotice::Error(message)),
        };

        Ok(notice)
    }

    /// Drives the session until it ends: joins the room, emits the admin's periodic broadcast,
    /// and applies inbound events. The broadcast timer only lives as long as this future.
    pub async fn run<S>(
        &self,
        mut inbound: S,
        notices: Option<UnboundedSender<RoomNotice>>,
    ) -> LeaveReason
    where
        S: Stream<Item = ServerEvent> + Unpin,
    {
        let notify = |notice: RoomNotice| {
            if let Some(notices) = &notices {
                notices.send(notice).ok();
            }
        };

        if let Err(e) = self.join().await {
            warn!("Could not join party {}: {}", self.party_id, e);
            self.end(LeaveReason::ChannelClosed);
            return LeaveReason::ChannelClosed;
        }

        let mut ticker = interval(self.config.sync_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if let Some(reason) = self.ended() {
                return reason;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.broadcast_position().await {
                        warn!("Failed to broadcast position: {}", e);
                    }
                }
                event = inbound.next() => {
                    let Some(event) = event else {
                        self.end(LeaveReason::ChannelClosed);
                        notify(RoomNotice::Ended(LeaveReason::ChannelClosed));
                        continue;
                    };

                    match self.handle(event).await {
                        Ok(Some(notice)) => notify(notice),
                        Ok(None) => {}
                        Err(e) => warn!("Failed to handle room event: {}", e),
                    }
                }
            }
        }
    }

    fn reconcile(&self, event: &ServerEvent) -> Option<RoomNotice> {
        if self.role() == Role::Admin {
            return None;
        }

        let update = SyncUpdate::from_event(event)?;
        let player = self.player.as_ref()?;

        match self.sync.lock().apply(player.as_ref(), update, Instant::now()) {
            SyncOutcome::Applied(reconciliation) => Some(RoomNotice::Reconciled(reconciliation)),
            SyncOutcome::Discarded => None,
        }
    }

    fn change_admin(&self, new_admin_id: UserId) -> RoomNotice {
        *self.admin_id.lock() = new_admin_id;

        if new_admin_id == self.user.id {
            info!("Took over as admin of party {}", self.party_id);

            *self.clock.lock() = Some(AdminClock::new(self.party_id));
            RoomNotice::BecameAdmin
        } else {
            *self.clock.lock() = None;
            *self.sync.lock() = Synchronizer::new(&self.config, Instant::now());

            RoomNotice::AdminChanged(new_admin_id)
        }
    }

    /// Marks the session as ended, returning false if it already was
    fn end(&self, reason: LeaveReason) -> bool {
        let mut ended = self.ended.lock();

        if ended.is_some() {
            return false;
        }

        *ended = Some(reason);
        *self.clock.lock() = None;

        true
    }

    async fn publish(&self, event: ClientEvent) -> Result<(), SessionError> {
        if self.ended().is_some() {
            return Err(SessionError::Ended);
        }

        self.channel.publish(event).await.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::mpsc::unbounded_channel;

    use crate::{ReactionPayload, SyncStamp, Visibility};

    #[derive(Default)]
    struct RecordingChannel {
        published: Mutex<Vec<ClientEvent>>,
    }

    impl RecordingChannel {
        fn published(&self) -> Vec<ClientEvent> {
            self.published.lock().clone()
        }
    }

    #[async_trait]
    impl RoomChannel for RecordingChannel {
        async fn publish(&self, event: ClientEvent) -> Result<(), ChannelError> {
            self.published.lock().push(event);
            Ok(())
        }
    }

    #[derive(Default)]
    struct StillPlayer {
        time: Mutex<f64>,
        playing: Mutex<bool>,
        seeks: Mutex<Vec<f64>>,
    }

    impl VideoPlayer for StillPlayer {
        fn current_time(&self) -> f64 {
            *self.time.lock()
        }

        fn duration(&self) -> f64 {
            300.
        }

        fn is_playing(&self) -> bool {
            *self.playing.lock()
        }

        fn play(&self) {
            *self.playing.lock() = true;
        }

        fn pause(&self) {
            *self.playing.lock() = false;
        }

        fn seek(&self, to: f64) {
            *self.time.lock() = to;
            self.seeks.lock().push(to);
        }
    }

    fn member(id: UserId) -> MemberSummary {
        MemberSummary {
            id,
            username: format!("user{id}"),
            display_name: format!("User {id}"),
        }
    }

    fn party(admin_id: UserId, media_ref: &str) -> PartySummary {
        PartySummary {
            id: 9,
            name: "Movie night".into(),
            visibility: Visibility::Private,
            media_ref: media_ref.into(),
            admin_id,
            members: vec![member(1), member(2)],
            created_at: Utc::now(),
        }
    }

    fn session(
        user_id: UserId,
        start_at: f64,
    ) -> (
        PartySession<RecordingChannel, StillPlayer>,
        Arc<RecordingChannel>,
    ) {
        let channel = Arc::new(RecordingChannel::default());
        let session = PartySession::new(
            &Config::default(),
            &party(1, "https://youtu.be/JwRWf3ho4B8"),
            member(user_id),
            channel.clone(),
            |_| StillPlayer {
                time: Mutex::new(start_at),
                ..Default::default()
            },
        );

        (session, channel)
    }

    fn admin_sync(current_time: f64, is_playing: bool) -> ServerEvent {
        ServerEvent::AdminSync {
            party_id: 9,
            current_time,
            is_playing,
            stamp: None,
        }
    }

    #[tokio::test]
    async fn test_follower_plays_without_seeking() {
        let (follower, _) = session(2, 10.0);

        let notice = follower
            .handle(admin_sync(9.0, true))
            .await
            .expect("handles");

        let player = follower.player().expect("has a player");
        assert!(player.is_playing());
        assert!(player.seeks.lock().is_empty());
        assert!(matches!(
            notice,
            Some(RoomNotice::Reconciled(Reconciliation {
                seeked_to: None,
                toggled_to: Some(true)
            }))
        ));
        assert_eq!(follower.follower_state(), FollowerState::Synced);
    }

    #[tokio::test]
    async fn test_admin_never_reconciles() {
        let (admin, _) = session(1, 10.0);

        let notice = admin.handle(admin_sync(100.0, true)).await.expect("handles");

        assert!(notice.is_none());
        assert!(admin.player().expect("has a player").seeks.lock().is_empty());
    }

    #[tokio::test]
    async fn test_ready_follower_requests_sync() {
        let (follower, channel) = session(2, 0.0);
        follower.on_player_ready().await.expect("publishes");

        assert_eq!(
            channel.published(),
            vec![ClientEvent::RequestSync { party_id: 9 }]
        );
    }

    #[tokio::test]
    async fn test_admin_answers_sync_requests() {
        let (admin, channel) = session(1, 42.0);

        admin
            .handle(ServerEvent::SyncRequested { party_id: 9 })
            .await
            .expect("handles");

        match channel.published().as_slice() {
            [ClientEvent::AdminSync {
                current_time,
                is_playing,
                stamp: Some(SyncStamp { seq: 1, .. }),
                ..
            }] => {
                assert_eq!(*current_time, 42.0);
                assert!(!is_playing);
            }
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unresolvable_media_means_no_player() {
        let channel = Arc::new(RecordingChannel::default());
        let follower: PartySession<_, StillPlayer> = PartySession::new(
            &Config::default(),
            &party(1, "https://example.com/video.mp4"),
            member(2),
            channel,
            |_| unreachable!("no player is created"),
        );

        assert!(follower.player().is_none());

        // Chat keeps working without a video
        let notice = follower
            .handle(admin_sync(5.0, true))
            .await
            .expect("handles");
        assert!(notice.is_none());

        follower.send_message("still here").await.expect("sends");
        assert_eq!(follower.chat().len(), 1);
    }

    #[tokio::test]
    async fn test_own_message_is_not_duplicated() {
        let (follower, _) = session(2, 0.0);
        let sent = follower.send_message("  hello  ").await.expect("sends");
        assert_eq!(sent.message, "hello");

        let echo = ChatMessage {
            id: Some(11),
            timestamp: sent.timestamp + chrono::Duration::milliseconds(250),
            ..sent
        };

        let notice = follower
            .handle(ServerEvent::PartyMessage(echo))
            .await
            .expect("handles");

        assert!(notice.is_none());
        assert_eq!(follower.chat().snapshot()[0].id, Some(11));
    }

    #[tokio::test]
    async fn test_empty_message_is_refused() {
        let (follower, channel) = session(2, 0.0);

        assert!(matches!(
            follower.send_message("   ").await,
            Err(SessionError::Validation(_))
        ));
        assert!(channel.published().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reactions_expire_on_every_receiver() {
        let (sender, _) = session(1, 0.0);
        let (receiver, _) = session(2, 0.0);

        sender.send_reaction(Emoji::Laugh).await.expect("sends");

        let payload = ReactionPayload {
            party_id: 9,
            emoji: Emoji::Laugh,
            user_id: 1,
            username: "user1".into(),
            timestamp: Utc::now(),
        };

        // The echo of the sender's own reaction is ignored
        sender
            .handle(ServerEvent::PartyReaction(payload.clone()))
            .await
            .expect("handles");
        receiver
            .handle(ServerEvent::PartyReaction(payload))
            .await
            .expect("handles");

        assert_eq!(sender.reactions().snapshot().len(), 1);
        assert_eq!(receiver.reactions().snapshot().len(), 1);

        tokio::time::sleep(Duration::from_millis(3100)).await;

        assert!(sender.reactions().snapshot().is_empty());
        assert!(receiver.reactions().snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_admin_handover() {
        let (follower, _) = session(2, 0.0);

        let notice = follower
            .handle(ServerEvent::PartyLeft {
                party_id: 9,
                user_id: 1,
                new_admin_id: Some(2),
            })
            .await
            .expect("handles");

        assert!(matches!(notice, Some(RoomNotice::BecameAdmin)));
        assert_eq!(follower.role(), Role::Admin);
        assert_eq!(follower.members().len(), 1);
    }

    #[tokio::test]
    async fn test_kick_ends_session() {
        let (follower, _) = session(2, 0.0);

        follower
            .handle(ServerEvent::UserKicked {
                party_id: 9,
                user_id: 2,
                kicked_by: 1,
            })
            .await
            .expect("handles");

        assert_eq!(follower.ended(), Some(LeaveReason::Kicked));
        assert!(matches!(
            follower.request_sync().await,
            Err(SessionError::Ended)
        ));
    }

    #[tokio::test]
    async fn test_events_for_other_parties_are_ignored() {
        let (follower, _) = session(2, 0.0);

        let notice = follower
            .handle(ServerEvent::PartyDeleted {
                party_id: 100,
                deleted_by: Some(1),
            })
            .await
            .expect("handles");

        assert!(notice.is_none());
        assert!(follower.ended().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_admin_broadcasts_until_session_ends() {
        let (admin, channel) = session(1, 5.0);
        let admin = Arc::new(admin);
        let (sender, mut receiver) = unbounded_channel();
        let inbound = futures_util::stream::poll_fn(move |cx| receiver.poll_recv(cx));

        let running = {
            let admin = admin.clone();
            tokio::spawn(async move { admin.run(inbound, None).await })
        };

        // Immediate tick, then one every 3 seconds
        tokio::time::sleep(Duration::from_millis(6500)).await;

        sender
            .send(ServerEvent::PartyDeleted {
                party_id: 9,
                deleted_by: Some(1),
            })
            .expect("sends");

        let reason = running.await.expect("joins");
        assert_eq!(reason, LeaveReason::Deleted);

        let published = channel.published();
        let syncs = published
            .iter()
            .filter(|e| matches!(e, ClientEvent::AdminSync { .. }))
            .count();

        assert_eq!(published.first(), Some(&ClientEvent::JoinParty { party_id: 9 }));
        assert_eq!(syncs, 3);

        // Nothing more is sent once the session is over
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(channel.published().len(), published.len());
    }
}
