use crossbeam::atomic::AtomicCell;
use rand::random;

use crate::{ClientEvent, PartyId, PlaybackChange, PlaybackState, SyncStamp, VideoPlayer};

/// The admin's side of playback sync.
/// Produces the broadcasts followers reconcile against, each stamped so followers can order them.
pub struct AdminClock {
    party_id: PartyId,
    session: u64,
    seq: AtomicCell<u64>,
}

impl AdminClock {
    /// Starts a new clock. Every clock has its own session, so followers
    /// accept it even if an earlier admin got further along in its sequence.
    pub fn new(party_id: PartyId) -> Self {
        Self {
            party_id,
            session: random(),
            seq: AtomicCell::new(0),
        }
    }

    /// The broadcast sent on every tick and whenever a follower requests it
    pub fn sync_event(&self, player: &dyn VideoPlayer) -> ClientEvent {
        let state = PlaybackState::read(player);

        ClientEvent::AdminSync {
            party_id: self.party_id,
            current_time: state.current_time,
            is_playing: state.is_playing,
            stamp: Some(self.next_stamp()),
        }
    }

    /// The broadcast sent when the admin's own player changes state
    pub fn state_change_event(&self, player: &dyn VideoPlayer, change: PlaybackChange) -> ClientEvent {
        let state = PlaybackState::read(player);

        ClientEvent::VideoStateChange {
            party_id: self.party_id,
            state: change,
            current_time: state.current_time,
            is_playing: state.is_playing,
            stamp: Some(self.next_stamp()),
        }
    }

    fn next_stamp(&self) -> SyncStamp {
        SyncStamp {
            session: self.session,
            seq: self.seq.fetch_add(1) + 1,
        }
    }
}
