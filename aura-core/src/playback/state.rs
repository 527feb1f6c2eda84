use chrono::{DateTime, Utc};

use crate::VideoPlayer;

/// A view of playback at a point in time.
/// The admin's copy is authoritative, every follower only holds a reconciled copy.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    /// The position of the player, in seconds
    pub current_time: f64,
    pub is_playing: bool,
    /// The length of the video, in seconds
    pub duration: f64,
    pub last_update: DateTime<Utc>,
}

impl PlaybackState {
    /// Reads the current state of a player
    pub fn read(player: &dyn VideoPlayer) -> Self {
        Self {
            current_time: player.current_time().max(0.),
            is_playing: player.is_playing(),
            duration: player.duration(),
            last_update: Utc::now(),
        }
    }
}
