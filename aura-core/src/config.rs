use std::{ops::RangeInclusive, time::Duration};

/// The configuration of the party protocol
#[derive(Debug, Clone)]
pub struct Config {
    /// How often the admin broadcasts its playback state, in seconds
    pub sync_interval_in_seconds: f32,
    /// How far a follower may drift from the admin before it seeks, in seconds
    pub seek_threshold_in_seconds: f64,
    /// How long a follower shows the "syncing" indicator after a seek, in seconds
    pub reconcile_cooldown_in_seconds: f32,
    /// How long a follower can go without a broadcast before playback is considered stale, in seconds
    pub staleness_threshold_in_seconds: f32,
    /// How many chat messages are kept in the live view
    pub chat_history_limit: usize,
    /// Messages with the same sender and content this close together are the same message, in seconds
    pub chat_dedup_window_in_seconds: f32,
    /// How long a reaction stays active, in seconds
    pub reaction_lifetime_in_seconds: f32,
    /// The maximum amount of characters in a chat message
    pub max_message_length: usize,
    /// Allowed length of a party name, in characters
    pub party_name_length: RangeInclusive<usize>,
}

impl Config {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs_f32(self.sync_interval_in_seconds)
    }

    pub fn reconcile_cooldown(&self) -> Duration {
        Duration::from_secs_f32(self.reconcile_cooldown_in_seconds)
    }

    pub fn staleness_threshold(&self) -> Duration {
        Duration::from_secs_f32(self.staleness_threshold_in_seconds)
    }

    pub fn reaction_lifetime(&self) -> Duration {
        Duration::from_secs_f32(self.reaction_lifetime_in_seconds)
    }

    /// The dedup window as a [chrono::Duration], since message timestamps are wall-clock
    pub fn chat_dedup_window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds((self.chat_dedup_window_in_seconds * 1000.) as i64)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync_interval_in_seconds: 3.0,
            // Seeking causes buffering, so small drift is tolerated
            seek_threshold_in_seconds: 2.0,
            reconcile_cooldown_in_seconds: 0.5,
            // A few missed broadcasts in a row
            staleness_threshold_in_seconds: 10.0,
            chat_history_limit: 100,
            chat_dedup_window_in_seconds: 2.0,
            reaction_lifetime_in_seconds: 3.0,
            max_message_length: 500,
            party_name_length: 3..=100,
        }
    }
}
