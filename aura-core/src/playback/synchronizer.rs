use log::debug;
use std::time::Duration;
use tokio::time::Instant;

use crate::{Config, PlaybackState, ServerEvent, SyncStamp, VideoPlayer};

/// Where a follower is in relation to the admin's playback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowerState {
    /// Nothing has been received from the admin yet
    AwaitingFirstSync,
    Synced,
    /// A correction was just applied. Only used to show a "syncing" indicator
    Reconciling,
}

/// A broadcast from the admin, either periodic, requested, or caused by a state change
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncUpdate {
    pub current_time: f64,
    pub is_playing: bool,
    pub stamp: Option<SyncStamp>,
}

/// What a follower did to its player for one update
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Reconciliation {
    /// Set if the player was seeked, to the position it was seeked to
    pub seeked_to: Option<f64>,
    /// Set if the player was played (true) or paused (false)
    pub toggled_to: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncOutcome {
    Applied(Reconciliation),
    /// The update was older than one already applied
    Discarded,
}

/// The follower's side of playback sync.
///
/// Seeks are only done when drift exceeds the threshold, since seeking is visible to the viewer.
/// Play and pause always follow the admin.
#[derive(Debug)]
pub struct Synchronizer {
    seek_threshold: f64,
    cooldown: Duration,
    staleness_threshold: Duration,

    started_at: Instant,
    last_stamp: Option<SyncStamp>,
    last_applied: Option<(Instant, PlaybackState)>,
    reconciling_until: Option<Instant>,
}

impl SyncUpdate {
    /// Extracts an update from the events that carry one
    pub fn from_event(event: &ServerEvent) -> Option<Self> {
        match event {
            ServerEvent::AdminSync {
                current_time,
                is_playing,
                stamp,
                ..
            }
            | ServerEvent::VideoSync {
                current_time,
                is_playing,
                stamp,
                ..
            } => Some(Self {
                current_time: *current_time,
                is_playing: *is_playing,
                stamp: *stamp,
            }),
            _ => None,
        }
    }
}

impl Synchronizer {
    pub fn new(config: &Config, now: Instant) -> Self {
        Self {
            seek_threshold: config.seek_threshold_in_seconds,
            cooldown: config.reconcile_cooldown(),
            staleness_threshold: config.staleness_threshold(),
            started_at: now,
            last_stamp: None,
            last_applied: None,
            reconciling_until: None,
        }
    }

    /// Reconciles the player against an update from the admin.
    pub fn apply(
        &mut self,
        player: &dyn VideoPlayer,
        update: SyncUpdate,
        now: Instant,
    ) -> SyncOutcome {
        if self.is_outdated(update.stamp) {
            debug!("Discarding outdated sync {:?}", update.stamp);
            return SyncOutcome::Discarded;
        }

        if update.stamp.is_some() {
            self.last_stamp = update.stamp;
        }

        let mut reconciliation = Reconciliation::default();
        let drift = (player.current_time() - update.current_time).abs();

        if drift > self.seek_threshold {
            debug!("Drifted {:.2}s from admin, seeking to {:.2}", drift, update.current_time);

            player.seek(update.current_time);
            reconciliation.seeked_to = Some(update.current_time);

            // Re-entering just pushes the end of the indicator further out
            self.reconciling_until = Some(now + self.cooldown);
        }

        if update.is_playing != player.is_playing() {
            if update.is_playing {
                player.play()
            } else {
                player.pause()
            }

            reconciliation.toggled_to = Some(update.is_playing);
        }

        let mut state = PlaybackState::read(player);
        state.current_time = update.current_time;
        state.is_playing = update.is_playing;
        self.last_applied = Some((now, state));

        SyncOutcome::Applied(reconciliation)
    }

    pub fn state(&self, now: Instant) -> FollowerState {
        if self.last_applied.is_none() {
            return FollowerState::AwaitingFirstSync;
        }

        match self.reconciling_until {
            Some(until) if now < until => FollowerState::Reconciling,
            _ => FollowerState::Synced,
        }
    }

    /// True if nothing was applied for longer than the staleness threshold.
    /// This is the "playback may be out of sync" indicator, nothing is done about it.
    pub fn is_stale(&self, now: Instant) -> bool {
        let since = self
            .last_applied
            .as_ref()
            .map(|(at, _)| *at)
            .unwrap_or(self.started_at);

        now.saturating_duration_since(since) > self.staleness_threshold
    }

    /// The locally reconciled copy of the admin's playback
    pub fn last_applied(&self) -> Option<&PlaybackState> {
        self.last_applied.as_ref().map(|(_, state)| state)
    }

    fn is_outdated(&self, stamp: Option<SyncStamp>) -> bool {
        match (self.last_stamp, stamp) {
            (Some(last), Some(new)) => last.session == new.session && new.seq <= last.seq,
            // Unstamped broadcasts are applied in receipt order
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct FakePlayer {
        time: Mutex<f64>,
        playing: Mutex<bool>,
        seeks: Mutex<Vec<f64>>,
    }

    impl FakePlayer {
        fn at(time: f64, playing: bool) -> Self {
            Self {
                time: Mutex::new(time),
                playing: Mutex::new(playing),
                seeks: Default::default(),
            }
        }
    }

    impl VideoPlayer for FakePlayer {
        fn current_time(&self) -> f64 {
            *self.time.lock()
        }

        fn duration(&self) -> f64 {
            600.
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

    fn update(current_time: f64, is_playing: bool, seq: Option<u64>) -> SyncUpdate {
        SyncUpdate {
            current_time,
            is_playing,
            stamp: seq.map(|seq| SyncStamp { session: 1, seq }),
        }
    }

    #[test]
    fn test_seek_threshold_boundary() {
        let now = Instant::now();

        let player = FakePlayer::at(12.0, true);
        let mut sync = Synchronizer::new(&Config::default(), now);
        sync.apply(&player, update(10.0, true, None), now);
        assert!(player.seeks.lock().is_empty());

        let player = FakePlayer::at(12.0001, true);
        let mut sync = Synchronizer::new(&Config::default(), now);
        let outcome = sync.apply(&player, update(10.0, true, None), now);

        assert_eq!(*player.seeks.lock(), vec![10.0]);
        assert_eq!(
            outcome,
            SyncOutcome::Applied(Reconciliation {
                seeked_to: Some(10.0),
                toggled_to: None
            })
        );
    }

    #[test]
    fn test_play_state_follows_without_seek() {
        let now = Instant::now();
        let player = FakePlayer::at(10.0, false);
        let mut sync = Synchronizer::new(&Config::default(), now);

        let outcome = sync.apply(&player, update(9.0, true, None), now);

        assert!(player.is_playing());
        assert!(player.seeks.lock().is_empty());
        assert_eq!(
            outcome,
            SyncOutcome::Applied(Reconciliation {
                seeked_to: None,
                toggled_to: Some(true)
            })
        );

        sync.apply(&player, update(9.5, false, None), now);
        assert!(!player.is_playing());
    }

    #[test]
    fn test_state_machine() {
        let config = Config::default();
        let now = Instant::now();
        let player = FakePlayer::at(0.0, true);
        let mut sync = Synchronizer::new(&config, now);

        assert_eq!(sync.state(now), FollowerState::AwaitingFirstSync);

        sync.apply(&player, update(30.0, true, None), now);
        assert_eq!(sync.state(now), FollowerState::Reconciling);
        assert_eq!(
            sync.state(now + Duration::from_millis(499)),
            FollowerState::Reconciling
        );
        assert_eq!(
            sync.state(now + Duration::from_millis(500)),
            FollowerState::Synced
        );

        // A small drift doesn't re-enter reconciling
        let later = now + Duration::from_secs(3);
        sync.apply(&player, update(31.0, true, None), later);
        assert_eq!(sync.state(later), FollowerState::Synced);
    }

    #[test]
    fn test_applying_twice_is_idempotent() {
        let now = Instant::now();
        let player = FakePlayer::at(0.0, false);
        let mut sync = Synchronizer::new(&Config::default(), now);

        sync.apply(&player, update(40.0, true, None), now);
        let second = sync.apply(&player, update(40.0, true, None), now);

        assert_eq!(second, SyncOutcome::Applied(Reconciliation::default()));
        assert_eq!(player.seeks.lock().len(), 1);
    }

    #[test]
    fn test_outdated_broadcasts_are_discarded() {
        let now = Instant::now();
        let player = FakePlayer::at(50.0, true);
        let mut sync = Synchronizer::new(&Config::default(), now);

        sync.apply(&player, update(50.0, true, Some(5)), now);

        // A delayed tick arriving after a newer requested broadcast
        let outcome = sync.apply(&player, update(20.0, true, Some(4)), now);
        assert_eq!(outcome, SyncOutcome::Discarded);
        assert!(player.seeks.lock().is_empty());

        // A new admin session starts from scratch
        let fresh = SyncUpdate {
            current_time: 20.0,
            is_playing: true,
            stamp: Some(SyncStamp { session: 2, seq: 1 }),
        };
        assert!(matches!(
            sync.apply(&player, fresh, now),
            SyncOutcome::Applied(_)
        ));
        assert_eq!(*player.seeks.lock(), vec![20.0]);
    }

    #[test]
    fn test_staleness() {
        let config = Config::default();
        let now = Instant::now();
        let player = FakePlayer::at(0.0, true);
        let mut sync = Synchronizer::new(&config, now);

        assert!(!sync.is_stale(now + Duration::from_secs(9)));
        assert!(sync.is_stale(now + Duration::from_secs(11)));

        let later = now + Duration::from_secs(11);
        sync.apply(&player, update(0.0, true, None), later);
        assert!(!sync.is_stale(later + Duration::from_secs(3)));
        assert_eq!(sync.last_applied().map(|s| s.current_time), Some(0.0));
    }
}
