use parking_lot::Mutex;
use tokio::time::Instant;

use aura_core::VideoPlayer;

/// Implements [VideoPlayer] without rendering anything.
/// The position advances with the tokio clock while playing, so it works with paused time in tests.
pub struct VirtualPlayer {
    video_id: String,
    duration: f64,
    state: Mutex<VirtualState>,
}

struct VirtualState {
    /// The position at `anchor`
    position: f64,
    anchor: Instant,
    playing: bool,
}

impl VirtualPlayer {
    pub fn new(video_id: impl Into<String>, duration: f64) -> Self {
        Self {
            video_id: video_id.into(),
            duration,
            state: Mutex::new(VirtualState {
                position: 0.,
                anchor: Instant::now(),
                playing: false,
            }),
        }
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    fn clamp(&self, position: f64) -> f64 {
        if self.duration > 0. {
            position.clamp(0., self.duration)
        } else {
            position.max(0.)
        }
    }
}

impl VirtualState {
    fn position_at(&self, now: Instant) -> f64 {
        if self.playing {
            self.position + now.duration_since(self.anchor).as_secs_f64()
        } else {
            self.position
        }
    }

    /// Moves the anchor to `now`, keeping the position
    fn settle(&mut self, now: Instant) {
        self.position = self.position_at(now);
        self.anchor = now;
    }
}

impl VideoPlayer for VirtualPlayer {
    fn current_time(&self) -> f64 {
        let state = self.state.lock();
        self.clamp(state.position_at(Instant::now()))
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn is_playing(&self) -> bool {
        let state = self.state.lock();

        // Reaching the end stops playback
        state.playing && (self.duration <= 0. || state.position_at(Instant::now()) < self.duration)
    }

    fn play(&self) {
        let mut state = self.state.lock();
        state.settle(Instant::now());
        state.playing = true;
    }

    fn pause(&self) {
        let mut state = self.state.lock();
        state.settle(Instant::now());
        state.playing = false;
    }

    fn seek(&self, to: f64) {
        let mut state = self.state.lock();

        state.position = self.clamp(to);
        state.anchor = Instant::now();
    }
}
