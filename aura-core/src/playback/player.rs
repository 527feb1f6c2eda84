/// The local video player a party session drives.
///
/// Implementations wrap whatever actually renders the video. Calls are expected to be cheap
/// and non-blocking, since they run inside event handlers.
pub trait VideoPlayer: Send + Sync {
    /// The current position, in seconds
    fn current_time(&self) -> f64;

    /// The length of the loaded video, in seconds. Zero if unknown
    fn duration(&self) -> f64;

    fn is_playing(&self) -> bool;

    fn play(&self);

    fn pause(&self);

    /// Seeks to a position, in seconds
    fn seek(&self, to: f64);
}
