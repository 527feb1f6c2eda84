mod clock;
mod player;
mod state;
mod synchronizer;

pub use clock::*;
pub use player::*;
pub use state::*;
pub use synchronizer::*;
