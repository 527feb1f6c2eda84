//! Implementations of the traits in aura-core that don't depend on a real video surface.

mod channels;
mod players;

pub use channels::*;
pub use players::*;
