//! The client side of a party, shared by anything that takes part in one.
//!
//! Holds the room protocol, playback sync between the admin and followers,
//! and the chat and reaction views every participant keeps locally.

mod channel;
mod chat;
mod config;
mod media;
mod playback;
mod protocol;
mod reactions;
mod session;
mod util;

pub use channel::*;
pub use chat::*;
pub use config::*;
pub use media::*;
pub use playback::*;
pub use protocol::*;
pub use reactions::*;
pub use session::*;
pub use util::*;
