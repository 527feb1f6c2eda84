mod memory_channel;

pub use memory_channel::*;
