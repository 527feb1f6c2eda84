mod virtual_player;

pub use virtual_player::*;
