mod id;
mod snapshot;

pub use id::*;
pub use snapshot::*;
