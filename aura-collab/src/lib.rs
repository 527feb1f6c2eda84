mod db;
mod events;
mod parties;

use std::sync::Arc;

use aura_core::Config;
use crossbeam::channel::unbounded;
use dashmap::DashMap;

pub use db::*;
pub use events::*;
pub use parties::*;

// Reduces verbosity
pub type ArcedStore<Id, T> = Arc<DashMap<Id, Arc<T>>>;
pub type SharedDatabase = Arc<dyn Database>;

/// The party system, facilitating membership, party lifecycle, and room fan-out.
pub struct Collab {
    pub database: SharedDatabase,
    pub parties: PartyManager,

    event_receiver: EventReceiver,
}

/// A type passed to various components of the collab system, to access state and emit events.
#[derive(Clone)]
pub struct CollabContext {
    pub config: Config,
    pub database: SharedDatabase,
    pub parties: ArcedStore<PartyId, Party>,

    event_sender: EventSender,
}

impl Collab {
    pub fn new<Db>(config: Config, database: Db) -> Self
    where
        Db: Database + 'static,
    {
        let database: SharedDatabase = Arc::new(database);
        let (event_sender, event_receiver) = unbounded();

        let context = CollabContext {
            config,
            database: database.clone(),
            parties: Default::default(),
            event_sender,
        };

        Self {
            database,
            parties: PartyManager::new(&context),
            event_receiver,
        }
    }

    /// Receive lobby events. Blocks until one is available.
    /// Returns None once the collab system is gone.
    pub fn wait_for_event(&self) -> Option<CollabEvent> {
        self.event_receiver.recv().ok()
    }

    /// Returns a receiver for lobby events, for listeners that want to poll
    pub fn events(&self) -> EventReceiver {
        self.event_receiver.clone()
    }
}

impl CollabContext {
    pub fn emit(&self, event: CollabEvent) {
        // The receiver lives as long as the Collab, so this only fails during shutdown
        self.event_sender.send(event).ok();
    }
}
