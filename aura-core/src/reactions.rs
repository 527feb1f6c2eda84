use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use rand::Rng;
use tokio::time::{sleep_until, Instant};

use crate::{Config, Emoji, Id, Snapshot, UserId};

pub type ReactionId = Id<Reaction>;

/// A reaction that is currently being shown.
#[derive(Debug, Clone)]
pub struct Reaction {
    pub id: ReactionId,
    pub emoji: Emoji,
    pub user_id: UserId,
    pub username: String,
    /// Horizontal placement between 0 and 1. Purely cosmetic and different on every receiver
    pub position: f32,
    pub expires_at: Instant,
}

/// The reactions active on one receiver.
/// Every receiver expires reactions on its own, nothing is acknowledged or stored.
#[derive(Debug)]
pub struct ReactionSet {
    lifetime: Duration,
    active: Snapshot<Reaction>,
}

impl ReactionSet {
    pub fn new(config: &Config) -> Arc<Self> {
        Arc::new(Self {
            lifetime: config.reaction_lifetime(),
            active: Default::default(),
        })
    }

    /// Shows a reaction received at `now`. It expires one lifetime later.
    pub fn add(&self, emoji: Emoji, user_id: UserId, username: String, now: Instant) -> Reaction {
        let reaction = Reaction {
            id: ReactionId::new(),
            emoji,
            user_id,
            username,
            position: rand::thread_rng().gen_range(0.0..1.0),
            expires_at: now + self.lifetime,
        };

        self.active.update(|active| active.push(reaction.clone()));
        reaction
    }

    /// Shows a reaction and schedules its removal on the tokio timer.
    pub fn add_and_schedule(
        self: &Arc<Self>,
        emoji: Emoji,
        user_id: UserId,
        username: String,
    ) -> Reaction {
        let reaction = self.add(emoji, user_id, username, Instant::now());
        let set: Weak<Self> = Arc::downgrade(self);
        let (id, expires_at) = (reaction.id, reaction.expires_at);

        tokio::spawn(async move {
            sleep_until(expires_at).await;

            if let Some(set) = set.upgrade() {
                set.remove(id);
            }
        });

        reaction
    }

    /// Removes one specific reaction, returning false if it was already gone
    pub fn remove(&self, id: ReactionId) -> bool {
        self.active.update(|active| {
            let before = active.len();
            active.retain(|r| r.id != id);

            active.len() != before
        })
    }

    /// Drops every reaction that expired at or before `now`
    pub fn prune(&self, now: Instant) -> usize {
        self.active.update(|active| {
            let before = active.len();
            active.retain(|r| r.expires_at > now);

            before - active.len()
        })
    }

    /// Returns the reactions that are still visible at `now`
    pub fn active_at(&self, now: Instant) -> Vec<Reaction> {
        self.active
            .get()
            .iter()
            .filter(|r| r.expires_at > now)
            .cloned()
            .collect()
    }

    /// Returns everything not yet removed
    pub fn snapshot(&self) -> Arc<Vec<Reaction>> {
        self.active.get()
    }
}
