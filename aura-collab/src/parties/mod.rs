mod chat;
mod connection;
mod lifecycle;
mod membership;
mod party;

use std::sync::Arc;

use aura_core::PartySummary;
use log::info;
use thiserror::Error;

use crate::{CollabContext, DatabaseError, PrimaryKey};

pub use aura_core::PartyId;
pub use connection::*;
pub use lifecycle::*;
pub use membership::*;
pub use party::*;

/// Owns every live party and carries out membership, lifecycle, and room actions on them.
pub struct PartyManager {
    context: CollabContext,
}

#[derive(Debug, Error)]
pub enum PartyError {
    /// The acting user lacks the admin rights for this action
    #[error("Only the party admin can do this")]
    NotAuthorized,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("User is not a member of this party")]
    NotAMember,
    #[error("{0}")]
    Validation(String),
    #[error("Join request has already been resolved")]
    RequestAlreadyResolved,
    #[error(transparent)]
    Database(DatabaseError),
}

impl From<DatabaseError> for PartyError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::NotFound { resource, .. } => Self::NotFound(resource),
            e => Self::Database(e),
        }
    }
}

impl PartyManager {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Restores the active parties from the database on init
    pub async fn restore(&self) -> Result<(), DatabaseError> {
        let parties: Vec<_> = self
            .context
            .database
            .list_active_parties()
            .await?
            .into_iter()
            .map(|p| (p.id, Party::new(&self.context, p)))
            .collect();

        info!("Restored {} active parties", parties.len());

        for (id, party) in parties {
            self.context.parties.insert(id, party.into());
        }

        Ok(())
    }

    /// Returns a live party
    pub fn get(&self, party_id: PartyId) -> Result<Arc<Party>, PartyError> {
        self.context
            .parties
            .get(&party_id)
            .map(|p| p.value().clone())
            .ok_or(PartyError::NotFound("party"))
    }

    /// Every active party, newest first
    pub fn list_active(&self) -> Vec<PartySummary> {
        let mut parties: Vec<_> = self
            .context
            .parties
            .iter()
            .map(|p| p.value().summary())
            .collect();

        parties.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        parties
    }

    /// Every active party a user is a member of, newest first
    pub fn list_for_user(&self, user_id: PrimaryKey) -> Vec<PartySummary> {
        self.list_active()
            .into_iter()
            .filter(|p| p.members.iter().any(|m| m.id == user_id))
            .collect()
    }
}
