use std::sync::Arc;

use aura_core::{extract_video_id, RequestStatus, ServerEvent, Visibility};
use log::info;

use crate::{
    events::CollabEvent, DatabaseError, JoinRequestData, NewJoinRequest, NewParty, PrimaryKey,
};

use super::{Party, PartyError, PartyId, PartyManager};

/// What a user asks for when creating a party
#[derive(Debug, Clone)]
pub struct NewPartyRequest {
    pub name: String,
    pub visibility: Visibility,
    /// A YouTube url
    pub media_ref: String,
}

/// How an admin resolves a join request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestAction {
    Approve,
    Reject,
}

impl PartyManager {
    /// Creates a party with the owner as its admin and only member
    pub async fn create(
        &self,
        owner_id: PrimaryKey,
        new_party: NewPartyRequest,
    ) -> Result<Arc<Party>, PartyError> {
        let config = &self.context.config;
        let name = new_party.name.trim();

        if !config
            .party_name_length
            .contains(&name.chars().count())
        {
            return Err(PartyError::Validation(format!(
                "Party name must be between {} and {} characters",
                config.party_name_length.start(),
                config.party_name_length.end()
            )));
        }

        let media_ref = new_party.media_ref.trim();

        if extract_video_id(media_ref).is_err() {
            return Err(PartyError::Validation("Invalid YouTube URL".to_string()));
        }

        let data = self
            .context
            .database
            .create_party(NewParty {
                name: name.to_string(),
                visibility: new_party.visibility,
                media_ref: media_ref.to_string(),
                admin_id: owner_id,
            })
            .await?;

        let party = Arc::new(Party::new(&self.context, data));
        self.context.parties.insert(party.id(), party.clone());

        info!("Party {} created by user {}", name, owner_id);

        self.context.emit(CollabEvent::PartyCreated {
            party: party.summary(),
        });

        Ok(party)
    }

    /// Deletes a party, evicting everyone in its room
    pub async fn delete(&self, party_id: PartyId, actor_id: PrimaryKey) -> Result<(), PartyError> {
        let party = self.get(party_id)?;
        let _operation = party.lock_operations().await?;

        party.ensure_admin(actor_id)?;

        self.context.database.delete_party(party_id).await?;
        self.context.parties.remove(&party_id);
        party.close();

        info!("Party {} deleted by user {}", party.data().name, actor_id);

        party.broadcast(ServerEvent::PartyDeleted {
            party_id,
            deleted_by: Some(actor_id),
        });
        party.disconnect_all();

        self.context.emit(CollabEvent::PartyDeleted {
            party_id,
            deleted_by: Some(actor_id),
        });

        Ok(())
    }

    /// Asks to join a private party.
    /// Returns the pending request, which is the existing one if the user already asked.
    pub async fn request_join(
        &self,
        party_id: PartyId,
        user_id: PrimaryKey,
    ) -> Result<JoinRequestData, PartyError> {
        let party = self.get(party_id)?;
        let _operation = party.lock_operations().await?;

        if party.data().visibility == Visibility::Public {
            return Err(PartyError::Validation(
                "Public parties can be joined directly".to_string(),
            ));
        }

        if party.is_member(user_id) {
            return Err(PartyError::Validation(
                "Already a member of this party".to_string(),
            ));
        }

        let database = &self.context.database;

        match database.latest_join_request(party_id, user_id).await {
            Ok(request) if request.status == RequestStatus::Pending => return Ok(request),
            Ok(_) | Err(DatabaseError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        let request = database
            .create_join_request(NewJoinRequest { party_id, user_id })
            .await?;

        info!(
            "User {} requested to join party {}",
            request.user.display_name,
            party.data().name
        );

        party.broadcast(ServerEvent::JoinRequested {
            party_id,
            request: request.summary(),
        });

        Ok(request)
    }

    /// Returns the pending join requests of a party, oldest first
    pub async fn list_requests(
        &self,
        party_id: PartyId,
        actor_id: PrimaryKey,
    ) -> Result<Vec<JoinRequestData>, PartyError> {
        let party = self.get(party_id)?;
        party.ensure_admin(actor_id)?;

        let requests = self
            .context
            .database
            .list_join_requests(party_id, RequestStatus::Pending)
            .await?;

        Ok(requests)
    }

    /// Approves or rejects a pending join request.
    /// Approving has the same effect as the requester joining.
    pub async fn resolve_join_request(
        &self,
        party_id: PartyId,
        request_id: PrimaryKey,
        actor_id: PrimaryKey,
        action: RequestAction,
    ) -> Result<JoinRequestData, PartyError> {
        let party = self.get(party_id)?;
        let _operation = party.lock_operations().await?;

        party.ensure_admin(actor_id)?;

        let database = &self.context.database;
        let request = database.join_request_by_id(request_id).await?;

        if request.party_id != party_id {
            return Err(PartyError::NotFound("join request"));
        }

        if request.status != RequestStatus::Pending {
            return Err(PartyError::RequestAlreadyResolved);
        }

        let status = match action {
            RequestAction::Approve => RequestStatus::Approved,
            RequestAction::Reject => RequestStatus::Rejected,
        };

        let request = database.update_join_request(request_id, status).await?;

        info!(
            "Join request of {} for party {} was {}",
            request.user.display_name,
            party.data().name,
            status
        );

        if action == RequestAction::Approve && !party.is_member(request.user.id) {
            self.admit(&party, request.user.id).await?;
        }

        Ok(request)
    }
}
