use aura_core::{RequestStatus, Visibility};
use log::info;

use crate::{events::CollabEvent, DatabaseError, NewPartyMember, PrimaryKey};

use super::{Party, PartyError, PartyId, PartyManager};

/// The result of adding a user to a party
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    /// The user was already a member, nothing changed
    AlreadyMember,
}

impl PartyManager {
    /// Joins a party as the given user.
    /// Private parties can only be joined by the admin, or with an approved join request.
    pub async fn join(
        &self,
        party_id: PartyId,
        user_id: PrimaryKey,
    ) -> Result<JoinOutcome, PartyError> {
        let party = self.get(party_id)?;
        let _operation = party.lock_operations().await?;

        if party.is_member(user_id) {
            return Ok(JoinOutcome::AlreadyMember);
        }

        let data = party.data();

        if data.visibility == Visibility::Private && data.admin_id != user_id {
            let approved = match self
                .context
                .database
                .latest_join_request(party_id, user_id)
                .await
            {
                Ok(request) => request.status == RequestStatus::Approved,
                Err(DatabaseError::NotFound { .. }) => false,
                Err(e) => return Err(e.into()),
            };

            if !approved {
                return Err(PartyError::NotAuthorized);
            }
        }

        self.admit(&party, user_id).await?;
        Ok(JoinOutcome::Joined)
    }

    /// Adds a user directly, bypassing join requests. Only the admin can do this
    pub async fn add_member(
        &self,
        party_id: PartyId,
        actor_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<JoinOutcome, PartyError> {
        let party = self.get(party_id)?;
        let _operation = party.lock_operations().await?;

        party.ensure_admin(actor_id)?;

        if party.is_member(user_id) {
            return Ok(JoinOutcome::AlreadyMember);
        }

        self.admit(&party, user_id).await?;
        Ok(JoinOutcome::Joined)
    }

    /// Leaves a party.
    ///
    /// If the admin leaves, the longest-standing remaining member becomes admin.
    /// If nobody remains, the party is deactivated.
    pub async fn leave(&self, party_id: PartyId, user_id: PrimaryKey) -> Result<(), PartyError> {
        let party = self.get(party_id)?;
        let _operation = party.lock_operations().await?;

        let member = party.member_by_user_id(user_id)?;
        let data = party.data();
        let database = &self.context.database;

        // Members are kept in the order they joined
        let successor = data
            .members
            .iter()
            .find(|m| m.user.id != user_id)
            .map(|m| m.user.id);

        database.delete_party_member(party_id, user_id).await?;

        info!(
            "User {} left party {}",
            member.user.display_name, data.name
        );

        let Some(successor) = successor else {
            database.deactivate_party(party_id).await?;
            self.context.parties.remove(&party_id);
            party.close();

            info!("Party {} is empty and was deactivated", data.name);

            party.remove_member(user_id, None);
            party.disconnect_all();

            self.context.emit(CollabEvent::PartyDeleted {
                party_id,
                deleted_by: None,
            });

            return Ok(());
        };

        let new_admin_id = if data.admin_id == user_id {
            database.update_party_admin(party_id, successor).await?;
            info!("User {} is now admin of party {}", successor, data.name);

            Some(successor)
        } else {
            None
        };

        party.remove_member(user_id, new_admin_id);
        Ok(())
    }

    /// Removes a member. Only the admin can kick, and not themself
    pub async fn kick(
        &self,
        party_id: PartyId,
        actor_id: PrimaryKey,
        target_id: PrimaryKey,
    ) -> Result<(), PartyError> {
        let party = self.get(party_id)?;
        let _operation = party.lock_operations().await?;

        party.ensure_admin(actor_id)?;

        if actor_id == target_id {
            return Err(PartyError::Validation("You cannot kick yourself".to_string()));
        }

        let target = party.member_by_user_id(target_id)?;

        self.context
            .database
            .delete_party_member(party_id, target_id)
            .await?;

        info!(
            "User {} was kicked from party {}",
            target.user.display_name,
            party.data().name
        );

        party.remove_kicked_member(target_id, actor_id);
        Ok(())
    }

    /// Makes a user a member. The caller holds the party's operation lock
    pub(crate) async fn admit(&self, party: &Party, user_id: PrimaryKey) -> Result<(), PartyError> {
        let member = self
            .context
            .database
            .create_party_member(NewPartyMember {
                party_id: party.id(),
                user_id,
            })
            .await?;

        info!(
            "User {} joined party {}",
            member.user.display_name,
            party.data().name
        );

        party.add_member(member);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use aura_core::ServerEvent;
    use tokio::sync::mpsc::unbounded_channel;

    use super::*;
    use crate::parties::tests::{drain, fixture, new_party, Fixture};

    #[tokio::test]
    async fn test_public_join_is_idempotent() {
        let Fixture {
            collab,
            admin,
            users,
        } = fixture();

        let party = collab
            .parties
            .create(admin.id, new_party(Visibility::Public))
            .await
            .expect("creates party");

        assert_eq!(
            collab.parties.join(party.id(), users[0].id).await.expect("joins"),
            JoinOutcome::Joined
        );
        assert_eq!(
            collab.parties.join(party.id(), users[0].id).await.expect("joins"),
            JoinOutcome::AlreadyMember
        );
        assert_eq!(party.data().members.len(), 2);
    }

    #[tokio::test]
    async fn test_add_member_is_admin_only() {
        let Fixture {
            collab,
            admin,
            users,
        } = fixture();
        let parties = &collab.parties;

        let party = parties
            .create(admin.id, new_party(Visibility::Private))
            .await
            .expect("creates party");

        assert!(matches!(
            parties.add_member(party.id(), users[0].id, users[1].id).await,
            Err(PartyError::NotAuthorized)
        ));

        assert_eq!(
            parties
                .add_member(party.id(), admin.id, users[1].id)
                .await
                .expect("adds"),
            JoinOutcome::Joined
        );
        assert_eq!(
            parties
                .add_member(party.id(), admin.id, users[1].id)
                .await
                .expect("adds"),
            JoinOutcome::AlreadyMember
        );

        assert!(matches!(
            parties.add_member(party.id(), admin.id, 9999).await,
            Err(PartyError::NotFound("user"))
        ));
    }

    #[tokio::test]
    async fn test_kick() {
        let Fixture {
            collab,
            admin,
            users,
        } = fixture();
        let parties = &collab.parties;
        let (target, bystander) = (&users[0], &users[1]);

        let party = parties
            .create(admin.id, new_party(Visibility::Public))
            .await
            .expect("creates party");

        parties.join(party.id(), target.id).await.expect("joins");
        parties.join(party.id(), bystander.id).await.expect("joins");

        let (sender, mut target_events) = unbounded_channel();
        let _target = party.connect(target.id, sender).expect("connects");

        let (sender, mut bystander_events) = unbounded_channel();
        let _bystander = party.connect(bystander.id, sender).expect("connects");

        assert!(matches!(
            parties.kick(party.id(), admin.id, admin.id).await,
            Err(PartyError::Validation(_))
        ));

        parties
            .kick(party.id(), admin.id, target.id)
            .await
            .expect("kicks");

        assert!(!party.is_member(target.id));
        assert!(party
            .current_connections()
            .iter()
            .all(|c| c.user_id != target.id));

        let kicked = |events: Vec<ServerEvent>| {
            events.into_iter().any(|e| {
                matches!(e, ServerEvent::UserKicked { user_id, kicked_by, .. } if user_id == target.id && kicked_by == admin.id)
            })
        };

        assert!(kicked(drain(&mut target_events)));
        assert!(kicked(drain(&mut bystander_events)));

        assert!(matches!(
            parties.kick(party.id(), admin.id, target.id).await,
            Err(PartyError::NotAMember)
        ));
    }

    #[tokio::test]
    async fn test_admin_leaving_hands_over() {
        let Fixture {
            collab,
            admin,
            users,
        } = fixture();
        let parties = &collab.parties;

        let party = parties
            .create(admin.id, new_party(Visibility::Public))
            .await
            .expect("creates party");

        parties.join(party.id(), users[0].id).await.expect("joins");
        parties.join(party.id(), users[1].id).await.expect("joins");

        let (sender, mut events) = unbounded_channel();
        let _follower = party.connect(users[1].id, sender).expect("connects");

        parties.leave(party.id(), admin.id).await.expect("leaves");

        assert_eq!(party.admin_id(), users[0].id);
        assert!(party.is_member(party.admin_id()));
        assert!(!party.is_member(admin.id));

        let stored = collab
            .database
            .party_by_id(party.id())
            .await
            .expect("party exists");
        assert_eq!(stored.admin_id, users[0].id);

        assert!(drain(&mut events).into_iter().any(|e| matches!(
            e,
            ServerEvent::PartyLeft { user_id, new_admin_id: Some(new_admin), .. }
                if user_id == admin.id && new_admin == users[0].id
        )));
    }

    #[tokio::test]
    async fn test_last_member_leaving_deactivates() {
        let Fixture {
            collab,
            admin,
            users,
        } = fixture();
        let parties = &collab.parties;

        let party = parties
            .create(admin.id, new_party(Visibility::Public))
            .await
            .expect("creates party");

        assert!(matches!(
            parties.leave(party.id(), users[0].id).await,
            Err(PartyError::NotAMember)
        ));

        parties.leave(party.id(), admin.id).await.expect("leaves");

        assert!(parties.list_active().is_empty());

        let stored = collab
            .database
            .party_by_id(party.id())
            .await
            .expect("party is kept");
        assert!(!stored.is_active);

        let deleted = collab
            .events()
            .try_iter()
            .any(|e| matches!(e, CollabEvent::PartyDeleted { deleted_by: None, .. }));
        assert!(deleted);
    }

    #[tokio::test]
    async fn test_join_queued_behind_deactivation_finds_party_gone() {
        let Fixture {
            collab,
            admin,
            users,
        } = fixture();
        let collab = Arc::new(collab);
        let joiner = users[0].id;

        let party = collab
            .parties
            .create(admin.id, new_party(Visibility::Public))
            .await
            .expect("creates party");
        let party_id = party.id();

        // Queue both operations behind a held lock, leave first
        let operation = party.lock_operations().await.expect("party is live");

        let leaving = tokio::spawn({
            let collab = collab.clone();
            async move { collab.parties.leave(party_id, admin.id).await }
        });
        tokio::task::yield_now().await;

        let joining = tokio::spawn({
            let collab = collab.clone();
            async move { collab.parties.join(party_id, joiner).await }
        });
        tokio::task::yield_now().await;

        drop(operation);

        leaving.await.expect("task completes").expect("leaves");
        assert!(matches!(
            joining.await.expect("task completes"),
            Err(PartyError::NotFound("party"))
        ));

        assert!(!party.is_live());
        assert!(!party.is_member(joiner));

        let stored = collab
            .database
            .party_by_id(party_id)
            .await
            .expect("party is kept");
        assert!(!stored.is_active);
        assert!(stored.members.is_empty());
    }
}
