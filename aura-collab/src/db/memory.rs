use async_trait::async_trait;
use aura_core::RequestStatus;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::{
    Database, DatabaseError, JoinRequestData, NewJoinRequest, NewParty, NewPartyMember,
    NewPartyMessage, PartyData, PartyMemberData, PartyMessageData, PrimaryKey, Result,
    SessionData, UserData,
};

/// A database kept entirely in memory.
/// Used when no database url is configured, and in tests.
#[derive(Default)]
pub struct MemoryDatabase {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    last_id: PrimaryKey,

    users: Vec<UserData>,
    sessions: Vec<SessionRecord>,
    parties: Vec<PartyRecord>,
    members: Vec<MemberRecord>,
    requests: Vec<RequestRecord>,
    messages: Vec<MessageRecord>,
}

struct SessionRecord {
    id: PrimaryKey,
    token: String,
    user_id: PrimaryKey,
    expires_at: DateTime<Utc>,
}

struct PartyRecord {
    id: PrimaryKey,
    name: String,
    visibility: aura_core::Visibility,
    media_ref: String,
    admin_id: PrimaryKey,
    is_active: bool,
    created_at: DateTime<Utc>,
}

struct MemberRecord {
    id: PrimaryKey,
    party_id: PrimaryKey,
    user_id: PrimaryKey,
    joined_at: DateTime<Utc>,
}

struct RequestRecord {
    id: PrimaryKey,
    party_id: PrimaryKey,
    user_id: PrimaryKey,
    status: RequestStatus,
    created_at: DateTime<Utc>,
}

struct MessageRecord {
    id: PrimaryKey,
    party_id: PrimaryKey,
    user_id: PrimaryKey,
    content: String,
    created_at: DateTime<Utc>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an account, as the account service would
    pub fn insert_user(&self, username: &str, display_name: &str) -> UserData {
        let mut state = self.state.lock();

        let user = UserData {
            id: state.next_id(),
            username: username.to_string(),
            display_name: display_name.to_string(),
        };

        state.users.push(user.clone());
        user
    }

    /// Adds a login session valid for a week, as the account service would
    pub fn insert_session(&self, user_id: PrimaryKey, token: &str) -> Result<SessionData> {
        let mut state = self.state.lock();

        let record = SessionRecord {
            id: state.next_id(),
            token: token.to_string(),
            user_id,
            expires_at: Utc::now() + Duration::days(7),
        };

        let session = state.session_data(&record)?;
        state.sessions.push(record);

        Ok(session)
    }
}

impl MemoryState {
    fn next_id(&mut self) -> PrimaryKey {
        self.last_id += 1;
        self.last_id
    }

    fn user(&self, user_id: PrimaryKey) -> Result<UserData> {
        self.users
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "id",
            })
    }

    fn session_data(&self, record: &SessionRecord) -> Result<SessionData> {
        Ok(SessionData {
            id: record.id,
            token: record.token.clone(),
            expires_at: record.expires_at,
            user: self.user(record.user_id)?,
        })
    }

    fn party(&self, party_id: PrimaryKey) -> Result<PartyData> {
        let record = self
            .parties
            .iter()
            .find(|p| p.id == party_id)
            .ok_or(DatabaseError::NotFound {
                resource: "party",
                identifier: "id",
            })?;

        self.party_data(record)
    }

    fn party_data(&self, record: &PartyRecord) -> Result<PartyData> {
        let mut members: Vec<_> = self
            .members
            .iter()
            .filter(|m| m.party_id == record.id)
            .collect();

        members.sort_by_key(|m| (m.joined_at, m.id));

        let members = members
            .into_iter()
            .map(|m| self.member_data(m))
            .collect::<Result<Vec<_>>>()?;

        Ok(PartyData {
            id: record.id,
            name: record.name.clone(),
            visibility: record.visibility,
            media_ref: record.media_ref.clone(),
            admin_id: record.admin_id,
            is_active: record.is_active,
            created_at: record.created_at,
            members,
        })
    }

    fn member_data(&self, record: &MemberRecord) -> Result<PartyMemberData> {
        Ok(PartyMemberData {
            id: record.id,
            joined_at: record.joined_at,
            user: self.user(record.user_id)?,
        })
    }

    fn request(&self, request_id: PrimaryKey) -> Result<JoinRequestData> {
        let record = self
            .requests
            .iter()
            .find(|r| r.id == request_id)
            .ok_or(DatabaseError::NotFound {
                resource: "join request",
                identifier: "id",
            })?;

        self.request_data(record)
    }

    fn request_data(&self, record: &RequestRecord) -> Result<JoinRequestData> {
        Ok(JoinRequestData {
            id: record.id,
            party_id: record.party_id,
            status: record.status,
            created_at: record.created_at,
            user: self.user(record.user_id)?,
        })
    }

    fn message_data(&self, record: &MessageRecord) -> Result<PartyMessageData> {
        Ok(PartyMessageData {
            id: record.id,
            party_id: record.party_id,
            content: record.content.clone(),
            created_at: record.created_at,
            user: self.user(record.user_id)?,
        })
    }

    fn party_record_mut(&mut self, party_id: PrimaryKey) -> Result<&mut PartyRecord> {
        self.parties
            .iter_mut()
            .find(|p| p.id == party_id)
            .ok_or(DatabaseError::NotFound {
                resource: "party",
                identifier: "id",
            })
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        self.state.lock().user(user_id)
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        let state = self.state.lock();
        let now = Utc::now();

        let record = state
            .sessions
            .iter()
            .find(|s| s.token == token && s.expires_at > now)
            .ok_or(DatabaseError::NotFound {
                resource: "session",
                identifier: "token",
            })?;

        state.session_data(record)
    }

    async fn party_by_id(&self, party_id: PrimaryKey) -> Result<PartyData> {
        self.state.lock().party(party_id)
    }

    async fn list_active_parties(&self) -> Result<Vec<PartyData>> {
        let state = self.state.lock();

        let mut parties = state
            .parties
            .iter()
            .filter(|p| p.is_active)
            .map(|p| state.party_data(p))
            .collect::<Result<Vec<_>>>()?;

        parties.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(parties)
    }

    async fn create_party(&self, new_party: NewParty) -> Result<PartyData> {
        let mut state = self.state.lock();
        state.user(new_party.admin_id)?;

        let now = Utc::now();
        let party_id = state.next_id();
        let member_id = state.next_id();

        state.parties.push(PartyRecord {
            id: party_id,
            name: new_party.name,
            visibility: new_party.visibility,
            media_ref: new_party.media_ref,
            admin_id: new_party.admin_id,
            is_active: true,
            created_at: now,
        });

        state.members.push(MemberRecord {
            id: member_id,
            party_id,
            user_id: new_party.admin_id,
            joined_at: now,
        });

        state.party(party_id)
    }

    async fn update_party_admin(&self, party_id: PrimaryKey, admin_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.lock();
        state.party_record_mut(party_id)?.admin_id = admin_id;

        Ok(())
    }

    async fn deactivate_party(&self, party_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.lock();
        state.party_record_mut(party_id)?.is_active = false;

        Ok(())
    }

    async fn delete_party(&self, party_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.lock();

        // Ensure party exists
        state.party_record_mut(party_id)?;

        state.parties.retain(|p| p.id != party_id);
        state.members.retain(|m| m.party_id != party_id);
        state.requests.retain(|r| r.party_id != party_id);
        state.messages.retain(|m| m.party_id != party_id);

        Ok(())
    }

    async fn create_party_member(&self, new_member: NewPartyMember) -> Result<PartyMemberData> {
        let mut state = self.state.lock();

        state.party_record_mut(new_member.party_id)?;
        state.user(new_member.user_id)?;

        let exists = state
            .members
            .iter()
            .any(|m| m.party_id == new_member.party_id && m.user_id == new_member.user_id);

        if exists {
            return Err(DatabaseError::Conflict {
                resource: "party member",
                field: "party:user",
                value: format!("{}:{}", new_member.party_id, new_member.user_id),
            });
        }

        let record = MemberRecord {
            id: state.next_id(),
            party_id: new_member.party_id,
            user_id: new_member.user_id,
            joined_at: Utc::now(),
        };

        let member = state.member_data(&record)?;
        state.members.push(record);

        Ok(member)
    }

    async fn delete_party_member(&self, party_id: PrimaryKey, user_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.lock();

        let before = state.members.len();
        state
            .members
            .retain(|m| !(m.party_id == party_id && m.user_id == user_id));

        if state.members.len() == before {
            return Err(DatabaseError::NotFound {
                resource: "party member",
                identifier: "party_id:user_id",
            });
        }

        Ok(())
    }

    async fn join_request_by_id(&self, request_id: PrimaryKey) -> Result<JoinRequestData> {
        self.state.lock().request(request_id)
    }

    async fn latest_join_request(
        &self,
        party_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<JoinRequestData> {
        let state = self.state.lock();

        let record = state
            .requests
            .iter()
            .filter(|r| r.party_id == party_id && r.user_id == user_id)
            .max_by_key(|r| (r.created_at, r.id))
            .ok_or(DatabaseError::NotFound {
                resource: "join request",
                identifier: "party_id:user_id",
            })?;

        state.request_data(record)
    }

    async fn list_join_requests(
        &self,
        party_id: PrimaryKey,
        status: RequestStatus,
    ) -> Result<Vec<JoinRequestData>> {
        let state = self.state.lock();

        state
            .requests
            .iter()
            .filter(|r| r.party_id == party_id && r.status == status)
            .map(|r| state.request_data(r))
            .collect()
    }

    async fn create_join_request(&self, new_request: NewJoinRequest) -> Result<JoinRequestData> {
        let mut state = self.state.lock();

        state.party_record_mut(new_request.party_id)?;
        state.user(new_request.user_id)?;

        let id = state.next_id();

        state.requests.push(RequestRecord {
            id,
            party_id: new_request.party_id,
            user_id: new_request.user_id,
            status: RequestStatus::Pending,
            created_at: Utc::now(),
        });

        state.request(id)
    }

    async fn update_join_request(
        &self,
        request_id: PrimaryKey,
        status: RequestStatus,
    ) -> Result<JoinRequestData> {
        let mut state = self.state.lock();

        let record = state
            .requests
            .iter_mut()
            .find(|r| r.id == request_id)
            .ok_or(DatabaseError::NotFound {
                resource: "join request",
                identifier: "id",
            })?;

        record.status = status;
        state.request(request_id)
    }

    async fn create_party_message(&self, new_message: NewPartyMessage) -> Result<PartyMessageData> {
        let mut state = self.state.lock();

        state.party_record_mut(new_message.party_id)?;

        let record = MessageRecord {
            id: state.next_id(),
            party_id: new_message.party_id,
            user_id: new_message.user_id,
            content: new_message.content,
            created_at: Utc::now(),
        };

        let message = state.message_data(&record)?;
        state.messages.push(record);

        Ok(message)
    }

    async fn list_party_messages(
        &self,
        party_id: PrimaryKey,
        limit: usize,
    ) -> Result<Vec<PartyMessageData>> {
        let state = self.state.lock();

        let messages: Vec<_> = state
            .messages
            .iter()
            .filter(|m| m.party_id == party_id)
            .collect();

        let skip = messages.len().saturating_sub(limit);

        messages
            .into_iter()
            .skip(skip)
            .map(|m| state.message_data(m))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aura_core::Visibility;

    #[tokio::test]
    async fn test_party_lifecycle() {
        let db = MemoryDatabase::new();
        let admin = db.insert_user("ana", "Ana");
        let guest = db.insert_user("bo", "Bo");

        let party = db
            .create_party(NewParty {
                name: "Movie night".into(),
                visibility: Visibility::Private,
                media_ref: "https://youtu.be/JwRWf3ho4B8".into(),
                admin_id: admin.id,
            })
            .await
            .expect("creates party");

        assert_eq!(party.members.len(), 1);
        assert_eq!(party.members[0].user.id, admin.id);

        db.create_party_member(NewPartyMember {
            party_id: party.id,
            user_id: guest.id,
        })
        .await
        .expect("adds member");

        let conflict = db
            .create_party_member(NewPartyMember {
                party_id: party.id,
                user_id: guest.id,
            })
            .await;
        assert!(matches!(conflict, Err(DatabaseError::Conflict { .. })));

        db.delete_party(party.id).await.expect("deletes party");

        assert!(db.list_active_parties().await.expect("lists").is_empty());
        assert!(matches!(
            db.party_by_id(party.id).await,
            Err(DatabaseError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_messages_are_the_most_recent() {
        let db = MemoryDatabase::new();
        let admin = db.insert_user("ana", "Ana");

        let party = db
            .create_party(NewParty {
                name: "Movie night".into(),
                visibility: Visibility::Public,
                media_ref: "https://youtu.be/JwRWf3ho4B8".into(),
                admin_id: admin.id,
            })
            .await
            .expect("creates party");

        for i in 0..5 {
            db.create_party_message(NewPartyMessage {
                party_id: party.id,
                user_id: admin.id,
                content: format!("message {i}"),
            })
            .await
            .expect("creates message");
        }

        let messages = db
            .list_party_messages(party.id, 3)
            .await
            .expect("lists messages");

        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["message 2", "message 3", "message 4"]);
    }

    #[tokio::test]
    async fn test_sessions_resolve_to_users() {
        let db = MemoryDatabase::new();
        let user = db.insert_user("ana", "Ana");
        db.insert_session(user.id, "secret").expect("creates session");

        let session = db.session_by_token("secret").await.expect("finds session");
        assert_eq!(session.user.username, "ana");

        assert!(db.session_by_token("nope").await.is_err());
    }
}
