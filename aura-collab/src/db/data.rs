use aura_core::{
    ChatMessage, JoinRequestSummary, MemberSummary, PartySummary, RequestStatus, Visibility,
};
use chrono::{DateTime, Utc};

pub use aura_core::PrimaryKey;

/// An AuraChat account. Accounts are owned by the account service, parties only read them
#[derive(Debug, Clone)]
pub struct UserData {
    pub id: PrimaryKey,
    pub username: String,
    pub display_name: String,
}

/// Login session data for authentication
#[derive(Debug, Clone)]
pub struct SessionData {
    pub id: PrimaryKey,
    /// The session token, or key if you will
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// The user that is logged in
    pub user: UserData,
}

/// A watch party
#[derive(Debug, Clone)]
pub struct PartyData {
    pub id: PrimaryKey,
    pub name: String,
    pub visibility: Visibility,
    /// The video this party watches, as given by its creator
    pub media_ref: String,
    pub admin_id: PrimaryKey,
    /// Inactive parties are kept in the database but no longer listed or joinable
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub members: Vec<PartyMemberData>,
}

/// A member of a party
#[derive(Debug, Clone)]
pub struct PartyMemberData {
    pub id: PrimaryKey,
    pub joined_at: DateTime<Utc>,
    pub user: UserData,
}

/// A request by a non-member to join a private party
#[derive(Debug, Clone)]
pub struct JoinRequestData {
    pub id: PrimaryKey,
    pub party_id: PrimaryKey,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    /// The user who wants to join
    pub user: UserData,
}

/// A stored chat message
#[derive(Debug, Clone)]
pub struct PartyMessageData {
    pub id: PrimaryKey,
    pub party_id: PrimaryKey,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub user: UserData,
}

impl PartyData {
    pub fn summary(&self) -> PartySummary {
        PartySummary {
            id: self.id,
            name: self.name.clone(),
            visibility: self.visibility,
            media_ref: self.media_ref.clone(),
            admin_id: self.admin_id,
            members: self.members.iter().map(PartyMemberData::summary).collect(),
            created_at: self.created_at,
        }
    }

    pub fn member_by_user_id(&self, user_id: PrimaryKey) -> Option<&PartyMemberData> {
        self.members.iter().find(|m| m.user.id == user_id)
    }
}

impl PartyMemberData {
    pub fn summary(&self) -> MemberSummary {
        MemberSummary {
            id: self.user.id,
            username: self.user.username.clone(),
            display_name: self.user.display_name.clone(),
        }
    }
}

impl JoinRequestData {
    pub fn summary(&self) -> JoinRequestSummary {
        JoinRequestSummary {
            id: self.id,
            party_id: self.party_id,
            user_id: self.user.id,
            username: self.user.username.clone(),
            status: self.status,
            created_at: self.created_at,
        }
    }
}

impl PartyMessageData {
    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage {
            id: Some(self.id),
            party_id: self.party_id,
            message: self.content.clone(),
            user_id: self.user.id,
            username: self.user.username.clone(),
            timestamp: self.created_at,
        }
    }
}
