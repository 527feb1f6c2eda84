use async_trait::async_trait;
use aura_core::{RequestStatus, Visibility};
use thiserror::Error;

mod data;
pub use data::*;

mod memory;
pub use memory::*;

mod pg;
pub use pg::*;

pub type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the database doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
}

/// Helper trait to reduce boilerplate
pub trait IntoDatabaseError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError;
    fn any(self) -> DatabaseError;
}

/// Helper trait to reduce boilerplate
pub trait DatabaseResult {
    /// Turns the Result into a conflict error if it's Ok()
    fn conflict_or_ok(self, resource: &'static str, field: &'static str, value: &str)
        -> Result<()>;
}

impl<T> DatabaseResult for Result<T> {
    fn conflict_or_ok(
        self,
        resource: &'static str,
        field: &'static str,
        value: &str,
    ) -> Result<()> {
        match self {
            Ok(_) => Err(DatabaseError::Conflict {
                resource,
                field,
                value: value.to_string(),
            }),
            Err(DatabaseError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Represents a type that can fetch party data from a database
#[async_trait]
pub trait Database: Send + Sync {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData>;
    async fn session_by_token(&self, token: &str) -> Result<SessionData>;

    async fn party_by_id(&self, party_id: PrimaryKey) -> Result<PartyData>;
    async fn list_active_parties(&self) -> Result<Vec<PartyData>>;
    /// Creates a party with its admin as the only member
    async fn create_party(&self, new_party: NewParty) -> Result<PartyData>;
    async fn update_party_admin(&self, party_id: PrimaryKey, admin_id: PrimaryKey) -> Result<()>;
    async fn deactivate_party(&self, party_id: PrimaryKey) -> Result<()>;
    /// Deletes a party along with its members, messages, and join requests
    async fn delete_party(&self, party_id: PrimaryKey) -> Result<()>;
    async fn create_party_member(&self, new_member: NewPartyMember) -> Result<PartyMemberData>;
    async fn delete_party_member(&self, party_id: PrimaryKey, user_id: PrimaryKey) -> Result<()>;

    async fn join_request_by_id(&self, request_id: PrimaryKey) -> Result<JoinRequestData>;
    /// Returns the most recent request a user made for a party
    async fn latest_join_request(
        &self,
        party_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<JoinRequestData>;
    async fn list_join_requests(
        &self,
        party_id: PrimaryKey,
        status: RequestStatus,
    ) -> Result<Vec<JoinRequestData>>;
    async fn create_join_request(&self, new_request: NewJoinRequest) -> Result<JoinRequestData>;
    async fn update_join_request(
        &self,
        request_id: PrimaryKey,
        status: RequestStatus,
    ) -> Result<JoinRequestData>;

    async fn create_party_message(&self, new_message: NewPartyMessage) -> Result<PartyMessageData>;
    /// Returns the most recent messages of a party, oldest first
    async fn list_party_messages(
        &self,
        party_id: PrimaryKey,
        limit: usize,
    ) -> Result<Vec<PartyMessageData>>;
}

#[derive(Debug)]
pub struct NewParty {
    pub name: String,
    pub visibility: Visibility,
    pub media_ref: String,
    /// The creator, and first admin, of the new party
    pub admin_id: PrimaryKey,
}

#[derive(Debug)]
pub struct NewPartyMember {
    pub party_id: PrimaryKey,
    pub user_id: PrimaryKey,
}

#[derive(Debug)]
pub struct NewJoinRequest {
    pub party_id: PrimaryKey,
    pub user_id: PrimaryKey,
}

#[derive(Debug)]
pub struct NewPartyMessage {
    pub party_id: PrimaryKey,
    pub user_id: PrimaryKey,
    pub content: String,
}
