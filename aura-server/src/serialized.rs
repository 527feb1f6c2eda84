//! All schemas that are exposed from endpoints are defined here
//! along with the ToSerialized impls

use std::sync::Arc;

use aura_collab::{JoinOutcome, JoinRequestData, Party as CollabParty, UserData};
use aura_core::{extract_video_id, ChatMessage, MemberSummary, PartySummary, Visibility};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct User {
    id: i32,
    username: String,
    display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PartyType {
    Public,
    #[default]
    Private,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Party {
    id: i32,
    name: String,
    #[serde(rename = "type")]
    party_type: PartyType,
    media_ref: String,
    /// The YouTube video id, if the media reference could be resolved
    video_id: Option<String>,
    admin_id: i32,
    members: Vec<User>,
    /// Users that currently have the room open
    connected: Vec<i32>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JoinRequest {
    id: i32,
    party_id: i32,
    status: String,
    created_at: DateTime<Utc>,
    user: User,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Message {
    id: Option<i32>,
    party_id: i32,
    message: String,
    user_id: i32,
    username: String,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JoinResult {
    /// False if the user was already a member
    joined: bool,
    party: Party,
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl ToSerialized<User> for UserData {
    fn to_serialized(&self) -> User {
        User {
            id: self.id,
            username: self.username.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

impl ToSerialized<User> for MemberSummary {
    fn to_serialized(&self) -> User {
        User {
            id: self.id,
            username: self.username.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

impl From<Visibility> for PartyType {
    fn from(value: Visibility) -> Self {
        match value {
            Visibility::Public => Self::Public,
            Visibility::Private => Self::Private,
        }
    }
}

impl From<PartyType> for Visibility {
    fn from(value: PartyType) -> Self {
        match value {
            PartyType::Public => Self::Public,
            PartyType::Private => Self::Private,
        }
    }
}

impl ToSerialized<Party> for PartySummary {
    fn to_serialized(&self) -> Party {
        Party {
            id: self.id,
            name: self.name.clone(),
            party_type: self.visibility.into(),
            media_ref: self.media_ref.clone(),
            video_id: extract_video_id(&self.media_ref).ok(),
            admin_id: self.admin_id,
            members: self.members.to_serialized(),
            connected: vec![],
            created_at: self.created_at,
        }
    }
}

impl ToSerialized<Party> for Arc<CollabParty> {
    fn to_serialized(&self) -> Party {
        let mut connected: Vec<_> = self
            .current_connections()
            .into_iter()
            .map(|c| c.user_id)
            .collect();

        connected.sort_unstable();
        connected.dedup();

        Party {
            connected,
            ..self.summary().to_serialized()
        }
    }
}

impl ToSerialized<JoinRequest> for JoinRequestData {
    fn to_serialized(&self) -> JoinRequest {
        JoinRequest {
            id: self.id,
            party_id: self.party_id,
            status: self.status.to_string(),
            created_at: self.created_at,
            user: self.user.to_serialized(),
        }
    }
}

impl ToSerialized<Message> for ChatMessage {
    fn to_serialized(&self) -> Message {
        Message {
            id: self.id,
            party_id: self.party_id,
            message: self.message.clone(),
            user_id: self.user_id,
            username: self.username.clone(),
            timestamp: self.timestamp,
        }
    }
}

impl JoinResult {
    pub fn new(outcome: JoinOutcome, party: Party) -> Self {
        Self {
            joined: outcome == JoinOutcome::Joined,
            party,
        }
    }
}
