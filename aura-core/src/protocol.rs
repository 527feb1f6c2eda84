//! The events exchanged over a room channel.
//!
//! Both directions are closed enums, so every handler has to account for every event kind.
//! Payload field names follow the wire format clients already speak.

use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ChatMessage;

/// The type used for database-backed identifiers.
pub type PrimaryKey = i32;
pub type UserId = PrimaryKey;
pub type PartyId = PrimaryKey;
pub type MessageId = PrimaryKey;
pub type RequestId = PrimaryKey;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    #[default]
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

/// The small, fixed set of emoji a reaction can be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Emoji {
    #[serde(rename = "❤️")]
    Heart,
    #[serde(rename = "😂")]
    Laugh,
    #[serde(rename = "😮")]
    Wow,
    #[serde(rename = "😢")]
    Sad,
    #[serde(rename = "😡")]
    Angry,
}

/// Which local player event caused a `video_state_change`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackChange {
    Play,
    Pause,
    Seek,
}

/// Orders broadcasts from a single admin session.
/// `session` changes whenever a new admin clock starts, `seq` increases with every broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStamp {
    pub session: u64,
    pub seq: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSummary {
    pub id: UserId,
    pub username: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartySummary {
    pub id: PartyId,
    pub name: String,
    #[serde(rename = "type")]
    pub visibility: Visibility,
    pub media_ref: String,
    pub admin_id: UserId,
    pub members: Vec<MemberSummary>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRequestSummary {
    pub id: RequestId,
    pub party_id: PartyId,
    pub user_id: UserId,
    pub username: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionPayload {
    pub party_id: PartyId,
    pub emoji: Emoji,
    pub user_id: UserId,
    pub username: String,
    pub timestamp: DateTime<Utc>,
}

/// Events sent by a client to the server.
/// The acting user is never part of the payload, it comes from the authenticated connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ClientEvent {
    /// Subscribe to a party's room channel
    JoinParty { party_id: PartyId },
    /// Unsubscribe from a party's room channel
    LeaveParty { party_id: PartyId },
    /// The admin's local player changed state
    VideoStateChange {
        party_id: PartyId,
        state: PlaybackChange,
        current_time: f64,
        is_playing: bool,
        #[serde(default)]
        stamp: Option<SyncStamp>,
    },
    /// The admin's periodic or on-demand position broadcast
    AdminSync {
        party_id: PartyId,
        current_time: f64,
        is_playing: bool,
        #[serde(default)]
        stamp: Option<SyncStamp>,
    },
    /// A follower asks the admin for its position right away
    RequestSync { party_id: PartyId },
    PartyMessage { party_id: PartyId, message: String },
    PartyReaction { party_id: PartyId, emoji: Emoji },
}

/// Events sent by the server to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ServerEvent {
    /// A user became a member of a party
    PartyJoined {
        party_id: PartyId,
        user_id: UserId,
        members: Vec<MemberSummary>,
    },
    /// A user stopped being a member of a party
    PartyLeft {
        party_id: PartyId,
        user_id: UserId,
        /// Set when the leaving user was the admin and someone else took over
        #[serde(default)]
        new_admin_id: Option<UserId>,
    },
    /// A user was removed by the admin, and must leave the room
    UserKicked {
        party_id: PartyId,
        user_id: UserId,
        kicked_by: UserId,
    },
    /// A party was created. Lobby scoped
    PartyCreated { party: PartySummary },
    /// A party no longer exists. Sent to the room and the lobby
    PartyDeleted {
        party_id: PartyId,
        #[serde(default)]
        deleted_by: Option<UserId>,
    },
    /// A non-member asked to join a private party
    JoinRequested {
        party_id: PartyId,
        request: JoinRequestSummary,
    },
    /// A member opened the room channel
    MemberConnected { party_id: PartyId, user_id: UserId },
    /// A member closed the room channel
    MemberDisconnected { party_id: PartyId, user_id: UserId },
    /// Relay of the admin's `video_state_change`
    VideoSync {
        party_id: PartyId,
        state: PlaybackChange,
        current_time: f64,
        is_playing: bool,
        #[serde(default)]
        stamp: Option<SyncStamp>,
    },
    /// Relay of the admin's `admin_sync`
    AdminSync {
        party_id: PartyId,
        current_time: f64,
        is_playing: bool,
        #[serde(default)]
        stamp: Option<SyncStamp>,
    },
    /// Relay of a follower's `request_sync`, only delivered to the admin
    SyncRequested { party_id: PartyId },
    PartyMessage(ChatMessage),
    PartyReaction(ReactionPayload),
    /// Something the client sent was refused
    Error { message: String },
}

impl ClientEvent {
    pub fn party_id(&self) -> PartyId {
        match self {
            Self::JoinParty { party_id }
            | Self::LeaveParty { party_id }
            | Self::VideoStateChange { party_id, .. }
            | Self::AdminSync { party_id, .. }
            | Self::RequestSync { party_id }
            | Self::PartyMessage { party_id, .. }
            | Self::PartyReaction { party_id, .. } => *party_id,
        }
    }
}

impl ServerEvent {
    /// Returns the party this event is about, if any
    pub fn party_id(&self) -> Option<PartyId> {
        match self {
            Self::PartyJoined { party_id, .. }
            | Self::PartyLeft { party_id, .. }
            | Self::UserKicked { party_id, .. }
            | Self::PartyDeleted { party_id, .. }
            | Self::JoinRequested { party_id, .. }
            | Self::MemberConnected { party_id, .. }
            | Self::MemberDisconnected { party_id, .. }
            | Self::VideoSync { party_id, .. }
            | Self::AdminSync { party_id, .. }
            | Self::SyncRequested { party_id } => Some(*party_id),
            Self::PartyCreated { party } => Some(party.id),
            Self::PartyMessage(message) => Some(message.party_id),
            Self::PartyReaction(reaction) => Some(reaction.party_id),
            Self::Error { .. } => None,
        }
    }
}

impl Emoji {
    pub const ALL: [Emoji; 5] = [Self::Heart, Self::Laugh, Self::Wow, Self::Sad, Self::Angry];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Heart => "❤️",
            Self::Laugh => "😂",
            Self::Wow => "😮",
            Self::Sad => "😢",
            Self::Angry => "😡",
        }
    }
}

impl Display for Emoji {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Emoji {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| format!("{s} is not a supported reaction"))
    }
}

impl Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Public => f.write_str("public"),
            Self::Private => f.write_str("private"),
        }
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            other => Err(format!("{other} is not a party type")),
        }
    }
}

impl Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Approved => f.write_str("approved"),
            Self::Rejected => f.write_str("rejected"),
        }
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("{other} is not a request status")),
        }
    }
}
