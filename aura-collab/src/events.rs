use aura_core::{MemberSummary, PartySummary};
use crossbeam::channel::{Receiver, Sender};

use crate::PrimaryKey;

pub type EventSender = Sender<CollabEvent>;
pub type EventReceiver = Receiver<CollabEvent>;

/// Events for lobby listeners, such as party list views.
/// Room-scoped events go straight to the room's connections instead.
#[derive(Debug, Clone)]
pub enum CollabEvent {
    /// A party was created and can be discovered
    PartyCreated { party: PartySummary },
    /// A party was deleted, or deactivated because its last member left
    PartyDeleted {
        party_id: PrimaryKey,
        /// None if nobody deleted it explicitly
        deleted_by: Option<PrimaryKey>,
    },
    /// The members of a party changed
    PartyMembersUpdate {
        party_id: PrimaryKey,
        admin_id: PrimaryKey,
        members: Vec<MemberSummary>,
    },
}
