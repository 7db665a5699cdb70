//! Group formation offers produced by the queue

use crate::types::{
    DungeonId, EntityRef, GroupId, LfgAnswer, PlayerId, ProposalId, ProposalState, QueuePool,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// A player's slot in a proposal
#[derive(Debug, Clone, PartialEq)]
pub struct ProposalPlayer {
    /// Resolved role, leader flag included
    pub role: u8,
    pub answer: LfgAnswer,
    /// Group the player queued with, if any
    pub group: Option<GroupId>,
}

/// An offer to form a group for one dungeon
#[derive(Debug, Clone)]
pub struct Proposal {
    pub id: ProposalId,
    pub pool: QueuePool,
    pub dungeon_id: DungeonId,
    pub state: ProposalState,
    /// LFG group continuing its dungeon, if one is part of the offer
    pub group: Option<GroupId>,
    pub leader: PlayerId,
    pub cancel_time: DateTime<Utc>,
    /// A brand new group will be created on success
    pub is_new: bool,
    /// Queue entries the offer was built from
    pub queues: Vec<EntityRef>,
    pub players: BTreeMap<PlayerId, ProposalPlayer>,
}

impl Proposal {
    pub fn all_agreed(&self) -> bool {
        self.players.values().all(|p| p.answer == LfgAnswer::Agree)
    }

    pub fn has_pending(&self) -> bool {
        self.players.values().any(|p| p.answer == LfgAnswer::Pending)
    }

    pub fn contains_player(&self, player: PlayerId) -> bool {
        self.players.contains_key(&player)
    }

    /// Queue entry a player came from
    pub fn entity_of(&self, player: PlayerId) -> Option<EntityRef> {
        let slot = self.players.get(&player)?;
        Some(match slot.group {
            Some(group) => EntityRef::Group(group),
            None => EntityRef::Player(player),
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.cancel_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_proposal() -> Proposal {
        let mut players = BTreeMap::new();
        players.insert(
            1,
            ProposalPlayer {
                role: 2,
                answer: LfgAnswer::Agree,
                group: Some(50),
            },
        );
        players.insert(
            2,
            ProposalPlayer {
                role: 4,
                answer: LfgAnswer::Pending,
                group: None,
            },
        );
        Proposal {
            id: 1,
            pool: QueuePool::Shared,
            dungeon_id: 10,
            state: ProposalState::Initiating,
            group: None,
            leader: 1,
            cancel_time: Utc::now(),
            is_new: true,
            queues: vec![EntityRef::Group(50), EntityRef::Player(2)],
            players,
        }
    }

    #[test]
    fn test_answers() {
        let mut proposal = create_test_proposal();
        assert!(!proposal.all_agreed());
        assert!(proposal.has_pending());

        proposal.players.get_mut(&2).unwrap().answer = LfgAnswer::Agree;
        assert!(proposal.all_agreed());
    }

    #[test]
    fn test_entity_of() {
        let proposal = create_test_proposal();
        assert_eq!(proposal.entity_of(1), Some(EntityRef::Group(50)));
        assert_eq!(proposal.entity_of(2), Some(EntityRef::Player(2)));
        assert_eq!(proposal.entity_of(3), None);
    }
}
