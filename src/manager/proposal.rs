//! Proposal voting and settlement

use super::LfgManager;
use crate::notify::{Notification, ProposalMember};
use crate::queue::Proposal;
use crate::types::{
    roles, EntityRef, LfgAnswer, LfgState, LfgUpdateType, PlayerId, ProposalId, ProposalState,
};
use crate::utils::elapsed_ms;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Proposal update as seen by `recipient`
pub(super) fn proposal_notification(proposal: &Proposal, recipient: PlayerId) -> Notification {
    let recipient_group = proposal.players.get(&recipient).and_then(|s| s.group);
    let members = proposal
        .players
        .iter()
        .map(|(player, slot)| ProposalMember {
            player: *player,
            role: slot.role,
            answer: slot.answer,
            same_group: recipient_group.is_some() && slot.group == recipient_group,
            in_dungeon: proposal.group.is_some() && slot.group == proposal.group,
        })
        .collect();

    Notification::ProposalUpdate {
        proposal_id: proposal.id,
        state: proposal.state,
        dungeon_id: proposal.dungeon_id,
        continuing: !proposal.is_new,
        members,
    }
}

impl LfgManager {
    /// Number a freshly matched proposal and offer it to its players.
    /// Returns true when it was settled right away because everyone had
    /// already agreed.
    pub(super) fn register_proposal(&mut self, mut proposal: Proposal) -> bool {
        self.last_proposal_id += 1;
        let id = self.last_proposal_id;
        proposal.id = id;

        for player in proposal.players.keys() {
            self.store
                .set_state(EntityRef::Player(*player), LfgState::Proposal);
            let selected = self.get_selected_dungeons(*player);
            match self.store.player_group(*player) {
                Some(group) => {
                    self.store
                        .set_state(EntityRef::Group(group), LfgState::Proposal);
                    self.send_update(*player, LfgUpdateType::ProposalBegin, &selected, true);
                }
                None => {
                    self.send_update(*player, LfgUpdateType::ProposalBegin, &selected, false);
                }
            }
            self.send(*player, proposal_notification(&proposal, *player));
        }

        self.stats.proposals_created += 1;
        let settle = proposal.all_agreed();
        let leader = proposal.leader;
        self.proposals.insert(id, proposal);

        if settle {
            self.update_proposal(id, leader, true);
        }
        settle
    }

    /// Record a player's answer to a proposal
    pub fn update_proposal(&mut self, proposal_id: ProposalId, player: PlayerId, accept: bool) {
        let Some(proposal) = self.proposals.get_mut(&proposal_id) else {
            debug!("Answer from {} for unknown proposal {}", player, proposal_id);
            return;
        };
        let Some(slot) = proposal.players.get_mut(&player) else {
            debug!("Player {} is not part of proposal {}", player, proposal_id);
            return;
        };
        slot.answer = LfgAnswer::from_accept(accept);
        debug!(
            "Player {} {} proposal {}",
            player,
            if accept { "accepted" } else { "declined" },
            proposal_id
        );

        if !accept {
            self.remove_proposal(proposal_id, LfgUpdateType::ProposalDeclined);
            return;
        }

        if !proposal.all_agreed() {
            let proposal = proposal.clone();
            for member in proposal.players.keys() {
                self.send(*member, proposal_notification(&proposal, *member));
            }
            return;
        }

        let Some(mut proposal) = self.proposals.remove(&proposal_id) else {
            return;
        };
        let send_update = proposal.state != ProposalState::Success;
        proposal.state = ProposalState::Success;
        let now = self.now();
        let pool = proposal.pool;

        for (member, slot) in &proposal.players {
            let entity = slot
                .group
                .map_or(EntityRef::Player(*member), EntityRef::Group);
            if send_update {
                self.send(*member, proposal_notification(&proposal, *member));
            }

            let party = slot.group.is_some();
            self.send_update(*member, LfgUpdateType::GroupFound, &BTreeSet::new(), party);
            self.send_update(*member, LfgUpdateType::RemovedFromQueue, &BTreeSet::new(), party);

            let role = self.get_roles(*member) & !roles::LEADER;
            let queue = self.queue_mut(pool);
            let sample = queue
                .queue_data(&entity)
                .map(|d| (elapsed_ms(d.join_time, now), d.first_dungeon()));
            if let Some((wait_ms, dungeon)) = sample {
                match role {
                    roles::TANK => queue.update_wait_time_tank(wait_ms, dungeon),
                    roles::HEALER => queue.update_wait_time_healer(wait_ms, dungeon),
                    roles::DAMAGE => queue.update_wait_time_dps(wait_ms, dungeon),
                    _ => queue.update_wait_time_avg(wait_ms, dungeon),
                }
            }

            self.store
                .set_state(EntityRef::Player(*member), LfgState::Dungeon);
        }

        let queue = self.queue_mut(pool);
        for entity in &proposal.queues {
            queue.remove_from_queue(*entity);
        }

        info!(
            "Proposal {} accepted by all {} players for dungeon {}",
            proposal.id,
            proposal.players.len(),
            proposal.dungeon_id
        );
        self.stats.proposals_succeeded += 1;
        self.make_new_group(&proposal);
    }

    /// Dissolve a proposal. Entities that declined, or contain someone who
    /// did, leave the queue; everyone else goes back to the front of it.
    pub(super) fn remove_proposal(&mut self, proposal_id: ProposalId, update: LfgUpdateType) {
        let Some(mut proposal) = self.proposals.remove(&proposal_id) else {
            return;
        };
        proposal.state = ProposalState::Failed;
        debug!("Removing proposal {} ({:?})", proposal_id, update);

        if update == LfgUpdateType::ProposalFailed {
            for slot in proposal.players.values_mut() {
                if slot.answer == LfgAnswer::Pending {
                    slot.answer = LfgAnswer::Deny;
                }
            }
        }

        let mut to_remove = BTreeSet::new();
        for (player, slot) in proposal.players.iter_mut() {
            if slot.answer == LfgAnswer::Agree {
                continue;
            }
            if slot.answer == LfgAnswer::Deny || update == LfgUpdateType::ProposalFailed {
                slot.answer = LfgAnswer::Deny;
                to_remove.insert(slot.group.map_or(EntityRef::Player(*player), EntityRef::Group));
            }
        }

        for (player, slot) in &proposal.players {
            let entity = slot.group.map_or(EntityRef::Player(*player), EntityRef::Group);
            self.send(*player, proposal_notification(&proposal, *player));

            if to_remove.contains(&entity) {
                let kind = if slot.answer == LfgAnswer::Deny {
                    debug!("Player {} did not accept proposal {}, leaving the queue", player, proposal_id);
                    update
                } else {
                    debug!("Player {} shares a group with a decliner, leaving the queue", player);
                    LfgUpdateType::RemovedFromQueue
                };
                self.store
                    .restore_state(EntityRef::Player(*player), "proposal failed");
                if let Some(group) = slot.group {
                    self.store
                        .restore_state(EntityRef::Group(group), "proposal failed");
                }
                self.send_update(*player, kind, &BTreeSet::new(), slot.group.is_some());
            } else {
                self.store
                    .set_state(EntityRef::Player(*player), LfgState::Queued);
                if let Some(group) = slot.group {
                    self.store.set_state(EntityRef::Group(group), LfgState::Queued);
                }
                let selected = self.get_selected_dungeons(*player);
                self.send_update(*player, LfgUpdateType::AddedToQueue, &selected, slot.group.is_some());
            }
        }

        let queue = self.queue_mut(proposal.pool);
        for entity in &to_remove {
            queue.remove_from_queue(*entity);
        }
        for entity in proposal.queues.iter().filter(|e| !to_remove.contains(e)) {
            queue.add_to_queue(*entity, true);
        }

        self.stats.proposals_failed += 1;
        info!(
            "Proposal {} failed, {} entries dropped from the queue",
            proposal_id,
            to_remove.len()
        );
    }

    /// Fail every proposal past its deadline
    pub(super) fn expire_proposals(&mut self, now: DateTime<Utc>) -> usize {
        let expired: Vec<ProposalId> = self
            .proposals
            .values()
            .filter(|p| p.is_expired(now))
            .map(|p| p.id)
            .collect();
        for id in &expired {
            self.remove_proposal(*id, LfgUpdateType::ProposalFailed);
        }
        expired.len()
    }
}
