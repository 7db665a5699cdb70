//! Vote kicks inside dungeon finder groups

use super::events::GroupEvents;
use super::LfgManager;
use crate::notify::Notification;
use crate::types::{BootOutcome, GroupId, LfgAnswer, LfgState, PlayerId, RemoveMethod};
use crate::utils::deadline;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// A vote to remove a member
#[derive(Debug, Clone)]
pub struct Boot {
    pub cancel_time: DateTime<Utc>,
    pub in_progress: bool,
    pub victim: PlayerId,
    pub initiator: PlayerId,
    pub reason: String,
    pub votes: BTreeMap<PlayerId, LfgAnswer>,
    pub outcome: Option<BootOutcome>,
}

impl Boot {
    /// Agree and deny counts
    pub fn tally(&self) -> (u8, u8) {
        self.votes.values().fold((0, 0), |(agree, deny), vote| match vote {
            LfgAnswer::Agree => (agree + 1, deny),
            LfgAnswer::Deny => (agree, deny + 1),
            LfgAnswer::Pending => (agree, deny),
        })
    }

    fn notification(&self, recipient: PlayerId, votes_needed: u8, now: DateTime<Utc>) -> Notification {
        let (agree, deny) = self.tally();
        Notification::BootProposalUpdate {
            in_progress: self.in_progress,
            victim: self.victim,
            reason: self.reason.clone(),
            agree,
            deny,
            votes_needed,
            seconds_left: (self.cancel_time - now).num_seconds().max(0),
            my_answer: self.votes.get(&recipient).copied().unwrap_or_default(),
            outcome: self.outcome,
        }
    }
}

/// Why a vote kick could not be started
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BootRefusal {
    #[error("Group is not a dungeon finder group")]
    NotLfgGroup,

    #[error("Player is not a member of the group")]
    NotMember,

    #[error("No kicks left for this group")]
    LimitReached,

    #[error("A vote kick is already in progress")]
    InProgress,

    #[error("Not enough players in the group to vote")]
    TooFewPlayers,

    #[error("Dungeon already completed")]
    DungeonComplete,
}

impl LfgManager {
    /// Open a vote to kick `victim` from `group`
    pub fn initiate_boot(
        &mut self,
        group: GroupId,
        initiator: PlayerId,
        victim: PlayerId,
        reason: &str,
    ) -> Result<(), BootRefusal> {
        let Some(data) = self.store.group(group) else {
            return Err(BootRefusal::NotLfgGroup);
        };
        if !data.is_lfg() {
            return Err(BootRefusal::NotLfgGroup);
        }
        if initiator == victim
            || !data.members().contains(&initiator)
            || !data.members().contains(&victim)
        {
            return Err(BootRefusal::NotMember);
        }
        if data.kicks_left() == 0 {
            return Err(BootRefusal::LimitReached);
        }
        if data.vote_kick_active() || self.boots.contains_key(&group) {
            return Err(BootRefusal::InProgress);
        }
        if data.members().len() <= self.config.kick_votes_needed as usize {
            return Err(BootRefusal::TooFewPlayers);
        }
        if data.state() == LfgState::FinishedDungeon {
            return Err(BootRefusal::DungeonComplete);
        }

        let mut votes: BTreeMap<PlayerId, LfgAnswer> = data
            .members()
            .iter()
            .map(|m| (*m, LfgAnswer::Pending))
            .collect();
        votes.insert(victim, LfgAnswer::Deny);
        votes.insert(initiator, LfgAnswer::Agree);

        let now = self.now();
        let boot = Boot {
            cancel_time: deadline(now, self.config.boot_timeout()),
            in_progress: true,
            victim,
            initiator,
            reason: reason.to_string(),
            votes,
            outcome: None,
        };

        self.store.group_mut(group).set_vote_kick(true);
        for member in boot.votes.keys() {
            self.send(
                *member,
                boot.notification(*member, self.config.kick_votes_needed, now),
            );
        }
        info!(
            "Player {} started a vote to kick {} from group {}",
            initiator, victim, group
        );
        self.boots.insert(group, boot);
        self.stats.boots_started += 1;
        Ok(())
    }

    /// Record a player's kick vote
    pub fn update_boot(&mut self, player: PlayerId, accept: bool) {
        let Some(group) = self.store.player_group(player) else {
            return;
        };
        let needed = self.config.kick_votes_needed;
        let Some(boot) = self.boots.get_mut(&group) else {
            return;
        };
        if boot.votes.get(&player) != Some(&LfgAnswer::Pending) {
            debug!("Player {} cannot vote again in group {}", player, group);
            return;
        }
        boot.votes.insert(player, LfgAnswer::from_accept(accept));

        let (agree, deny) = boot.tally();
        let still_possible = boot.votes.len() - deny as usize;
        if agree < needed && still_possible >= needed as usize {
            let boot = boot.clone();
            let now = self.now();
            for member in boot.votes.keys().filter(|m| **m != boot.victim) {
                self.send(*member, boot.notification(*member, needed, now));
            }
            return;
        }

        let outcome = if agree >= needed {
            BootOutcome::Kicked
        } else {
            BootOutcome::Rejected
        };
        self.finish_boot(group, outcome);
    }

    fn finish_boot(&mut self, group: GroupId, outcome: BootOutcome) {
        let Some(mut boot) = self.boots.remove(&group) else {
            return;
        };
        boot.in_progress = false;
        boot.outcome = Some(outcome);

        let now = self.now();
        let needed = self.config.kick_votes_needed;
        for member in boot.votes.keys().filter(|m| **m != boot.victim) {
            self.send(*member, boot.notification(*member, needed, now));
        }
        self.store.group_mut(group).set_vote_kick(false);
        info!(
            "Vote to kick {} from group {} ended: {:?}",
            boot.victim, group, outcome
        );

        if outcome == BootOutcome::Kicked {
            self.world.remove_member(group, boot.victim);
            self.store.group_mut(group).decrease_kicks_left();
            self.on_member_removed(group, boot.victim, RemoveMethod::KickLfg, None, None);
            self.stats.kicks_completed += 1;
        }
    }

    /// Close every vote kick past its deadline
    pub(super) fn expire_boots(&mut self, now: DateTime<Utc>) -> usize {
        let expired: Vec<GroupId> = self
            .boots
            .iter()
            .filter(|(_, boot)| now >= boot.cancel_time)
            .map(|(group, _)| *group)
            .collect();
        for group in &expired {
            self.finish_boot(*group, BootOutcome::Expired);
        }
        expired.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally() {
        let boot = Boot {
            cancel_time: Utc::now(),
            in_progress: true,
            victim: 2,
            initiator: 1,
            reason: String::new(),
            votes: BTreeMap::from([
                (1, LfgAnswer::Agree),
                (2, LfgAnswer::Deny),
                (3, LfgAnswer::Pending),
                (4, LfgAnswer::Agree),
            ]),
            outcome: None,
        };
        assert_eq!(boot.tally(), (2, 1));
    }
}
