//! Group and session events reported by the world

use super::LfgManager;
use crate::notify::Notification;
use crate::types::{EntityRef, GroupId, LfgState, LfgUpdateType, PlayerId, RemoveMethod};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Observer for changes the world makes to groups and sessions.
///
/// A `Kick` removal of a dungeon finder group member is only a request: the
/// member stays until the vote kick it opens passes.
pub trait GroupEvents {
    fn on_member_added(&mut self, group: GroupId, player: PlayerId);
    fn on_member_removed(
        &mut self,
        group: GroupId,
        player: PlayerId,
        method: RemoveMethod,
        kicker: Option<PlayerId>,
        reason: Option<&str>,
    );
    fn on_group_disbanded(&mut self, group: GroupId);
    fn on_leader_changed(&mut self, group: GroupId, new_leader: PlayerId, old_leader: PlayerId);
    /// `group` is `None` while the inviter's group is still being created
    fn on_member_invited(&mut self, group: Option<GroupId>, inviter: PlayerId);
    fn on_player_login(&mut self, player: PlayerId);
    fn on_player_logout(&mut self, player: PlayerId, disconnected: bool);
}

impl GroupEvents for LfgManager {
    fn on_member_added(&mut self, group: GroupId, player: PlayerId) {
        if !self.config.is_enabled() {
            return;
        }

        if self.world.group_leader(group) == Some(player) {
            debug!("Leader {} added to group {}", player, group);
            self.store.group_mut(group).set_leader(player);
        } else {
            if self.store.state(EntityRef::Player(player)) == LfgState::Queued {
                self.leave_lfg(EntityRef::Player(player), false);
            }
            if self.store.state(EntityRef::Group(group)) == LfgState::Queued {
                self.leave_lfg(EntityRef::Group(group), false);
            }
        }

        self.store.player_mut(player).set_group(Some(group));
        self.store.group_mut(group).add_member(player);
    }

    fn on_member_removed(
        &mut self,
        group: GroupId,
        player: PlayerId,
        method: RemoveMethod,
        kicker: Option<PlayerId>,
        reason: Option<&str>,
    ) {
        if !self.config.is_enabled() {
            return;
        }

        let is_lfg = self.store.is_lfg_group(group);
        if is_lfg && method == RemoveMethod::Kick {
            if let Some(kicker) = kicker {
                if let Err(refusal) =
                    self.initiate_boot(group, kicker, player, reason.unwrap_or_default())
                {
                    debug!("Kick of {} from group {} refused: {}", player, group, refusal);
                }
            }
            return;
        }

        let state = self.store.state(EntityRef::Group(group));
        if state == LfgState::Proposal && method == RemoveMethod::Default {
            self.store.player_mut(player).set_group(None);
            self.store.group_mut(group).remove_member(player);
            return;
        }

        self.leave_lfg(EntityRef::Player(player), false);
        self.store.player_mut(player).set_group(None);
        let remaining = self.store.group_mut(group).remove_member(player);

        if self.world.player(player).is_some() {
            if method == RemoveMethod::Leave
                && state == LfgState::Dungeon
                && remaining >= self.config.kick_votes_needed as usize
            {
                debug!("Player {} deserted group {}", player, group);
                self.world.apply_deserter(player);
            } else if method == RemoveMethod::KickLfg {
                self.world.clear_random_cooldown(player);
            }

            self.send_update(player, LfgUpdateType::Leader, &BTreeSet::new(), true);
            let dungeon = self.get_dungeon(group);
            if is_lfg && dungeon != 0 {
                self.teleport_to(player, dungeon, true);
            }
        }

        if is_lfg && state != LfgState::FinishedDungeon {
            let entry = self.get_dungeon_entry(group);
            if let Some(leader) = self.get_leader(group).filter(|l| *l != player) {
                if entry != 0 {
                    self.send(leader, Notification::OfferContinue { dungeon_entry: entry });
                }
            }
        }
    }

    fn on_group_disbanded(&mut self, group: GroupId) {
        let gentity = EntityRef::Group(group);
        self.dequeue(gentity);
        self.role_checks.remove(&group);
        self.boots.remove(&group);

        let Some(data) = self.store.remove_group(group) else {
            return;
        };
        let forming = data.state() == LfgState::Proposal;
        for member in data.members() {
            let player = self.store.player_mut(*member);
            player.set_group(None);
            if !forming {
                player.set_state(LfgState::None);
                self.send_update(*member, LfgUpdateType::RemovedFromQueue, &BTreeSet::new(), true);
            }
        }
        self.delete_group_record(group);
        debug!("Group {} disbanded", group);
    }

    fn on_leader_changed(&mut self, group: GroupId, new_leader: PlayerId, old_leader: PlayerId) {
        debug!(
            "Group {} leader changed from {} to {}",
            group, old_leader, new_leader
        );
        self.store.group_mut(group).set_leader(new_leader);
    }

    fn on_member_invited(&mut self, group: Option<GroupId>, inviter: PlayerId) {
        if group.is_none() {
            self.leave_lfg(EntityRef::Player(inviter), false);
        }
    }

    fn on_player_login(&mut self, player: PlayerId) {
        let Some(profile) = self.world.player(player) else {
            return;
        };
        self.store.player_mut(player).set_team(profile.team);

        let world_group = self.world.group_of(player);
        let known_group = self.store.player_group(player);
        if world_group != known_group {
            warn!(
                "Group of player {} out of sync on login ({:?} vs {:?})",
                player, known_group, world_group
            );
            if let Some(old) = known_group {
                self.store.group_mut(old).remove_member(player);
            }
            self.store.player_mut(player).set_group(world_group);
            if let Some(group) = world_group {
                self.store.group_mut(group).add_member(player);
            }
        }
    }

    fn on_player_logout(&mut self, player: PlayerId, disconnected: bool) {
        if !self.config.is_enabled() {
            return;
        }
        let grouped = self.store.player_group(player).is_some() || self.world.group_of(player).is_some();
        if !grouped {
            self.leave_lfg(EntityRef::Player(player), false);
        } else if disconnected {
            self.leave_lfg(EntityRef::Player(player), true);
        }
    }
}
