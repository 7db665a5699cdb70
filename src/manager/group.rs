//! Group formation, teleports, dungeon completion and group persistence

use super::LfgManager;
use crate::error::Result;
use crate::notify::Notification;
use crate::persistence::GroupDungeonRecord;
use crate::queue::Proposal;
use crate::types::{
    roles, DungeonId, EntityRef, GroupId, LfgState, PlayerId, TeleportDestination, TeleportError,
};
use tracing::{debug, error, info, warn};

impl LfgManager {
    /// Turn an accepted proposal into a real group: a fresh one, or the
    /// continuing group refilled with the new players.
    pub(super) fn make_new_group(&mut self, proposal: &Proposal) {
        let mut ordered = Vec::with_capacity(proposal.players.len());
        let mut tanks = Vec::new();
        let mut healers = Vec::new();
        let mut dps = Vec::new();
        let mut to_teleport = Vec::new();

        for (player, slot) in &proposal.players {
            if *player == proposal.leader {
                ordered.push(*player);
            } else {
                match slot.role & !roles::LEADER {
                    roles::TANK => tanks.push(*player),
                    roles::HEALER => healers.push(*player),
                    roles::DAMAGE => dps.push(*player),
                    other => {
                        error!("Player {} entered a group with unresolved roles {}", player, other);
                        dps.push(*player);
                    }
                }
            }
            if proposal.is_new || self.store.player_group(*player) != proposal.group {
                to_teleport.push(*player);
            }
        }
        ordered.extend(tanks);
        ordered.extend(healers);
        ordered.extend(dps);

        let Some(dungeon) = self.catalog.get(proposal.dungeon_id).cloned() else {
            error!(
                "Proposal {} targets unknown dungeon {}",
                proposal.id, proposal.dungeon_id
            );
            return;
        };

        let mut group = proposal.group;
        for player in ordered {
            if self.world.player(player).is_none() {
                debug!("Player {} went away before group formation", player);
                continue;
            }

            let current = self.world.group_of(player);
            if let Some(old) = current.filter(|old| Some(*old) != group) {
                self.world.remove_member(old, player);
                self.forget_member(old, player);
            }

            match group {
                None => {
                    let created = self.world.create_group(player);
                    let data = self.store.group_mut(created);
                    data.set_lfg(true);
                    data.set_leader(player);
                    data.add_member(player);
                    self.store
                        .set_state(EntityRef::Group(created), LfgState::Proposal);
                    self.store.player_mut(player).set_group(Some(created));
                    group = Some(created);
                }
                Some(existing) if current != Some(existing) => {
                    self.world.add_member(existing, player);
                    self.store.group_mut(existing).add_member(player);
                    self.store.player_mut(player).set_group(Some(existing));
                }
                Some(_) => {}
            }

            let queued_random = self
                .store
                .player(player)
                .and_then(|p| p.selected_dungeons().iter().next().copied())
                .and_then(|id| self.catalog.get(id))
                .map_or(false, |d| d.is_random());
            if queued_random {
                self.world.apply_random_cooldown(player);
            }
        }

        let Some(group) = group else {
            error!("No group could be formed for proposal {}", proposal.id);
            return;
        };

        let data = self.store.group_mut(group);
        data.set_lfg(true);
        data.set_dungeon(dungeon.entry());
        self.store.set_state(EntityRef::Group(group), LfgState::Dungeon);
        self.save_group(group);

        for player in to_teleport {
            self.teleport_player(player, false);
        }

        self.stats.groups_formed += 1;
        info!(
            "Group {} is entering {} ({} players)",
            group,
            dungeon.name,
            self.store.players_of(EntityRef::Group(group)).len()
        );
    }

    /// Drop a player from a group record, discarding the record once empty
    fn forget_member(&mut self, group: GroupId, player: PlayerId) {
        self.store.player_mut(player).set_group(None);
        let left = self.store.group_mut(group).remove_member(player);
        if left == 0 {
            self.store.remove_group(group);
        }
    }

    /// Move a player into, or with `out` out of, the group's dungeon
    pub fn teleport_player(&self, player: PlayerId, out: bool) -> TeleportError {
        let dungeon = self
            .store
            .player_group(player)
            .filter(|g| self.store.is_lfg_group(*g))
            .map(|g| self.get_dungeon(g));
        match dungeon {
            Some(dungeon) if dungeon != 0 => self.teleport_to(player, dungeon, out),
            _ => {
                debug!("Player {} has no dungeon to teleport to", player);
                self.send(
                    player,
                    Notification::TeleportError {
                        error: TeleportError::InvalidLocation,
                    },
                );
                TeleportError::InvalidLocation
            }
        }
    }

    pub(super) fn teleport_to(&self, player: PlayerId, dungeon: DungeonId, out: bool) -> TeleportError {
        let Some(definition) = self.catalog.get(dungeon) else {
            self.send(
                player,
                Notification::TeleportError {
                    error: TeleportError::InvalidLocation,
                },
            );
            return TeleportError::InvalidLocation;
        };

        let destination = if out {
            TeleportDestination::Exit
        } else {
            TeleportDestination::Dungeon {
                map: definition.map,
                pose: definition.pose.unwrap_or_default(),
            }
        };
        let result = self.world.teleport(player, &destination);
        if result != TeleportError::Ok {
            debug!("Teleport of player {} failed: {:?}", player, result);
            self.send(player, Notification::TeleportError { error: result });
        }
        result
    }

    /// Mark a group's dungeon done and hand out random dungeon rewards
    pub fn finish_dungeon(&mut self, group: GroupId, dungeon_id: DungeonId) {
        let Some(data) = self.store.group(group) else {
            debug!("Finish reported for unknown group {}", group);
            return;
        };
        if data.dungeon_id() != dungeon_id {
            debug!(
                "Group {} finished dungeon {} but was assigned {}",
                group,
                dungeon_id,
                data.dungeon_id()
            );
            return;
        }
        if data.state() == LfgState::FinishedDungeon {
            debug!("Group {} already got its rewards", group);
            return;
        }
        let members: Vec<PlayerId> = data.members().iter().copied().collect();

        self.store
            .set_state(EntityRef::Group(group), LfgState::FinishedDungeon);
        self.save_group(group);
        self.stats.dungeons_finished += 1;

        for player in members {
            if self.store.state(EntityRef::Player(player)) == LfgState::FinishedDungeon {
                continue;
            }
            let selected = self
                .store
                .player(player)
                .and_then(|p| p.selected_dungeons().iter().next().copied());
            self.store
                .set_state(EntityRef::Player(player), LfgState::FinishedDungeon);

            let Some(queued) = selected.and_then(|id| self.catalog.get(id)).cloned() else {
                continue;
            };
            if !queued.is_random() && !queued.seasonal {
                debug!("Player {} queued for {} which has no reward", player, queued.id);
                continue;
            }
            let Some(profile) = self.world.player(player) else {
                continue;
            };

            self.world.clear_random_cooldown(player);
            let Some(reward) = self.catalog.rewards().reward_for(queued.id, profile.level).cloned()
            else {
                continue;
            };

            let already_done = self.world.has_rewarded_quest(player, reward.first_quest);
            let quest = if already_done {
                reward.other_quest
            } else {
                reward.first_quest
            };
            self.world.reward_quest(player, quest);
            debug!("Player {} rewarded with quest {} for {}", player, quest, queued.name);
            self.send(
                player,
                Notification::PlayerReward {
                    random_dungeon: queued.id,
                    done_dungeon: dungeon_id,
                    already_done,
                    quest,
                },
            );
        }
        info!("Group {} finished dungeon {}", group, dungeon_id);
    }

    pub(super) fn save_group(&self, group: GroupId) {
        let Some(store) = &self.group_store else {
            return;
        };
        let Some(data) = self.store.group(group) else {
            return;
        };
        let record = GroupDungeonRecord {
            group_id: group,
            leader: data.leader().unwrap_or_default(),
            members: data.members().iter().copied().collect(),
            dungeon_entry: data.dungeon(),
            state: data.state(),
        };
        if let Err(e) = store.save(&record) {
            warn!("Failed to persist group {}: {}", group, e);
        }
    }

    pub(super) fn delete_group_record(&self, group: GroupId) {
        if let Some(store) = &self.group_store {
            if let Err(e) = store.delete(group) {
                warn!("Failed to delete persisted group {}: {}", group, e);
            }
        }
    }

    /// Restore persisted groups, returning how many were loaded
    pub fn load_persisted_groups(&mut self) -> Result<usize> {
        let Some(store) = self.group_store.clone() else {
            return Ok(0);
        };

        let records = store.load_all()?;
        let loaded = records.len();
        for record in records {
            let group = record.group_id;
            let data = self.store.group_mut(group);
            data.set_lfg(true);
            data.set_leader(record.leader);
            for member in &record.members {
                data.add_member(*member);
            }
            for member in &record.members {
                self.store.player_mut(*member).set_group(Some(group));
            }

            if record.dungeon_entry == 0 {
                continue;
            }
            self.store.group_mut(group).set_dungeon(record.dungeon_entry);
            if matches!(record.state, LfgState::Dungeon | LfgState::FinishedDungeon) {
                self.store.set_state(EntityRef::Group(group), record.state);
                for member in &record.members {
                    self.store.set_state(EntityRef::Player(*member), record.state);
                }
            }
        }

        info!("Loaded {} persisted LFG groups", loaded);
        Ok(loaded)
    }
}
