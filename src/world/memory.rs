//! In-memory world used by the service and by tests

use super::{PlayerProfile, World};
use crate::types::{DungeonId, GroupId, PlayerId, TeleportDestination, TeleportError};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error};

// Updates are single map operations, so a poisoned map is still consistent.
fn read<'a, T>(lock: &'a RwLock<T>, name: &str) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        error!("World {} lock poisoned, using last written state", name);
        poisoned.into_inner()
    })
}

fn write<'a, T>(lock: &'a RwLock<T>, name: &str) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        error!("World {} lock poisoned, using last written state", name);
        poisoned.into_inner()
    })
}

fn lock<'a, T>(mutex: &'a Mutex<T>, name: &str) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        error!("World {} lock poisoned, using last written state", name);
        poisoned.into_inner()
    })
}

#[derive(Debug, Clone, Default)]
struct GroupRecord {
    leader: PlayerId,
    members: Vec<PlayerId>,
}

/// Thread-safe world backed by hash maps
#[derive(Debug)]
pub struct InMemoryWorld {
    players: RwLock<HashMap<PlayerId, PlayerProfile>>,
    groups: RwLock<HashMap<GroupId, GroupRecord>>,
    membership: RwLock<HashMap<PlayerId, GroupId>>,
    ignores: RwLock<HashSet<(PlayerId, PlayerId)>>,
    active_seasons: RwLock<HashSet<DungeonId>>,
    teleport_overrides: RwLock<HashMap<PlayerId, TeleportError>>,
    teleports: Mutex<Vec<(PlayerId, TeleportDestination)>>,
    next_group_id: AtomicU64,
}

impl Default for InMemoryWorld {
    fn default() -> Self {
        Self {
            players: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
            membership: RwLock::new(HashMap::new()),
            ignores: RwLock::new(HashSet::new()),
            active_seasons: RwLock::new(HashSet::new()),
            teleport_overrides: RwLock::new(HashMap::new()),
            teleports: Mutex::new(Vec::new()),
            next_group_id: AtomicU64::new(1),
        }
    }
}

impl InMemoryWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a player profile
    pub fn upsert_player(&self, profile: PlayerProfile) {
        write(&self.players, "players").insert(profile.id, profile);
    }

    pub fn remove_player(&self, id: PlayerId) -> Option<PlayerProfile> {
        write(&self.players, "players").remove(&id)
    }

    /// Apply an in-place change to a player profile
    pub fn update_player<F: FnOnce(&mut PlayerProfile)>(&self, id: PlayerId, f: F) -> bool {
        match write(&self.players, "players").get_mut(&id) {
            Some(profile) => {
                f(profile);
                true
            }
            None => false,
        }
    }

    pub fn player_count(&self) -> usize {
        read(&self.players, "players").len()
    }

    /// Create a group with the given leader and members
    pub fn form_group(&self, leader: PlayerId, members: &[PlayerId]) -> GroupId {
        let group = self.create_group(leader);
        for member in members {
            if *member != leader {
                self.add_member(group, *member);
            }
        }
        group
    }

    /// Track a group created outside this process, keeping ids it already has
    pub fn register_group(&self, group: GroupId, leader: PlayerId) {
        write(&self.groups, "groups")
            .entry(group)
            .or_insert_with(|| GroupRecord {
                leader,
                members: vec![leader],
            });
        write(&self.membership, "membership")
            .entry(leader)
            .or_insert(group);
        self.next_group_id.fetch_max(group + 1, Ordering::SeqCst);
    }

    /// Forget a group and all of its memberships
    pub fn disband_group(&self, group: GroupId) {
        let members = write(&self.groups, "groups")
            .remove(&group)
            .map(|r| r.members)
            .unwrap_or_default();
        let mut membership = write(&self.membership, "membership");
        for member in members {
            if membership.get(&member) == Some(&group) {
                membership.remove(&member);
            }
        }
    }

    pub fn set_leader(&self, group: GroupId, leader: PlayerId) {
        if let Some(record) = write(&self.groups, "groups").get_mut(&group) {
            record.leader = leader;
        }
    }

    pub fn set_ignore(&self, player: PlayerId, ignored: PlayerId) {
        write(&self.ignores, "ignores").insert((player, ignored));
    }

    pub fn set_season_active(&self, dungeon: DungeonId, active: bool) {
        let mut seasons = write(&self.active_seasons, "seasons");
        if active {
            seasons.insert(dungeon);
        } else {
            seasons.remove(&dungeon);
        }
    }

    /// Force the result of the next teleports of a player
    pub fn set_teleport_result(&self, player: PlayerId, result: TeleportError) {
        write(&self.teleport_overrides, "teleport overrides").insert(player, result);
    }

    /// Successful teleports performed so far
    pub fn teleports(&self) -> Vec<(PlayerId, TeleportDestination)> {
        lock(&self.teleports, "teleports").clone()
    }
}

impl World for InMemoryWorld {
    fn player(&self, id: PlayerId) -> Option<PlayerProfile> {
        read(&self.players, "players").get(&id).cloned()
    }

    fn group_of(&self, player: PlayerId) -> Option<GroupId> {
        read(&self.membership, "membership").get(&player).copied()
    }

    fn group_members(&self, group: GroupId) -> Vec<PlayerId> {
        read(&self.groups, "groups")
            .get(&group)
            .map(|r| r.members.clone())
            .unwrap_or_default()
    }

    fn group_leader(&self, group: GroupId) -> Option<PlayerId> {
        read(&self.groups, "groups").get(&group).map(|r| r.leader)
    }

    fn has_ignore(&self, a: PlayerId, b: PlayerId) -> bool {
        let ignores = read(&self.ignores, "ignores");
        ignores.contains(&(a, b)) || ignores.contains(&(b, a))
    }

    fn is_season_active(&self, dungeon: DungeonId) -> bool {
        read(&self.active_seasons, "seasons").contains(&dungeon)
    }

    fn create_group(&self, leader: PlayerId) -> GroupId {
        let id = self.next_group_id.fetch_add(1, Ordering::SeqCst);
        write(&self.groups, "groups").insert(
            id,
            GroupRecord {
                leader,
                members: vec![leader],
            },
        );
        write(&self.membership, "membership").insert(leader, id);
        debug!("World created group {} led by {}", id, leader);
        id
    }

    fn add_member(&self, group: GroupId, player: PlayerId) {
        if let Some(record) = write(&self.groups, "groups").get_mut(&group) {
            if !record.members.contains(&player) {
                record.members.push(player);
            }
        }
        write(&self.membership, "membership").insert(player, group);
    }

    fn remove_member(&self, group: GroupId, player: PlayerId) {
        {
            let mut groups = write(&self.groups, "groups");
            let now_empty = match groups.get_mut(&group) {
                Some(record) => {
                    record.members.retain(|m| *m != player);
                    if record.leader == player {
                        if let Some(next) = record.members.first() {
                            record.leader = *next;
                        }
                    }
                    record.members.is_empty()
                }
                None => false,
            };
            if now_empty {
                groups.remove(&group);
            }
        }
        let mut membership = write(&self.membership, "membership");
        if membership.get(&player) == Some(&group) {
            membership.remove(&player);
        }
    }

    fn teleport(&self, player: PlayerId, destination: &TeleportDestination) -> TeleportError {
        let forced = read(&self.teleport_overrides, "teleport overrides")
            .get(&player)
            .copied();
        if let Some(result) = forced {
            if result != TeleportError::Ok {
                return result;
            }
        }

        match self.player(player) {
            None => TeleportError::InvalidLocation,
            Some(profile) if !profile.alive => TeleportError::PlayerDead,
            Some(_) => {
                lock(&self.teleports, "teleports").push((player, *destination));
                TeleportError::Ok
            }
        }
    }

    fn apply_random_cooldown(&self, player: PlayerId) {
        self.update_player(player, |p| p.random_cooldown = true);
    }

    fn clear_random_cooldown(&self, player: PlayerId) {
        self.update_player(player, |p| p.random_cooldown = false);
    }

    fn apply_deserter(&self, player: PlayerId) {
        self.update_player(player, |p| p.deserter = true);
    }

    fn has_rewarded_quest(&self, player: PlayerId, quest: u32) -> bool {
        self.player(player)
            .map(|p| p.completed_quests.contains(&quest))
            .unwrap_or(false)
    }

    fn reward_quest(&self, player: PlayerId, quest: u32) {
        self.update_player(player, |p| {
            p.completed_quests.insert(quest);
        });
    }
}
