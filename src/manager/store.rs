//! Per-player and per-group dungeon finder state

use crate::types::{DungeonId, EntityRef, GroupId, LfgState, PlayerId, Team};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;
use uuid::Uuid;

/// Identifies one queueing attempt of a player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RideTicket {
    pub id: Uuid,
    pub joined_at: DateTime<Utc>,
}

/// State kept for a player
#[derive(Debug, Clone, Default)]
pub struct PlayerData {
    state: LfgState,
    old_state: LfgState,
    roles: u8,
    selected_dungeons: BTreeSet<DungeonId>,
    team: Option<Team>,
    group: Option<GroupId>,
    ticket: Option<RideTicket>,
}

impl PlayerData {
    pub fn set_state(&mut self, state: LfgState) {
        match state {
            LfgState::None | LfgState::FinishedDungeon => {
                self.roles = 0;
                self.selected_dungeons.clear();
                self.old_state = state;
            }
            LfgState::Dungeon => self.old_state = state,
            _ => {}
        }
        self.state = state;
    }

    pub fn restore_state(&mut self) {
        if self.old_state == LfgState::None {
            self.selected_dungeons.clear();
            self.roles = 0;
            self.ticket = None;
        }
        self.state = self.old_state;
    }

    pub fn state(&self) -> LfgState {
        self.state
    }

    pub fn old_state(&self) -> LfgState {
        self.old_state
    }

    pub fn roles(&self) -> u8 {
        self.roles
    }

    pub fn set_roles(&mut self, roles: u8) {
        self.roles = roles;
    }

    pub fn selected_dungeons(&self) -> &BTreeSet<DungeonId> {
        &self.selected_dungeons
    }

    pub fn set_selected_dungeons(&mut self, dungeons: BTreeSet<DungeonId>) {
        self.selected_dungeons = dungeons;
    }

    pub fn team(&self) -> Option<Team> {
        self.team
    }

    pub fn set_team(&mut self, team: Team) {
        self.team = Some(team);
    }

    pub fn group(&self) -> Option<GroupId> {
        self.group
    }

    pub fn set_group(&mut self, group: Option<GroupId>) {
        self.group = group;
    }

    pub fn ticket(&self) -> Option<RideTicket> {
        self.ticket
    }

    pub fn set_ticket(&mut self, ticket: Option<RideTicket>) {
        self.ticket = ticket;
    }
}

/// State kept for a group
#[derive(Debug, Clone)]
pub struct GroupData {
    state: LfgState,
    old_state: LfgState,
    members: BTreeSet<PlayerId>,
    leader: Option<PlayerId>,
    dungeon: u32,
    kicks_left: u8,
    kick_limit: u8,
    vote_kick_active: bool,
    is_lfg: bool,
}

impl GroupData {
    pub fn new(kick_limit: u8) -> Self {
        Self {
            state: LfgState::None,
            old_state: LfgState::None,
            members: BTreeSet::new(),
            leader: None,
            dungeon: 0,
            kicks_left: kick_limit,
            kick_limit,
            vote_kick_active: false,
            is_lfg: false,
        }
    }

    /// Only dungeon states are remembered as the state to fall back to
    pub fn set_state(&mut self, state: LfgState) {
        match state {
            LfgState::None => {
                self.dungeon = 0;
                self.kicks_left = self.kick_limit;
            }
            LfgState::Dungeon | LfgState::FinishedDungeon => self.old_state = state,
            _ => {}
        }
        self.state = state;
    }

    pub fn restore_state(&mut self) {
        self.state = self.old_state;
    }

    pub fn state(&self) -> LfgState {
        self.state
    }

    pub fn old_state(&self) -> LfgState {
        self.old_state
    }

    pub fn members(&self) -> &BTreeSet<PlayerId> {
        &self.members
    }

    pub fn add_member(&mut self, player: PlayerId) {
        self.members.insert(player);
    }

    /// Remove a member, returning how many are left
    pub fn remove_member(&mut self, player: PlayerId) -> usize {
        self.members.remove(&player);
        self.members.len()
    }

    pub fn leader(&self) -> Option<PlayerId> {
        self.leader
    }

    pub fn set_leader(&mut self, leader: PlayerId) {
        self.leader = Some(leader);
    }

    /// Current dungeon entry, 0 when none
    pub fn dungeon(&self) -> u32 {
        self.dungeon
    }

    pub fn dungeon_id(&self) -> DungeonId {
        self.dungeon & 0x00FF_FFFF
    }

    pub fn set_dungeon(&mut self, entry: u32) {
        self.dungeon = entry;
    }

    pub fn kicks_left(&self) -> u8 {
        self.kicks_left
    }

    pub fn decrease_kicks_left(&mut self) {
        self.kicks_left = self.kicks_left.saturating_sub(1);
    }

    pub fn vote_kick_active(&self) -> bool {
        self.vote_kick_active
    }

    pub fn set_vote_kick(&mut self, active: bool) {
        self.vote_kick_active = active;
    }

    pub fn is_lfg(&self) -> bool {
        self.is_lfg
    }

    pub fn set_lfg(&mut self, is_lfg: bool) {
        self.is_lfg = is_lfg;
    }
}

/// All player and group records
#[derive(Debug)]
pub struct StateStore {
    players: BTreeMap<PlayerId, PlayerData>,
    groups: BTreeMap<GroupId, GroupData>,
    kick_limit: u8,
}

impl StateStore {
    pub fn new(kick_limit: u8) -> Self {
        Self {
            players: BTreeMap::new(),
            groups: BTreeMap::new(),
            kick_limit,
        }
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerData> {
        self.players.get(&id)
    }

    /// Player record, created on first reference
    pub fn player_mut(&mut self, id: PlayerId) -> &mut PlayerData {
        self.players.entry(id).or_default()
    }

    pub fn group(&self, id: GroupId) -> Option<&GroupData> {
        self.groups.get(&id)
    }

    /// Group record, created on first reference
    pub fn group_mut(&mut self, id: GroupId) -> &mut GroupData {
        let kick_limit = self.kick_limit;
        self.groups
            .entry(id)
            .or_insert_with(|| GroupData::new(kick_limit))
    }

    pub fn remove_group(&mut self, id: GroupId) -> Option<GroupData> {
        self.groups.remove(&id)
    }

    pub fn remove_player(&mut self, id: PlayerId) -> Option<PlayerData> {
        self.players.remove(&id)
    }

    pub fn state(&self, entity: EntityRef) -> LfgState {
        match entity {
            EntityRef::Player(id) => self.player(id).map(|p| p.state()),
            EntityRef::Group(id) => self.group(id).map(|g| g.state()),
        }
        .unwrap_or_default()
    }

    pub fn old_state(&self, entity: EntityRef) -> LfgState {
        match entity {
            EntityRef::Player(id) => self.player(id).map(|p| p.old_state()),
            EntityRef::Group(id) => self.group(id).map(|g| g.old_state()),
        }
        .unwrap_or_default()
    }

    pub fn set_state(&mut self, entity: EntityRef, state: LfgState) {
        trace!("{} -> {}", entity, state);
        match entity {
            EntityRef::Player(id) => self.player_mut(id).set_state(state),
            EntityRef::Group(id) => self.group_mut(id).set_state(state),
        }
    }

    pub fn restore_state(&mut self, entity: EntityRef, debug_msg: &str) {
        match entity {
            EntityRef::Player(id) => {
                let data = self.player_mut(id);
                data.restore_state();
                trace!("{} restored to {} ({})", entity, data.state(), debug_msg);
            }
            EntityRef::Group(id) => {
                let data = self.group_mut(id);
                data.restore_state();
                trace!("{} restored to {} ({})", entity, data.state(), debug_msg);
            }
        }
    }

    pub fn is_lfg_group(&self, group: GroupId) -> bool {
        self.group(group).map_or(false, |g| g.is_lfg())
    }

    /// Players an entity stands for
    pub fn players_of(&self, entity: EntityRef) -> Vec<PlayerId> {
        match entity {
            EntityRef::Player(id) => vec![id],
            EntityRef::Group(id) => self
                .group(id)
                .map(|g| g.members().iter().copied().collect())
                .unwrap_or_default(),
        }
    }

    pub fn player_group(&self, player: PlayerId) -> Option<GroupId> {
        self.player(player).and_then(|p| p.group())
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}
