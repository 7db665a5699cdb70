//! Boundary to the game world
//!
//! The engine never owns players or groups. It reads profiles and asks the
//! world to mutate groups, teleport players and apply debuffs through the
//! [`World`] trait.

pub mod memory;

pub use memory::InMemoryWorld;

use crate::types::{
    roles, DungeonId, GroupId, PlayerId, Team, TeleportDestination, TeleportError,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What the engine needs to know about a player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub id: PlayerId,
    pub name: String,
    pub level: u8,
    pub team: Team,
    #[serde(default)]
    pub item_level: u16,
    #[serde(default = "default_expansion")]
    pub expansion: u8,
    /// Account may use the dungeon finder
    #[serde(default = "default_true")]
    pub can_join: bool,
    #[serde(default)]
    pub in_battleground: bool,
    #[serde(default)]
    pub deserter: bool,
    #[serde(default)]
    pub random_cooldown: bool,
    #[serde(default = "default_true")]
    pub alive: bool,
    /// Roles the player's class can fill
    #[serde(default = "default_roles")]
    pub allowed_roles: u8,
    #[serde(default)]
    pub completed_quests: BTreeSet<u32>,
    #[serde(default)]
    pub achievements: BTreeSet<u32>,
    #[serde(default)]
    pub items: BTreeSet<u32>,
    /// Maps the player holds a saved instance lock for
    #[serde(default)]
    pub instance_locks: BTreeSet<u32>,
}

fn default_expansion() -> u8 {
    2
}

fn default_true() -> bool {
    true
}

fn default_roles() -> u8 {
    roles::ANY
}

impl PlayerProfile {
    pub fn new(id: PlayerId, name: impl Into<String>, level: u8, team: Team) -> Self {
        Self {
            id,
            name: name.into(),
            level,
            team,
            item_level: 0,
            expansion: default_expansion(),
            can_join: true,
            in_battleground: false,
            deserter: false,
            random_cooldown: false,
            alive: true,
            allowed_roles: roles::ANY,
            completed_quests: BTreeSet::new(),
            achievements: BTreeSet::new(),
            items: BTreeSet::new(),
            instance_locks: BTreeSet::new(),
        }
    }

    pub fn with_item_level(mut self, item_level: u16) -> Self {
        self.item_level = item_level;
        self
    }

    pub fn with_allowed_roles(mut self, allowed: u8) -> Self {
        self.allowed_roles = allowed;
        self
    }
}

/// Operations the engine performs against the world
///
/// Group mutations made through this trait do not echo back as
/// [`crate::manager::GroupEvents`] calls; the engine updates its own
/// bookkeeping when it makes them.
pub trait World: Send + Sync {
    fn player(&self, id: PlayerId) -> Option<PlayerProfile>;
    fn group_of(&self, player: PlayerId) -> Option<GroupId>;
    fn group_members(&self, group: GroupId) -> Vec<PlayerId>;
    fn group_leader(&self, group: GroupId) -> Option<PlayerId>;

    /// True when either player ignores the other
    fn has_ignore(&self, a: PlayerId, b: PlayerId) -> bool;
    fn is_season_active(&self, dungeon: DungeonId) -> bool;

    fn create_group(&self, leader: PlayerId) -> GroupId;
    fn add_member(&self, group: GroupId, player: PlayerId);
    fn remove_member(&self, group: GroupId, player: PlayerId);

    fn teleport(&self, player: PlayerId, destination: &TeleportDestination) -> TeleportError;
    fn apply_random_cooldown(&self, player: PlayerId);
    fn clear_random_cooldown(&self, player: PlayerId);
    fn apply_deserter(&self, player: PlayerId);

    fn has_rewarded_quest(&self, player: PlayerId, quest: u32) -> bool;
    fn reward_quest(&self, player: PlayerId, quest: u32);
}
