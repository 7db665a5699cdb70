//! Common types used throughout the dungeon finder

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unique identifier for players
pub type PlayerId = u64;

/// Unique identifier for groups
pub type GroupId = u64;

/// Dungeon identifier as stored in the catalog
pub type DungeonId = u32;

/// Identifier of an in-flight group proposal
pub type ProposalId = u32;

/// Player to role bitmask assignment
pub type RoleMap = BTreeMap<PlayerId, u8>;

/// Dungeon entry to lock status
pub type LockMap = BTreeMap<u32, LockStatus>;

/// Role bits a player can select
pub mod roles {
    pub const NONE: u8 = 0x00;
    pub const LEADER: u8 = 0x01;
    pub const TANK: u8 = 0x02;
    pub const HEALER: u8 = 0x04;
    pub const DAMAGE: u8 = 0x08;
    pub const ANY: u8 = LEADER | TANK | HEALER | DAMAGE;
    pub const COMBAT: u8 = TANK | HEALER | DAMAGE;

    /// Human readable rendering of a role mask
    pub fn describe(mask: u8) -> String {
        let mut parts = Vec::new();
        if mask & LEADER != 0 {
            parts.push("Leader");
        }
        if mask & TANK != 0 {
            parts.push("Tank");
        }
        if mask & HEALER != 0 {
            parts.push("Healer");
        }
        if mask & DAMAGE != 0 {
            parts.push("Damage");
        }
        if parts.is_empty() {
            "None".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Reference to a queueable entity: a solo player or a whole group
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id")]
pub enum EntityRef {
    Player(PlayerId),
    Group(GroupId),
}

impl EntityRef {
    pub fn is_group(&self) -> bool {
        matches!(self, EntityRef::Group(_))
    }

    pub fn raw(&self) -> u64 {
        match self {
            EntityRef::Player(id) | EntityRef::Group(id) => *id,
        }
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityRef::Player(id) => write!(f, "Player-{}", id),
            EntityRef::Group(id) => write!(f, "Group-{}", id),
        }
    }
}

/// Lifecycle state of a player or group in the dungeon finder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LfgState {
    #[default]
    None,
    Rolecheck,
    Queued,
    Proposal,
    Dungeon,
    FinishedDungeon,
    Raidbrowser,
}

impl std::fmt::Display for LfgState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LfgState::None => "None",
            LfgState::Rolecheck => "Rolecheck",
            LfgState::Queued => "Queued",
            LfgState::Proposal => "Proposal",
            LfgState::Dungeon => "Dungeon",
            LfgState::FinishedDungeon => "FinishedDungeon",
            LfgState::Raidbrowser => "Raidbrowser",
        };
        write!(f, "{}", name)
    }
}

/// Faction of a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Team {
    Alliance,
    Horde,
}

/// Matchmaking pool a queue entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QueuePool {
    Shared,
    Faction(Team),
}

impl QueuePool {
    pub fn for_team(team: Team, cross_faction: bool) -> Self {
        if cross_faction {
            QueuePool::Shared
        } else {
            QueuePool::Faction(team)
        }
    }
}

impl std::fmt::Display for QueuePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueuePool::Shared => write!(f, "shared"),
            QueuePool::Faction(Team::Alliance) => write!(f, "alliance"),
            QueuePool::Faction(Team::Horde) => write!(f, "horde"),
        }
    }
}

/// Answer to a proposal or vote kick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LfgAnswer {
    #[default]
    Pending,
    Deny,
    Agree,
}

impl LfgAnswer {
    pub fn from_accept(accept: bool) -> Self {
        if accept {
            LfgAnswer::Agree
        } else {
            LfgAnswer::Deny
        }
    }
}

/// Status update codes pushed to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LfgUpdateType {
    Default,
    Leader,
    RolecheckAborted,
    JoinQueue,
    RolecheckFailed,
    RemovedFromQueue,
    ProposalFailed,
    ProposalDeclined,
    GroupFound,
    AddedToQueue,
    ProposalBegin,
    UpdateStatus,
    GroupMemberOffline,
    JoinQueueInitial,
    DungeonFinished,
    PartyRoleNotAvailable,
}

/// Result of a join request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinResult {
    Ok,
    Failed,
    GroupFull,
    InternalError,
    NotMeetReqs,
    PartyNotMeetReqs,
    MixedRaidDungeon,
    Disconnected,
    DungeonInvalid,
    Deserter,
    PartyDeserter,
    RandomCooldown,
    PartyRandomCooldown,
    TooManyMembers,
    UsingBgSystem,
    RoleCheckFailed,
    NoSlots,
}

/// Reason a dungeon is unavailable to a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockStatus {
    InsufficientExpansion,
    TooLowLevel,
    TooHighLevel,
    TooLowGearScore,
    RaidLocked,
    QuestNotCompleted,
    MissingItem,
    NotInSeason,
    MissingAchievement,
}

/// Player-side teleport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TeleportError {
    Ok,
    PlayerDead,
    Falling,
    InVehicle,
    Fatigue,
    InvalidLocation,
    Charming,
}

/// State of a group role check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoleCheckState {
    Default,
    Finished,
    Initializing,
    MissingRole,
    WrongRoles,
    Aborted,
    NoRole,
}

/// State of a group proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProposalState {
    Initiating,
    Failed,
    Success,
}

/// Final outcome of a vote kick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BootOutcome {
    Kicked,
    Rejected,
    Expired,
}

/// How a member left a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoveMethod {
    Default,
    Kick,
    KickLfg,
    Leave,
}

/// Teleport target requested from the world
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TeleportDestination {
    Dungeon { map: u32, pose: TeleportPose },
    Exit,
}

/// Map coordinates used when entering a dungeon
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TeleportPose {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub o: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_ref_ordering() {
        let mut refs = vec![
            EntityRef::Group(1),
            EntityRef::Player(9),
            EntityRef::Player(2),
        ];
        refs.sort();
        assert_eq!(
            refs,
            vec![
                EntityRef::Player(2),
                EntityRef::Player(9),
                EntityRef::Group(1)
            ]
        );
        assert!(EntityRef::Group(1).is_group());
        assert_eq!(EntityRef::Player(7).raw(), 7);
    }

    #[test]
    fn test_queue_pool_for_team() {
        assert_eq!(QueuePool::for_team(Team::Horde, true), QueuePool::Shared);
        assert_eq!(
            QueuePool::for_team(Team::Horde, false),
            QueuePool::Faction(Team::Horde)
        );
    }

    #[test]
    fn test_describe_roles() {
        assert_eq!(roles::describe(roles::TANK | roles::LEADER), "Leader, Tank");
        assert_eq!(roles::describe(roles::NONE), "None");
    }

    #[test]
    fn test_entity_ref_serialization() {
        let json = serde_json::to_string(&EntityRef::Group(5)).unwrap();
        assert_eq!(json, r#"{"kind":"Group","id":5}"#);
    }
}
