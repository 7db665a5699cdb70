//! Dungeon catalog, eligibility locks and completion rewards

pub mod catalog;
pub mod locks;
pub mod rewards;

pub use catalog::{AccessRequirement, DungeonCatalog, DungeonDefinition, DungeonType};
pub use locks::{lock_status, locked_dungeons};
pub use rewards::{RewardEntry, RewardTable};
