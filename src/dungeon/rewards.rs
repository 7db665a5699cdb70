//! Random dungeon completion rewards

use crate::types::DungeonId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reward row: applies to players up to `max_level`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardEntry {
    pub dungeon_id: DungeonId,
    pub max_level: u8,
    /// Quest granted on the first completion of the day
    pub first_quest: u32,
    /// Quest granted on later completions
    pub other_quest: u32,
}

/// Rewards per dungeon, ordered by max level
#[derive(Debug, Clone, Default)]
pub struct RewardTable {
    rows: BTreeMap<DungeonId, Vec<RewardEntry>>,
}

impl RewardTable {
    pub fn new(entries: Vec<RewardEntry>) -> Self {
        let mut rows: BTreeMap<DungeonId, Vec<RewardEntry>> = BTreeMap::new();
        for entry in entries {
            rows.entry(entry.dungeon_id).or_default().push(entry);
        }
        for list in rows.values_mut() {
            list.sort_by_key(|e| e.max_level);
        }
        Self { rows }
    }

    /// First row whose max level covers `level`, else the highest row.
    /// Accepts either a dungeon id or a packed entry.
    pub fn reward_for(&self, dungeon: u32, level: u8) -> Option<&RewardEntry> {
        let list = self.rows.get(&(dungeon & 0x00FF_FFFF))?;
        list.iter()
            .find(|e| e.max_level >= level)
            .or_else(|| list.last())
    }

    pub fn len(&self) -> usize {
        self.rows.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_table() -> RewardTable {
        RewardTable::new(vec![
            RewardEntry {
                dungeon_id: 261,
                max_level: 80,
                first_quest: 2,
                other_quest: 20,
            },
            RewardEntry {
                dungeon_id: 261,
                max_level: 75,
                first_quest: 1,
                other_quest: 10,
            },
        ])
    }

    #[test]
    fn test_reward_by_level() {
        let table = create_test_table();
        assert_eq!(table.reward_for(261, 70).unwrap().first_quest, 1);
        assert_eq!(table.reward_for(261, 75).unwrap().first_quest, 1);
        assert_eq!(table.reward_for(261, 76).unwrap().first_quest, 2);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_reward_falls_back_to_last_row() {
        let table = create_test_table();
        assert_eq!(table.reward_for(261, 85).unwrap().other_quest, 20);
    }

    #[test]
    fn test_reward_accepts_packed_entry() {
        let table = create_test_table();
        let entry = 261 | (6 << 24);
        assert!(table.reward_for(entry, 80).is_some());
        assert!(table.reward_for(262, 80).is_none());
    }
}
