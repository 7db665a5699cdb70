//! Group dungeon persistence
//!
//! Formed LFG groups survive a restart: the engine saves which dungeon each
//! group is running and reloads those rows at start-up.

use crate::error::Result;
use crate::types::{GroupId, LfgState, PlayerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// One persisted group row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupDungeonRecord {
    pub group_id: GroupId,
    pub leader: PlayerId,
    pub members: Vec<PlayerId>,
    pub dungeon_entry: u32,
    pub state: LfgState,
}

/// Storage for group dungeon rows
pub trait GroupDungeonStore: Send + Sync {
    fn save(&self, record: &GroupDungeonRecord) -> Result<()>;
    fn delete(&self, group_id: GroupId) -> Result<()>;
    fn load_all(&self) -> Result<Vec<GroupDungeonRecord>>;
}

/// Store kept in process memory
#[derive(Debug, Default)]
pub struct InMemoryGroupStore {
    rows: RwLock<BTreeMap<GroupId, GroupDungeonRecord>>,
}

impl InMemoryGroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, group_id: GroupId) -> Option<GroupDungeonRecord> {
        self.rows.read().ok().and_then(|r| r.get(&group_id).cloned())
    }
}

impl GroupDungeonStore for InMemoryGroupStore {
    fn save(&self, record: &GroupDungeonRecord) -> Result<()> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| anyhow::anyhow!("Group store lock poisoned"))?;
        rows.insert(record.group_id, record.clone());
        Ok(())
    }

    fn delete(&self, group_id: GroupId) -> Result<()> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| anyhow::anyhow!("Group store lock poisoned"))?;
        rows.remove(&group_id);
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<GroupDungeonRecord>> {
        let rows = self
            .rows
            .read()
            .map_err(|_| anyhow::anyhow!("Group store lock poisoned"))?;
        Ok(rows.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_record(group_id: GroupId) -> GroupDungeonRecord {
        GroupDungeonRecord {
            group_id,
            leader: 1,
            members: vec![1, 2, 3, 4, 5],
            dungeon_entry: 10 | (1 << 24),
            state: LfgState::Dungeon,
        }
    }

    #[test]
    fn test_save_load_delete() {
        let store = InMemoryGroupStore::new();
        store.save(&create_test_record(1)).unwrap();
        store.save(&create_test_record(2)).unwrap();
        assert_eq!(store.load_all().unwrap().len(), 2);

        let mut updated = create_test_record(1);
        updated.state = LfgState::FinishedDungeon;
        store.save(&updated).unwrap();
        assert_eq!(store.get(1).unwrap().state, LfgState::FinishedDungeon);

        store.delete(1).unwrap();
        assert!(store.get(1).is_none());
        assert_eq!(store.load_all().unwrap().len(), 1);
    }
}
