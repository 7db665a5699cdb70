//! Group dungeon persistence through a mocked store

use crate::fixtures::{TestHarness, CLASSIC_PARTY, UTGARDE_KEEP};
use dungeon_finder::dungeon::DungeonCatalog;
use dungeon_finder::error::Result;
use dungeon_finder::manager::GroupEvents;
use dungeon_finder::persistence::{GroupDungeonRecord, GroupDungeonStore, InMemoryGroupStore};
use dungeon_finder::types::{EntityRef, GroupId, LfgState};
use mockall::predicate::eq;
use std::sync::Arc;

mockall::mock! {
    pub GroupStore {}

    impl GroupDungeonStore for GroupStore {
        fn save(&self, record: &GroupDungeonRecord) -> Result<()>;
        fn delete(&self, group_id: GroupId) -> Result<()>;
        fn load_all(&self) -> Result<Vec<GroupDungeonRecord>>;
    }
}

fn harness_with_store(store: Arc<dyn GroupDungeonStore>) -> TestHarness {
    TestHarness::with_group_store(store)
}

#[test]
fn test_formed_group_is_saved() {
    let mut store = MockGroupStore::new();
    store
        .expect_save()
        .withf(|record| record.members.len() == 5 && record.state == LfgState::Dungeon)
        .times(1)
        .returning(|_| Ok(()));

    let mut harness = harness_with_store(Arc::new(store));
    let group = harness.form_classic_group(UTGARDE_KEEP);
    assert!(harness.manager.is_lfg_group(group));
}

#[test]
fn test_disband_deletes_record() {
    let mut store = MockGroupStore::new();
    store.expect_save().returning(|_| Ok(()));
    store
        .expect_delete()
        .with(eq(1))
        .times(1)
        .returning(|_| Ok(()));

    let mut harness = harness_with_store(Arc::new(store));
    let group = harness.form_classic_group(UTGARDE_KEEP);
    assert_eq!(group, 1);
    harness.manager.on_group_disbanded(group);
}

#[test]
fn test_store_failures_do_not_block_group_formation() {
    let mut store = MockGroupStore::new();
    store
        .expect_save()
        .returning(|_| Err(anyhow::anyhow!("disk full")));

    let mut harness = harness_with_store(Arc::new(store));
    let group = harness.form_classic_group(UTGARDE_KEEP);
    assert_eq!(
        harness.manager.get_state(EntityRef::Group(group)),
        LfgState::Dungeon
    );
}

#[test]
fn test_persisted_groups_are_restored() {
    let entry = DungeonCatalog::sample().unwrap().entry(UTGARDE_KEEP);
    let record = GroupDungeonRecord {
        group_id: 77,
        leader: 1,
        members: CLASSIC_PARTY.iter().map(|(id, _)| *id).collect(),
        dungeon_entry: entry,
        state: LfgState::Dungeon,
    };
    let mut store = MockGroupStore::new();
    store
        .expect_load_all()
        .times(1)
        .returning(move || Ok(vec![record.clone()]));

    let mut harness = harness_with_store(Arc::new(store));
    assert_eq!(harness.manager.load_persisted_groups().unwrap(), 1);

    assert!(harness.manager.is_lfg_group(77));
    assert_eq!(harness.manager.get_dungeon(77), UTGARDE_KEEP);
    assert_eq!(harness.manager.get_leader(77), Some(1));
    assert_eq!(harness.manager.get_group(3), Some(77));
    assert_eq!(
        harness.manager.get_state(EntityRef::Player(3)),
        LfgState::Dungeon
    );
}

#[test]
fn test_load_error_is_reported() {
    let mut store = MockGroupStore::new();
    store
        .expect_load_all()
        .returning(|| Err(anyhow::anyhow!("connection refused")));

    let mut harness = harness_with_store(Arc::new(store));
    assert!(harness.manager.load_persisted_groups().is_err());
}

#[test]
fn test_in_memory_store_tracks_finished_state() {
    let store = Arc::new(InMemoryGroupStore::new());
    let mut harness = harness_with_store(store.clone());
    let group = harness.form_classic_group(UTGARDE_KEEP);

    assert_eq!(store.get(group).unwrap().state, LfgState::Dungeon);
    harness.manager.finish_dungeon(group, UTGARDE_KEEP);
    assert_eq!(store.get(group).unwrap().state, LfgState::FinishedDungeon);
}
