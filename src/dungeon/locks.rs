//! Per-player dungeon eligibility

use super::catalog::{DungeonCatalog, DungeonDefinition, DungeonType};
use crate::types::{LockMap, LockStatus, Team};
use crate::world::{PlayerProfile, World};

/// Why `profile` cannot enter `dungeon`, if anything stops it.
/// Checks run in a fixed order and the first failing one wins.
pub fn lock_status(
    profile: &PlayerProfile,
    dungeon: &DungeonDefinition,
    world: &dyn World,
) -> Option<LockStatus> {
    if !profile.can_join {
        return Some(LockStatus::RaidLocked);
    }
    if profile.expansion < dungeon.expansion {
        return Some(LockStatus::InsufficientExpansion);
    }
    let saved = matches!(dungeon.dungeon_type, DungeonType::Heroic | DungeonType::Raid)
        || dungeon.difficulty > 0;
    if saved && profile.instance_locks.contains(&dungeon.map) {
        return Some(LockStatus::RaidLocked);
    }
    if profile.level < dungeon.min_level {
        return Some(LockStatus::TooLowLevel);
    }
    if profile.level > dungeon.max_level {
        return Some(LockStatus::TooHighLevel);
    }
    if dungeon.seasonal && !world.is_season_active(dungeon.id) {
        return Some(LockStatus::NotInSeason);
    }
    if profile.item_level < dungeon.required_item_level {
        return Some(LockStatus::TooLowGearScore);
    }

    let access = dungeon.access.as_ref()?;
    if let Some(achievement) = access.achievement {
        if !profile.achievements.contains(&achievement) {
            return Some(LockStatus::MissingAchievement);
        }
    }
    let quest = match profile.team {
        Team::Alliance => access.quest_alliance,
        Team::Horde => access.quest_horde,
    };
    if let Some(quest) = quest {
        if !profile.completed_quests.contains(&quest) {
            return Some(LockStatus::QuestNotCompleted);
        }
    }
    if let Some(item) = access.item {
        let has_alternate = access.item2.map_or(false, |i| profile.items.contains(&i));
        if !profile.items.contains(&item) && !has_alternate {
            return Some(LockStatus::MissingItem);
        }
    }
    None
}

/// Lock map of every catalog dungeon the player cannot enter, keyed by entry
pub fn locked_dungeons(
    profile: &PlayerProfile,
    catalog: &DungeonCatalog,
    world: &dyn World,
) -> LockMap {
    catalog
        .iter()
        .filter_map(|dungeon| lock_status(profile, dungeon, world).map(|s| (dungeon.entry(), s)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dungeon::catalog::AccessRequirement;
    use crate::world::InMemoryWorld;

    fn create_test_profile() -> PlayerProfile {
        PlayerProfile::new(1, "tester", 80, Team::Horde).with_item_level(200)
    }

    fn dungeon() -> DungeonDefinition {
        DungeonDefinition::new(10, "Test Dungeon", 100, DungeonType::Dungeon)
    }

    #[test]
    fn test_eligible_player_has_no_lock() {
        let world = InMemoryWorld::new();
        assert_eq!(lock_status(&create_test_profile(), &dungeon(), &world), None);
    }

    #[test]
    fn test_level_locks() {
        let world = InMemoryWorld::new();
        let mut profile = create_test_profile();
        let def = dungeon().with_levels(70, 75);

        profile.level = 60;
        assert_eq!(lock_status(&profile, &def, &world), Some(LockStatus::TooLowLevel));
        profile.level = 80;
        assert_eq!(lock_status(&profile, &def, &world), Some(LockStatus::TooHighLevel));
    }

    #[test]
    fn test_permission_checked_first() {
        let world = InMemoryWorld::new();
        let mut profile = create_test_profile();
        profile.can_join = false;
        profile.level = 1;
        assert_eq!(lock_status(&profile, &dungeon(), &world), Some(LockStatus::RaidLocked));
    }

    #[test]
    fn test_heroic_instance_lock() {
        let world = InMemoryWorld::new();
        let mut profile = create_test_profile();
        profile.instance_locks.insert(100);

        assert_eq!(lock_status(&profile, &dungeon(), &world), None);
        let mut heroic = dungeon();
        heroic.dungeon_type = DungeonType::Heroic;
        assert_eq!(lock_status(&profile, &heroic, &world), Some(LockStatus::RaidLocked));
    }

    #[test]
    fn test_seasonal_and_gear() {
        let world = InMemoryWorld::new();
        let profile = create_test_profile();
        let mut def = dungeon();
        def.seasonal = true;
        assert_eq!(lock_status(&profile, &def, &world), Some(LockStatus::NotInSeason));

        world.set_season_active(10, true);
        assert_eq!(lock_status(&profile, &def, &world), None);

        def.required_item_level = 250;
        assert_eq!(lock_status(&profile, &def, &world), Some(LockStatus::TooLowGearScore));
    }

    #[test]
    fn test_access_requirements() {
        let world = InMemoryWorld::new();
        let mut profile = create_test_profile();
        let mut def = dungeon();
        def.access = Some(AccessRequirement {
            achievement: Some(1),
            quest_alliance: Some(100),
            quest_horde: Some(200),
            item: Some(5),
            item2: Some(6),
        });

        assert_eq!(lock_status(&profile, &def, &world), Some(LockStatus::MissingAchievement));
        profile.achievements.insert(1);
        assert_eq!(lock_status(&profile, &def, &world), Some(LockStatus::QuestNotCompleted));
        profile.completed_quests.insert(100);
        assert_eq!(lock_status(&profile, &def, &world), Some(LockStatus::QuestNotCompleted));
        profile.completed_quests.insert(200);
        assert_eq!(lock_status(&profile, &def, &world), Some(LockStatus::MissingItem));
        profile.items.insert(6);
        assert_eq!(lock_status(&profile, &def, &world), None);
    }

    #[test]
    fn test_locked_dungeons_uses_entries() {
        let world = InMemoryWorld::new();
        let catalog = DungeonCatalog::sample().unwrap();
        let mut profile = create_test_profile();
        profile.level = 70;

        let locks = locked_dungeons(&profile, &catalog, &world);
        let heroic = catalog.get(242).unwrap();
        assert_eq!(locks.get(&heroic.entry()), Some(&LockStatus::TooLowLevel));
        assert!(!locks.contains_key(&catalog.entry(202)));
    }
}
