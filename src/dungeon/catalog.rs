//! Static dungeon definitions
//!
//! The catalog is loaded once at start-up (TOML) and is read-only afterwards.

use super::rewards::{RewardEntry, RewardTable};
use crate::error::{LfgError, Result};
use crate::types::{DungeonId, TeleportPose};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info, warn};

/// Built-in catalog shipped with the service
const SAMPLE_CATALOG: &str = include_str!("../../data/dungeons.toml");

/// Kind of content a dungeon entry describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DungeonType {
    Dungeon,
    Raid,
    Zone,
    Heroic,
    Random,
}

impl DungeonType {
    /// Numeric type code packed into the high byte of an entry
    pub fn code(&self) -> u32 {
        match self {
            DungeonType::Dungeon => 1,
            DungeonType::Raid => 2,
            DungeonType::Zone => 4,
            DungeonType::Heroic => 5,
            DungeonType::Random => 6,
        }
    }
}

/// Extra conditions to enter a dungeon
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessRequirement {
    pub achievement: Option<u32>,
    pub quest_alliance: Option<u32>,
    pub quest_horde: Option<u32>,
    pub item: Option<u32>,
    /// Accepted in place of `item`
    pub item2: Option<u32>,
}

/// A single dungeon row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DungeonDefinition {
    pub id: DungeonId,
    pub name: String,
    pub map: u32,
    #[serde(default)]
    pub difficulty: u8,
    #[serde(rename = "type")]
    pub dungeon_type: DungeonType,
    #[serde(default)]
    pub expansion: u8,
    #[serde(default)]
    pub group_category: u32,
    pub min_level: u8,
    pub max_level: u8,
    #[serde(default)]
    pub required_item_level: u16,
    #[serde(default)]
    pub seasonal: bool,
    #[serde(default)]
    pub pose: Option<TeleportPose>,
    #[serde(default)]
    pub access: Option<AccessRequirement>,
}

impl DungeonDefinition {
    /// Minimal definition open to every level
    pub fn new(id: DungeonId, name: impl Into<String>, map: u32, dungeon_type: DungeonType) -> Self {
        Self {
            id,
            name: name.into(),
            map,
            difficulty: 0,
            dungeon_type,
            expansion: 0,
            group_category: 0,
            min_level: 1,
            max_level: 80,
            required_item_level: 0,
            seasonal: false,
            pose: None,
            access: None,
        }
    }

    pub fn with_group_category(mut self, category: u32) -> Self {
        self.group_category = category;
        self
    }

    pub fn with_levels(mut self, min_level: u8, max_level: u8) -> Self {
        self.min_level = min_level;
        self.max_level = max_level;
        self
    }

    /// Id with the type code in the high byte
    pub fn entry(&self) -> u32 {
        self.id | (self.dungeon_type.code() << 24)
    }

    pub fn is_random(&self) -> bool {
        self.dungeon_type == DungeonType::Random
    }

    pub fn is_raid(&self) -> bool {
        self.dungeon_type == DungeonType::Raid
    }
}

#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "dungeon")]
    dungeons: Vec<DungeonDefinition>,
    #[serde(default, rename = "reward")]
    rewards: Vec<RewardEntry>,
}

/// Read-only dungeon lookup
#[derive(Debug, Clone, Default)]
pub struct DungeonCatalog {
    dungeons: BTreeMap<DungeonId, DungeonDefinition>,
    rewards: RewardTable,
}

impl DungeonCatalog {
    /// Load a catalog from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read dungeon catalog {}", path.display()))?;
        let catalog = Self::from_toml_str(&contents)?;
        info!(
            "Loaded dungeon catalog from {} ({} dungeons)",
            path.display(),
            catalog.len()
        );
        Ok(catalog)
    }

    /// Parse a catalog from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(contents).map_err(|e| LfgError::CatalogError {
            reason: e.to_string(),
        })?;
        Self::from_definitions(file.dungeons, file.rewards)
    }

    /// The catalog bundled with the crate
    pub fn sample() -> Result<Self> {
        Self::from_toml_str(SAMPLE_CATALOG)
    }

    /// Build a catalog from already parsed rows
    pub fn from_definitions(
        definitions: Vec<DungeonDefinition>,
        rewards: Vec<RewardEntry>,
    ) -> Result<Self> {
        let mut dungeons = BTreeMap::new();
        for definition in definitions {
            if definition.id == 0 || definition.id > 0x00FF_FFFF {
                return Err(LfgError::CatalogError {
                    reason: format!("dungeon id {} out of range", definition.id),
                }
                .into());
            }
            if definition.min_level > definition.max_level {
                return Err(LfgError::CatalogError {
                    reason: format!(
                        "dungeon {} has min level {} above max level {}",
                        definition.id, definition.min_level, definition.max_level
                    ),
                }
                .into());
            }
            let id = definition.id;
            if dungeons.insert(id, definition).is_some() {
                return Err(LfgError::CatalogError {
                    reason: format!("duplicate dungeon id {}", id),
                }
                .into());
            }
        }

        for reward in &rewards {
            match dungeons.get(&reward.dungeon_id) {
                None => warn!(
                    "Reward row references unknown dungeon {}",
                    reward.dungeon_id
                ),
                Some(d) if !d.is_random() && !d.seasonal => debug!(
                    "Reward row for dungeon {} which is neither random nor seasonal",
                    d.id
                ),
                _ => {}
            }
        }

        Ok(Self {
            dungeons,
            rewards: RewardTable::new(rewards),
        })
    }

    pub fn get(&self, id: DungeonId) -> Option<&DungeonDefinition> {
        self.dungeons.get(&id)
    }

    /// Entry of a dungeon, 0 when unknown
    pub fn entry(&self, id: DungeonId) -> u32 {
        self.get(id).map(|d| d.entry()).unwrap_or(0)
    }

    /// Dungeons a random dungeon can pick from; 0 lists every non-random dungeon
    pub fn dungeons_by_random(&self, random_id: DungeonId) -> BTreeSet<DungeonId> {
        let category = if random_id == 0 {
            None
        } else {
            match self.get(random_id) {
                Some(random) => Some(random.group_category),
                None => return BTreeSet::new(),
            }
        };

        self.dungeons
            .values()
            .filter(|d| !d.is_random() && d.dungeon_type != DungeonType::Zone)
            .filter(|d| category.map_or(true, |c| d.group_category == c))
            .map(|d| d.id)
            .collect()
    }

    pub fn all_ids(&self) -> impl Iterator<Item = DungeonId> + '_ {
        self.dungeons.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DungeonDefinition> {
        self.dungeons.values()
    }

    pub fn rewards(&self) -> &RewardTable {
        &self.rewards
    }

    pub fn len(&self) -> usize {
        self.dungeons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dungeons.is_empty()
    }
}
