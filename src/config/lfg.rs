//! Dungeon finder engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables of the matching engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LfgConfig {
    /// Dungeon finder queueing enabled
    pub enable_dungeon_finder: bool,
    /// Raid browser enabled
    pub enable_raid_browser: bool,
    /// Tanks per formed group
    pub tanks_needed: u8,
    /// Healers per formed group
    pub healers_needed: u8,
    /// Damage dealers per formed group
    pub dps_needed: u8,
    /// Seconds a group has to answer a role check
    pub role_check_timeout_seconds: u64,
    /// Seconds players have to accept a proposal
    pub proposal_timeout_seconds: u64,
    /// Seconds a vote kick stays open
    pub boot_timeout_seconds: u64,
    /// Seconds between queue status broadcasts
    pub queue_status_interval_seconds: u64,
    /// Vote kicks a group may start per dungeon
    pub max_kicks: u8,
    /// Agree votes required to kick a member
    pub kick_votes_needed: u8,
    /// Queue both factions in a single pool
    pub cross_faction: bool,
    /// Fixed seed for dungeon and leader selection
    pub rng_seed: Option<u64>,
    /// Dungeon catalog file, built-in sample catalog when unset
    pub catalog_path: Option<String>,
}

impl Default for LfgConfig {
    fn default() -> Self {
        Self {
            enable_dungeon_finder: true,
            enable_raid_browser: false,
            tanks_needed: 1,
            healers_needed: 1,
            dps_needed: 3,
            role_check_timeout_seconds: 45,
            proposal_timeout_seconds: 45,
            boot_timeout_seconds: 120,
            queue_status_interval_seconds: 15,
            max_kicks: 3,
            kick_votes_needed: 3,
            cross_faction: false,
            rng_seed: None,
            catalog_path: None,
        }
    }
}

impl LfgConfig {
    /// Players in a complete group
    pub fn group_size(&self) -> usize {
        self.tanks_needed as usize + self.healers_needed as usize + self.dps_needed as usize
    }

    /// Whether any LFG system is switched on
    pub fn is_enabled(&self) -> bool {
        self.enable_dungeon_finder || self.enable_raid_browser
    }

    pub fn role_check_timeout(&self) -> Duration {
        Duration::from_secs(self.role_check_timeout_seconds)
    }

    pub fn proposal_timeout(&self) -> Duration {
        Duration::from_secs(self.proposal_timeout_seconds)
    }

    pub fn boot_timeout(&self) -> Duration {
        Duration::from_secs(self.boot_timeout_seconds)
    }

    pub fn queue_status_interval(&self) -> Duration {
        Duration::from_secs(self.queue_status_interval_seconds)
    }
}
