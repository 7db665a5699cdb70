//! Running wait-time averages per dungeon and role class

use crate::types::DungeonId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Incremental mean of observed waits
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WaitTimeStat {
    pub mean_ms: f64,
    pub samples: u64,
}

impl WaitTimeStat {
    pub fn record(&mut self, wait_ms: i64) {
        let n = self.samples as f64;
        self.mean_ms = (self.mean_ms * n + wait_ms as f64) / (n + 1.0);
        self.samples += 1;
    }

    /// Rounded mean, -1 when nothing was recorded yet
    pub fn time_ms(&self) -> i64 {
        if self.samples == 0 {
            -1
        } else {
            self.mean_ms.round() as i64
        }
    }
}

/// Role class a wait sample is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WaitRole {
    Tank,
    Healer,
    Dps,
    Average,
}

/// Per-dungeon statistics, never reset
#[derive(Debug, Clone, Default)]
pub struct WaitTimes {
    tank: BTreeMap<DungeonId, WaitTimeStat>,
    healer: BTreeMap<DungeonId, WaitTimeStat>,
    dps: BTreeMap<DungeonId, WaitTimeStat>,
    avg: BTreeMap<DungeonId, WaitTimeStat>,
}

impl WaitTimes {
    fn table(&self, role: WaitRole) -> &BTreeMap<DungeonId, WaitTimeStat> {
        match role {
            WaitRole::Tank => &self.tank,
            WaitRole::Healer => &self.healer,
            WaitRole::Dps => &self.dps,
            WaitRole::Average => &self.avg,
        }
    }

    pub fn record(&mut self, role: WaitRole, dungeon: DungeonId, wait_ms: i64) {
        let table = match role {
            WaitRole::Tank => &mut self.tank,
            WaitRole::Healer => &mut self.healer,
            WaitRole::Dps => &mut self.dps,
            WaitRole::Average => &mut self.avg,
        };
        table.entry(dungeon).or_default().record(wait_ms);
    }

    pub fn get(&self, role: WaitRole, dungeon: DungeonId) -> WaitTimeStat {
        self.table(role).get(&dungeon).copied().unwrap_or_default()
    }

    pub fn time_ms(&self, role: WaitRole, dungeon: DungeonId) -> i64 {
        self.get(role, dungeon).time_ms()
    }
}
