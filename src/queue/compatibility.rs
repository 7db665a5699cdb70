//! Memoized compatibility verdicts for candidate sets

use crate::types::{EntityRef, RoleMap};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Verdict for a set of queue entries, ordered from worst to best
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LfgCompatibility {
    Pending,
    WrongGroupSize,
    TooManyPlayers,
    MultipleLfgGroups,
    HasIgnores,
    NoRoles,
    NoDungeons,
    WithLessPlayers,
    BadStates,
    Match,
}

impl LfgCompatibility {
    /// Verdicts that still allow growing the set
    pub fn is_compatible(&self) -> bool {
        *self >= LfgCompatibility::WithLessPlayers
    }
}

/// Canonical identity of a candidate set: sorted and deduplicated
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CompatibilityKey(BTreeSet<EntityRef>);

impl CompatibilityKey {
    pub fn contains(&self, entity: &EntityRef) -> bool {
        self.0.contains(entity)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityRef> {
        self.0.iter()
    }
}

impl FromIterator<EntityRef> for CompatibilityKey {
    fn from_iter<I: IntoIterator<Item = EntityRef>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<&'a EntityRef> for CompatibilityKey {
    fn from_iter<I: IntoIterator<Item = &'a EntityRef>>(iter: I) -> Self {
        Self(iter.into_iter().copied().collect())
    }
}

impl std::fmt::Display for CompatibilityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", parts.join("|"))
    }
}

/// Cached verdict, with the role assignment for partial matches
#[derive(Debug, Clone, PartialEq)]
pub struct CompatibilityRecord {
    pub verdict: LfgCompatibility,
    pub roles: Option<RoleMap>,
}

/// Lookup counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evaluations: u64,
}

/// Verdict cache keyed by candidate set
#[derive(Debug, Default)]
pub struct CompatibilityCache {
    entries: HashMap<CompatibilityKey, CompatibilityRecord>,
    stats: CacheStats,
}

impl CompatibilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached record for `key`, counted as a hit or a miss
    pub fn lookup(&mut self, key: &CompatibilityKey) -> Option<CompatibilityRecord> {
        match self.entries.get(key) {
            Some(record) => {
                self.stats.hits += 1;
                Some(record.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Cached verdict without touching the counters
    pub fn peek(&self, key: &CompatibilityKey) -> Option<LfgCompatibility> {
        self.entries.get(key).map(|r| r.verdict)
    }

    pub fn store(&mut self, key: CompatibilityKey, verdict: LfgCompatibility, roles: Option<RoleMap>) {
        self.entries.insert(key, CompatibilityRecord { verdict, roles });
    }

    /// Partial matches that include `entity`, with their role assignment
    pub fn partial_matches_of<'a>(
        &'a self,
        entity: &'a EntityRef,
    ) -> impl Iterator<Item = (&'a CompatibilityKey, &'a RoleMap)> + 'a {
        self.entries.iter().filter_map(move |(key, record)| {
            if record.verdict == LfgCompatibility::WithLessPlayers && key.contains(entity) {
                record.roles.as_ref().map(|roles| (key, roles))
            } else {
                None
            }
        })
    }

    /// Count a verdict computed from scratch
    pub fn note_evaluation(&mut self) {
        self.stats.evaluations += 1;
    }

    /// Drop every record whose key includes `entity`
    pub fn remove_containing(&mut self, entity: &EntityRef) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.contains(entity));
        before - self.entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
