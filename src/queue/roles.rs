//! Role assignment for candidate groups

use crate::types::{roles, PlayerId, RoleMap};
use serde::{Deserialize, Serialize};

/// How many players of each role a complete group holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleQuotas {
    pub tanks: u8,
    pub healers: u8,
    pub dps: u8,
}

impl Default for RoleQuotas {
    fn default() -> Self {
        Self {
            tanks: 1,
            healers: 1,
            dps: 3,
        }
    }
}

impl RoleQuotas {
    pub fn group_size(&self) -> usize {
        self.tanks as usize + self.healers as usize + self.dps as usize
    }

    /// Slots left open once `assigned` (single-role masks) is placed
    pub fn remaining(&self, assigned: &RoleMap) -> RoleQuotas {
        let mut left = *self;
        for mask in assigned.values() {
            if mask & roles::TANK != 0 {
                left.tanks = left.tanks.saturating_sub(1);
            } else if mask & roles::HEALER != 0 {
                left.healers = left.healers.saturating_sub(1);
            } else if mask & roles::DAMAGE != 0 {
                left.dps = left.dps.saturating_sub(1);
            }
        }
        left
    }

    fn limit(&self, slot: usize) -> u8 {
        match slot {
            0 => self.tanks,
            1 => self.healers,
            _ => self.dps,
        }
    }
}

const SLOTS: [(u8, usize); 3] = [(roles::TANK, 0), (roles::HEALER, 1), (roles::DAMAGE, 2)];

/// Resolve every member to exactly one combat role without exceeding any quota.
///
/// Returns the resolved map (leader flag preserved) or `None` when no such
/// assignment exists. For a map holding a full group this is an exact
/// partition into the quotas.
pub fn check_group_roles(group: &RoleMap, quotas: &RoleQuotas) -> Option<RoleMap> {
    if group.is_empty() || group.len() > quotas.group_size() {
        return None;
    }

    let members: Vec<(PlayerId, u8)> = group.iter().map(|(p, r)| (*p, *r)).collect();
    if members.iter().any(|(_, r)| r & roles::COMBAT == 0) {
        return None;
    }

    let mut counts = [0u8; 3];
    let mut picked = Vec::with_capacity(members.len());
    if assign(&members, &mut counts, quotas, &mut picked) {
        Some(
            members
                .iter()
                .zip(picked)
                .map(|((player, _), role)| (*player, role))
                .collect(),
        )
    } else {
        None
    }
}

fn assign(
    members: &[(PlayerId, u8)],
    counts: &mut [u8; 3],
    quotas: &RoleQuotas,
    picked: &mut Vec<u8>,
) -> bool {
    let index = picked.len();
    let Some((_, mask)) = members.get(index) else {
        return true;
    };

    for (bit, slot) in SLOTS {
        if mask & bit == 0 || counts[slot] >= quotas.limit(slot) {
            continue;
        }
        counts[slot] += 1;
        picked.push(bit | (mask & roles::LEADER));
        if assign(members, counts, quotas, picked) {
            return true;
        }
        picked.pop();
        counts[slot] -= 1;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn role_map(masks: &[u8]) -> RoleMap {
        masks
            .iter()
            .enumerate()
            .map(|(i, m)| (i as PlayerId + 1, *m))
            .collect()
    }

    fn exact_partition_exists(masks: &[u8], quotas: &RoleQuotas) -> bool {
        let n = masks.len();
        let total = 3usize.pow(n as u32);
        (0..total).any(|mut code| {
            let mut counts = [0u8; 3];
            for mask in masks {
                let slot = code % 3;
                code /= 3;
                if mask & SLOTS[slot].0 == 0 {
                    return false;
                }
                counts[slot] += 1;
            }
            counts == [quotas.tanks, quotas.healers, quotas.dps]
        })
    }

    #[test]
    fn test_classic_group_resolves() {
        let group = role_map(&[
            roles::TANK | roles::LEADER,
            roles::HEALER,
            roles::DAMAGE,
            roles::DAMAGE,
            roles::DAMAGE,
        ]);
        let resolved = check_group_roles(&group, &RoleQuotas::default()).unwrap();
        assert_eq!(resolved[&1], roles::TANK | roles::LEADER);
        assert_eq!(resolved[&2], roles::HEALER);
    }

    #[test]
    fn test_too_many_tanks_fails() {
        let group = role_map(&[roles::TANK, roles::TANK, roles::DAMAGE]);
        assert!(check_group_roles(&group, &RoleQuotas::default()).is_none());
    }

    #[test]
    fn test_multi_role_players_backtrack() {
        let group = role_map(&[
            roles::TANK | roles::HEALER,
            roles::TANK,
            roles::DAMAGE,
            roles::DAMAGE,
            roles::HEALER | roles::DAMAGE,
        ]);
        let resolved = check_group_roles(&group, &RoleQuotas::default()).unwrap();
        assert_eq!(resolved[&1], roles::HEALER);
        assert_eq!(resolved[&2], roles::TANK);
        assert_eq!(resolved[&5], roles::DAMAGE);
    }

    #[test]
    fn test_empty_or_roleless_fails() {
        assert!(check_group_roles(&RoleMap::new(), &RoleQuotas::default()).is_none());
        let group = role_map(&[roles::LEADER]);
        assert!(check_group_roles(&group, &RoleQuotas::default()).is_none());
    }

    #[test]
    fn test_partial_group_within_quotas() {
        let group = role_map(&[roles::DAMAGE, roles::DAMAGE | roles::HEALER]);
        let resolved = check_group_roles(&group, &RoleQuotas::default()).unwrap();
        let left = RoleQuotas::default().remaining(&resolved);
        assert_eq!(left.tanks, 1);
        assert_eq!(left.healers + left.dps, 2);
    }

    proptest! {
        #[test]
        fn prop_full_group_matches_exact_partition(masks in prop::collection::vec(1u8..16, 5)) {
            let quotas = RoleQuotas::default();
            let group = role_map(&masks);
            let result = check_group_roles(&group, &quotas);

            prop_assert_eq!(result.is_some(), exact_partition_exists(&masks, &quotas));

            if let Some(resolved) = result {
                let left = quotas.remaining(&resolved);
                prop_assert_eq!((left.tanks, left.healers, left.dps), (0, 0, 0));
                for (player, role) in &resolved {
                    let combat = role & roles::COMBAT;
                    prop_assert_eq!(combat.count_ones(), 1);
                    prop_assert!(group[player] & combat != 0);
                    prop_assert_eq!(role & roles::LEADER, group[player] & roles::LEADER);
                }
            }
        }
    }
}
