//! Matchmaking queue for one pool
//!
//! Entries start in the `new` list and are moved to the `waiting` list once a
//! search pass could not place them. Each pass grows candidate sets greedily
//! from a new entry against a snapshot of the waiting list, memoizing every
//! verdict in the compatibility cache.

use super::compatibility::{CompatibilityCache, CompatibilityKey, LfgCompatibility};
use super::proposal::{Proposal, ProposalPlayer};
use super::roles::{check_group_roles, RoleQuotas};
use super::wait_time::{WaitRole, WaitTimes};
use crate::notify::QueueStatus;
use crate::types::{
    roles, DungeonId, EntityRef, GroupId, LfgAnswer, LfgState, PlayerId, ProposalState,
    QueuePool, RoleMap,
};
use crate::utils::{deadline, elapsed_ms};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::IteratorRandom;
use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::Duration;
use tracing::{debug, error, trace};

/// Engine state the queue consults while matching
pub trait QueueContext {
    fn state(&self, entity: EntityRef) -> LfgState;
    fn old_state(&self, entity: EntityRef) -> LfgState;
    /// Group was formed by the dungeon finder
    fn is_lfg_group(&self, group: GroupId) -> bool;
    fn has_ignore(&self, a: PlayerId, b: PlayerId) -> bool;

    fn all_queued(&self, entities: &[EntityRef]) -> bool {
        !entities.is_empty()
            && entities.iter().all(|e| {
                let state = self.state(*e);
                if state != LfgState::Queued && state != LfgState::Proposal {
                    debug!("{} is in state {} while being matched", e, state);
                }
                state == LfgState::Queued
            })
    }
}

/// Matching parameters
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub quotas: RoleQuotas,
    pub proposal_timeout: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            quotas: RoleQuotas::default(),
            proposal_timeout: Duration::from_secs(45),
        }
    }
}

/// Queue record of an entry
#[derive(Debug, Clone)]
pub struct QueueData {
    pub join_time: DateTime<Utc>,
    pub dungeons: BTreeSet<DungeonId>,
    pub roles: RoleMap,
    pub tanks_needed: u8,
    pub healers_needed: u8,
    pub dps_needed: u8,
    pub best_compatible: Option<CompatibilityKey>,
    best_size: usize,
}

impl QueueData {
    fn new(
        join_time: DateTime<Utc>,
        dungeons: BTreeSet<DungeonId>,
        roles: RoleMap,
        quotas: &RoleQuotas,
    ) -> Self {
        Self {
            join_time,
            dungeons,
            roles,
            tanks_needed: quotas.tanks,
            healers_needed: quotas.healers,
            dps_needed: quotas.dps,
            best_compatible: None,
            best_size: 0,
        }
    }

    /// Dungeon used to key wait-time statistics
    pub fn first_dungeon(&self) -> DungeonId {
        self.dungeons.iter().next().copied().unwrap_or(0)
    }
}

/// Snapshot of a queue for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct QueueSummary {
    pub pool: QueuePool,
    pub entries: usize,
    pub players: usize,
    pub new_entries: usize,
    pub waiting_entries: usize,
    pub cached_verdicts: usize,
}

struct Search<'a> {
    ctx: &'a dyn QueueContext,
    rng: &'a mut StdRng,
    now: DateTime<Utc>,
    proposals: Vec<Proposal>,
}

/// Queue for one matchmaking pool
#[derive(Debug)]
pub struct LfgQueue {
    pool: QueuePool,
    settings: QueueSettings,
    queue_data: BTreeMap<EntityRef, QueueData>,
    new_queue: VecDeque<EntityRef>,
    current_queue: VecDeque<EntityRef>,
    cache: CompatibilityCache,
    wait_times: WaitTimes,
}

impl LfgQueue {
    pub fn new(pool: QueuePool, settings: QueueSettings) -> Self {
        Self {
            pool,
            settings,
            queue_data: BTreeMap::new(),
            new_queue: VecDeque::new(),
            current_queue: VecDeque::new(),
            cache: CompatibilityCache::new(),
            wait_times: WaitTimes::default(),
        }
    }

    pub fn pool(&self) -> QueuePool {
        self.pool
    }

    /// Create the queue record of an entry and put it in the new list
    pub fn add_queue_data(
        &mut self,
        entity: EntityRef,
        join_time: DateTime<Utc>,
        dungeons: BTreeSet<DungeonId>,
        roles: RoleMap,
    ) {
        let data = QueueData::new(join_time, dungeons, roles, &self.settings.quotas);
        self.queue_data.insert(entity, data);
        self.add_to_queue(entity, false);
    }

    /// Put an entry with a queue record back in line; `re_add` jumps the waiting list
    pub fn add_to_queue(&mut self, entity: EntityRef, re_add: bool) {
        if !self.queue_data.contains_key(&entity) {
            error!("Queue data not found for {} in {} queue", entity, self.pool);
            return;
        }

        self.remove_from_lists(&entity);
        if re_add {
            self.current_queue.push_front(entity);
        } else {
            self.new_queue.push_back(entity);
        }
    }

    /// Drop an entry together with its record and every verdict involving it
    pub fn remove_from_queue(&mut self, entity: EntityRef) {
        self.remove_from_lists(&entity);
        let dropped = self.cache.remove_containing(&entity);
        trace!("Dropped {} cached verdicts for {}", dropped, entity);

        let stale: Vec<EntityRef> = self
            .queue_data
            .iter()
            .filter(|(e, d)| {
                **e != entity
                    && d
                        .best_compatible
                        .as_ref()
                        .map_or(false, |key| key.contains(&entity))
            })
            .map(|(e, _)| *e)
            .collect();
        for other in stale {
            self.recompute_best_compatible(other);
        }

        self.queue_data.remove(&entity);
    }

    fn remove_from_lists(&mut self, entity: &EntityRef) {
        self.new_queue.retain(|e| e != entity);
        self.current_queue.retain(|e| e != entity);
    }

    pub fn contains(&self, entity: &EntityRef) -> bool {
        self.queue_data.contains_key(entity)
    }

    pub fn queue_data(&self, entity: &EntityRef) -> Option<&QueueData> {
        self.queue_data.get(entity)
    }

    pub fn join_time(&self, entity: &EntityRef) -> Option<DateTime<Utc>> {
        self.queue_data.get(entity).map(|d| d.join_time)
    }

    pub fn new_entries(&self) -> impl Iterator<Item = &EntityRef> {
        self.new_queue.iter()
    }

    pub fn waiting_entries(&self) -> impl Iterator<Item = &EntityRef> {
        self.current_queue.iter()
    }

    pub fn len(&self) -> usize {
        self.queue_data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue_data.is_empty()
    }

    /// Players across every entry
    pub fn player_count(&self) -> usize {
        self.queue_data.values().map(|d| d.roles.len()).sum()
    }

    pub fn cache(&self) -> &CompatibilityCache {
        &self.cache
    }

    /// Run one search pass over every new entry
    pub fn find_groups(
        &mut self,
        ctx: &dyn QueueContext,
        rng: &mut StdRng,
        now: DateTime<Utc>,
    ) -> Vec<Proposal> {
        let mut search = Search {
            ctx,
            rng,
            now,
            proposals: Vec::new(),
        };

        while let Some(front) = self.new_queue.pop_front() {
            let mut check = vec![front];
            let mut all = self.current_queue.clone();
            let verdict = self.find_new_groups(&mut check, &mut all, &mut search);

            if verdict != LfgCompatibility::Match && self.queue_data.contains_key(&front) {
                self.current_queue.push_back(front);
            }
        }

        if !search.proposals.is_empty() {
            debug!(
                "{} queue formed {} proposals, {} entries left waiting",
                self.pool,
                search.proposals.len(),
                self.current_queue.len()
            );
        }
        search.proposals
    }

    fn find_new_groups(
        &mut self,
        check: &mut Vec<EntityRef>,
        all: &mut VecDeque<EntityRef>,
        search: &mut Search<'_>,
    ) -> LfgCompatibility {
        let key: CompatibilityKey = check.iter().collect();
        let mut verdict = match self.cache.lookup(&key) {
            Some(record) if record.verdict != LfgCompatibility::Match => record.verdict,
            _ => self.check_compatibility(check, search),
        };

        if verdict == LfgCompatibility::BadStates && search.ctx.all_queued(check) {
            verdict = self.check_compatibility(check, search);
        }

        if verdict != LfgCompatibility::WithLessPlayers {
            return verdict;
        }

        while let Some(next) = all.pop_front() {
            check.push(next);
            if self.find_new_groups(check, all, search) == LfgCompatibility::Match {
                return LfgCompatibility::Match;
            }
            check.pop();
        }
        verdict
    }

    fn check_compatibility(
        &mut self,
        check: &[EntityRef],
        search: &mut Search<'_>,
    ) -> LfgCompatibility {
        let quotas = self.settings.quotas;
        let max_players = quotas.group_size();
        if check.is_empty() || check.len() > max_players {
            return LfgCompatibility::WrongGroupSize;
        }

        self.cache.note_evaluation();
        let key: CompatibilityKey = check.iter().collect();

        if check.len() > 2 {
            let child = &check[1..];
            let child_key: CompatibilityKey = child.iter().collect();
            let child_verdict = match self.cache.lookup(&child_key) {
                Some(record) => record.verdict,
                None => self.check_compatibility(child, search),
            };
            if child_verdict == LfgCompatibility::Pending {
                return LfgCompatibility::Pending;
            }
            if child_verdict < LfgCompatibility::WithLessPlayers {
                self.cache.store(key, child_verdict, None);
                return child_verdict;
            }
        }

        let mut num_players = 0usize;
        let mut num_lfg_groups = 0usize;
        let mut lfg_group: Option<GroupId> = None;
        let mut player_groups: BTreeMap<PlayerId, Option<GroupId>> = BTreeMap::new();
        for entity in check {
            let Some(data) = self.queue_data.get(entity) else {
                error!("{} not found in {} queue while matching", entity, self.pool);
                self.remove_from_queue(*entity);
                return LfgCompatibility::Pending;
            };

            let group = match entity {
                EntityRef::Group(g) => Some(*g),
                EntityRef::Player(_) => None,
            };
            for player in data.roles.keys() {
                player_groups.insert(*player, group);
            }
            num_players += data.roles.len();

            if let Some(g) = group {
                if search.ctx.is_lfg_group(g) {
                    if num_lfg_groups == 0 {
                        lfg_group = Some(g);
                    }
                    num_lfg_groups += 1;
                }
            }
        }

        if check.len() == 1 && num_players != max_players {
            let entity = check[0];
            let raw = self.queue_data[&entity].roles.clone();
            let roles = check_group_roles(&raw, &quotas).unwrap_or(raw);
            self.update_best_compatible(entity, &key, &roles);
            self.cache
                .store(key, LfgCompatibility::WithLessPlayers, Some(roles));
            return LfgCompatibility::WithLessPlayers;
        }

        if num_lfg_groups > 1 {
            self.cache.store(key, LfgCompatibility::MultipleLfgGroups, None);
            return LfgCompatibility::MultipleLfgGroups;
        }

        if num_players > max_players {
            self.cache.store(key, LfgCompatibility::TooManyPlayers, None);
            return LfgCompatibility::TooManyPlayers;
        }

        let (proposal_roles, proposal_dungeons) = if check.len() > 1 {
            let mut admitted = RoleMap::new();
            for entity in check {
                for (player, role) in &self.queue_data[entity].roles {
                    let mut admit = true;
                    for existing in admitted.keys() {
                        if existing == player {
                            error!("Player {} queued twice in candidate set {}", player, key);
                        } else if search.ctx.has_ignore(*player, *existing) {
                            admit = false;
                            break;
                        }
                    }
                    if admit {
                        admitted.insert(*player, *role);
                    }
                }
            }

            if admitted.len() != num_players {
                self.cache.store(key, LfgCompatibility::HasIgnores, None);
                return LfgCompatibility::HasIgnores;
            }

            let Some(resolved) = check_group_roles(&admitted, &quotas) else {
                self.cache.store(key, LfgCompatibility::NoRoles, None);
                return LfgCompatibility::NoRoles;
            };

            let mut dungeons = self.queue_data[&check[0]].dungeons.clone();
            for entity in &check[1..] {
                let other = &self.queue_data[entity].dungeons;
                dungeons = dungeons.intersection(other).copied().collect();
            }
            if dungeons.is_empty() {
                self.cache.store(key, LfgCompatibility::NoDungeons, None);
                return LfgCompatibility::NoDungeons;
            }
            (resolved, dungeons)
        } else {
            let data = &self.queue_data[&check[0]];
            let roles = check_group_roles(&data.roles, &quotas).unwrap_or_else(|| data.roles.clone());
            (roles, data.dungeons.clone())
        };

        if num_players != max_players {
            for entity in check {
                self.update_best_compatible(*entity, &key, &proposal_roles);
            }
            self.cache.store(
                key,
                LfgCompatibility::WithLessPlayers,
                Some(proposal_roles),
            );
            return LfgCompatibility::WithLessPlayers;
        }

        let is_new = match lfg_group {
            Some(g) if num_lfg_groups == 1 => {
                search.ctx.old_state(EntityRef::Group(g)) != LfgState::Dungeon
            }
            _ => true,
        };

        if !search.ctx.all_queued(check) {
            self.cache.store(key, LfgCompatibility::BadStates, None);
            return LfgCompatibility::BadStates;
        }

        let Some(dungeon_id) = proposal_dungeons.iter().copied().choose(&mut *search.rng) else {
            self.cache.store(key, LfgCompatibility::NoDungeons, None);
            return LfgCompatibility::NoDungeons;
        };

        let mut leader: Option<PlayerId> = None;
        let mut leader_flagged = false;
        let mut players = BTreeMap::new();
        for (player, role) in &proposal_roles {
            if role & roles::LEADER != 0 {
                if !leader_flagged || leader.is_none() || search.rng.gen_bool(0.5) {
                    leader = Some(*player);
                }
                leader_flagged = true;
            } else if !leader_flagged && (leader.is_none() || search.rng.gen_bool(0.5)) {
                leader = Some(*player);
            }

            let group = player_groups.get(player).copied().flatten();
            let answer = if !is_new && group.is_some() && group == lfg_group {
                LfgAnswer::Agree
            } else {
                LfgAnswer::Pending
            };
            players.insert(
                *player,
                ProposalPlayer {
                    role: *role,
                    answer,
                    group,
                },
            );
        }

        for entity in check {
            self.remove_from_lists(entity);
        }

        let proposal = Proposal {
            id: 0,
            pool: self.pool,
            dungeon_id,
            state: ProposalState::Initiating,
            group: lfg_group,
            leader: leader.unwrap_or_default(),
            cancel_time: deadline(search.now, self.settings.proposal_timeout),
            is_new,
            queues: check.to_vec(),
            players,
        };
        debug!(
            "Match in {} queue for dungeon {}: {} (leader {})",
            self.pool, dungeon_id, key, proposal.leader
        );
        search.proposals.push(proposal);

        self.cache.store(key, LfgCompatibility::Match, None);
        LfgCompatibility::Match
    }

    fn update_best_compatible(&mut self, entity: EntityRef, key: &CompatibilityKey, roles: &RoleMap) {
        let quotas = self.settings.quotas;
        let Some(data) = self.queue_data.get_mut(&entity) else {
            return;
        };
        let size = roles.len();
        if size <= data.best_size {
            return;
        }

        let left = quotas.remaining(roles);
        data.best_compatible = Some(key.clone());
        data.best_size = size;
        data.tanks_needed = left.tanks;
        data.healers_needed = left.healers;
        data.dps_needed = left.dps;
    }

    fn recompute_best_compatible(&mut self, entity: EntityRef) {
        let quotas = self.settings.quotas;
        if let Some(data) = self.queue_data.get_mut(&entity) {
            data.best_compatible = None;
            data.best_size = 0;
            data.tanks_needed = quotas.tanks;
            data.healers_needed = quotas.healers;
            data.dps_needed = quotas.dps;
        }

        let candidates: Vec<(CompatibilityKey, RoleMap)> = self
            .cache
            .partial_matches_of(&entity)
            .map(|(k, r)| (k.clone(), r.clone()))
            .collect();
        for (key, roles) in candidates {
            self.update_best_compatible(entity, &key, &roles);
        }
    }

    pub fn update_wait_time(&mut self, role: WaitRole, wait_ms: i64, dungeon: DungeonId) {
        self.wait_times.record(role, dungeon, wait_ms);
    }

    pub fn update_wait_time_tank(&mut self, wait_ms: i64, dungeon: DungeonId) {
        self.update_wait_time(WaitRole::Tank, wait_ms, dungeon);
    }

    pub fn update_wait_time_healer(&mut self, wait_ms: i64, dungeon: DungeonId) {
        self.update_wait_time(WaitRole::Healer, wait_ms, dungeon);
    }

    pub fn update_wait_time_dps(&mut self, wait_ms: i64, dungeon: DungeonId) {
        self.update_wait_time(WaitRole::Dps, wait_ms, dungeon);
    }

    pub fn update_wait_time_avg(&mut self, wait_ms: i64, dungeon: DungeonId) {
        self.update_wait_time(WaitRole::Average, wait_ms, dungeon);
    }

    pub fn wait_times(&self) -> &WaitTimes {
        &self.wait_times
    }

    /// Queue status of every entry, addressed to each of its players
    pub fn update_queue_timers(&mut self, now: DateTime<Utc>) -> Vec<(PlayerId, QueueStatus)> {
        let entities: Vec<EntityRef> = self.queue_data.keys().copied().collect();
        let mut out = Vec::new();

        for entity in entities {
            let needs_best = self
                .queue_data
                .get(&entity)
                .map_or(false, |d| d.best_compatible.is_none());
            if needs_best {
                self.recompute_best_compatible(entity);
            }

            let Some(data) = self.queue_data.get(&entity) else {
                continue;
            };
            let dungeon_id = data.first_dungeon();
            let tank = self.wait_times.time_ms(WaitRole::Tank, dungeon_id);
            let healer = self.wait_times.time_ms(WaitRole::Healer, dungeon_id);
            let dps = self.wait_times.time_ms(WaitRole::Dps, dungeon_id);
            let avg = self.wait_times.time_ms(WaitRole::Average, dungeon_id);

            let combined = data.roles.values().fold(0u8, |acc, r| acc | r) & !roles::LEADER;
            let wait_time_ms = match combined {
                roles::NONE => -1,
                roles::TANK => tank,
                roles::HEALER => healer,
                roles::DAMAGE => dps,
                _ => avg,
            };

            let status = QueueStatus {
                dungeon_id,
                wait_time_ms,
                wait_time_avg_ms: avg,
                wait_time_tank_ms: tank,
                wait_time_healer_ms: healer,
                wait_time_dps_ms: dps,
                queued_time_ms: elapsed_ms(data.join_time, now),
                tanks_needed: data.tanks_needed,
                healers_needed: data.healers_needed,
                dps_needed: data.dps_needed,
            };
            for player in data.roles.keys() {
                out.push((*player, status.clone()));
            }
        }
        out
    }

    /// Summary of the queue contents
    pub fn dump_queue_info(&self) -> QueueSummary {
        let summary = QueueSummary {
            pool: self.pool,
            entries: self.queue_data.len(),
            players: self.player_count(),
            new_entries: self.new_queue.len(),
            waiting_entries: self.current_queue.len(),
            cached_verdicts: self.cache.len(),
        };
        debug!(
            "Queue {}: {} entries ({} players), {} new, {} waiting, {} cached verdicts",
            summary.pool,
            summary.entries,
            summary.players,
            summary.new_entries,
            summary.waiting_entries,
            summary.cached_verdicts
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use std::collections::{HashMap, HashSet};

    #[derive(Default)]
    struct TestContext {
        states: HashMap<EntityRef, LfgState>,
        old_states: HashMap<EntityRef, LfgState>,
        lfg_groups: HashSet<GroupId>,
        ignores: HashSet<(PlayerId, PlayerId)>,
    }

    impl QueueContext for TestContext {
        fn state(&self, entity: EntityRef) -> LfgState {
            self.states.get(&entity).copied().unwrap_or(LfgState::Queued)
        }

        fn old_state(&self, entity: EntityRef) -> LfgState {
            self.old_states.get(&entity).copied().unwrap_or_default()
        }

        fn is_lfg_group(&self, group: GroupId) -> bool {
            self.lfg_groups.contains(&group)
        }

        fn has_ignore(&self, a: PlayerId, b: PlayerId) -> bool {
            self.ignores.contains(&(a, b)) || self.ignores.contains(&(b, a))
        }
    }

    fn create_test_queue() -> LfgQueue {
        LfgQueue::new(QueuePool::Shared, QueueSettings::default())
    }

    fn dungeons(ids: &[DungeonId]) -> BTreeSet<DungeonId> {
        ids.iter().copied().collect()
    }

    fn add_solo(queue: &mut LfgQueue, player: PlayerId, role: u8, ids: &[DungeonId], now: DateTime<Utc>) {
        let mut roles = RoleMap::new();
        roles.insert(player, role);
        queue.add_queue_data(EntityRef::Player(player), now, dungeons(ids), roles);
    }

    fn add_classic_five(queue: &mut LfgQueue, now: DateTime<Utc>) {
        add_solo(queue, 1, roles::TANK, &[10, 11], now);
        add_solo(queue, 2, roles::HEALER, &[10], now);
        add_solo(queue, 3, roles::DAMAGE, &[10, 12], now);
        add_solo(queue, 4, roles::DAMAGE, &[10], now);
        add_solo(queue, 5, roles::DAMAGE, &[10], now);
    }

    #[test]
    fn test_cached_verdicts_are_reused() {
        let mut queue = create_test_queue();
        let ctx = TestContext::default();
        let mut rng = StdRng::seed_from_u64(3);
        let now = Utc::now();
        add_solo(&mut queue, 1, roles::TANK, &[10], now);
        add_solo(&mut queue, 2, roles::HEALER, &[10], now);

        // {1}, {2} and {1,2}
        assert!(queue.find_groups(&ctx, &mut rng, now).is_empty());
        let first = queue.cache().stats();
        assert_eq!(first.evaluations, 3);
        assert_eq!(first.hits, 0);

        // nothing new, nothing evaluated
        queue.find_groups(&ctx, &mut rng, now);
        assert_eq!(queue.cache().stats(), first);

        // {3}, {1,3} and {1,2,3}, whose {1,2} tail comes from the cache
        add_solo(&mut queue, 3, roles::DAMAGE, &[10], now);
        assert!(queue.find_groups(&ctx, &mut rng, now).is_empty());
        let second = queue.cache().stats();
        assert_eq!(second.evaluations, 6);
        assert_eq!(second.hits, 1);
    }

    #[test]
    fn test_five_solos_form_one_proposal() {
        let mut queue = create_test_queue();
        let ctx = TestContext::default();
        let mut rng = StdRng::seed_from_u64(7);
        let now = Utc::now();
        add_classic_five(&mut queue, now);

        let proposals = queue.find_groups(&ctx, &mut rng, now);
        assert_eq!(proposals.len(), 1);

        let proposal = &proposals[0];
        assert_eq!(proposal.dungeon_id, 10);
        assert_eq!(proposal.players.len(), 5);
        assert!(proposal.is_new);
        assert!(proposal.players.contains_key(&proposal.leader));
        assert_eq!(proposal.cancel_time, now + chrono::Duration::seconds(45));
        assert_eq!(proposal.players[&1].role, roles::TANK);
        assert!(proposal.players.values().all(|p| p.answer == LfgAnswer::Pending));

        // Records stay, lists are emptied
        assert_eq!(queue.len(), 5);
        assert_eq!(queue.new_entries().count(), 0);
        assert_eq!(queue.waiting_entries().count(), 0);
    }

    #[test]
    fn test_incomplete_queue_keeps_waiting() {
        let mut queue = create_test_queue();
        let ctx = TestContext::default();
        let mut rng = StdRng::seed_from_u64(1);
        let now = Utc::now();
        add_solo(&mut queue, 1, roles::TANK, &[10], now);
        add_solo(&mut queue, 2, roles::DAMAGE, &[10], now);

        assert!(queue.find_groups(&ctx, &mut rng, now).is_empty());
        assert_eq!(queue.waiting_entries().count(), 2);

        let data = queue.queue_data(&EntityRef::Player(1)).unwrap();
        assert_eq!(data.best_compatible.as_ref().map(|k| k.len()), Some(2));
        assert_eq!((data.tanks_needed, data.healers_needed, data.dps_needed), (0, 1, 2));
    }

    #[test]
    fn test_surplus_tank_is_left_out() {
        let mut queue = create_test_queue();
        let ctx = TestContext::default();
        let mut rng = StdRng::seed_from_u64(3);
        let now = Utc::now();
        add_solo(&mut queue, 1, roles::TANK, &[10], now);
        add_solo(&mut queue, 6, roles::TANK, &[10], now);
        add_solo(&mut queue, 2, roles::HEALER, &[10], now);
        add_solo(&mut queue, 3, roles::DAMAGE, &[10], now);
        add_solo(&mut queue, 4, roles::DAMAGE, &[10], now);
        add_solo(&mut queue, 5, roles::DAMAGE, &[10], now);

        let proposals = queue.find_groups(&ctx, &mut rng, now);
        assert_eq!(proposals.len(), 1);
        assert!(!proposals[0].contains_player(6));
        assert_eq!(
            queue.waiting_entries().copied().collect::<Vec<_>>(),
            vec![EntityRef::Player(6)]
        );

        let key: CompatibilityKey = [EntityRef::Player(1), EntityRef::Player(6)].iter().collect();
        assert_eq!(queue.cache().peek(&key), Some(LfgCompatibility::NoRoles));
    }

    #[test]
    fn test_ignores_prevent_match() {
        let mut queue = create_test_queue();
        let mut ctx = TestContext::default();
        ctx.ignores.insert((3, 1));
        let mut rng = StdRng::seed_from_u64(3);
        let now = Utc::now();
        add_classic_five(&mut queue, now);

        assert!(queue.find_groups(&ctx, &mut rng, now).is_empty());
        let key: CompatibilityKey = [EntityRef::Player(1), EntityRef::Player(3)].iter().collect();
        assert_eq!(queue.cache().peek(&key), Some(LfgCompatibility::HasIgnores));
    }

    #[test]
    fn test_disjoint_dungeons_do_not_match() {
        let mut queue = create_test_queue();
        let ctx = TestContext::default();
        let mut rng = StdRng::seed_from_u64(3);
        let now = Utc::now();
        add_solo(&mut queue, 1, roles::TANK, &[10], now);
        add_solo(&mut queue, 2, roles::HEALER, &[11], now);

        assert!(queue.find_groups(&ctx, &mut rng, now).is_empty());
        let key: CompatibilityKey = [EntityRef::Player(1), EntityRef::Player(2)].iter().collect();
        assert_eq!(queue.cache().peek(&key), Some(LfgCompatibility::NoDungeons));
    }

    #[test]
    fn test_bad_states_recomputed_once_all_queued() {
        let mut queue = create_test_queue();
        let mut ctx = TestContext::default();
        ctx.states.insert(EntityRef::Player(4), LfgState::Rolecheck);
        let mut rng = StdRng::seed_from_u64(5);
        let now = Utc::now();
        add_classic_five(&mut queue, now);

        assert!(queue.find_groups(&ctx, &mut rng, now).is_empty());
        let full: CompatibilityKey = (1..=5).map(EntityRef::Player).collect();
        assert_eq!(queue.cache().peek(&full), Some(LfgCompatibility::BadStates));

        ctx.states.clear();
        queue.add_to_queue(EntityRef::Player(4), false);
        let proposals = queue.find_groups(&ctx, &mut rng, now);
        assert_eq!(proposals.len(), 1);
        assert_eq!(queue.cache().peek(&full), Some(LfgCompatibility::Match));
    }

    #[test]
    fn test_multiple_lfg_groups_rejected() {
        let mut queue = create_test_queue();
        let mut ctx = TestContext::default();
        ctx.lfg_groups.insert(100);
        ctx.lfg_groups.insert(200);
        let mut rng = StdRng::seed_from_u64(5);
        let now = Utc::now();

        let mut first = RoleMap::new();
        first.insert(1, roles::TANK);
        first.insert(2, roles::HEALER);
        queue.add_queue_data(EntityRef::Group(100), now, dungeons(&[10]), first);
        let mut second = RoleMap::new();
        second.insert(3, roles::DAMAGE);
        second.insert(4, roles::DAMAGE);
        queue.add_queue_data(EntityRef::Group(200), now, dungeons(&[10]), second);

        assert!(queue.find_groups(&ctx, &mut rng, now).is_empty());
        let key: CompatibilityKey = [EntityRef::Group(100), EntityRef::Group(200)].iter().collect();
        assert_eq!(queue.cache().peek(&key), Some(LfgCompatibility::MultipleLfgGroups));
    }

    #[test]
    fn test_continuing_group_members_preaccepted() {
        let mut queue = create_test_queue();
        let mut ctx = TestContext::default();
        ctx.lfg_groups.insert(100);
        ctx.old_states.insert(EntityRef::Group(100), LfgState::Dungeon);
        let mut rng = StdRng::seed_from_u64(9);
        let now = Utc::now();

        let mut group_roles = RoleMap::new();
        group_roles.insert(1, roles::TANK | roles::LEADER);
        group_roles.insert(2, roles::HEALER);
        group_roles.insert(3, roles::DAMAGE);
        group_roles.insert(4, roles::DAMAGE);
        queue.add_queue_data(EntityRef::Group(100), now, dungeons(&[10]), group_roles);
        add_solo(&mut queue, 5, roles::DAMAGE, &[10], now);

        let proposals = queue.find_groups(&ctx, &mut rng, now);
        assert_eq!(proposals.len(), 1);
        let proposal = &proposals[0];
        assert!(!proposal.is_new);
        assert_eq!(proposal.group, Some(100));
        assert_eq!(proposal.leader, 1);
        assert_eq!(proposal.players[&2].answer, LfgAnswer::Agree);
        assert_eq!(proposal.players[&5].answer, LfgAnswer::Pending);
        assert_eq!(proposal.players[&5].group, None);
    }

    #[test]
    fn test_readd_goes_to_front_and_deduplicates() {
        let mut queue = create_test_queue();
        let ctx = TestContext::default();
        let mut rng = StdRng::seed_from_u64(1);
        let now = Utc::now();
        add_solo(&mut queue, 1, roles::TANK, &[10], now);
        add_solo(&mut queue, 2, roles::HEALER, &[11], now);
        queue.find_groups(&ctx, &mut rng, now);

        queue.add_to_queue(EntityRef::Player(2), true);
        queue.add_to_queue(EntityRef::Player(2), true);
        assert_eq!(
            queue.waiting_entries().copied().collect::<Vec<_>>(),
            vec![EntityRef::Player(2), EntityRef::Player(1)]
        );

        queue.add_to_queue(EntityRef::Player(9), false);
        assert_eq!(queue.new_entries().count(), 0);
    }

    #[test]
    fn test_remove_from_queue_clears_cache_and_best_match() {
        let mut queue = create_test_queue();
        let ctx = TestContext::default();
        let mut rng = StdRng::seed_from_u64(1);
        let now = Utc::now();
        add_solo(&mut queue, 1, roles::TANK, &[10], now);
        add_solo(&mut queue, 2, roles::DAMAGE, &[10], now);
        queue.find_groups(&ctx, &mut rng, now);

        queue.remove_from_queue(EntityRef::Player(2));
        assert!(!queue.contains(&EntityRef::Player(2)));
        let pair: CompatibilityKey = [EntityRef::Player(1), EntityRef::Player(2)].iter().collect();
        assert_eq!(queue.cache().peek(&pair), None);

        let data = queue.queue_data(&EntityRef::Player(1)).unwrap();
        assert_eq!(data.best_compatible.as_ref().map(|k| k.len()), Some(1));
        assert_eq!((data.tanks_needed, data.healers_needed, data.dps_needed), (0, 1, 3));
    }

    #[test]
    fn test_queue_timers_report_wait_estimates() {
        let mut queue = create_test_queue();
        let ctx = TestContext::default();
        let mut rng = StdRng::seed_from_u64(1);
        let now = Utc::now();
        add_solo(&mut queue, 1, roles::TANK | roles::LEADER, &[10], now);
        add_solo(&mut queue, 2, roles::HEALER | roles::DAMAGE, &[10], now);
        queue.find_groups(&ctx, &mut rng, now);

        queue.update_wait_time_tank(4000, 10);
        queue.update_wait_time_avg(9000, 10);

        let statuses = queue.update_queue_timers(now + chrono::Duration::seconds(30));
        assert_eq!(statuses.len(), 2);

        let (_, tank) = statuses.iter().find(|(p, _)| *p == 1).unwrap();
        assert_eq!(tank.wait_time_ms, 4000);
        assert_eq!(tank.queued_time_ms, 30_000);
        assert_eq!(tank.wait_time_dps_ms, -1);

        let (_, flex) = statuses.iter().find(|(p, _)| *p == 2).unwrap();
        assert_eq!(flex.wait_time_ms, 9000);
    }

    #[test]
    fn test_dump_queue_info() {
        let mut queue = create_test_queue();
        let now = Utc::now();
        add_solo(&mut queue, 1, roles::TANK, &[10], now);
        let summary = queue.dump_queue_info();
        assert_eq!(summary.entries, 1);
        assert_eq!(summary.players, 1);
        assert_eq!(summary.new_entries, 1);
        assert_eq!(summary.waiting_entries, 0);
    }
}
