//! Dungeon finder engine
//!
//! [`LfgManager`] owns every piece of mutable LFG state: entity records, one
//! queue per pool, in-flight proposals, role checks and vote kicks. All
//! mutations go through `&mut self` and finish before returning, so callers
//! that share the manager only need to serialize access to it.
//!
//! Time advances through [`LfgManager::update`], which expires deadlines,
//! runs the matching pass and periodically broadcasts queue status.

mod boot;
mod events;
mod group;
mod proposal;
mod role_check;
pub mod store;

pub use boot::{Boot, BootRefusal};
pub use events::GroupEvents;
pub use role_check::RoleCheck;
pub use store::{GroupData, PlayerData, RideTicket, StateStore};

use crate::clock::{Clock, SystemClock};
use crate::config::LfgConfig;
use crate::dungeon::{locked_dungeons, DungeonCatalog, DungeonType};
use crate::notify::{lock_list, LfgNotifier, Notification, PlayerLocks};
use crate::persistence::GroupDungeonStore;
use crate::queue::{LfgQueue, Proposal, QueueContext, QueueSettings, QueueSummary, RoleQuotas};
use crate::types::{
    roles, DungeonId, EntityRef, GroupId, JoinResult, LfgAnswer, LfgState, LfgUpdateType, LockMap,
    LockStatus, PlayerId, ProposalId, QueuePool, RoleCheckState, RoleMap, Team,
};
use crate::utils::generate_request_id;
use crate::world::{PlayerProfile, World};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Counters and gauges describing the engine
#[derive(Debug, Clone, Default, Serialize)]
pub struct LfgManagerStats {
    /// Join requests received
    pub joins_requested: u64,
    /// Joins that reached a queue or a role check
    pub joins_accepted: u64,
    /// Joins answered with an error code
    pub joins_rejected: u64,
    /// Role checks started
    pub role_checks_started: u64,
    /// Role checks that ended without queueing
    pub role_checks_failed: u64,
    /// Proposals offered to players
    pub proposals_created: u64,
    /// Proposals accepted by everyone
    pub proposals_succeeded: u64,
    /// Proposals declined or timed out
    pub proposals_failed: u64,
    /// Groups formed or refilled from proposals
    pub groups_formed: u64,
    /// Vote kicks started
    pub boots_started: u64,
    /// Vote kicks that removed their victim
    pub kicks_completed: u64,
    /// Dungeons completed by LFG groups
    pub dungeons_finished: u64,
    /// Current queue entries across pools
    pub queued_entries: usize,
    /// Current players across pools
    pub queued_players: usize,
    pub active_proposals: usize,
    pub active_role_checks: usize,
    pub active_boots: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_evaluations: u64,
}

/// What one scheduler tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub expired_role_checks: usize,
    pub expired_proposals: usize,
    pub expired_boots: usize,
    pub new_proposals: usize,
    pub auto_settled: usize,
    pub queue_status_sent: usize,
}

/// Read-only view of entity state handed to the queues while matching
struct StoreView<'a> {
    store: &'a StateStore,
    world: &'a dyn World,
}

impl QueueContext for StoreView<'_> {
    fn state(&self, entity: EntityRef) -> LfgState {
        self.store.state(entity)
    }

    fn old_state(&self, entity: EntityRef) -> LfgState {
        self.store.old_state(entity)
    }

    fn is_lfg_group(&self, group: GroupId) -> bool {
        self.store.is_lfg_group(group)
    }

    fn has_ignore(&self, a: PlayerId, b: PlayerId) -> bool {
        self.world.has_ignore(a, b)
    }
}

/// The dungeon finder engine
pub struct LfgManager {
    config: LfgConfig,
    catalog: Arc<DungeonCatalog>,
    world: Arc<dyn World>,
    notifier: Arc<dyn LfgNotifier>,
    clock: Arc<dyn Clock>,
    group_store: Option<Arc<dyn GroupDungeonStore>>,
    store: StateStore,
    queues: BTreeMap<QueuePool, LfgQueue>,
    proposals: BTreeMap<ProposalId, Proposal>,
    role_checks: BTreeMap<GroupId, RoleCheck>,
    boots: BTreeMap<GroupId, Boot>,
    last_proposal_id: ProposalId,
    queue_timer: Duration,
    rng: StdRng,
    stats: LfgManagerStats,
}

impl LfgManager {
    /// Create a manager on the system clock without persistence
    pub fn new(
        config: LfgConfig,
        catalog: Arc<DungeonCatalog>,
        world: Arc<dyn World>,
        notifier: Arc<dyn LfgNotifier>,
    ) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let store = StateStore::new(config.max_kicks);

        Self {
            config,
            catalog,
            world,
            notifier,
            clock: Arc::new(SystemClock),
            group_store: None,
            store,
            queues: BTreeMap::new(),
            proposals: BTreeMap::new(),
            role_checks: BTreeMap::new(),
            boots: BTreeMap::new(),
            last_proposal_id: 0,
            queue_timer: Duration::ZERO,
            rng,
            stats: LfgManagerStats::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_group_store(mut self, store: Arc<dyn GroupDungeonStore>) -> Self {
        self.group_store = Some(store);
        self
    }

    pub fn config(&self) -> &LfgConfig {
        &self.config
    }

    pub fn catalog(&self) -> &DungeonCatalog {
        &self.catalog
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Snapshot of the counters with current gauges filled in
    pub fn stats(&self) -> LfgManagerStats {
        let mut stats = self.stats.clone();
        stats.queued_entries = self.queues.values().map(|q| q.len()).sum();
        stats.queued_players = self.queues.values().map(|q| q.player_count()).sum();
        stats.active_proposals = self.proposals.len();
        stats.active_role_checks = self.role_checks.len();
        stats.active_boots = self.boots.len();
        for queue in self.queues.values() {
            let cache = queue.cache().stats();
            stats.cache_hits += cache.hits;
            stats.cache_misses += cache.misses;
            stats.cache_evaluations += cache.evaluations;
        }
        stats
    }

    pub fn get_state(&self, entity: EntityRef) -> LfgState {
        self.store.state(entity)
    }

    pub fn get_old_state(&self, entity: EntityRef) -> LfgState {
        self.store.old_state(entity)
    }

    /// Dungeon id assigned to a group, 0 when none
    pub fn get_dungeon(&self, group: GroupId) -> DungeonId {
        self.store.group(group).map_or(0, |g| g.dungeon_id())
    }

    /// Dungeon entry assigned to a group, 0 when none
    pub fn get_dungeon_entry(&self, group: GroupId) -> u32 {
        self.store.group(group).map_or(0, |g| g.dungeon())
    }

    pub fn get_roles(&self, player: PlayerId) -> u8 {
        self.store.player(player).map_or(roles::NONE, |p| p.roles())
    }

    pub fn get_selected_dungeons(&self, player: PlayerId) -> BTreeSet<DungeonId> {
        self.store
            .player(player)
            .map(|p| p.selected_dungeons().clone())
            .unwrap_or_default()
    }

    pub fn get_group(&self, player: PlayerId) -> Option<GroupId> {
        self.store.player_group(player)
    }

    pub fn get_leader(&self, group: GroupId) -> Option<PlayerId> {
        self.store.group(group).and_then(|g| g.leader())
    }

    pub fn get_members(&self, group: GroupId) -> Vec<PlayerId> {
        self.store.players_of(EntityRef::Group(group))
    }

    pub fn get_kicks_left(&self, group: GroupId) -> u8 {
        self.store
            .group(group)
            .map_or(self.config.max_kicks, |g| g.kicks_left())
    }

    pub fn get_ticket(&self, player: PlayerId) -> Option<RideTicket> {
        self.store.player(player).and_then(|p| p.ticket())
    }

    pub fn is_lfg_group(&self, group: GroupId) -> bool {
        self.store.is_lfg_group(group)
    }

    pub fn proposal(&self, id: ProposalId) -> Option<&Proposal> {
        self.proposals.get(&id)
    }

    pub fn proposals(&self) -> impl Iterator<Item = &Proposal> {
        self.proposals.values()
    }

    /// Proposal a player is currently part of
    pub fn proposal_of(&self, player: PlayerId) -> Option<&Proposal> {
        self.proposals.values().find(|p| p.contains_player(player))
    }

    pub fn role_check(&self, group: GroupId) -> Option<&RoleCheck> {
        self.role_checks.get(&group)
    }

    pub fn boot(&self, group: GroupId) -> Option<&Boot> {
        self.boots.get(&group)
    }

    pub fn queue(&self, pool: QueuePool) -> Option<&LfgQueue> {
        self.queues.get(&pool)
    }

    /// Pool an entity queues in
    pub fn pool_of(&self, entity: EntityRef) -> QueuePool {
        let player = match entity {
            EntityRef::Player(id) => Some(id),
            EntityRef::Group(id) => self
                .store
                .group(id)
                .and_then(|g| g.leader())
                .or_else(|| self.world.group_leader(id)),
        };
        let team = player
            .and_then(|p| {
                self.store
                    .player(p)
                    .and_then(|d| d.team())
                    .or_else(|| self.world.player(p).map(|profile| profile.team))
            })
            .unwrap_or(Team::Alliance);
        QueuePool::for_team(team, self.config.cross_faction)
    }

    fn quotas(&self) -> RoleQuotas {
        RoleQuotas {
            tanks: self.config.tanks_needed,
            healers: self.config.healers_needed,
            dps: self.config.dps_needed,
        }
    }

    fn queue_mut(&mut self, pool: QueuePool) -> &mut LfgQueue {
        let settings = QueueSettings {
            quotas: self.quotas(),
            proposal_timeout: self.config.proposal_timeout(),
        };
        self.queues
            .entry(pool)
            .or_insert_with(|| LfgQueue::new(pool, settings))
    }

    /// Drop an entity from whichever queue holds it
    fn dequeue(&mut self, entity: EntityRef) {
        for queue in self.queues.values_mut() {
            if queue.contains(&entity) {
                queue.remove_from_queue(entity);
            }
        }
    }

    fn send(&self, player: PlayerId, notification: Notification) {
        self.notifier.notify(player, notification);
    }

    fn send_update(
        &self,
        player: PlayerId,
        update: LfgUpdateType,
        dungeons: &BTreeSet<DungeonId>,
        party: bool,
    ) {
        let queued = matches!(
            update,
            LfgUpdateType::JoinQueue | LfgUpdateType::JoinQueueInitial | LfgUpdateType::AddedToQueue
        );
        self.send(
            player,
            Notification::UpdateStatus {
                update,
                dungeons: dungeons.iter().copied().collect(),
                party,
                queued,
            },
        );
    }

    fn send_join_result(
        &self,
        player: PlayerId,
        result: JoinResult,
        role_check: RoleCheckState,
        locks: Vec<PlayerLocks>,
    ) {
        self.send(
            player,
            Notification::JoinResult {
                result,
                role_check,
                locks,
            },
        );
    }

    /// Mirror the world's membership of a group into the store
    fn sync_group(&mut self, group: GroupId) {
        let members = self.world.group_members(group);
        let leader = self.world.group_leader(group);
        let data = self.store.group_mut(group);
        for member in &members {
            data.add_member(*member);
        }
        if let Some(leader) = leader {
            data.set_leader(leader);
        }
        for member in members {
            self.store.player_mut(member).set_group(Some(group));
        }
    }

    /// Whether the finder serving `dungeons` is switched on. Raid entries need
    /// the raid browser, everything else the dungeon finder. Mixed selections
    /// are left to the join validation.
    fn selection_enabled(&self, dungeons: &BTreeSet<DungeonId>) -> bool {
        let raids = dungeons
            .iter()
            .filter(|id| self.catalog.get(**id).map_or(false, |d| d.is_raid()))
            .count();
        if raids == dungeons.len() {
            self.config.enable_raid_browser
        } else if raids == 0 {
            self.config.enable_dungeon_finder
        } else {
            self.config.is_enabled()
        }
    }

    /// Queue a player, or start a role check for the player's group
    pub fn join_lfg(
        &mut self,
        player: PlayerId,
        roles: u8,
        dungeons: BTreeSet<DungeonId>,
    ) -> JoinResult {
        self.stats.joins_requested += 1;
        let mut dungeons = dungeons;

        if dungeons.is_empty() {
            debug!("Player {} tried to join without selecting a dungeon", player);
            self.stats.joins_rejected += 1;
            return JoinResult::NoSlots;
        }

        if !self.selection_enabled(&dungeons) {
            debug!("Player {} joined for a disabled finder", player);
            self.stats.joins_rejected += 1;
            self.send_join_result(player, JoinResult::Failed, RoleCheckState::Default, Vec::new());
            return JoinResult::Failed;
        }

        let Some(profile) = self.world.player(player) else {
            warn!("Join request from unknown player {}", player);
            self.stats.joins_rejected += 1;
            return JoinResult::InternalError;
        };

        let roles = roles & roles::ANY & (profile.allowed_roles | roles::LEADER);
        if roles & roles::COMBAT == 0 {
            debug!("Player {} selected no usable role", player);
            self.stats.joins_rejected += 1;
            return JoinResult::Failed;
        }

        let group = self.world.group_of(player);
        if let Some(group) = group {
            self.sync_group(group);
        }
        let entity = group.map_or(EntityRef::Player(player), EntityRef::Group);
        let is_continue = group.map_or(false, |g| {
            self.store.is_lfg_group(g)
                && self.store.state(EntityRef::Group(g)) != LfgState::FinishedDungeon
        });

        if let Some(group) = group.filter(|_| is_continue) {
            dungeons = BTreeSet::from([self.get_dungeon(group)]);
        }

        if self.store.state(entity) == LfgState::Queued {
            if self.get_selected_dungeons(player) == dungeons {
                debug!("{} is already queued for the same dungeons", entity);
                self.send_join_result(player, JoinResult::Ok, RoleCheckState::Default, Vec::new());
                return JoinResult::Ok;
            }
            self.leave_lfg(entity, false);
        }

        let mut result = JoinResult::Ok;
        let mut members: Vec<PlayerProfile> = Vec::new();
        if !profile.can_join {
            result = JoinResult::NotMeetReqs;
        } else if profile.in_battleground {
            result = JoinResult::UsingBgSystem;
        } else if profile.deserter {
            result = JoinResult::Deserter;
        } else if !is_continue && profile.random_cooldown {
            result = JoinResult::RandomCooldown;
        } else if let Some(group) = group {
            let ids = self.world.group_members(group);
            if ids.len() > self.config.group_size() {
                result = JoinResult::TooManyMembers;
            } else {
                let mut missing = 0;
                for id in ids {
                    let Some(member) = self.world.player(id) else {
                        missing += 1;
                        continue;
                    };
                    if !member.can_join {
                        result = JoinResult::InternalError;
                    } else if member.deserter {
                        result = JoinResult::PartyDeserter;
                    } else if !is_continue && member.random_cooldown {
                        result = JoinResult::PartyRandomCooldown;
                    } else if member.in_battleground {
                        result = JoinResult::UsingBgSystem;
                    }
                    if result != JoinResult::Ok {
                        break;
                    }
                    members.push(member);
                }
                if result == JoinResult::Ok && missing > 0 {
                    result = JoinResult::Disconnected;
                }
            }
        } else {
            members.push(profile.clone());
        }

        let mut random_id = None;
        let mut is_raid = false;
        let mut party_locks = Vec::new();
        if result == JoinResult::Ok {
            let mut is_dungeon = false;
            for id in &dungeons {
                match self.catalog.get(*id).map(|d| d.dungeon_type) {
                    Some(DungeonType::Random) if dungeons.len() > 1 => {
                        result = JoinResult::DungeonInvalid;
                    }
                    Some(kind @ (DungeonType::Random | DungeonType::Dungeon | DungeonType::Heroic)) => {
                        if kind == DungeonType::Random {
                            random_id = Some(*id);
                        }
                        if is_raid {
                            result = JoinResult::MixedRaidDungeon;
                        }
                        is_dungeon = true;
                    }
                    Some(DungeonType::Raid) => {
                        if is_dungeon {
                            result = JoinResult::MixedRaidDungeon;
                        }
                        is_raid = true;
                    }
                    Some(DungeonType::Zone) | None => result = JoinResult::DungeonInvalid,
                }
                if result != JoinResult::Ok {
                    break;
                }
            }

            if result == JoinResult::Ok {
                if let Some(random) = random_id {
                    dungeons = self.catalog.dungeons_by_random(random);
                }
                let (compatible, locks) = self.compatible_dungeons(&dungeons, &members, is_continue);
                dungeons = compatible;
                if dungeons.is_empty() {
                    result = if group.is_some() {
                        JoinResult::PartyNotMeetReqs
                    } else {
                        JoinResult::NotMeetReqs
                    };
                    party_locks = locks;
                }
            }
        }

        if result != JoinResult::Ok {
            debug!("{} join refused: {:?}", entity, result);
            self.stats.joins_rejected += 1;
            self.send_join_result(player, result, RoleCheckState::Default, party_locks);
            return result;
        }

        self.store.player_mut(player).set_team(profile.team);

        if is_raid {
            debug!("Raid browser is not supported, {} joined for raids only", entity);
            self.send_join_result(player, JoinResult::Ok, RoleCheckState::Default, Vec::new());
            return JoinResult::Ok;
        }

        self.stats.joins_accepted += 1;
        let now = self.now();
        match group {
            Some(group) => {
                self.start_role_check(group, player, roles, dungeons, random_id, is_continue, now);
            }
            None => {
                let pool = self.pool_of(entity);
                let role_map = RoleMap::from([(player, roles)]);
                self.queue_mut(pool)
                    .add_queue_data(entity, now, dungeons.clone(), role_map);

                let selection = match random_id {
                    Some(random) => BTreeSet::from([random]),
                    None => dungeons,
                };
                self.send_join_result(player, JoinResult::Ok, RoleCheckState::Default, Vec::new());
                self.send_update(player, LfgUpdateType::JoinQueueInitial, &selection, false);

                let data = self.store.player_mut(player);
                data.set_selected_dungeons(selection);
                data.set_state(LfgState::Queued);
                data.set_roles(roles);
                data.set_ticket(Some(RideTicket {
                    id: generate_request_id(),
                    joined_at: now,
                }));
                info!(
                    "Player {} joined the {} queue as {}",
                    player,
                    pool,
                    roles::describe(roles)
                );
            }
        }
        JoinResult::Ok
    }

    /// Take an entity out of whatever LFG activity it is in
    pub fn leave_lfg(&mut self, entity: EntityRef, disconnected: bool) {
        let group = match entity {
            EntityRef::Group(id) => Some(id),
            EntityRef::Player(id) => self.store.player_group(id),
        };
        let state = self.store.state(entity);

        match state {
            LfgState::Queued => match group {
                Some(group) => {
                    let gentity = EntityRef::Group(group);
                    let old_state = self.store.old_state(gentity);
                    let in_dungeon = self.store.is_lfg_group(group)
                        && self.get_dungeon_entry(group) != 0
                        && matches!(old_state, LfgState::Dungeon | LfgState::FinishedDungeon);
                    let new_state = if in_dungeon { old_state } else { LfgState::None };

                    self.dequeue(gentity);
                    self.store.set_state(gentity, new_state);
                    for member in self.store.players_of(gentity) {
                        self.store.set_state(EntityRef::Player(member), new_state);
                        self.send_update(member, LfgUpdateType::RemovedFromQueue, &BTreeSet::new(), true);
                    }
                    info!("Group {} left the queue", group);
                }
                None => {
                    let player = entity.raw();
                    self.send_update(player, LfgUpdateType::RemovedFromQueue, &BTreeSet::new(), false);
                    self.dequeue(entity);
                    self.store.set_state(entity, LfgState::None);
                    info!("Player {} left the queue", player);
                }
            },
            LfgState::Rolecheck => {
                if let Some(group) = group {
                    self.abort_role_check(group);
                }
            }
            LfgState::Proposal => {
                let voter = match entity {
                    EntityRef::Group(id) => self.get_leader(id),
                    EntityRef::Player(id) => Some(id),
                };
                let found = voter.and_then(|voter| {
                    self.proposals
                        .iter_mut()
                        .find(|(_, p)| p.contains_player(voter))
                        .map(|(id, p)| {
                            if let Some(slot) = p.players.get_mut(&voter) {
                                slot.answer = LfgAnswer::Deny;
                            }
                            *id
                        })
                });
                if let Some(id) = found {
                    self.remove_proposal(id, LfgUpdateType::ProposalDeclined);
                }
            }
            LfgState::Dungeon | LfgState::FinishedDungeon => {
                if !entity.is_group() && !disconnected {
                    self.store.set_state(entity, LfgState::None);
                }
            }
            LfgState::None | LfgState::Raidbrowser => {}
        }
    }

    /// Advance the engine by `diff`
    pub fn update(&mut self, diff: Duration) -> TickReport {
        let mut report = TickReport::default();
        if !self.config.is_enabled() {
            return report;
        }

        let now = self.now();
        report.expired_role_checks = self.expire_role_checks(now);
        report.expired_proposals = self.expire_proposals(now);
        report.expired_boots = self.expire_boots(now);

        let (found, settled) = self.find_new_proposals(now);
        report.new_proposals = found;
        report.auto_settled = settled;

        self.queue_timer += diff;
        if self.queue_timer >= self.config.queue_status_interval() {
            self.queue_timer = Duration::ZERO;
            report.queue_status_sent = self.send_queue_status(now);
        }
        report
    }

    fn find_new_proposals(&mut self, now: DateTime<Utc>) -> (usize, usize) {
        let mut found = Vec::new();
        let pools: Vec<QueuePool> = self.queues.keys().copied().collect();
        for pool in pools {
            let view = StoreView {
                store: &self.store,
                world: self.world.as_ref(),
            };
            let Some(queue) = self.queues.get_mut(&pool) else {
                continue;
            };
            let proposals = queue.find_groups(&view, &mut self.rng, now);
            if !proposals.is_empty() {
                debug!("Found {} new groups in {} queue", proposals.len(), pool);
            }
            found.extend(proposals);
        }

        let count = found.len();
        let mut settled = 0;
        for proposal in found {
            if self.register_proposal(proposal) {
                settled += 1;
            }
        }
        (count, settled)
    }

    fn send_queue_status(&mut self, now: DateTime<Utc>) -> usize {
        let mut statuses = Vec::new();
        for queue in self.queues.values_mut() {
            statuses.extend(queue.update_queue_timers(now));
        }
        let sent = statuses.len();
        for (player, status) in statuses {
            self.send(player, Notification::QueueStatus(status));
        }
        sent
    }

    /// Every catalog dungeon the player cannot enter
    pub fn get_locked_dungeons(&self, player: PlayerId) -> LockMap {
        match self.world.player(player) {
            Some(profile) => locked_dungeons(&profile, &self.catalog, self.world.as_ref()),
            None => LockMap::new(),
        }
    }

    /// Send a player the lock map and return it
    pub fn lock_info(&self, player: PlayerId) -> LockMap {
        let locks = self.get_locked_dungeons(player);
        self.send(
            player,
            Notification::LockInfo {
                locks: lock_list(&locks),
            },
        );
        locks
    }

    /// Dungeons from `dungeons` none of `players` is locked out of
    pub fn get_compatible_dungeons(
        &self,
        dungeons: &BTreeSet<DungeonId>,
        players: &[PlayerId],
    ) -> BTreeSet<DungeonId> {
        let profiles: Vec<PlayerProfile> =
            players.iter().filter_map(|p| self.world.player(*p)).collect();
        self.compatible_dungeons(dungeons, &profiles, false).0
    }

    /// Filter `dungeons` by the members' locks. The locks are only returned
    /// when nothing is left.
    fn compatible_dungeons(
        &self,
        dungeons: &BTreeSet<DungeonId>,
        members: &[PlayerProfile],
        is_continue: bool,
    ) -> (BTreeSet<DungeonId>, Vec<PlayerLocks>) {
        let mut removed = BTreeSet::new();
        let mut party_locks = Vec::new();

        for profile in members {
            let mut hits = LockMap::new();
            for (entry, status) in locked_dungeons(profile, &self.catalog, self.world.as_ref()) {
                let id = entry & 0x00FF_FFFF;
                if !dungeons.contains(&id) {
                    continue;
                }
                // a continuing group may re-enter its own saved instance
                if !(is_continue && status == LockStatus::RaidLocked) {
                    removed.insert(id);
                }
                hits.insert(entry, status);
            }
            if !hits.is_empty() {
                party_locks.push(PlayerLocks {
                    player: profile.id,
                    locks: lock_list(&hits),
                });
            }
        }

        let compatible: BTreeSet<DungeonId> = dungeons.difference(&removed).copied().collect();
        if !compatible.is_empty() {
            party_locks.clear();
        }
        (compatible, party_locks)
    }

    /// Per-pool queue summaries
    pub fn dump_queue_info(&self) -> Vec<QueueSummary> {
        self.queues.values().map(|q| q.dump_queue_info()).collect()
    }
}
