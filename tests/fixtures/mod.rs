//! Test fixtures shared by the integration tests
#![allow(dead_code)]

use dungeon_finder::clock::ManualClock;
use dungeon_finder::config::LfgConfig;
use dungeon_finder::dungeon::DungeonCatalog;
use dungeon_finder::manager::LfgManager;
use dungeon_finder::notify::{Notification, RecordingNotifier};
use dungeon_finder::persistence::GroupDungeonStore;
use dungeon_finder::types::{roles, DungeonId, GroupId, JoinResult, PlayerId, ProposalId, Team};
use dungeon_finder::world::{InMemoryWorld, PlayerProfile, World};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// One tank (leader), one healer and three damage dealers
pub const CLASSIC_PARTY: [(PlayerId, u8); 5] = [
    (1, roles::TANK | roles::LEADER),
    (2, roles::HEALER),
    (3, roles::DAMAGE),
    (4, roles::DAMAGE),
    (5, roles::DAMAGE),
];

pub const UTGARDE_KEEP: DungeonId = 202;
pub const THE_NEXUS: DungeonId = 225;
pub const RANDOM_DUNGEON: DungeonId = 261;
pub const NAXXRAMAS: DungeonId = 159;

/// Engine wired to in-memory collaborators and a manual clock
pub struct TestHarness {
    pub manager: LfgManager,
    pub world: Arc<InMemoryWorld>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(seeded_config())
    }

    pub fn with_config(config: LfgConfig) -> Self {
        Self::build(config, None)
    }

    /// Harness whose engine persists formed groups into `store`
    pub fn with_group_store(store: Arc<dyn GroupDungeonStore>) -> Self {
        Self::build(seeded_config(), Some(store))
    }

    fn build(config: LfgConfig, store: Option<Arc<dyn GroupDungeonStore>>) -> Self {
        let world = Arc::new(InMemoryWorld::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let clock = Arc::new(ManualClock::default());
        let catalog = Arc::new(DungeonCatalog::sample().expect("sample catalog parses"));
        let manager = LfgManager::new(config, catalog, world.clone(), notifier.clone())
            .with_clock(clock.clone());
        let manager = match store {
            Some(store) => manager.with_group_store(store),
            None => manager,
        };

        Self {
            manager,
            world,
            notifier,
            clock,
        }
    }

    /// Register level 80 alliance players
    pub fn add_players(&self, ids: impl IntoIterator<Item = PlayerId>) {
        for id in ids {
            self.add_player(id, Team::Alliance);
        }
    }

    pub fn add_player(&self, id: PlayerId, team: Team) {
        self.world
            .upsert_player(PlayerProfile::new(id, format!("player{}", id), 80, team));
    }

    /// Queue the classic party as five solo players
    pub fn queue_classic_party(&mut self, dungeon: DungeonId) {
        self.add_players(CLASSIC_PARTY.iter().map(|(id, _)| *id));
        for (player, mask) in CLASSIC_PARTY {
            let result = self
                .manager
                .join_lfg(player, mask, BTreeSet::from([dungeon]));
            assert_eq!(result, JoinResult::Ok, "player {} failed to join", player);
        }
    }

    pub fn tick(&mut self) {
        self.manager.update(Duration::from_secs(1));
    }

    pub fn advance(&mut self, seconds: i64) {
        self.clock.advance(chrono::Duration::seconds(seconds));
    }

    pub fn proposal_for(&self, player: PlayerId) -> ProposalId {
        self.manager
            .proposal_of(player)
            .map(|p| p.id)
            .expect("player has a proposal")
    }

    pub fn accept_all(&mut self, proposal: ProposalId, players: &[PlayerId]) {
        for player in players {
            self.manager.update_proposal(proposal, *player, true);
        }
    }

    /// Queue, match and accept the classic party, returning the new group
    pub fn form_classic_group(&mut self, dungeon: DungeonId) -> GroupId {
        self.queue_classic_party(dungeon);
        self.tick();
        let proposal = self.proposal_for(1);
        let players: Vec<PlayerId> = CLASSIC_PARTY.iter().map(|(id, _)| *id).collect();
        self.accept_all(proposal, &players);
        self.world.group_of(1).expect("group formed")
    }

    pub fn count_for(&self, player: PlayerId, pred: impl Fn(&Notification) -> bool) -> usize {
        self.notifier
            .for_player(player)
            .iter()
            .filter(|n| pred(n))
            .count()
    }
}

pub fn seeded_config() -> LfgConfig {
    LfgConfig {
        rng_seed: Some(42),
        ..LfgConfig::default()
    }
}
