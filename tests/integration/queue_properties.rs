//! Property tests over random join and leave sequences

use crate::fixtures::{TestHarness, THE_NEXUS, UTGARDE_KEEP};
use dungeon_finder::types::{roles, EntityRef, LfgState, PlayerId};
use proptest::prelude::*;
use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Clone)]
enum Action {
    Join { player: PlayerId, mask: u8, both: bool },
    Leave { player: PlayerId },
    Tick,
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        4 => (1u64..=20, 1u8..=15, any::<bool>())
            .prop_map(|(player, mask, both)| Action::Join { player, mask, both }),
        1 => (1u64..=20).prop_map(|player| Action::Leave { player }),
        1 => Just(Action::Tick),
    ]
}

fn apply(harness: &mut TestHarness, action: &Action) {
    match action {
        Action::Join { player, mask, both } => {
            // clients cannot queue again while answering a proposal
            if harness.manager.get_state(EntityRef::Player(*player)) == LfgState::Proposal {
                return;
            }
            let dungeons = if *both {
                BTreeSet::from([UTGARDE_KEEP, THE_NEXUS])
            } else {
                BTreeSet::from([UTGARDE_KEEP])
            };
            harness.manager.join_lfg(*player, *mask, dungeons);
        }
        Action::Leave { player } => {
            harness.manager.leave_lfg(EntityRef::Player(*player), false);
        }
        Action::Tick => harness.tick(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn queued_count_matches_player_states(actions in prop::collection::vec(action_strategy(), 1..60)) {
        let mut harness = TestHarness::new();
        harness.add_players(1..=20);

        for action in &actions {
            apply(&mut harness, action);
        }

        // matched entries stay in the queue until their proposal resolves
        let queued = (1..=20)
            .filter(|p| matches!(
                harness.manager.get_state(EntityRef::Player(*p)),
                LfgState::Queued | LfgState::Proposal
            ))
            .count();
        prop_assert_eq!(harness.manager.stats().queued_players, queued);
    }

    #[test]
    fn proposals_are_disjoint_and_complete(actions in prop::collection::vec(action_strategy(), 1..60)) {
        let mut harness = TestHarness::new();
        harness.add_players(1..=20);

        for action in &actions {
            apply(&mut harness, action);
        }
        harness.tick();

        let mut seen = HashSet::new();
        for proposal in harness.manager.proposals() {
            prop_assert_eq!(proposal.players.len(), 5);
            let mut counts = (0, 0, 0);
            for (player, slot) in &proposal.players {
                prop_assert!(seen.insert(*player), "player {} in two proposals", player);
                prop_assert_eq!(
                    harness.manager.get_state(EntityRef::Player(*player)),
                    LfgState::Proposal
                );
                match slot.role & !roles::LEADER {
                    roles::TANK => counts.0 += 1,
                    roles::HEALER => counts.1 += 1,
                    roles::DAMAGE => counts.2 += 1,
                    other => prop_assert!(false, "unresolved role {}", other),
                }
            }
            prop_assert_eq!(counts, (1, 1, 3));
        }
    }
}
