//! Premade groups: role checks, mixed proposals, vote kicks and completion

use crate::fixtures::{TestHarness, UTGARDE_KEEP};
use dungeon_finder::manager::{BootRefusal, GroupEvents};
use dungeon_finder::notify::Notification;
use dungeon_finder::types::{
    roles, BootOutcome, EntityRef, JoinResult, LfgState, PlayerId, RemoveMethod, RoleCheckState,
    TeleportDestination,
};
use dungeon_finder::world::World;
use std::collections::BTreeSet;

#[test]
fn test_premade_and_solos_form_one_group() {
    let mut harness = TestHarness::new();
    harness.add_players(1..=5);
    let premade = harness.world.form_group(1, &[1, 2, 3]);

    // Step 1: the leader queues the group, which starts a role check
    let result = harness
        .manager
        .join_lfg(1, roles::TANK | roles::LEADER, BTreeSet::from([UTGARDE_KEEP]));
    assert_eq!(result, JoinResult::Ok);
    assert_eq!(
        harness.manager.get_state(EntityRef::Group(premade)),
        LfgState::Rolecheck
    );
    assert!(harness.count_for(2, |n| matches!(
        n,
        Notification::RoleCheckUpdate { begin: true, .. }
    )) >= 1);

    // Step 2: the members answer and the group enters the queue
    harness.manager.update_role_check(premade, Some(2), roles::HEALER);
    harness.manager.update_role_check(premade, Some(3), roles::DAMAGE);
    assert_eq!(
        harness.manager.get_state(EntityRef::Group(premade)),
        LfgState::Queued
    );

    // Step 3: two solo damage dealers complete it
    for player in [4, 5] {
        harness
            .manager
            .join_lfg(player, roles::DAMAGE, BTreeSet::from([UTGARDE_KEEP]));
    }
    harness.tick();
    let proposal_id = harness.proposal_for(4);
    assert_eq!(harness.manager.proposal(proposal_id).unwrap().players.len(), 5);

    harness.accept_all(proposal_id, &[1, 2, 3, 4, 5]);
    let group = harness.world.group_of(4).unwrap();
    assert!(harness.manager.is_lfg_group(group));
    for player in 1..=5 {
        assert_eq!(harness.world.group_of(player), Some(group));
        assert_eq!(
            harness.manager.get_state(EntityRef::Player(player)),
            LfgState::Dungeon
        );
    }
    assert_eq!(harness.manager.get_leader(group), Some(1));
}

#[test]
fn test_role_check_abort_by_leader_leaving() {
    let mut harness = TestHarness::new();
    harness.add_players(1..=3);
    let group = harness.world.form_group(1, &[1, 2, 3]);
    harness
        .manager
        .join_lfg(1, roles::TANK | roles::LEADER, BTreeSet::from([UTGARDE_KEEP]));

    harness.manager.leave_lfg(EntityRef::Group(group), false);

    assert!(harness.manager.role_check(group).is_none());
    assert_eq!(harness.manager.get_state(EntityRef::Group(group)), LfgState::None);
    assert!(harness.count_for(1, |n| matches!(
        n,
        Notification::JoinResult {
            role_check: RoleCheckState::Aborted,
            ..
        }
    )) >= 1);
    assert_eq!(harness.manager.stats().role_checks_failed, 1);
}

#[test]
fn test_role_check_rejects_member_without_role() {
    let mut harness = TestHarness::new();
    harness.add_players(1..=2);
    let group = harness.world.form_group(1, &[1, 2]);
    harness
        .manager
        .join_lfg(1, roles::TANK | roles::LEADER, BTreeSet::from([UTGARDE_KEEP]));

    harness.manager.update_role_check(group, Some(2), roles::LEADER);

    assert!(harness.manager.role_check(group).is_none());
    assert_eq!(harness.manager.get_state(EntityRef::Player(2)), LfgState::None);
    assert!(harness.count_for(1, |n| matches!(
        n,
        Notification::JoinResult {
            result: JoinResult::RoleCheckFailed,
            role_check: RoleCheckState::NoRole,
            ..
        }
    )) >= 1);
}

fn non_leaders(harness: &TestHarness, group: u64) -> (PlayerId, Vec<PlayerId>) {
    let leader = harness.manager.get_leader(group).unwrap();
    let others = harness
        .manager
        .get_members(group)
        .into_iter()
        .filter(|m| *m != leader)
        .collect();
    (leader, others)
}

#[test]
fn test_vote_kick_rejected_by_majority() {
    let mut harness = TestHarness::new();
    let group = harness.form_classic_group(UTGARDE_KEEP);
    let (leader, others) = non_leaders(&harness, group);
    let victim = others[0];

    harness
        .manager
        .initiate_boot(group, leader, victim, "pulling too much")
        .unwrap();
    for voter in &others[1..] {
        harness.manager.update_boot(*voter, false);
    }

    assert!(harness.manager.boot(group).is_none());
    assert_eq!(harness.world.group_of(victim), Some(group));
    assert_eq!(harness.manager.get_members(group).len(), 5);
    assert_eq!(harness.manager.get_kicks_left(group), 3);
    assert!(harness.count_for(leader, |n| matches!(
        n,
        Notification::BootProposalUpdate {
            in_progress: false,
            outcome: Some(BootOutcome::Rejected),
            ..
        }
    )) == 1);
}

#[test]
fn test_vote_kick_expires() {
    let mut harness = TestHarness::new();
    let group = harness.form_classic_group(UTGARDE_KEEP);
    let (leader, others) = non_leaders(&harness, group);

    harness
        .manager
        .initiate_boot(group, leader, others[0], "afk")
        .unwrap();
    harness.advance(121);
    let report = harness.manager.update(std::time::Duration::from_secs(1));

    assert_eq!(report.expired_boots, 1);
    assert!(harness.manager.boot(group).is_none());
    assert_eq!(harness.manager.get_members(group).len(), 5);
    assert!(harness.count_for(others[1], |n| matches!(
        n,
        Notification::BootProposalUpdate {
            outcome: Some(BootOutcome::Expired),
            ..
        }
    )) == 1);
}

#[test]
fn test_kick_event_opens_vote_and_keeps_member() {
    let mut harness = TestHarness::new();
    let group = harness.form_classic_group(UTGARDE_KEEP);
    let (leader, others) = non_leaders(&harness, group);

    harness.manager.on_member_removed(
        group,
        others[0],
        RemoveMethod::Kick,
        Some(leader),
        Some("afk"),
    );

    let boot = harness.manager.boot(group).unwrap();
    assert_eq!(boot.victim, others[0]);
    assert_eq!(boot.initiator, leader);
    assert_eq!(harness.manager.get_members(group).len(), 5);
    assert_eq!(
        harness.manager.initiate_boot(group, leader, others[1], "again"),
        Err(BootRefusal::InProgress)
    );
}

#[test]
fn test_vote_kick_needs_enough_members() {
    let mut harness = TestHarness::new();
    let group = harness.form_classic_group(UTGARDE_KEEP);
    let (leader, others) = non_leaders(&harness, group);

    // two voluntary leaves bring the group down to the vote threshold
    for leaver in &others[..2] {
        harness.world.remove_member(group, *leaver);
        harness
            .manager
            .on_member_removed(group, *leaver, RemoveMethod::Leave, None, None);
    }
    assert_eq!(harness.manager.get_members(group).len(), 3);
    assert_eq!(
        harness.manager.initiate_boot(group, leader, others[2], "afk"),
        Err(BootRefusal::TooFewPlayers)
    );
}

#[test]
fn test_finished_dungeon_blocks_vote_kick_and_teleports_out() {
    let mut harness = TestHarness::new();
    let group = harness.form_classic_group(UTGARDE_KEEP);
    let (leader, others) = non_leaders(&harness, group);

    harness.manager.finish_dungeon(group, UTGARDE_KEEP);
    assert_eq!(
        harness.manager.get_state(EntityRef::Group(group)),
        LfgState::FinishedDungeon
    );
    assert_eq!(
        harness.manager.initiate_boot(group, leader, others[0], "afk"),
        Err(BootRefusal::DungeonComplete)
    );

    harness.manager.teleport_player(others[0], true);
    assert!(harness
        .world
        .teleports()
        .iter()
        .any(|(p, d)| *p == others[0] && *d == TeleportDestination::Exit));
    assert_eq!(harness.manager.stats().dungeons_finished, 1);
}

#[test]
fn test_disbanding_lfg_group_resets_members() {
    let mut harness = TestHarness::new();
    let group = harness.form_classic_group(UTGARDE_KEEP);

    harness.manager.on_group_disbanded(group);

    assert!(!harness.manager.is_lfg_group(group));
    for player in 1..=5 {
        assert_eq!(harness.manager.get_group(player), None);
        assert_eq!(
            harness.manager.get_state(EntityRef::Player(player)),
            LfgState::None
        );
    }
}
