//! Role check run when a group asks to join

use super::store::RideTicket;
use super::LfgManager;
use crate::notify::{member_roles, Notification};
use crate::queue::check_group_roles;
use crate::types::{
    roles, DungeonId, EntityRef, GroupId, JoinResult, LfgState, LfgUpdateType, PlayerId,
    RoleCheckState, RoleMap,
};
use crate::utils::{deadline, generate_request_id};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Pending role selection of a group
#[derive(Debug, Clone)]
pub struct RoleCheck {
    pub cancel_time: DateTime<Utc>,
    pub state: RoleCheckState,
    pub leader: PlayerId,
    /// Submitted roles, `roles::NONE` until a member answers
    pub roles: RoleMap,
    /// Dungeons the group will queue for, randoms already expanded
    pub dungeons: BTreeSet<DungeonId>,
    pub random_dungeon: Option<DungeonId>,
}

impl RoleCheck {
    /// Selection as shown to the members
    pub fn shown_dungeons(&self) -> BTreeSet<DungeonId> {
        match self.random_dungeon {
            Some(random) => BTreeSet::from([random]),
            None => self.dungeons.clone(),
        }
    }

    pub fn all_answered(&self) -> bool {
        self.roles.values().all(|r| *r != roles::NONE)
    }

    fn notification(&self) -> Notification {
        Notification::RoleCheckUpdate {
            state: self.state,
            dungeons: self.shown_dungeons().into_iter().collect(),
            leader: self.leader,
            members: member_roles(&self.roles),
            begin: self.state == RoleCheckState::Initializing,
        }
    }
}

impl LfgManager {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn start_role_check(
        &mut self,
        group: GroupId,
        leader: PlayerId,
        leader_roles: u8,
        dungeons: BTreeSet<DungeonId>,
        random_dungeon: Option<DungeonId>,
        is_continue: bool,
        now: DateTime<Utc>,
    ) {
        let gentity = EntityRef::Group(group);
        let mut check = RoleCheck {
            cancel_time: deadline(now, self.config.role_check_timeout()),
            state: RoleCheckState::Initializing,
            leader,
            roles: RoleMap::new(),
            dungeons,
            random_dungeon,
        };
        let shown = check.shown_dungeons();

        self.store.set_state(gentity, LfgState::Rolecheck);
        for member in self.store.players_of(gentity) {
            self.send_update(member, LfgUpdateType::JoinQueue, &shown, true);
            let data = self.store.player_mut(member);
            data.set_state(LfgState::Rolecheck);
            if !is_continue {
                data.set_selected_dungeons(shown.clone());
            }
            check.roles.insert(member, roles::NONE);
        }

        debug!(
            "Role check started for group {} with {} members",
            group,
            check.roles.len()
        );
        self.role_checks.insert(group, check);
        self.stats.role_checks_started += 1;

        self.update_role_check(group, Some(leader), leader_roles);
    }

    /// Record a member's roles. `None` aborts the check.
    pub fn update_role_check(&mut self, group: GroupId, player: Option<PlayerId>, submitted: u8) {
        let Some(mut check) = self.role_checks.remove(&group) else {
            return;
        };

        let mut submitted = submitted & roles::ANY;
        if let Some(player) = player {
            let allowed = match self.world.player(player) {
                Some(profile) if check.roles.contains_key(&player) => profile.allowed_roles,
                _ => {
                    debug!("Ignoring role answer of {} for group {}", player, group);
                    self.role_checks.insert(group, check);
                    return;
                }
            };
            submitted &= allowed | roles::LEADER;
        }

        let send_chosen = check.state != RoleCheckState::Default && player.is_some();

        match player {
            None => check.state = RoleCheckState::Aborted,
            Some(_) if submitted < roles::TANK => check.state = RoleCheckState::NoRole,
            Some(player) => {
                check.roles.insert(player, submitted);
                if check.all_answered() {
                    check.state = match check_group_roles(&check.roles, &self.quotas()) {
                        Some(_) => RoleCheckState::Finished,
                        None => RoleCheckState::WrongRoles,
                    };
                }
            }
        }

        let shown = check.shown_dungeons();
        let update = check.notification();
        let now = self.now();
        let members: Vec<(PlayerId, u8)> = check.roles.iter().map(|(p, r)| (*p, *r)).collect();

        for (member, member_roles) in members {
            if send_chosen {
                if let Some(player) = player {
                    self.send(
                        member,
                        Notification::RoleChosen {
                            player,
                            roles: submitted,
                            accepted: submitted & roles::COMBAT != 0,
                        },
                    );
                }
            }
            self.send(member, update.clone());

            match check.state {
                RoleCheckState::Initializing => continue,
                RoleCheckState::Finished => {
                    let data = self.store.player_mut(member);
                    data.set_state(LfgState::Queued);
                    data.set_roles(member_roles);
                    data.set_ticket(Some(RideTicket {
                        id: generate_request_id(),
                        joined_at: now,
                    }));
                    self.send_update(member, LfgUpdateType::AddedToQueue, &shown, true);
                }
                failed => {
                    if member == check.leader {
                        self.send_join_result(member, JoinResult::RoleCheckFailed, failed, Vec::new());
                    }
                    self.send_update(member, LfgUpdateType::RolecheckFailed, &BTreeSet::new(), true);
                    self.store
                        .restore_state(EntityRef::Player(member), "role check failed");
                }
            }
        }

        let gentity = EntityRef::Group(group);
        match check.state {
            RoleCheckState::Initializing => {
                self.role_checks.insert(group, check);
            }
            RoleCheckState::Finished => {
                self.store.set_state(gentity, LfgState::Queued);
                let pool = self.pool_of(gentity);
                info!(
                    "Group {} passed its role check and joined the {} queue",
                    group, pool
                );
                self.queue_mut(pool)
                    .add_queue_data(gentity, now, check.dungeons, check.roles);
            }
            failed => {
                debug!("Role check of group {} ended as {:?}", group, failed);
                self.store.restore_state(gentity, "role check failed");
                self.stats.role_checks_failed += 1;
            }
        }
    }

    pub fn abort_role_check(&mut self, group: GroupId) {
        self.update_role_check(group, None, roles::NONE);
    }

    /// Fail every role check past its deadline
    pub(super) fn expire_role_checks(&mut self, now: DateTime<Utc>) -> usize {
        let expired: Vec<GroupId> = self
            .role_checks
            .iter()
            .filter(|(_, check)| now >= check.cancel_time)
            .map(|(group, _)| *group)
            .collect();

        for group in &expired {
            let Some(mut check) = self.role_checks.remove(group) else {
                continue;
            };
            check.state = RoleCheckState::MissingRole;
            let update = check.notification();

            for member in check.roles.keys() {
                self.store
                    .restore_state(EntityRef::Player(*member), "role check expired");
                self.send(*member, update.clone());
                if *member == check.leader {
                    self.send_join_result(
                        *member,
                        JoinResult::RoleCheckFailed,
                        RoleCheckState::MissingRole,
                        Vec::new(),
                    );
                }
            }
            self.store
                .restore_state(EntityRef::Group(*group), "role check expired");
            self.stats.role_checks_failed += 1;
            debug!("Role check of group {} timed out", group);
        }
        expired.len()
    }
}
