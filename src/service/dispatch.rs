//! Mapping of decoded requests onto engine calls
//!
//! Group events describe changes the game world has already made, so they
//! are mirrored into the [`InMemoryWorld`] before the engine hears about
//! them. The one exception is a kick from a dungeon finder group, which only
//! opens a vote and leaves membership alone.

use crate::amqp::messages::{GroupEvent, LfgRequest};
use crate::error::{LfgError, Result};
use crate::manager::{GroupEvents, LfgManager};
use crate::types::{EntityRef, JoinResult, RemoveMethod};
use crate::world::{InMemoryWorld, World};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Applies requests to an engine and the world it reads from
#[derive(Clone)]
pub struct RequestDispatcher {
    world: Arc<InMemoryWorld>,
}

impl RequestDispatcher {
    pub fn new(world: Arc<InMemoryWorld>) -> Self {
        Self { world }
    }

    pub fn world(&self) -> Arc<InMemoryWorld> {
        self.world.clone()
    }

    /// Apply one request. Client-visible refusals such as a rejected join are
    /// reported through notifications and still count as handled; only
    /// requests the engine cannot act on return an error.
    pub fn apply(&self, manager: &mut LfgManager, request: LfgRequest) -> Result<()> {
        match request {
            LfgRequest::JoinLfg {
                player_id,
                roles,
                dungeons,
            } => {
                let dungeons: BTreeSet<_> = dungeons.into_iter().collect();
                let result = manager.join_lfg(player_id, roles, dungeons);
                if result != JoinResult::Ok {
                    info!("Join of player {} refused: {:?}", player_id, result);
                }
            }
            LfgRequest::LeaveLfg {
                player_id,
                group_id,
                disconnected,
            } => {
                let entity = match group_id {
                    Some(group) => EntityRef::Group(group),
                    None => EntityRef::Player(player_id),
                };
                manager.leave_lfg(entity, disconnected);
            }
            LfgRequest::UpdateRoleCheck {
                group_id,
                player_id,
                roles,
            } => {
                if manager.role_check(group_id).is_none() {
                    return Err(LfgError::GroupNotFound { group_id }.into());
                }
                manager.update_role_check(group_id, Some(player_id), roles);
            }
            LfgRequest::UpdateProposal {
                proposal_id,
                player_id,
                accept,
            } => {
                if manager.proposal(proposal_id).is_none() {
                    return Err(LfgError::ProposalNotFound { proposal_id }.into());
                }
                manager.update_proposal(proposal_id, player_id, accept);
            }
            LfgRequest::UpdateBoot { player_id, accept } => {
                manager.update_boot(player_id, accept);
            }
            LfgRequest::InitiateBoot {
                group_id,
                initiator,
                victim,
                reason,
            } => {
                manager
                    .initiate_boot(group_id, initiator, victim, &reason)
                    .map_err(|refusal| LfgError::InvalidRequest {
                        reason: refusal.to_string(),
                    })?;
            }
            LfgRequest::Teleport { player_id, out } => {
                let result = manager.teleport_player(player_id, out);
                debug!("Teleport of player {}: {:?}", player_id, result);
            }
            LfgRequest::FinishDungeon {
                group_id,
                dungeon_id,
            } => {
                manager.finish_dungeon(group_id, dungeon_id);
            }
            LfgRequest::LockInfo { player_id } => {
                manager.lock_info(player_id);
            }
            LfgRequest::PlayerProfile { profile } => {
                debug!("Refreshing profile of player {}", profile.id);
                self.world.upsert_player(profile);
            }
            LfgRequest::GroupEvent { event } => self.apply_group_event(manager, event),
        }
        Ok(())
    }

    fn apply_group_event(&self, manager: &mut LfgManager, event: GroupEvent) {
        match event {
            GroupEvent::MemberAdded {
                group_id,
                player_id,
            } => {
                self.world.register_group(group_id, player_id);
                self.world.add_member(group_id, player_id);
                manager.on_member_added(group_id, player_id);
            }
            GroupEvent::MemberRemoved {
                group_id,
                player_id,
                method,
                kicker,
                reason,
            } => {
                let vote_only = method == RemoveMethod::Kick && manager.is_lfg_group(group_id);
                if !vote_only {
                    self.world.remove_member(group_id, player_id);
                }
                manager.on_member_removed(group_id, player_id, method, kicker, reason.as_deref());
            }
            GroupEvent::Disbanded { group_id } => {
                manager.on_group_disbanded(group_id);
                self.world.disband_group(group_id);
            }
            GroupEvent::LeaderChanged {
                group_id,
                new_leader,
                old_leader,
            } => {
                self.world.set_leader(group_id, new_leader);
                manager.on_leader_changed(group_id, new_leader, old_leader);
            }
            GroupEvent::MemberInvited { group_id, inviter } => {
                manager.on_member_invited(group_id, inviter);
            }
            GroupEvent::Login { player_id } => manager.on_player_login(player_id),
            GroupEvent::Logout {
                player_id,
                disconnected,
            } => manager.on_player_logout(player_id, disconnected),
        }
    }
}
