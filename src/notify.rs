//! Outbound notifications
//!
//! Every message the engine pushes to a client goes through an [`LfgNotifier`].
//! The service forwards them to AMQP, tests record them.

use crate::types::{
    BootOutcome, DungeonId, JoinResult, LfgAnswer, LfgUpdateType, LockMap, LockStatus, PlayerId,
    ProposalId, ProposalState, RoleCheckState, RoleMap, TeleportError,
};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// A single locked dungeon entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DungeonLock {
    pub dungeon_entry: u32,
    pub status: LockStatus,
}

/// Locks of one party member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerLocks {
    pub player: PlayerId,
    pub locks: Vec<DungeonLock>,
}

/// Role selection of one member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRoles {
    pub player: PlayerId,
    pub roles: u8,
}

/// Member line of a proposal update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalMember {
    pub player: PlayerId,
    pub role: u8,
    pub answer: LfgAnswer,
    /// Member is already in the recipient's group
    pub same_group: bool,
    /// Member belongs to the group continuing the dungeon
    pub in_dungeon: bool,
}

/// Queue position estimate for one queue entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub dungeon_id: DungeonId,
    /// Estimate for the player's role class, -1 when unknown
    pub wait_time_ms: i64,
    pub wait_time_avg_ms: i64,
    pub wait_time_tank_ms: i64,
    pub wait_time_healer_ms: i64,
    pub wait_time_dps_ms: i64,
    pub queued_time_ms: i64,
    pub tanks_needed: u8,
    pub healers_needed: u8,
    pub dps_needed: u8,
}

/// Messages pushed to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Notification {
    UpdateStatus {
        update: LfgUpdateType,
        dungeons: Vec<DungeonId>,
        party: bool,
        queued: bool,
    },
    JoinResult {
        result: JoinResult,
        role_check: RoleCheckState,
        locks: Vec<PlayerLocks>,
    },
    RoleCheckUpdate {
        state: RoleCheckState,
        dungeons: Vec<DungeonId>,
        leader: PlayerId,
        members: Vec<MemberRoles>,
        begin: bool,
    },
    RoleChosen {
        player: PlayerId,
        roles: u8,
        accepted: bool,
    },
    ProposalUpdate {
        proposal_id: ProposalId,
        state: ProposalState,
        dungeon_id: DungeonId,
        continuing: bool,
        members: Vec<ProposalMember>,
    },
    QueueStatus(QueueStatus),
    BootProposalUpdate {
        in_progress: bool,
        victim: PlayerId,
        reason: String,
        agree: u8,
        deny: u8,
        votes_needed: u8,
        seconds_left: i64,
        my_answer: LfgAnswer,
        outcome: Option<BootOutcome>,
    },
    TeleportError {
        error: TeleportError,
    },
    PlayerReward {
        random_dungeon: DungeonId,
        done_dungeon: DungeonId,
        already_done: bool,
        quest: u32,
    },
    OfferContinue {
        dungeon_entry: u32,
    },
    LockInfo {
        locks: Vec<DungeonLock>,
    },
}

impl Notification {
    /// Short name used for routing keys and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::UpdateStatus { .. } => "update_status",
            Notification::JoinResult { .. } => "join_result",
            Notification::RoleCheckUpdate { .. } => "role_check_update",
            Notification::RoleChosen { .. } => "role_chosen",
            Notification::ProposalUpdate { .. } => "proposal_update",
            Notification::QueueStatus(_) => "queue_status",
            Notification::BootProposalUpdate { .. } => "boot_proposal_update",
            Notification::TeleportError { .. } => "teleport_error",
            Notification::PlayerReward { .. } => "player_reward",
            Notification::OfferContinue { .. } => "offer_continue",
            Notification::LockInfo { .. } => "lock_info",
        }
    }
}

/// Flatten a lock map for the wire
pub fn lock_list(locks: &LockMap) -> Vec<DungeonLock> {
    locks
        .iter()
        .map(|(entry, status)| DungeonLock {
            dungeon_entry: *entry,
            status: *status,
        })
        .collect()
}

/// Flatten a role map for the wire
pub fn member_roles(roles: &RoleMap) -> Vec<MemberRoles> {
    roles
        .iter()
        .map(|(player, roles)| MemberRoles {
            player: *player,
            roles: *roles,
        })
        .collect()
}

/// A notification together with its recipient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundNotification {
    pub recipient: PlayerId,
    pub notification: Notification,
}

/// Sink for client notifications
pub trait LfgNotifier: Send + Sync {
    fn notify(&self, recipient: PlayerId, notification: Notification);
}

/// Notifier that keeps everything in memory
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<OutboundNotification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far
    pub fn sent(&self) -> Vec<OutboundNotification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Notifications received by one player, in order
    pub fn for_player(&self, player: PlayerId) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|n| n.recipient == player)
            .map(|n| n.notification)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }
}

impl LfgNotifier for RecordingNotifier {
    fn notify(&self, recipient: PlayerId, notification: Notification) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(OutboundNotification {
                recipient,
                notification,
            });
        }
    }
}

/// Notifier that hands notifications to an async consumer
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<OutboundNotification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl LfgNotifier for ChannelNotifier {
    fn notify(&self, recipient: PlayerId, notification: Notification) {
        if self
            .tx
            .send(OutboundNotification {
                recipient,
                notification,
            })
            .is_err()
        {
            tracing::debug!("Notification channel closed, dropping message for {}", recipient);
        }
    }
}
