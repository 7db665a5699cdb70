//! AMQP message definitions and serialization

use crate::error::{LfgError, Result};
use crate::notify::Notification;
use crate::types::{roles, DungeonId, GroupId, PlayerId, ProposalId, RemoveMethod};
use crate::world::PlayerProfile;
use serde::{Deserialize, Serialize};
use serde_json;

/// Default AMQP names
pub const LFG_REQUEST_QUEUE: &str = "lfg.requests";
pub const LFG_NOTIFICATIONS_EXCHANGE: &str = "lfg.notifications";

/// Prefix of every notification routing key
pub const NOTIFY_ROUTING_PREFIX: &str = "lfg.notify";

/// Longest vote kick reason accepted from clients
pub const MAX_BOOT_REASON_LEN: usize = 255;

/// Message envelope with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope<T> {
    pub payload: T,
    pub correlation_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub routing_key: String,
}

impl<T> MessageEnvelope<T>
where
    T: Serialize + serde::de::DeserializeOwned,
{
    /// Create a new message envelope
    pub fn new(payload: T, routing_key: String) -> Self {
        Self {
            payload,
            correlation_id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now(),
            routing_key,
        }
    }

    /// Serialize the envelope to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            LfgError::InternalError {
                message: format!("Failed to serialize message: {}", e),
            }
            .into()
        })
    }

    /// Deserialize envelope from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            LfgError::InvalidRequest {
                reason: format!("Failed to deserialize message: {}", e),
            }
            .into()
        })
    }
}

/// Group and session changes reported by the game world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GroupEvent {
    MemberAdded {
        group_id: GroupId,
        player_id: PlayerId,
    },
    MemberRemoved {
        group_id: GroupId,
        player_id: PlayerId,
        method: RemoveMethod,
        #[serde(default)]
        kicker: Option<PlayerId>,
        #[serde(default)]
        reason: Option<String>,
    },
    Disbanded {
        group_id: GroupId,
    },
    LeaderChanged {
        group_id: GroupId,
        new_leader: PlayerId,
        old_leader: PlayerId,
    },
    MemberInvited {
        #[serde(default)]
        group_id: Option<GroupId>,
        inviter: PlayerId,
    },
    Login {
        player_id: PlayerId,
    },
    Logout {
        player_id: PlayerId,
        #[serde(default)]
        disconnected: bool,
    },
}

/// Requests consumed from the request queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LfgRequest {
    JoinLfg {
        player_id: PlayerId,
        roles: u8,
        dungeons: Vec<DungeonId>,
    },
    LeaveLfg {
        player_id: PlayerId,
        /// Leave on behalf of this group instead of the player alone
        #[serde(default)]
        group_id: Option<GroupId>,
        #[serde(default)]
        disconnected: bool,
    },
    UpdateRoleCheck {
        group_id: GroupId,
        player_id: PlayerId,
        roles: u8,
    },
    UpdateProposal {
        proposal_id: ProposalId,
        player_id: PlayerId,
        accept: bool,
    },
    UpdateBoot {
        player_id: PlayerId,
        accept: bool,
    },
    InitiateBoot {
        group_id: GroupId,
        initiator: PlayerId,
        victim: PlayerId,
        #[serde(default)]
        reason: String,
    },
    Teleport {
        player_id: PlayerId,
        #[serde(default)]
        out: bool,
    },
    FinishDungeon {
        group_id: GroupId,
        dungeon_id: DungeonId,
    },
    LockInfo {
        player_id: PlayerId,
    },
    /// Insert or refresh the profile the engine reads for a player
    PlayerProfile {
        profile: PlayerProfile,
    },
    GroupEvent {
        event: GroupEvent,
    },
}

impl LfgRequest {
    /// Short name used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            LfgRequest::JoinLfg { .. } => "join_lfg",
            LfgRequest::LeaveLfg { .. } => "leave_lfg",
            LfgRequest::UpdateRoleCheck { .. } => "update_role_check",
            LfgRequest::UpdateProposal { .. } => "update_proposal",
            LfgRequest::UpdateBoot { .. } => "update_boot",
            LfgRequest::InitiateBoot { .. } => "initiate_boot",
            LfgRequest::Teleport { .. } => "teleport",
            LfgRequest::FinishDungeon { .. } => "finish_dungeon",
            LfgRequest::LockInfo { .. } => "lock_info",
            LfgRequest::PlayerProfile { .. } => "player_profile",
            LfgRequest::GroupEvent { .. } => "group_event",
        }
    }
}

/// Message serialization and validation utilities
pub struct MessageUtils;

impl MessageUtils {
    /// Serialize a request to bytes
    pub fn serialize_request(request: &LfgRequest) -> Result<Vec<u8>> {
        Self::validate_request(request)?;
        Self::serialize_message(request)
    }

    /// Deserialize a request from bytes
    pub fn deserialize_request(bytes: &[u8]) -> Result<LfgRequest> {
        let request: LfgRequest =
            serde_json::from_slice(bytes).map_err(|e| LfgError::InvalidRequest {
                reason: format!("Failed to deserialize LFG request: {}", e),
            })?;

        Self::validate_request(&request)?;
        Ok(request)
    }

    /// Reject requests no engine call could make sense of
    pub fn validate_request(request: &LfgRequest) -> Result<()> {
        let invalid = |reason: &str| -> Result<()> {
            Err(LfgError::InvalidRequest {
                reason: reason.to_string(),
            }
            .into())
        };

        match request {
            LfgRequest::JoinLfg {
                player_id,
                roles: mask,
                ..
            } => {
                if *player_id == 0 {
                    return invalid("Player ID cannot be 0");
                }
                if mask & !roles::ANY != 0 {
                    return invalid("Unknown role bits");
                }
            }
            LfgRequest::UpdateRoleCheck { roles: mask, .. } if mask & !roles::ANY != 0 => {
                return invalid("Unknown role bits");
            }
            LfgRequest::InitiateBoot {
                initiator,
                victim,
                reason,
                ..
            } => {
                if initiator == victim {
                    return invalid("A player cannot vote to kick themselves");
                }
                if reason.len() > MAX_BOOT_REASON_LEN {
                    return invalid("Kick reason is too long");
                }
            }
            LfgRequest::PlayerProfile { profile } => {
                if profile.id == 0 {
                    return invalid("Player ID cannot be 0");
                }
                if profile.name.is_empty() {
                    return invalid("Player name cannot be empty");
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Serialize any AMQP message to bytes
    pub fn serialize_message<T: Serialize>(message: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(message).map_err(|e| {
            LfgError::InternalError {
                message: format!("Failed to serialize message: {}", e),
            }
            .into()
        })
    }

    /// Routing key of a notification
    pub fn routing_key(notification: &Notification) -> String {
        format!("{}.{}", NOTIFY_ROUTING_PREFIX, notification.kind())
    }
}
