//! Matchmaking queues, compatibility search and wait-time statistics

pub mod compatibility;
pub mod lfg_queue;
pub mod proposal;
pub mod roles;
pub mod wait_time;

pub use compatibility::{CacheStats, CompatibilityCache, CompatibilityKey, LfgCompatibility};
pub use lfg_queue::{LfgQueue, QueueContext, QueueData, QueueSettings, QueueSummary};
pub use proposal::{Proposal, ProposalPlayer};
pub use roles::{check_group_roles, RoleQuotas};
pub use wait_time::{WaitRole, WaitTimeStat, WaitTimes};
