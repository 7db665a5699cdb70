//! Error types for the dungeon finder
//!
//! Engine-level validation failures are reported as join results or
//! notifications; the types here cover the places where an operation
//! cannot proceed at all (bad input, missing data, configuration).

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific dungeon finder scenarios
#[derive(Debug, thiserror::Error)]
pub enum LfgError {
    #[error("AMQP connection failed: {message}")]
    AmqpConnectionFailed { message: String },

    #[error("Invalid LFG request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Player not found: {player_id}")]
    PlayerNotFound { player_id: u64 },

    #[error("Group not found: {group_id}")]
    GroupNotFound { group_id: u64 },

    #[error("Dungeon not found: {dungeon_id}")]
    DungeonNotFound { dungeon_id: u32 },

    #[error("Proposal not found: {proposal_id}")]
    ProposalNotFound { proposal_id: u32 },

    #[error("Dungeon catalog error: {reason}")]
    CatalogError { reason: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}
