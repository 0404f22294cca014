use thiserror::Error;
use uuid::Uuid;

use crate::claims::feedback::keys;
use crate::claims::types::CellCoord;

/// Errors raised by claim storage, claimant management and batch updates.
#[derive(Debug, Error)]
pub enum ClaimError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Wrapper around IO errors (directory creation, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Returned when fetching a record that is not present.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Returned when deserializing a record with an unexpected schema version.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },

    /// Claim conflict: the cell already belongs to someone else.
    #[error("cell {0} is already owned")]
    AlreadyOwned(CellCoord),

    /// Unclaim of a cell nobody owns.
    #[error("cell {0} is not owned")]
    NotOwned(CellCoord),

    /// Unclaim (or town claim) of a cell owned by a different claimant.
    #[error("cell {0} is not owned by the acting claimant")]
    NotOwnedByActor(CellCoord),

    /// Policy rejection keyed by its translation identifier.
    #[error("{key} at {coord}")]
    Policy {
        key: &'static str,
        coord: CellCoord,
    },

    #[error("player {0} already belongs to a town")]
    AlreadyInTown(Uuid),

    #[error("player {0} is not a member of that town")]
    NotTownMember(Uuid),

    #[error("town {0} still holds claimed cells")]
    TownHasClaims(Uuid),

    #[error("tax rate {0} is outside 0-100")]
    InvalidTaxRate(u8),

    #[error("claims are disabled")]
    ClaimsDisabled,

    #[error("height {0} is outside the sliced range")]
    InvalidSlice(i32),

    /// Internal error (unexpected conditions)
    #[error("internal error: {0}")]
    Internal(String),
}

impl ClaimError {
    /// Translation identifier used for user-facing feedback.
    pub fn translation_key(&self) -> &'static str {
        match self {
            ClaimError::AlreadyOwned(_) => keys::ALREADY_OWNED,
            ClaimError::NotOwned(_) => keys::NOT_OWNED,
            ClaimError::NotOwnedByActor(_) => keys::NOT_OWNED_BY_ACTOR,
            ClaimError::Policy { key, .. } => *key,
            ClaimError::AlreadyInTown(_) => keys::ALREADY_IN_TOWN,
            ClaimError::NotTownMember(_) => keys::NOT_TOWN_MEMBER,
            ClaimError::TownHasClaims(_) => keys::TOWN_HAS_CLAIMS,
            ClaimError::InvalidTaxRate(_) => keys::INVALID_TAX_RATE,
            ClaimError::ClaimsDisabled => keys::DISABLED,
            ClaimError::InvalidSlice(_) => keys::INVALID_SLICE,
            ClaimError::Sled(_)
            | ClaimError::Bincode(_)
            | ClaimError::Io(_)
            | ClaimError::NotFound(_)
            | ClaimError::SchemaMismatch { .. }
            | ClaimError::Internal(_) => keys::INTERNAL,
        }
    }
}
