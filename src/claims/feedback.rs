//! User-facing feedback surface.
//!
//! Batch operations never format text themselves: they emit a [`Feedback`]
//! carrying a translation key and an optional count, and the host renders it
//! in the recipient's language.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Translation identifiers for claim feedback.
pub mod keys {
    pub const CLAIMED: &str = "claim.chunk.claimed";
    pub const UNCLAIMED: &str = "claim.chunk.unclaimed";
    pub const ALREADY_OWNED: &str = "claim.chunk.already_owned";
    pub const NOT_OWNED: &str = "claim.chunk.not_owned";
    pub const NOT_OWNED_BY_ACTOR: &str = "claim.chunk.not_owned_by_actor";
    pub const PROTECTED: &str = "claim.chunk.protected";
    pub const OUTSIDE_BORDER: &str = "claim.chunk.outside_border";
    pub const LIMIT_REACHED: &str = "claim.chunk.limit_reached";
    pub const NOT_CLAIMABLE: &str = "claim.chunk.not_claimable";
    pub const NOT_TOWN_OWNER: &str = "claim.town.not_owner_cell";
    pub const ALREADY_IN_TOWN: &str = "claim.town.already_member";
    pub const NOT_TOWN_MEMBER: &str = "claim.town.not_member";
    pub const TOWN_HAS_CLAIMS: &str = "claim.town.has_claims";
    pub const INVALID_TAX_RATE: &str = "claim.town.invalid_tax";
    pub const INVALID_SLICE: &str = "claim.slice.invalid";
    pub const DISABLED: &str = "claim.disabled";
    pub const INTERNAL: &str = "claim.error";
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    Success,
    Failure,
}

/// One structured message for the command/feedback surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Feedback {
    /// Player who issued the command; `None` for console or automated callers.
    pub recipient: Option<Uuid>,
    pub kind: FeedbackKind,
    pub key: String,
    pub count: Option<usize>,
}

impl Feedback {
    pub fn success(recipient: Option<Uuid>, key: &str, count: usize) -> Self {
        Self {
            recipient,
            kind: FeedbackKind::Success,
            key: key.to_string(),
            count: Some(count),
        }
    }

    pub fn failure(recipient: Option<Uuid>, key: &str) -> Self {
        Self {
            recipient,
            kind: FeedbackKind::Failure,
            key: key.to_string(),
            count: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind == FeedbackKind::Success
    }
}

/// Receives feedback produced by claim operations.
pub trait FeedbackSink {
    fn send(&mut self, feedback: Feedback);
}

/// Collects feedback in order; used by tests and the CLI.
impl FeedbackSink for Vec<Feedback> {
    fn send(&mut self, feedback: Feedback) {
        self.push(feedback);
    }
}
