//! Land claims: who owns each world cell and what others may do there.
//! Claimant records live in a shared [`ClaimCache`]; read-side decisions go
//! through [`resolver`]; ownership changes run as tick-driven
//! [`ChunkOwnerUpdate`] batches.

pub mod audit;
pub mod cache;
pub mod claimant;
pub mod errors;
pub mod feedback;
pub mod resolver;
pub mod scheduler;
pub mod storage;
pub mod types;
pub mod update;
pub mod world;

pub use audit::{audit_counts, repair_counts, CountMismatch};
pub use cache::{CacheSettings, ClaimCache, FeatureFlags};
pub use claimant::{
    Claimant, ClaimantCore, ClaimantKind, ClaimantPlayer, ClaimantTown, ClaimTarget, PlayerHandle,
    TownHandle,
};
pub use errors::ClaimError;
pub use feedback::{keys, Feedback, FeedbackKind, FeedbackSink};
pub use resolver::{
    can_perform, can_perform_at, effective_rank, is_setting_enabled, player_setting, snapshot_for,
    Actor, ClaimSnapshot,
};
pub use scheduler::{CancelHandle, TaskState, TickContext, TickDriver, TickScheduler, Tickable};
pub use storage::{ClaimPersistence, ClaimStore, ClaimStoreBuilder};
pub use types::*;
pub use update::{run, CellJob, ChunkOwnerUpdate, Mode, RunOutcome, UpdateState};
pub use world::{CellOwnershipSource, CellRect, MemoryWorld, OwnershipChange};
