//! # Landclaim - cell ownership and permission resolution
//!
//! Landclaim decides who owns each horizontal cell of a persistent world and
//! what other actors may do there. Players and player-formed towns claim
//! cells; every protected action is checked against the cell owner's friend
//! ranks, permission requirements and settings, with town-level overrides.
//!
//! ## Features
//!
//! - **Claimant registry**: one shared instance per player or town, loaded
//!   lazily from a sled database and evicted when idle.
//! - **Permission resolution**: rank-gated actions, environmental settings,
//!   town priority and per-slice ownership.
//! - **Batch updates**: cancellable claim/unclaim jobs that process one cell
//!   per scheduler step so large selections never stall a tick.
//! - **Audit**: detect and repair drift between stored counts and cells.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use landclaim::claims::{
//!     CellCoord, ChunkOwnerUpdate, ClaimCache, ClaimStore, ClaimTarget, Feedback, Mode,
//!     TickDriver, TickScheduler,
//! };
//! use landclaim::config::Config;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let store = Arc::new(ClaimStore::open(config.claims_db_path())?);
//!     let claims = ClaimCache::new(store.clone(), config.cache_settings());
//!     let mut world = config.build_world().load_from(&store)?;
//!
//!     let player = uuid::Uuid::new_v4();
//!     let target = ClaimTarget::Player(claims.get_player_claim(player));
//!     let cells = [CellCoord::new(0, 0), CellCoord::new(0, 1)];
//!
//!     let mut driver = TickDriver::new();
//!     driver.register(Box::new(ChunkOwnerUpdate::new(Some(player), Some(target), Mode::Claim, cells)));
//!     let mut feedback: Vec<Feedback> = Vec::new();
//!     driver.run_until_idle(&mut world, &mut feedback, &claims, 100);
//!     world.flush_dirty(&store)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`claims`] - Claimants, cache, resolver, batch updates and persistence
//! - [`config`] - Configuration loading and validation
//! - [`logutil`] - Single-line log sanitising
//! - [`metrics`] - Process-wide counters

pub mod claims;
pub mod config;
pub mod logutil;
pub mod metrics;
