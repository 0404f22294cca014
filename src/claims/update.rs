//! Bulk claim/unclaim state machine.
//!
//! A [`ChunkOwnerUpdate`] owns a FIFO queue of cells and drains it one cell
//! per even tick under a [`TickDriver`](crate::claims::scheduler::TickDriver).
//! Each cell is applied all-or-nothing inside a single step, so cancelling
//! between ticks never leaves a half-written cell; already applied cells are
//! kept.
//!
//! States: `Pending` until the first step, `Running` while draining,
//! `Completed` once the queue is empty, the batch aborted, the target was
//! missing, or the task was cancelled.
//!
//! Single-cell batches surface every rejection as a failure. Larger batches
//! skip rejected cells and keep going, then report one aggregated result.

use std::collections::VecDeque;

use log::{debug, info};
use uuid::Uuid;

use crate::claims::claimant::{read, write, Claimant, ClaimTarget, PlayerHandle, TownHandle};
use crate::claims::errors::ClaimError;
use crate::claims::feedback::{keys, Feedback};
use crate::claims::scheduler::{CancelHandle, TaskState, TickContext, Tickable};
use crate::claims::types::CellCoord;
use crate::claims::world::OwnershipChange;
use crate::logutil::{escape_log, format_cells};
use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Claim,
    Unclaim,
}

impl Mode {
    pub fn success_key(&self) -> &'static str {
        match self {
            Mode::Claim => keys::CLAIMED,
            Mode::Unclaim => keys::UNCLAIMED,
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Mode::Claim => "claimed",
            Mode::Unclaim => "unclaimed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Pending,
    Running,
    Completed,
}

/// Result of applying a mode to one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    /// Nothing changed; carries the translation key explaining why.
    Skipped(&'static str),
}

/// One cell's worth of work.
#[derive(Debug, Clone, Copy)]
pub struct CellJob<'a> {
    pub target: &'a ClaimTarget,
    pub coord: CellCoord,
    pub verify: bool,
    /// Part of a multi-cell batch: conflicts skip instead of failing.
    pub batch: bool,
}

impl CellJob<'_> {
    fn conflict(&self, err: ClaimError) -> Result<RunOutcome, ClaimError> {
        if self.batch {
            Ok(RunOutcome::Skipped(err.translation_key()))
        } else {
            Err(err)
        }
    }
}

/// Apply `mode` to the job's cell.
pub fn run(mode: Mode, job: &CellJob<'_>, ctx: &mut TickContext<'_>) -> Result<RunOutcome, ClaimError> {
    match mode {
        Mode::Claim => claim_cell(job, ctx),
        Mode::Unclaim => unclaim_cell(job, ctx),
    }
}

fn cell_owners(ctx: &TickContext<'_>, coord: CellCoord) -> (Option<Uuid>, Option<Uuid>) {
    ctx.world
        .cell(coord)
        .map(|cell| (cell.owner_id(), cell.town_id()))
        .unwrap_or((None, None))
}

fn claim_cell(job: &CellJob<'_>, ctx: &mut TickContext<'_>) -> Result<RunOutcome, ClaimError> {
    let coord = job.coord;
    if !ctx.world.in_border(coord) {
        return Ok(RunOutcome::Skipped(keys::OUTSIDE_BORDER));
    }
    if job.verify && !ctx.claims.is_spawn(job.target.id()) && ctx.world.is_protected(coord) {
        return Err(ClaimError::Policy {
            key: keys::PROTECTED,
            coord,
        });
    }
    match job.target {
        ClaimTarget::Town(town) => claim_for_town(town, job, ctx),
        ClaimTarget::Player(player) => claim_for_player(player, job, ctx),
    }
}

fn claim_for_town(
    town: &TownHandle,
    job: &CellJob<'_>,
    ctx: &mut TickContext<'_>,
) -> Result<RunOutcome, ClaimError> {
    let coord = job.coord;
    let (owner, cell_town) = cell_owners(ctx, coord);
    let (town_id, town_owner, has_capacity, name) = {
        let town = read(town);
        (town.id(), town.owner_id, town.has_capacity(), town.name())
    };

    match cell_town {
        Some(id) if id == town_id => return Ok(RunOutcome::Skipped(keys::ALREADY_OWNED)),
        Some(_) => return job.conflict(ClaimError::AlreadyOwned(coord)),
        None => {}
    }
    if owner != Some(town_owner) {
        return Err(ClaimError::Policy {
            key: keys::NOT_TOWN_OWNER,
            coord,
        });
    }
    if job.verify && !has_capacity {
        return Err(ClaimError::Policy {
            key: keys::LIMIT_REACHED,
            coord,
        });
    }

    ctx.world.cell_mut(coord).set_town(Some(town_id))?;
    write(town).increment_chunks();
    ctx.claims.save_town(town);
    ctx.world.mark_dirty(coord);
    ctx.world.notify_watchers(OwnershipChange {
        coord,
        owner_id: Some(town_owner),
        owner_name: Some(name),
        town_id: Some(town_id),
    });
    Ok(RunOutcome::Success)
}

fn claim_for_player(
    player: &PlayerHandle,
    job: &CellJob<'_>,
    ctx: &mut TickContext<'_>,
) -> Result<RunOutcome, ClaimError> {
    let coord = job.coord;
    let (owner, cell_town) = cell_owners(ctx, coord);
    let (player_id, has_capacity, claimable, name) = {
        let player = read(player);
        let claimable = !job.verify || ctx.world.can_player_claim(&player, coord);
        (player.id(), player.has_capacity(), claimable, player.name())
    };

    if owner == Some(player_id) {
        return job.conflict(ClaimError::AlreadyOwned(coord));
    }
    if job.verify {
        if owner.is_some() {
            return job.conflict(ClaimError::AlreadyOwned(coord));
        }
        if !has_capacity {
            return Err(ClaimError::Policy {
                key: keys::LIMIT_REACHED,
                coord,
            });
        }
        if !claimable {
            return Err(ClaimError::Policy {
                key: keys::NOT_CLAIMABLE,
                coord,
            });
        }
    }

    // Forced takeover: release the previous holders' counts first.
    if let Some(previous) = owner {
        let handle = ctx.claims.get_player_claim(previous);
        write(&handle).decrement_chunks();
        ctx.claims.save_player(&handle);
    }
    if let Some(town) = cell_town.and_then(|id| ctx.claims.get_town_claim(id)) {
        write(&town).decrement_chunks();
        ctx.claims.save_town(&town);
    }

    let cell = ctx.world.cell_mut(coord);
    cell.clear();
    cell.assign(Some(player_id), None)?;
    write(player).increment_chunks();
    ctx.claims.save_player(player);
    ctx.world.mark_dirty(coord);
    ctx.world.notify_watchers(OwnershipChange {
        coord,
        owner_id: Some(player_id),
        owner_name: Some(name),
        town_id: None,
    });
    Ok(RunOutcome::Success)
}

fn unclaim_cell(job: &CellJob<'_>, ctx: &mut TickContext<'_>) -> Result<RunOutcome, ClaimError> {
    let coord = job.coord;
    let (owner, cell_town) = cell_owners(ctx, coord);
    let Some(owner) = owner else {
        return job.conflict(ClaimError::NotOwned(coord));
    };
    match job.target {
        ClaimTarget::Town(town) => unclaim_for_town(town, owner, cell_town, job, ctx),
        ClaimTarget::Player(player) => unclaim_for_player(player, owner, cell_town, job, ctx),
    }
}

/// Releases the town attribution only; the player keeps the cell.
fn unclaim_for_town(
    town: &TownHandle,
    owner: Uuid,
    cell_town: Option<Uuid>,
    job: &CellJob<'_>,
    ctx: &mut TickContext<'_>,
) -> Result<RunOutcome, ClaimError> {
    let coord = job.coord;
    let Some(cell_town) = cell_town else {
        return job.conflict(ClaimError::NotOwned(coord));
    };
    let town_id = read(town).id();
    if job.verify && cell_town != town_id {
        return job.conflict(ClaimError::NotOwnedByActor(coord));
    }

    if job.verify {
        write(town).decrement_chunks();
        ctx.claims.save_town(town);
    } else if let Some(actual) = ctx.claims.get_town_claim(cell_town) {
        write(&actual).decrement_chunks();
        ctx.claims.save_town(&actual);
    }

    ctx.world.cell_mut(coord).set_town(None)?;
    ctx.world.mark_dirty(coord);
    let owner_name = read(&ctx.claims.get_player_claim(owner)).name();
    ctx.world.notify_watchers(OwnershipChange {
        coord,
        owner_id: Some(owner),
        owner_name: Some(owner_name),
        town_id: None,
    });
    Ok(RunOutcome::Success)
}

fn unclaim_for_player(
    player: &PlayerHandle,
    owner: Uuid,
    cell_town: Option<Uuid>,
    job: &CellJob<'_>,
    ctx: &mut TickContext<'_>,
) -> Result<RunOutcome, ClaimError> {
    let coord = job.coord;
    let player_id = read(player).id();
    if job.verify && owner != player_id {
        return job.conflict(ClaimError::NotOwnedByActor(coord));
    }

    // Verified unclaims debit the target; forced ones debit whoever
    // actually holds the cell so counts follow the world.
    if job.verify {
        write(player).decrement_chunks();
        ctx.claims.save_player(player);
    } else {
        let actual = ctx.claims.get_player_claim(owner);
        write(&actual).decrement_chunks();
        ctx.claims.save_player(&actual);
    }
    if let Some(town) = cell_town.and_then(|id| ctx.claims.get_town_claim(id)) {
        write(&town).decrement_chunks();
        ctx.claims.save_town(&town);
    }

    ctx.world.cell_mut(coord).clear();
    ctx.world.mark_dirty(coord);
    ctx.world.notify_watchers(OwnershipChange {
        coord,
        owner_id: None,
        owner_name: None,
        town_id: None,
    });
    Ok(RunOutcome::Success)
}

/// Cancellable, resumable batch of claim or unclaim work.
pub struct ChunkOwnerUpdate {
    actor: Option<Uuid>,
    target: Option<ClaimTarget>,
    mode: Mode,
    queue: VecDeque<CellCoord>,
    initial_size: usize,
    changed: Vec<CellCoord>,
    skipped: usize,
    silent: bool,
    verify: bool,
    state: UpdateState,
    cancel: CancelHandle,
}

impl ChunkOwnerUpdate {
    /// `target` of `None` (claimant not found) makes the batch a no-op.
    pub fn new(
        actor: Option<Uuid>,
        target: Option<ClaimTarget>,
        mode: Mode,
        cells: impl IntoIterator<Item = CellCoord>,
    ) -> Self {
        let queue: VecDeque<CellCoord> = cells.into_iter().collect();
        Self {
            actor,
            target,
            mode,
            initial_size: queue.len(),
            queue,
            changed: Vec::new(),
            skipped: 0,
            silent: false,
            verify: true,
            state: UpdateState::Pending,
            cancel: CancelHandle::new(),
        }
    }

    /// Suppress user-facing feedback.
    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Toggle ownership, protection and limit checks. Only trusted
    /// administrative callers turn this off.
    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn state(&self) -> UpdateState {
        self.state
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn initial_size(&self) -> usize {
        self.initial_size
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    pub fn changed(&self) -> &[CellCoord] {
        &self.changed
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn complete(&mut self) -> TaskState {
        self.state = UpdateState::Completed;
        TaskState::Terminal
    }

    /// Single-cell batches end on their first rejection.
    fn abort(&mut self, ctx: &mut TickContext<'_>, coord: CellCoord, key: &'static str) -> TaskState {
        debug!("{} rejected at {}: {}", self.mode.verb(), coord, key);
        metrics::inc_batch_failed();
        if !self.silent {
            ctx.feedback.send(Feedback::failure(self.actor, key));
        }
        self.complete()
    }

    fn finish(&mut self, ctx: &mut TickContext<'_>) -> TaskState {
        let name = self
            .target
            .as_ref()
            .map(ClaimTarget::name)
            .unwrap_or_default();
        info!(
            "{} {} {} cell(s) ({} skipped): {}",
            escape_log(&name),
            self.mode.verb(),
            self.changed.len(),
            self.skipped,
            format_cells(&self.changed)
        );
        metrics::inc_batch_completed();
        if !self.silent {
            ctx.feedback.send(Feedback::success(
                self.actor,
                self.mode.success_key(),
                self.changed.len(),
            ));
        }
        self.complete()
    }
}

impl Tickable for ChunkOwnerUpdate {
    fn step(&mut self, ctx: &mut TickContext<'_>) -> TaskState {
        if self.state == UpdateState::Completed {
            return TaskState::Terminal;
        }
        if self.cancel.is_cancelled() {
            debug!(
                "{} batch cancelled with {} cell(s) left",
                self.mode.verb(),
                self.queue.len()
            );
            metrics::inc_batch_cancelled();
            return self.complete();
        }
        let Some(target) = self.target.as_ref() else {
            return self.complete();
        };
        self.state = UpdateState::Running;
        if ctx.tick % 2 != 0 {
            return TaskState::Running;
        }
        let Some(coord) = self.queue.pop_front() else {
            return self.finish(ctx);
        };

        let job = CellJob {
            target,
            coord,
            verify: self.verify,
            batch: self.initial_size > 1,
        };
        match run(self.mode, &job, ctx) {
            Ok(RunOutcome::Success) => {
                match self.mode {
                    Mode::Claim => metrics::inc_cells_claimed(),
                    Mode::Unclaim => metrics::inc_cells_unclaimed(),
                }
                self.changed.push(coord);
            }
            Ok(RunOutcome::Skipped(reason)) if self.initial_size == 1 => {
                return self.abort(ctx, coord, reason)
            }
            Ok(RunOutcome::Skipped(reason)) => {
                debug!("{} skipped {}: {}", self.mode.verb(), coord, reason);
                metrics::inc_cells_skipped();
                self.skipped += 1;
            }
            Err(err) if self.initial_size > 1 => {
                debug!("{} skipped {}: {}", self.mode.verb(), coord, err);
                metrics::inc_cells_skipped();
                self.skipped += 1;
            }
            Err(err) => return self.abort(ctx, coord, err.translation_key()),
        }

        if self.queue.is_empty() {
            return self.finish(ctx);
        }
        TaskState::Running
    }

    fn is_removed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::cache::{CacheSettings, ClaimCache};
    use crate::claims::feedback::FeedbackKind;
    use crate::claims::scheduler::{TickDriver, TickScheduler};
    use crate::claims::storage::ClaimStoreBuilder;
    use crate::claims::types::CellOwnership;
    use crate::claims::world::{CellOwnershipSource, CellRect, MemoryWorld};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        claims: ClaimCache,
        world: MemoryWorld,
        feedback: Vec<Feedback>,
        driver: TickDriver,
    }

    impl Harness {
        fn new() -> Self {
            let dir = TempDir::new().expect("tempdir");
            let store = ClaimStoreBuilder::new(dir.path()).open().expect("store");
            Self {
                claims: ClaimCache::new(Arc::new(store), CacheSettings::default()),
                _dir: dir,
                world: MemoryWorld::new(),
                feedback: Vec::new(),
                driver: TickDriver::new(),
            }
        }

        fn player(&self, id: Uuid) -> ClaimTarget {
            ClaimTarget::Player(self.claims.get_player_claim(id))
        }

        fn drive(&mut self, update: ChunkOwnerUpdate) -> u64 {
            self.driver.register(Box::new(update));
            self.driver
                .run_until_idle(&mut self.world, &mut self.feedback, &self.claims, 1_000)
        }

        fn count(&self, id: Uuid) -> u32 {
            read(&self.claims.get_player_claim(id)).chunk_count
        }
    }

    fn cells(coords: &[(i32, i32)]) -> Vec<CellCoord> {
        coords.iter().map(|(x, z)| CellCoord::new(*x, *z)).collect()
    }

    #[test]
    fn single_claim_assigns_and_reports() {
        let mut h = Harness::new();
        let alice = Uuid::new_v4();
        let coord = CellCoord::new(3, 4);
        let update = ChunkOwnerUpdate::new(Some(alice), Some(h.player(alice)), Mode::Claim, [coord]);
        h.drive(update);

        assert_eq!(h.world.cell(coord).and_then(CellOwnership::owner_id), Some(alice));
        assert!(h.world.is_dirty(coord));
        assert_eq!(h.count(alice), 1);
        assert_eq!(h.feedback, vec![Feedback::success(Some(alice), keys::CLAIMED, 1)]);
        assert_eq!(h.world.changes()[0].owner_id, Some(alice));
    }

    #[test]
    fn single_claim_on_foreign_cell_fails() {
        let mut h = Harness::new();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let coord = CellCoord::new(0, 0);
        h.world.set_cell(coord, CellOwnership::owned_by(bob));

        h.drive(ChunkOwnerUpdate::new(Some(alice), Some(h.player(alice)), Mode::Claim, [coord]));

        assert_eq!(h.world.cell(coord).and_then(CellOwnership::owner_id), Some(bob));
        assert_eq!(h.count(alice), 0);
        assert_eq!(h.feedback.len(), 1);
        assert_eq!(h.feedback[0].kind, FeedbackKind::Failure);
        assert_eq!(h.feedback[0].key, keys::ALREADY_OWNED);
    }

    #[test]
    fn batch_skips_conflicts_and_aggregates() {
        let mut h = Harness::new();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        h.world.set_cell(CellCoord::new(1, 0), CellOwnership::owned_by(bob));

        let update = ChunkOwnerUpdate::new(
            Some(alice),
            Some(h.player(alice)),
            Mode::Claim,
            cells(&[(0, 0), (1, 0), (2, 0)]),
        );
        let ticks = h.drive(update);

        // One cell per even tick: 0, 2 and 4.
        assert_eq!(ticks, 5);
        assert_eq!(h.world.owned_by(alice), 2);
        assert_eq!(h.count(alice), 2);
        assert_eq!(h.feedback, vec![Feedback::success(Some(alice), keys::CLAIMED, 2)]);
    }

    #[test]
    fn odd_ticks_do_no_work() {
        let mut h = Harness::new();
        let alice = Uuid::new_v4();
        let mut update = ChunkOwnerUpdate::new(
            Some(alice),
            Some(h.player(alice)),
            Mode::Claim,
            cells(&[(0, 0), (0, 1)]),
        );
        assert_eq!(update.state(), UpdateState::Pending);

        let mut ctx = TickContext {
            tick: 1,
            world: &mut h.world,
            feedback: &mut h.feedback,
            claims: &h.claims,
        };
        assert_eq!(update.step(&mut ctx), TaskState::Running);
        assert_eq!(update.remaining(), 2);
        assert_eq!(update.state(), UpdateState::Running);

        ctx.tick = 2;
        assert_eq!(update.step(&mut ctx), TaskState::Running);
        assert_eq!(update.remaining(), 1);
        assert_eq!(update.changed(), &[CellCoord::new(0, 0)]);
    }

    #[test]
    fn cancel_keeps_applied_cells() {
        let mut h = Harness::new();
        let alice = Uuid::new_v4();
        let update = ChunkOwnerUpdate::new(
            Some(alice),
            Some(h.player(alice)),
            Mode::Claim,
            cells(&[(0, 0), (0, 1), (0, 2), (0, 3)]),
        );
        let cancel = update.cancel_handle();
        h.driver.register(Box::new(update));
        for _ in 0..3 {
            h.driver.run_tick(&mut h.world, &mut h.feedback, &h.claims);
        }
        cancel.cancel();
        h.driver.run_tick(&mut h.world, &mut h.feedback, &h.claims);

        assert!(h.driver.is_idle());
        assert_eq!(h.world.owned_by(alice), 2);
        assert_eq!(h.count(alice), 2);
        assert!(h.feedback.is_empty());
    }

    #[test]
    fn missing_target_is_a_silent_noop() {
        let mut h = Harness::new();
        let update = ChunkOwnerUpdate::new(None, None, Mode::Claim, cells(&[(0, 0)]));
        let ticks = h.drive(update);
        assert_eq!(ticks, 1);
        assert!(h.feedback.is_empty());
        assert!(h.world.cell(CellCoord::new(0, 0)).is_none());
    }

    #[test]
    fn silent_batches_emit_nothing() {
        let mut h = Harness::new();
        let alice = Uuid::new_v4();
        let update = ChunkOwnerUpdate::new(Some(alice), Some(h.player(alice)), Mode::Claim, cells(&[(0, 0)]))
            .silent(true);
        h.drive(update);
        assert_eq!(h.world.owned_by(alice), 1);
        assert!(h.feedback.is_empty());
    }

    #[test]
    fn protected_and_border_rules_apply() {
        let mut h = Harness::new();
        h.world = MemoryWorld::new()
            .with_border(5)
            .with_protected_zone(CellRect::new(CellCoord::new(0, 0), CellCoord::new(1, 1)));
        let alice = Uuid::new_v4();

        h.drive(ChunkOwnerUpdate::new(Some(alice), Some(h.player(alice)), Mode::Claim, cells(&[(0, 0)])));
        assert_eq!(h.feedback.pop().map(|f| f.key), Some(keys::PROTECTED.to_string()));

        h.drive(ChunkOwnerUpdate::new(Some(alice), Some(h.player(alice)), Mode::Claim, cells(&[(9, 0)])));
        assert_eq!(h.feedback.pop().map(|f| f.key), Some(keys::OUTSIDE_BORDER.to_string()));

        // Spawn may claim inside protected zones.
        let spawn = h.claims.spawn_id();
        h.drive(ChunkOwnerUpdate::new(None, Some(h.player(spawn)), Mode::Claim, cells(&[(1, 1)])));
        assert_eq!(h.world.owned_by(spawn), 1);
    }

    #[test]
    fn limit_stops_verified_claims_only() {
        let mut h = Harness::new();
        let alice = Uuid::new_v4();
        write(&h.claims.get_player_claim(alice)).chunk_limit = 1;

        h.drive(ChunkOwnerUpdate::new(
            Some(alice),
            Some(h.player(alice)),
            Mode::Claim,
            cells(&[(0, 0), (0, 1)]),
        ));
        assert_eq!(h.count(alice), 1);

        h.drive(
            ChunkOwnerUpdate::new(None, Some(h.player(alice)), Mode::Claim, cells(&[(0, 1)]))
                .verify(false),
        );
        assert_eq!(h.count(alice), 2);
    }

    #[test]
    fn forced_claim_takes_over_and_moves_counts() {
        let mut h = Harness::new();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let coord = CellCoord::new(7, 7);
        h.drive(ChunkOwnerUpdate::new(Some(bob), Some(h.player(bob)), Mode::Claim, [coord]));
        assert_eq!(h.count(bob), 1);

        h.drive(ChunkOwnerUpdate::new(None, Some(h.player(alice)), Mode::Claim, [coord]).verify(false));
        assert_eq!(h.world.cell(coord).and_then(CellOwnership::owner_id), Some(alice));
        assert_eq!(h.count(alice), 1);
        assert_eq!(h.count(bob), 0);
    }

    #[test]
    fn unclaim_is_idempotent() {
        let mut h = Harness::new();
        let alice = Uuid::new_v4();
        let batch = cells(&[(0, 0), (0, 1)]);
        h.drive(ChunkOwnerUpdate::new(Some(alice), Some(h.player(alice)), Mode::Claim, batch.clone()));
        assert_eq!(h.count(alice), 2);

        h.drive(ChunkOwnerUpdate::new(Some(alice), Some(h.player(alice)), Mode::Unclaim, batch.clone()));
        assert_eq!(h.world.owned_by(alice), 0);
        assert_eq!(h.count(alice), 0);

        h.feedback.clear();
        h.drive(ChunkOwnerUpdate::new(Some(alice), Some(h.player(alice)), Mode::Unclaim, batch));
        assert_eq!(h.count(alice), 0);
        assert_eq!(h.feedback, vec![Feedback::success(Some(alice), keys::UNCLAIMED, 0)]);
        assert!(h.feedback.iter().all(Feedback::is_success));
    }

    #[test]
    fn unclaim_of_foreign_cell_is_refused() {
        let mut h = Harness::new();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let coord = CellCoord::new(2, 2);
        h.drive(ChunkOwnerUpdate::new(Some(bob), Some(h.player(bob)), Mode::Claim, [coord]));
        h.feedback.clear();

        h.drive(ChunkOwnerUpdate::new(Some(alice), Some(h.player(alice)), Mode::Unclaim, [coord]));
        assert_eq!(h.feedback[0].key, keys::NOT_OWNED_BY_ACTOR);
        assert_eq!(h.world.owned_by(bob), 1);
    }

    #[test]
    fn forced_unclaim_debits_the_actual_owner() {
        let mut h = Harness::new();
        let (admin, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let coord = CellCoord::new(2, 2);
        h.drive(ChunkOwnerUpdate::new(Some(bob), Some(h.player(bob)), Mode::Claim, [coord]));

        h.drive(ChunkOwnerUpdate::new(Some(admin), Some(h.player(admin)), Mode::Unclaim, [coord]).verify(false));
        assert!(h.world.cell(coord).is_some_and(CellOwnership::is_wilderness));
        assert_eq!(h.count(bob), 0);
        assert_eq!(h.count(admin), 0);
    }

    #[test]
    fn town_claims_layer_over_the_owner() {
        let mut h = Harness::new();
        let mayor = Uuid::new_v4();
        let town = h.claims.make_town_claim(mayor, "Riverside").expect("town");
        let town_id = read(&town).id();
        let coord = CellCoord::new(4, 4);

        // The mayor has to hold the cell first.
        h.drive(ChunkOwnerUpdate::new(Some(mayor), Some(ClaimTarget::Town(town.clone())), Mode::Claim, [coord]));
        assert_eq!(h.feedback.pop().map(|f| f.key), Some(keys::NOT_TOWN_OWNER.to_string()));

        h.drive(ChunkOwnerUpdate::new(Some(mayor), Some(h.player(mayor)), Mode::Claim, [coord]));
        h.drive(ChunkOwnerUpdate::new(Some(mayor), Some(ClaimTarget::Town(town.clone())), Mode::Claim, [coord]));
        assert_eq!(h.world.cell(coord).and_then(CellOwnership::town_id), Some(town_id));
        assert_eq!(read(&town).chunk_count, 1);
        assert_eq!(h.world.changes().last().and_then(|c| c.owner_name.clone()), Some("Riverside".to_string()));

        h.drive(ChunkOwnerUpdate::new(Some(mayor), Some(ClaimTarget::Town(town.clone())), Mode::Unclaim, [coord]));
        let cell = h.world.cell(coord).cloned().unwrap_or_default();
        assert_eq!(cell.town_id(), None);
        assert_eq!(cell.owner_id(), Some(mayor));
        assert_eq!(read(&town).chunk_count, 0);
        assert_eq!(h.count(mayor), 1);
    }

    /// Founds a town for `mayor` holding `coord`.
    fn town_holding(h: &mut Harness, mayor: Uuid, name: &str, coord: CellCoord) -> TownHandle {
        let town = h.claims.make_town_claim(mayor, name).expect("town");
        let player = h.player(mayor);
        h.drive(ChunkOwnerUpdate::new(Some(mayor), Some(player), Mode::Claim, [coord]));
        h.drive(ChunkOwnerUpdate::new(Some(mayor), Some(ClaimTarget::Town(town.clone())), Mode::Claim, [coord]));
        assert_eq!(read(&town).chunk_count, 1);
        town
    }

    #[test]
    fn player_unclaim_releases_the_town_count() {
        let mut h = Harness::new();
        let mayor = Uuid::new_v4();
        let coord = CellCoord::new(5, 5);
        let town = town_holding(&mut h, mayor, "Riverside", coord);

        h.drive(ChunkOwnerUpdate::new(Some(mayor), Some(h.player(mayor)), Mode::Unclaim, [coord]));
        assert!(h.world.cell(coord).is_some_and(CellOwnership::is_wilderness));
        assert_eq!(h.count(mayor), 0);
        assert_eq!(read(&town).chunk_count, 0);
    }

    #[test]
    fn forced_takeover_releases_the_town_count() {
        let mut h = Harness::new();
        let (mayor, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let coord = CellCoord::new(6, 6);
        let town = town_holding(&mut h, mayor, "Riverside", coord);

        h.drive(ChunkOwnerUpdate::new(None, Some(h.player(bob)), Mode::Claim, [coord]).verify(false));
        let cell = h.world.cell(coord).cloned().unwrap_or_default();
        assert_eq!(cell.owner_id(), Some(bob));
        assert_eq!(cell.town_id(), None);
        assert_eq!(h.count(bob), 1);
        assert_eq!(h.count(mayor), 0);
        assert_eq!(read(&town).chunk_count, 0);
    }

    #[test]
    fn forced_town_unclaim_debits_the_cells_town() {
        let mut h = Harness::new();
        let (east_mayor, west_mayor) = (Uuid::new_v4(), Uuid::new_v4());
        let east_cell = CellCoord::new(10, 0);
        let east = town_holding(&mut h, east_mayor, "Eastbrook", east_cell);
        let west = town_holding(&mut h, west_mayor, "Westfield", CellCoord::new(-10, 0));

        h.drive(
            ChunkOwnerUpdate::new(None, Some(ClaimTarget::Town(west.clone())), Mode::Unclaim, [east_cell])
                .verify(false),
        );
        let cell = h.world.cell(east_cell).cloned().unwrap_or_default();
        assert_eq!(cell.town_id(), None);
        assert_eq!(cell.owner_id(), Some(east_mayor));
        assert_eq!(read(&east).chunk_count, 0);
        assert_eq!(read(&west).chunk_count, 1);
        assert_eq!(h.count(east_mayor), 1);
    }

    #[test]
    fn single_cell_skip_is_reported_as_failure() {
        let mut h = Harness::new();
        let mayor = Uuid::new_v4();
        let coord = CellCoord::new(1, 1);
        let town = town_holding(&mut h, mayor, "Riverside", coord);
        h.feedback.clear();

        h.drive(ChunkOwnerUpdate::new(Some(mayor), Some(ClaimTarget::Town(town.clone())), Mode::Claim, [coord]));
        assert_eq!(h.feedback, vec![Feedback::failure(Some(mayor), keys::ALREADY_OWNED)]);
        assert_eq!(read(&town).chunk_count, 1);
    }

    #[test]
    fn batch_of_skips_reports_zero_changed() {
        let mut h = Harness::new();
        h.world = MemoryWorld::new().with_border(2);
        let alice = Uuid::new_v4();

        h.drive(ChunkOwnerUpdate::new(Some(alice), Some(h.player(alice)), Mode::Claim, cells(&[(8, 0), (9, 0)])));
        assert_eq!(h.feedback, vec![Feedback::success(Some(alice), keys::CLAIMED, 0)]);
        assert_eq!(h.count(alice), 0);
    }
}
