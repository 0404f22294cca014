//! Cooperative per-tick task driver.
//!
//! Long-running claim work is expressed as [`Tickable`] tasks that hold their
//! own cursor state. The host calls [`TickDriver::run_tick`] once per
//! simulation tick; each task performs at most one bounded step and is
//! dropped once it reports [`TaskState::Terminal`] or has been cancelled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;

use crate::claims::cache::ClaimCache;
use crate::claims::feedback::FeedbackSink;
use crate::claims::world::CellOwnershipSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Terminal,
}

/// Everything a task may touch during one step.
pub struct TickContext<'a> {
    pub tick: u64,
    pub world: &'a mut dyn CellOwnershipSource,
    pub feedback: &'a mut dyn FeedbackSink,
    pub claims: &'a ClaimCache,
}

pub trait Tickable: Send {
    /// Perform at most one bounded unit of work.
    fn step(&mut self, ctx: &mut TickContext<'_>) -> TaskState;

    /// True once the task was cancelled externally.
    fn is_removed(&self) -> bool;
}

/// Registration side of a tick scheduler.
pub trait TickScheduler {
    fn register(&mut self, task: Box<dyn Tickable>);
    fn current_tick(&self) -> u64;
}

/// Shared cancellation flag; clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Default)]
pub struct TickDriver {
    tick: u64,
    tasks: Vec<Box<dyn Tickable>>,
}

impl TickDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_idle(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Step every task once at the current tick, drop finished ones, then
    /// advance the clock.
    pub fn run_tick(
        &mut self,
        world: &mut dyn CellOwnershipSource,
        feedback: &mut dyn FeedbackSink,
        claims: &ClaimCache,
    ) {
        let mut ctx = TickContext {
            tick: self.tick,
            world,
            feedback,
            claims,
        };
        let before = self.tasks.len();
        self.tasks
            .retain_mut(|task| !task.is_removed() && task.step(&mut ctx) == TaskState::Running);
        if self.tasks.len() != before {
            debug!(
                "tick {}: {} task(s) finished, {} active",
                self.tick,
                before - self.tasks.len(),
                self.tasks.len()
            );
        }
        self.tick += 1;
    }

    /// Tick until every task has finished or `max_ticks` elapsed. Returns the
    /// number of ticks run.
    pub fn run_until_idle(
        &mut self,
        world: &mut dyn CellOwnershipSource,
        feedback: &mut dyn FeedbackSink,
        claims: &ClaimCache,
        max_ticks: u64,
    ) -> u64 {
        let mut ran = 0;
        while !self.is_idle() && ran < max_ticks {
            self.run_tick(world, feedback, claims);
            ran += 1;
        }
        ran
    }
}

impl TickScheduler for TickDriver {
    fn register(&mut self, task: Box<dyn Tickable>) {
        self.tasks.push(task);
    }

    fn current_tick(&self) -> u64 {
        self.tick
    }
}
