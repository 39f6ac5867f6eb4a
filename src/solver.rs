//! Parallel collision search: worker pool, coordinator, termination
//!
//! A solve binds every shared resource (branch table, queue, counters,
//! termination flag) into one per-call context, spawns the worker
//! pool, and runs the coordinator on the calling thread. Workers walk
//! independently and push distinguished triples into the bounded queue;
//! the coordinator validates each arrival, keeps them in an ordered
//! dictionary keyed by the curve point, and resolves the logarithm from
//! the first non-trivial collision:
//!
//! ```text
//! u.a·P + u.b·Q = t.a·P + t.b·Q   ⇒   k = (u.a − t.a) / (t.b − u.b) mod n
//! ```
//!
//! ## Termination
//! The flag flips 0 → 1 exactly once per run (release store, acquire
//! loads). Closing the queue at the same moment wakes every producer
//! blocked on a full buffer, so the pool drains within one iteration.
//! All threads are joined and all run-local state is dropped before
//! `solve` returns; the recovered scalar is verified against `k·P = Q`
//! before it is handed to the caller.

#![forbid(unsafe_code)]

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use num_bigint::BigInt;

use crate::curve::{AffinePoint, CurveParams};
use crate::queue::TripleQueue;
use crate::stats::{RunStats, SharedStats, ITERATION_FLUSH};
use crate::triple::Triple;
use crate::walk::{BranchTable, Walk, WalkContext};

/// Tunables for one solve. The defaults match the classic parallel-rho
/// deployment: 128 branches, 8 workers, a 32-slot queue, a 20-position
/// loop window, negation map on, and `D = ⌊bits(n)/4⌋` distinguishing
/// bits.
#[derive(Clone, Debug)]
pub struct SolverConfig {
    /// Worker threads walking in parallel.
    pub workers: usize,
    /// Branch-table size `r`.
    pub branches: usize,
    /// Capacity of the distinguished-point queue.
    pub queue_capacity: usize,
    /// Loop-detection window `L`.
    pub loop_window: usize,
    /// Canonicalise walks under the negation map.
    pub use_negation_map: bool,
    /// Distinguishing bits `D`; derived from the subgroup order when
    /// unset.
    pub distinguishing_bits: Option<u64>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            branches: 128,
            queue_capacity: 32,
            loop_window: 20,
            use_negation_map: true,
            distinguishing_bits: None,
        }
    }
}

/// Errors surfaced by [`Solver::new`] and [`Solver::solve`].
#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    /// A configuration value was unusable.
    #[error("invalid configuration: {0}")]
    Config(&'static str),
    /// The base point was the identity or off the curve.
    #[error("base point must be a finite point on the curve")]
    InvalidBase,
    /// The target point was off the curve.
    #[error("target point does not lie on the curve")]
    InvalidTarget,
    /// The target was the identity: the trivial logarithm `k = 0` is a
    /// documented precondition violation, not something to search for.
    #[error("target is the identity; k = 0 is excluded by precondition")]
    IdentityTarget,
    /// Worker-thread creation failed.
    #[error("failed to spawn a worker thread: {0}")]
    Spawn(#[from] io::Error),
    /// The recovered scalar did not satisfy `k·P = Q`.
    #[error("recovered scalar failed verification against the target")]
    Verification,
}

/// The recovered logarithm together with the run's statistics.
#[derive(Clone, Debug)]
pub struct Solution {
    /// `k` with `k·P = Q`, canonical in `[0, n)`.
    pub scalar: BigInt,
    /// Counters accumulated over the run.
    pub stats: RunStats,
}

/// A configured solver bound to one curve.
#[derive(Clone, Debug)]
pub struct Solver<'a> {
    curve: &'a CurveParams,
    config: SolverConfig,
    dp_bits: u64,
}

impl<'a> Solver<'a> {
    /// Validate the configuration against the curve.
    pub fn new(curve: &'a CurveParams, config: SolverConfig) -> Result<Self, SolverError> {
        if config.workers == 0 {
            return Err(SolverError::Config("at least one worker is required"));
        }
        if config.branches < 2 {
            return Err(SolverError::Config("the branch table needs at least two entries"));
        }
        if config.queue_capacity == 0 {
            return Err(SolverError::Config("the queue needs a non-zero capacity"));
        }
        if config.loop_window == 0 {
            return Err(SolverError::Config("the loop window must hold at least one triple"));
        }
        let dp_bits = config
            .distinguishing_bits
            .unwrap_or_else(|| curve.order.bits() / 4);
        Ok(Self { curve, config, dp_bits })
    }

    /// Run the collision search: find and verify `k` with `k·P = Q`.
    ///
    /// Blocks until a non-trivial collision resolves the logarithm.
    /// `base` must be a finite point of odd prime order `n` (the order
    /// carried by the curve parameters) and `target` must lie in its
    /// subgroup and differ from the identity.
    pub fn solve(
        &self,
        base: &AffinePoint,
        target: &AffinePoint,
    ) -> Result<Solution, SolverError> {
        if base.is_identity() || !self.curve.is_on_curve(base) {
            return Err(SolverError::InvalidBase);
        }
        if target.is_identity() {
            return Err(SolverError::IdentityTarget);
        }
        if !self.curve.is_on_curve(target) {
            return Err(SolverError::InvalidTarget);
        }

        let mut rng = rand::thread_rng();
        let branches = BranchTable::generate(
            self.curve,
            base,
            target,
            self.config.branches,
            self.config.use_negation_map,
            &mut rng,
        );
        let stats = SharedStats::new(self.config.loop_window);
        let queue = TripleQueue::new(self.config.queue_capacity);
        let finished = AtomicBool::new(false);
        let ctx = WalkContext {
            curve: self.curve,
            base,
            target,
            branches: &branches,
            use_negation_map: self.config.use_negation_map,
            field_bits: self.curve.fp.bits(),
            dp_bits: self.dp_bits,
            stats: &stats,
        };

        let (scalar, distinguished, discarded) = thread::scope(|scope| {
            for i in 0..self.config.workers {
                let spawned = thread::Builder::new()
                    .name(format!("walker-{i}"))
                    .spawn_scoped(scope, || {
                        run_walker(&ctx, &queue, &finished, self.config.loop_window);
                    });
                if let Err(err) = spawned {
                    // Unblock anything already running before bailing out.
                    finished.store(true, Ordering::Release);
                    queue.close();
                    return Err(SolverError::Spawn(err));
                }
            }
            Ok(coordinate(self.curve, base, target, &queue, &finished))
        })?;

        let stats = stats.report(distinguished, discarded);
        tracing::info!(
            iterations = stats.iterations,
            distinguished = stats.distinguished,
            discarded = stats.discarded,
            loops = stats.total_loops,
            "collision search finished"
        );

        if self.curve.scalar_mul(&scalar, base) != *target {
            return Err(SolverError::Verification);
        }
        Ok(Solution { scalar, stats })
    }
}

/// One-shot convenience wrapper: default configuration, scalar only.
pub fn solve(
    base: &AffinePoint,
    target: &AffinePoint,
    curve: &CurveParams,
) -> Result<BigInt, SolverError> {
    Solver::new(curve, SolverConfig::default())?
        .solve(base, target)
        .map(|solution| solution.scalar)
}

/// Worker body: walk until the termination flag is visible, flushing
/// the local step tally every [`ITERATION_FLUSH`] steps and once at
/// exit. Push failures are ignored; they only happen during shutdown.
fn run_walker(
    ctx: &WalkContext<'_>,
    queue: &TripleQueue,
    finished: &AtomicBool,
    window: usize,
) {
    let mut rng = rand::thread_rng();
    let mut walk = Walk::new(ctx, window, &mut rng);
    let mut local_steps = 0u64;

    while !finished.load(Ordering::Acquire) {
        {
            let mut emit = |t: &Triple| {
                let _ = queue.push(t.clone());
            };
            local_steps += walk.detect_cycles(ctx, &mut rng, &mut emit);
        }
        if walk.current_is_distinguished(ctx) {
            let _ = queue.push(walk.current().clone());
        }
        walk.advance(ctx, &mut rng);
        local_steps += 1;

        if local_steps >= ITERATION_FLUSH {
            ctx.stats.add_iterations(local_steps);
            local_steps = 0;
        }
    }
    ctx.stats.add_iterations(local_steps);
}

/// Coordinator body: drain the queue into the dictionary until two
/// walks meet. Returns the recovered scalar plus the distinguished and
/// discarded counts.
fn coordinate(
    curve: &CurveParams,
    base: &AffinePoint,
    target: &AffinePoint,
    queue: &TripleQueue,
    finished: &AtomicBool,
) -> (BigInt, u64, u64) {
    let mut dictionary: BTreeMap<AffinePoint, Triple> = BTreeMap::new();
    let mut distinguished = 0u64;
    let mut discarded = 0u64;

    loop {
        let triple = queue
            .pop()
            .expect("queue is closed by the coordinator alone");

        if triple.point.is_identity() {
            tracing::warn!("discarding the identity point sent by a walk");
            continue;
        }
        if !curve.is_on_curve(&triple.point) {
            tracing::warn!("discarding an off-curve point sent by a walk");
            continue;
        }
        if !triple.is_valid(curve, base, target) {
            tracing::warn!("discarding a triple whose witness does not reproduce its point");
            continue;
        }

        match dictionary.entry(triple.point.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(triple);
                distinguished += 1;
            }
            Entry::Occupied(slot) => {
                let stored = slot.get();
                if stored.a == triple.a {
                    // The same walk re-reported this point.
                    discarded += 1;
                    continue;
                }
                let delta_b = curve.order.sub(&triple.b, &stored.b);
                let delta_b_inv = match curve.order.inverse(&delta_b) {
                    Some(inv) => inv,
                    None => {
                        tracing::warn!("degenerate collision: matching b coefficients");
                        discarded += 1;
                        continue;
                    }
                };
                let delta_a = curve.order.sub(&stored.a, &triple.a);
                let scalar = curve.order.mul(&delta_a, &delta_b_inv);

                finished.store(true, Ordering::Release);
                queue.close();
                return (scalar, distinguished, discarded);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
