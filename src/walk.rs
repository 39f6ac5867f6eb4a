//! The pseudo-random walk: branch table, iteration step, cycle escape
//!
//! Each worker owns a [`Walk`]: a current triple plus a ring buffer of
//! the last few positions. One step of the additive r-adic walk is
//!
//! 1. pick branch `j = x.limb0 mod r` from the current point's least
//!    significant 64-bit digit,
//! 2. add the precomputed branch triple `Branch[j]`,
//! 3. canonicalise under the negation map,
//! 4. hand the triple to the coordinator iff it is distinguished.
//!
//! The selector is deterministic in `R`, so two walks that meet at the
//! same point continue identically; that is what makes collisions
//! productive. The price of the negation map is short fruitless cycles
//! (mostly 2-cycles), which [`Walk::detect_cycles`] breaks by scanning
//! the ring buffer newest-first and escaping along a rotated branch.
//!
//! ## Escape policy
//! On a match at distance `i`, the walk adds `Branch[(j + i + 1) mod r]`
//! instead of `Branch[j]`; if the rotation would wrap back onto the
//! current branch the triple is regenerated from scratch. Escapes within
//! one detection pass are bounded by the window length, after which the
//! walk always regenerates, so a pathological chain of coincidences
//! cannot recurse without limit. A match carrying an *independent* witness is not a cycle at
//! all but a collision inside a single walk; both triples go to the
//! coordinator.

#![forbid(unsafe_code)]

use num_bigint::BigInt;
use rand::Rng;

use crate::curve::{AffinePoint, CurveParams};
use crate::stats::SharedStats;
use crate::triple::Triple;

/// The `r` precomputed random triples that drive the walk.
pub struct BranchTable {
    entries: Box<[Triple]>,
}

impl BranchTable {
    /// Generate `count` uniform branch triples.
    pub fn generate<R: Rng + ?Sized>(
        curve: &CurveParams,
        base: &AffinePoint,
        target: &AffinePoint,
        count: usize,
        canonical: bool,
        rng: &mut R,
    ) -> Self {
        let entries = (0..count)
            .map(|_| Triple::random(curve, base, target, canonical, rng))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { entries }
    }

    /// Number of branches `r`.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty (it never is in a configured solver).
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Branch entry by index.
    pub fn entry(&self, index: usize) -> &Triple {
        &self.entries[index]
    }

    /// Branch selector `h(R) = x.limb0 mod r` on the least significant
    /// 64-bit digit of the x coordinate.
    pub fn select(&self, x: &BigInt) -> usize {
        let limb0 = x.iter_u64_digits().next().unwrap_or(0);
        (limb0 % self.entries.len() as u64) as usize
    }
}

/// Shared, read-only context for every walk of one solve.
pub struct WalkContext<'a> {
    /// Curve and subgroup parameters.
    pub curve: &'a CurveParams,
    /// Base point `P`.
    pub base: &'a AffinePoint,
    /// Target point `Q`.
    pub target: &'a AffinePoint,
    /// The branch table, immutable after setup.
    pub branches: &'a BranchTable,
    /// Whether to canonicalise under the negation map.
    pub use_negation_map: bool,
    /// Bit width of the coordinate field.
    pub field_bits: u64,
    /// Distinguishing bits `D`.
    pub dp_bits: u64,
    /// Shared run counters.
    pub stats: &'a SharedStats,
}

impl WalkContext<'_> {
    /// Distinguished-point predicate under this context's parameters.
    pub fn is_distinguished(&self, triple: &Triple) -> bool {
        triple.is_distinguished(self.field_bits, self.dp_bits)
    }
}

/// Ring buffer of the last `capacity` walk positions, newest last.
struct LoopBuffer {
    window: Vec<Triple>,
    head: usize,
    capacity: usize,
}

impl LoopBuffer {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: Vec::with_capacity(capacity),
            head: 0,
            capacity,
        }
    }

    /// Append, evicting the oldest entry once full.
    fn record(&mut self, triple: &Triple) {
        if self.window.len() < self.capacity {
            self.window.push(triple.clone());
        } else {
            self.window[self.head] = triple.clone();
        }
        self.head = (self.head + 1) % self.capacity;
    }

    /// Scan newest-first for `point`; returns the match distance
    /// (0 = most recent entry) and the buffered triple.
    fn find(&self, point: &AffinePoint) -> Option<(usize, &Triple)> {
        let filled = self.window.len();
        for distance in 0..filled {
            let index = (self.head + self.capacity - 1 - distance) % self.capacity;
            let candidate = &self.window[index];
            if candidate.point == *point {
                return Some((distance, candidate));
            }
        }
        None
    }
}

/// One worker's walk state.
pub struct Walk {
    current: Triple,
    history: LoopBuffer,
}

impl Walk {
    /// Start a walk from a fresh random triple with a loop-detection
    /// window of `window` positions.
    pub fn new<R: Rng + ?Sized>(ctx: &WalkContext<'_>, window: usize, rng: &mut R) -> Self {
        Self {
            current: Triple::random(ctx.curve, ctx.base, ctx.target, ctx.use_negation_map, rng),
            history: LoopBuffer::new(window),
        }
    }

    /// The walk's current triple.
    pub fn current(&self) -> &Triple {
        &self.current
    }

    /// Whether the current triple should be emitted.
    pub fn current_is_distinguished(&self, ctx: &WalkContext<'_>) -> bool {
        ctx.is_distinguished(&self.current)
    }

    /// Advance one step: branch add, then negation-map canonicalisation.
    /// A step that lands on the identity regenerates the triple (the
    /// branch selector is undefined there).
    pub fn advance<R: Rng + ?Sized>(&mut self, ctx: &WalkContext<'_>, rng: &mut R) {
        let j = match &self.current.point {
            AffinePoint::Identity => {
                self.regenerate(ctx, rng);
                return;
            }
            AffinePoint::Point { x, .. } => ctx.branches.select(x),
        };
        self.current.add_assign(ctx.branches.entry(j), ctx.curve);
        self.after_move(ctx, rng);
    }

    /// Scan the history for the current point and escape any cycle,
    /// recording the position afterwards. Emits through `emit`: both
    /// triples of an intra-walk collision, and any post-escape triple
    /// that is distinguished. Returns the number of escape steps taken.
    pub fn detect_cycles<R: Rng + ?Sized>(
        &mut self,
        ctx: &WalkContext<'_>,
        rng: &mut R,
        emit: &mut dyn FnMut(&Triple),
    ) -> u64 {
        let mut escape_steps = 0u64;
        let mut attempts = 0usize;
        loop {
            let hit = self
                .history
                .find(&self.current.point)
                .map(|(distance, buffered)| (distance, buffered.clone()));
            self.history.record(&self.current);

            let (distance, buffered) = match hit {
                Some(hit) => hit,
                None => break,
            };

            let a_matches = buffered.a == self.current.a;
            let b_matches = buffered.b == self.current.b;
            if !a_matches && !b_matches {
                // Same point, independent witness: a collision inside a
                // single walk. Let the coordinator resolve it.
                tracing::warn!(distance, "walk re-entry carries an independent witness");
                emit(&buffered);
                emit(&self.current);
            } else if a_matches != b_matches {
                tracing::warn!(distance, "degenerate re-entry: witness half-matches");
            }
            ctx.stats.record_loop(distance);

            escape_steps += 1;
            attempts += 1;
            if attempts >= self.history.capacity {
                self.regenerate(ctx, rng);
                break;
            }
            self.escape(ctx, distance, rng);
            if ctx.is_distinguished(&self.current) {
                emit(&self.current);
            }
        }
        escape_steps
    }

    /// Leave a detected cycle along a rotated branch.
    fn escape<R: Rng + ?Sized>(&mut self, ctx: &WalkContext<'_>, distance: usize, rng: &mut R) {
        let r = ctx.branches.len();
        let j = match &self.current.point {
            AffinePoint::Identity => {
                self.regenerate(ctx, rng);
                return;
            }
            AffinePoint::Point { x, .. } => ctx.branches.select(x),
        };
        if (distance + 1) % r == 0 {
            // The rotation wrapped onto the branch that formed the
            // cycle; start over instead.
            tracing::debug!(distance, "escape rotation wrapped, regenerating walk");
            self.regenerate(ctx, rng);
            return;
        }
        let rotated = (j + distance + 1) % r;
        self.current.add_assign(ctx.branches.entry(rotated), ctx.curve);
        self.after_move(ctx, rng);
    }

    /// Post-move fixups shared by `advance` and `escape`.
    fn after_move<R: Rng + ?Sized>(&mut self, ctx: &WalkContext<'_>, rng: &mut R) {
        if self.current.point.is_identity() {
            self.regenerate(ctx, rng);
            return;
        }
        if ctx.use_negation_map {
            self.current.canonicalize(ctx.curve);
        }
    }

    /// Replace the triple with a fresh random one. The history is kept:
    /// a later coincidence against pre-regeneration entries with a
    /// distinct witness is a productive collision.
    fn regenerate<R: Rng + ?Sized>(&mut self, ctx: &WalkContext<'_>, rng: &mut R) {
        self.current = Triple::random(ctx.curve, ctx.base, ctx.target, ctx.use_negation_map, rng);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::Zero;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn s3_fixture() -> (CurveParams, AffinePoint, AffinePoint) {
        let curve = CurveParams::new(1009, 1, 21, 113).expect("valid curve");
        (curve, AffinePoint::finite(348, 200), AffinePoint::finite(200, 632))
    }

    fn ctx<'a>(
        curve: &'a CurveParams,
        base: &'a AffinePoint,
        target: &'a AffinePoint,
        branches: &'a BranchTable,
        stats: &'a SharedStats,
    ) -> WalkContext<'a> {
        WalkContext {
            curve,
            base,
            target,
            branches,
            use_negation_map: true,
            field_bits: curve.fp.bits(),
            dp_bits: curve.order.bits() / 4,
            stats,
        }
    }

    #[test]
    fn branch_entries_are_valid_triples() {
        let (curve, base, target) = s3_fixture();
        let mut rng = StdRng::seed_from_u64(3);
        let table = BranchTable::generate(&curve, &base, &target, 16, true, &mut rng);
        assert_eq!(table.len(), 16);
        for i in 0..table.len() {
            assert!(table.entry(i).is_valid(&curve, &base, &target));
            assert!(!table.entry(i).point.is_identity());
        }
    }

    #[test]
    fn selector_uses_the_low_digit() {
        let (curve, base, target) = s3_fixture();
        let mut rng = StdRng::seed_from_u64(3);
        let table = BranchTable::generate(&curve, &base, &target, 128, true, &mut rng);
        assert_eq!(table.select(&BigInt::zero()), 0);
        assert_eq!(table.select(&BigInt::from(130u32)), 2);
        assert_eq!(table.select(&BigInt::from(127u32)), 127);
        assert_eq!(table.select(&BigInt::from(128u32)), 0);
    }

    #[test]
    fn steps_are_deterministic_and_preserve_the_witness() {
        let (curve, base, target) = s3_fixture();
        let mut table_rng = StdRng::seed_from_u64(11);
        let table = BranchTable::generate(&curve, &base, &target, 32, true, &mut table_rng);
        let stats = SharedStats::new(20);
        let ctx = ctx(&curve, &base, &target, &table, &stats);

        let mut rng_a = StdRng::seed_from_u64(99);
        let mut rng_b = StdRng::seed_from_u64(99);
        let mut walk_a = Walk::new(&ctx, 20, &mut rng_a);
        let mut walk_b = Walk::new(&ctx, 20, &mut rng_b);
        let mut sink = |_: &Triple| {};

        for _ in 0..100 {
            walk_a.detect_cycles(&ctx, &mut rng_a, &mut sink);
            walk_b.detect_cycles(&ctx, &mut rng_b, &mut sink);
            walk_a.advance(&ctx, &mut rng_a);
            walk_b.advance(&ctx, &mut rng_b);
            assert_eq!(walk_a.current(), walk_b.current());
            assert!(walk_a.current().is_valid(&curve, &base, &target));
            assert!(!walk_a.current().point.is_identity());
        }
    }

    #[test]
    fn tiny_subgroup_walks_cycle_and_recover() {
        // Order-5 subgroup: cycles are constant, escapes must keep the
        // walk alive and valid.
        let curve = CurveParams::new(263, 2, 3, 5).expect("valid curve");
        let base = AffinePoint::finite(61, 20);
        let target = AffinePoint::finite(175, 180); // 2P
        let mut rng = StdRng::seed_from_u64(5);
        let table = BranchTable::generate(&curve, &base, &target, 8, true, &mut rng);
        let stats = SharedStats::new(20);
        let ctx = ctx(&curve, &base, &target, &table, &stats);

        let mut walk = Walk::new(&ctx, 20, &mut rng);
        let mut emitted = Vec::new();
        for _ in 0..300 {
            let mut sink = |t: &Triple| emitted.push(t.clone());
            walk.detect_cycles(&ctx, &mut rng, &mut sink);
            walk.advance(&ctx, &mut rng);
            assert!(walk.current().is_valid(&curve, &base, &target));
        }
        let report = stats.report(0, 0);
        assert!(report.total_loops > 0, "a 5-element orbit must cycle");
        for t in &emitted {
            assert!(t.is_valid(&curve, &base, &target));
        }
    }

    #[test]
    fn loop_buffer_distances_count_back_from_the_newest() {
        let mk = |i: u32| Triple {
            point: AffinePoint::finite(i, 0u32),
            a: BigInt::zero(),
            b: BigInt::zero(),
        };
        let mut buf = LoopBuffer::new(3);
        assert!(buf.find(&mk(0).point).is_none());
        buf.record(&mk(0));
        buf.record(&mk(1));
        buf.record(&mk(2));
        assert_eq!(buf.find(&mk(2).point).map(|(d, _)| d), Some(0));
        assert_eq!(buf.find(&mk(1).point).map(|(d, _)| d), Some(1));
        assert_eq!(buf.find(&mk(0).point).map(|(d, _)| d), Some(2));
        // Overwriting evicts the oldest entry.
        buf.record(&mk(3));
        assert!(buf.find(&mk(0).point).is_none());
        assert_eq!(buf.find(&mk(3).point).map(|(d, _)| d), Some(0));
        assert_eq!(buf.find(&mk(1).point).map(|(d, _)| d), Some(2));
    }
}
