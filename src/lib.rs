//! Crate root: public surface and solver-wide invariants
//!
//! `ecrho` computes elliptic-curve discrete logarithms with the parallel
//! Pollard's rho of van Oorschot & Wiener: given a short-Weierstrass
//! curve over `F_p`, a base point `P` of odd prime order `n` and a
//! target `Q` in `⟨P⟩`, [`solve`] returns the `k ∈ [0, n)` with
//! `Q = kP`. Worker threads walk pseudo-random point sequences, each
//! carrying an algebraic witness `(a, b)` with `R = aP + bQ`; a
//! coordinator folds their distinguished points into an ordered
//! dictionary and reads the logarithm off the first non-trivial
//! collision.
//!
//! ## Invariants
//!
//! - **Witness equation.** Every [`Triple`] in the system satisfies
//!   `R = aP + bQ` with `a, b` canonical modulo `n`; every walk
//!   mutation preserves it and the coordinator re-derives it on ingress
//!   before trusting an arrival.
//! - **Single-writer ownership.** Each worker owns its walk and loop
//!   buffer; the coordinator owns the dictionary; the queue owns the
//!   triples in transit under its lock. All cross-thread state lives in
//!   a per-call context; the crate has no globals.
//! - **One-shot termination.** The finished flag transitions 0 → 1 at
//!   most once per solve (release/acquire); by the time [`solve`]
//!   returns, every worker has been joined and every run-local
//!   allocation dropped.
//! - **Verified output.** A recovered scalar is checked against
//!   `k·P = Q` before being returned; a mismatch is an error, never a
//!   silently wrong answer.
//!
//! Not constant-time and makes no side-channel promises: this is a
//! computational kernel for solving instances, not protocol code.

#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms)]

/// Residue arithmetic modulo an odd integer (coordinate field and
/// scalar ring).
pub mod field;

/// Short-Weierstrass affine curve arithmetic and the point total order.
pub mod curve;

/// The `(R, a, b)` walk triple and its operations.
pub mod triple;

/// Branch table, iteration function and cycle escape.
pub mod walk;

/// Bounded fan-in queue from walks to the coordinator.
pub mod queue;

/// Iteration counters, cycle histogram and the run report.
pub mod stats;

/// Worker pool, coordinator, collision resolution and termination.
pub mod solver;

pub use curve::{AffinePoint, CurveError, CurveParams};
pub use field::{FieldError, Fp};
pub use solver::{solve, Solution, Solver, SolverConfig, SolverError};
pub use stats::RunStats;
pub use triple::Triple;
