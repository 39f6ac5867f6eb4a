//! Short-Weierstrass curves over prime fields
//!
//! Affine group arithmetic for `y² = x³ + ax + b` over `F_p`, together
//! with the subgroup order `n` of the base point the solver works in.
//! The identity is an explicit enum variant, not a sentinel coordinate,
//! so every case split (identity absorbs, equal-x/opposite-y cancels,
//! order-2 doubling) is spelled out in the type.
//!
//! ## Point ordering
//! [`AffinePoint`] derives `Ord` with the identity as the least element
//! and finite points compared by `x`, ties broken by `y`. The
//! coordinator's dictionary and every point comparison in the crate use
//! exactly this order.
//!
//! Scalar multiplication is plain left-to-right double-and-add; it runs
//! at setup, ingress validation and final verification only, never in
//! the walk's inner loop.

#![forbid(unsafe_code)]

use num_bigint::BigInt;
use num_traits::Zero;

use crate::field::{FieldError, Fp};

/// Errors produced while validating curve parameters or points.
#[derive(Debug, thiserror::Error)]
pub enum CurveError {
    /// The coordinate field or scalar ring modulus was unusable.
    #[error(transparent)]
    Field(#[from] FieldError),
    /// `4a³ + 27b² ≡ 0 (mod p)`: the curve is singular.
    #[error("curve is singular: 4a^3 + 27b^2 = 0 mod p")]
    Singular,
}

/// A point on the affine curve, or the identity `O`.
///
/// The derived order places `Identity` below every finite point and
/// compares finite points by `(x, y)` lexicographically.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum AffinePoint {
    /// The neutral element of the group.
    Identity,
    /// A finite point with canonical coordinates in `[0, p)`.
    Point {
        /// x coordinate.
        x: BigInt,
        /// y coordinate.
        y: BigInt,
    },
}

impl AffinePoint {
    /// Construct a finite point from any integer representatives.
    pub fn finite(x: impl Into<BigInt>, y: impl Into<BigInt>) -> Self {
        Self::Point { x: x.into(), y: y.into() }
    }

    /// Whether this is the identity.
    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity)
    }
}

/// Curve `y² = x³ + ax + b` over `F_p`, with the order `n` of the
/// subgroup the solver operates in.
#[derive(Clone, Debug)]
pub struct CurveParams {
    /// Coordinate field `F_p`.
    pub fp: Fp,
    /// Scalar ring `Z/nZ` for the subgroup order `n`.
    pub order: Fp,
    /// Curve coefficient `a`, canonical in `[0, p)`.
    pub a: BigInt,
    /// Curve coefficient `b`, canonical in `[0, p)`.
    pub b: BigInt,
}

impl CurveParams {
    /// Validate and construct curve parameters.
    ///
    /// `p` must be an odd integer ≥ 3 (prime in any meaningful use),
    /// `n` the odd order of the base-point subgroup, and the curve must
    /// be non-singular.
    pub fn new(
        p: impl Into<BigInt>,
        a: impl Into<BigInt>,
        b: impl Into<BigInt>,
        n: impl Into<BigInt>,
    ) -> Result<Self, CurveError> {
        let fp = Fp::new(p.into())?;
        let order = Fp::new(n.into())?;
        let a = fp.reduce(&a.into());
        let b = fp.reduce(&b.into());

        // 4a^3 + 27b^2 != 0 mod p
        let a3 = fp.mul(&fp.square(&a), &a);
        let disc = fp.add(
            &fp.mul(&BigInt::from(4u32), &a3),
            &fp.mul(&BigInt::from(27u32), &fp.square(&b)),
        );
        if disc.is_zero() {
            return Err(CurveError::Singular);
        }

        Ok(Self { fp, order, a, b })
    }

    /// Whether `point` satisfies the curve equation (the identity does).
    pub fn is_on_curve(&self, point: &AffinePoint) -> bool {
        match point {
            AffinePoint::Identity => true,
            AffinePoint::Point { x, y } => {
                let zero = BigInt::zero();
                if *x < zero || *y < zero || x >= self.fp.modulus() || y >= self.fp.modulus() {
                    return false;
                }
                let rhs = self.fp.add(
                    &self.fp.add(&self.fp.mul(&self.fp.square(x), x), &self.fp.mul(&self.a, x)),
                    &self.b,
                );
                self.fp.square(y) == rhs
            }
        }
    }

    /// Group addition `lhs + rhs`.
    pub fn add(&self, lhs: &AffinePoint, rhs: &AffinePoint) -> AffinePoint {
        let (x1, y1) = match lhs {
            AffinePoint::Identity => return rhs.clone(),
            AffinePoint::Point { x, y } => (x, y),
        };
        let (x2, y2) = match rhs {
            AffinePoint::Identity => return lhs.clone(),
            AffinePoint::Point { x, y } => (x, y),
        };

        if x1 == x2 {
            if y1 == y2 {
                return self.double(lhs);
            }
            // Same x, distinct y: the points are negatives of each other.
            return AffinePoint::Identity;
        }

        // lambda = (y2 - y1) / (x2 - x1)
        let dx = self.fp.sub(x2, x1);
        let dx_inv = match self.fp.inverse(&dx) {
            Some(inv) => inv,
            // p prime makes every non-zero dx invertible; a composite
            // "prime" can produce zero divisors, which behave like the
            // vertical-line case.
            None => return AffinePoint::Identity,
        };
        let lambda = self.fp.mul(&self.fp.sub(y2, y1), &dx_inv);

        let x3 = self.fp.sub(&self.fp.sub(&self.fp.square(&lambda), x1), x2);
        let y3 = self.fp.sub(&self.fp.mul(&lambda, &self.fp.sub(x1, &x3)), y1);
        AffinePoint::Point { x: x3, y: y3 }
    }

    /// Group doubling `2·point`. Doubling a point of order 2 (`y = 0`)
    /// yields the identity.
    pub fn double(&self, point: &AffinePoint) -> AffinePoint {
        let (x1, y1) = match point {
            AffinePoint::Identity => return AffinePoint::Identity,
            AffinePoint::Point { x, y } => (x, y),
        };
        if self.fp.neg(y1) == *y1 {
            // y = -y only at y = 0: a point of order 2.
            return AffinePoint::Identity;
        }

        // lambda = (3x² + a) / 2y
        let two_y_inv = match self.fp.inverse(&self.fp.add(y1, y1)) {
            Some(inv) => inv,
            None => return AffinePoint::Identity,
        };
        let numer = self.fp.add(&self.fp.mul(&BigInt::from(3u32), &self.fp.square(x1)), &self.a);
        let lambda = self.fp.mul(&numer, &two_y_inv);

        let x3 = self.fp.sub(&self.fp.sub(&self.fp.square(&lambda), x1), x1);
        let y3 = self.fp.sub(&self.fp.mul(&lambda, &self.fp.sub(x1, &x3)), y1);
        AffinePoint::Point { x: x3, y: y3 }
    }

    /// Group negation `-point`.
    pub fn negate(&self, point: &AffinePoint) -> AffinePoint {
        match point {
            AffinePoint::Identity => AffinePoint::Identity,
            AffinePoint::Point { x, y } => AffinePoint::Point {
                x: x.clone(),
                y: self.fp.neg(y),
            },
        }
    }

    /// Scalar multiplication `k·point`, left-to-right double-and-add.
    /// `k` is reduced modulo the subgroup order first.
    pub fn scalar_mul(&self, k: &BigInt, point: &AffinePoint) -> AffinePoint {
        let k = self.order.reduce(k);
        let mut acc = AffinePoint::Identity;
        for i in (0..k.bits()).rev() {
            acc = self.double(&acc);
            if k.bit(i) {
                acc = self.add(&acc, point);
            }
        }
        acc
    }
}

// ============================================================================
// Tests
// ============================================================================
