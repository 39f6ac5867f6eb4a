//! Walk triples `(R, a, b)` with `R = aP + bQ`
//!
//! The fundamental value object of the collision search. Every triple
//! carries its algebraic witness: the scalars `a, b` (canonical modulo
//! the subgroup order `n`) such that `R = aP + bQ`. Group operations on
//! `R` are mirrored on the witness, so the invariant survives every
//! mutation the walk performs. [`Triple::is_valid`] re-derives `R` from
//! the witness with two scalar multiplications; the coordinator checks
//! it on ingress, the walk never does.

#![forbid(unsafe_code)]

use num_bigint::BigInt;
use rand::Rng;

use crate::curve::{AffinePoint, CurveParams};

/// A curve point together with its witness: `point = a·P + b·Q`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Triple {
    /// The current walk position `R`.
    pub point: AffinePoint,
    /// Coefficient of the base point `P`, canonical in `[0, n)`.
    pub a: BigInt,
    /// Coefficient of the target point `Q`, canonical in `[0, n)`.
    pub b: BigInt,
}

impl Triple {
    /// Sample a uniform triple: `a, b ← [0, n)`, `R = aP + bQ`.
    ///
    /// Resamples while `R` is the identity (probability `1/n`), so every
    /// triple handed to a walk or the branch table is finite. Applies
    /// the negation map when `canonical` is set.
    pub fn random<R: Rng + ?Sized>(
        curve: &CurveParams,
        base: &AffinePoint,
        target: &AffinePoint,
        canonical: bool,
        rng: &mut R,
    ) -> Self {
        loop {
            let a = curve.order.sample(rng);
            let b = curve.order.sample(rng);
            let point = curve.add(
                &curve.scalar_mul(&a, base),
                &curve.scalar_mul(&b, target),
            );
            if point.is_identity() {
                continue;
            }
            let mut triple = Self { point, a, b };
            if canonical {
                triple.canonicalize(curve);
            }
            return triple;
        }
    }

    /// In-place addition: `self ← self + other` on the point, witnesses
    /// added modulo `n`.
    pub fn add_assign(&mut self, other: &Self, curve: &CurveParams) {
        self.point = curve.add(&self.point, &other.point);
        self.a = curve.order.add(&self.a, &other.a);
        self.b = curve.order.add(&self.b, &other.b);
    }

    /// `x + y` as a fresh triple.
    pub fn add(x: &Self, y: &Self, curve: &CurveParams) -> Self {
        let mut out = x.clone();
        out.add_assign(y, curve);
        out
    }

    /// In-place doubling: `self ← 2·self`.
    pub fn double_assign(&mut self, curve: &CurveParams) {
        self.point = curve.double(&self.point);
        self.a = curve.order.add(&self.a, &self.a);
        self.b = curve.order.add(&self.b, &self.b);
    }

    /// Negation-map canonicalisation: replace `(x, y)` by `(x, p − y)`
    /// when the latter has the smaller `y`, negating the witness to
    /// match. Returns whether the map was applied. Idempotent; a no-op
    /// on the identity.
    pub fn canonicalize(&mut self, curve: &CurveParams) -> bool {
        let (x, y) = match &self.point {
            AffinePoint::Identity => return false,
            AffinePoint::Point { x, y } => (x, y),
        };
        let neg_y = curve.fp.neg(y);
        if neg_y < *y {
            self.point = AffinePoint::Point { x: x.clone(), y: neg_y };
            self.a = curve.order.neg(&self.a);
            self.b = curve.order.neg(&self.b);
            return true;
        }
        false
    }

    /// Whether `point` is on the curve **and** equals `a·P + b·Q`.
    ///
    /// Two scalar multiplications per call; ingress-only.
    pub fn is_valid(&self, curve: &CurveParams, base: &AffinePoint, target: &AffinePoint) -> bool {
        if !curve.is_on_curve(&self.point) {
            return false;
        }
        let derived = curve.add(
            &curve.scalar_mul(&self.a, base),
            &curve.scalar_mul(&self.b, target),
        );
        derived == self.point
    }

    /// Distinguished-point predicate: the x coordinate has at least
    /// `dp_bits` leading zero bits at the field's width. The identity is
    /// never distinguished.
    pub fn is_distinguished(&self, field_bits: u64, dp_bits: u64) -> bool {
        match &self.point {
            AffinePoint::Identity => false,
            AffinePoint::Point { x, .. } => x.bits() + dp_bits <= field_bits,
        }
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

    // y^2 = x^3 + x + 21 over F_1009, G = (348, 200) of prime order 113.
    fn fixture() -> (CurveParams, AffinePoint, AffinePoint) {
        let curve = CurveParams::new(1009, 1, 21, 113).expect("valid curve");
        let base = AffinePoint::finite(348, 200);
        // Q = 57 * G
        let target = AffinePoint::finite(200, 632);
        (curve, base, target)
    }

    #[test]
    fn random_triples_satisfy_the_witness_equation() {
        let (curve, base, target) = fixture();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..20 {
            let t = Triple::random(&curve, &base, &target, true, &mut rng);
            assert!(!t.point.is_identity());
            assert!(t.is_valid(&curve, &base, &target));
        }
    }

    #[test]
    fn add_and_double_preserve_the_witness() {
        let (curve, base, target) = fixture();
        let mut rng = StdRng::seed_from_u64(7);
        let x = Triple::random(&curve, &base, &target, true, &mut rng);
        let y = Triple::random(&curve, &base, &target, true, &mut rng);

        let sum = Triple::add(&x, &y, &curve);
        assert!(sum.is_valid(&curve, &base, &target));

        let mut doubled = x.clone();
        doubled.double_assign(&curve);
        assert!(doubled.is_valid(&curve, &base, &target));

        // Aliasing form: x <- x + y.
        let mut aliased = x.clone();
        aliased.add_assign(&y, &curve);
        assert_eq!(aliased, sum);
    }

    #[test]
    fn canonicalisation_is_idempotent_and_valid() {
        let (curve, base, target) = fixture();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            let mut t = Triple::random(&curve, &base, &target, false, &mut rng);
            t.canonicalize(&curve);
            assert!(t.is_valid(&curve, &base, &target));
            let frozen = t.clone();
            // Applying the map to a canonical triple changes nothing.
            assert!(!t.canonicalize(&curve));
            assert_eq!(t, frozen);
        }
    }

    #[test]
    fn canonical_y_is_the_smaller_representative() {
        let (curve, _, _) = fixture();
        // (348, 200): p - 200 = 809 > 200, already canonical.
        let mut t = Triple {
            point: AffinePoint::finite(348, 200),
            a: BigInt::from(1u32),
            b: BigInt::zero(),
        };
        assert!(!t.canonicalize(&curve));
        // (348, 809) flips to (348, 200) and negates the witness.
        let mut u = Triple {
            point: AffinePoint::finite(348, 809),
            a: BigInt::from(1u32),
            b: BigInt::zero(),
        };
        assert!(u.canonicalize(&curve));
        assert_eq!(u.point, AffinePoint::finite(348, 200));
        assert_eq!(u.a, BigInt::from(112u32));
    }

    #[test]
    fn distinguished_depends_on_leading_zero_bits() {
        // Width 10 field (p = 1009), one distinguishing bit: x < 512.
        let t = |x: u32| Triple {
            point: AffinePoint::finite(x, 0u32),
            a: BigInt::zero(),
            b: BigInt::zero(),
        };
        assert!(t(0).is_distinguished(10, 1));
        assert!(t(511).is_distinguished(10, 1));
        assert!(!t(512).is_distinguished(10, 1));
        // D = 0 distinguishes everything in range.
        assert!(t(1008).is_distinguished(10, 0));
        // The identity never is.
        let o = Triple {
            point: AffinePoint::Identity,
            a: BigInt::zero(),
            b: BigInt::zero(),
        };
        assert!(!o.is_distinguished(10, 0));
    }

    #[test]
    fn witness_validation_rejects_forgeries() {
        let (curve, base, target) = fixture();
        // G = 1*P + 0*Q holds...
        let good = Triple {
            point: AffinePoint::finite(348, 200),
            a: BigInt::from(1u32),
            b: BigInt::zero(),
        };
        assert!(good.is_valid(&curve, &base, &target));
        // ...but not with a doctored witness.
        let bad = Triple { a: BigInt::from(2u32), ..good.clone() };
        assert!(!bad.is_valid(&curve, &base, &target));
        // Off-curve points fail regardless of the witness.
        let off = Triple { point: AffinePoint::finite(348, 201), ..good };
        assert!(!off.is_valid(&curve, &base, &target));
    }
}
