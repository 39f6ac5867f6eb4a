//! Residue arithmetic modulo an odd integer
//!
//! All solver arithmetic happens in two rings: the coordinate field
//! `F_p` and the scalar ring `Z/nZ` for the subgroup order `n`. Both are
//! odd primes in practice, so a single type covers them: [`Fp`] wraps an
//! odd modulus and exposes the operations the walk and the coordinator
//! consume.
//!
//! ## Conventions
//! - Every value returned by an `Fp` operation is a **canonical residue**
//!   in `[0, m)`. Inputs are reduced on entry, so callers may pass any
//!   `BigInt`.
//! - Inversion is the **binary extended Euclidean** algorithm (HAC
//!   14.61), which requires the modulus to be odd; [`Fp::new`] rejects
//!   even moduli up front. [`Fp::inverse`] returns `None` for
//!   non-invertible inputs instead of diverging.

#![forbid(unsafe_code)]

use num_bigint::{BigInt, RandBigInt};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::Rng;

/// Errors produced when constructing a residue ring.
#[derive(Debug, thiserror::Error)]
pub enum FieldError {
    /// The modulus must be at least 3.
    #[error("modulus must be at least 3 (got {0})")]
    TooSmall(BigInt),
    /// Binary inversion needs an odd modulus.
    #[error("modulus must be odd (got {0})")]
    EvenModulus(BigInt),
}

/// Arithmetic modulo a fixed odd integer `m ≥ 3`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fp {
    modulus: BigInt,
    bits: u64,
}

impl Fp {
    /// Construct the ring `Z/mZ`, validating the modulus.
    pub fn new(modulus: BigInt) -> Result<Self, FieldError> {
        if modulus < BigInt::from(3u32) {
            return Err(FieldError::TooSmall(modulus));
        }
        if modulus.is_even() {
            return Err(FieldError::EvenModulus(modulus));
        }
        let bits = modulus.bits();
        Ok(Self { modulus, bits })
    }

    /// The modulus `m`.
    pub fn modulus(&self) -> &BigInt {
        &self.modulus
    }

    /// Bit width of the modulus, `⌈log2 m⌉` for non-powers of two.
    pub fn bits(&self) -> u64 {
        self.bits
    }

    /// Canonical residue of `v` in `[0, m)`.
    #[inline]
    pub fn reduce(&self, v: &BigInt) -> BigInt {
        v.mod_floor(&self.modulus)
    }

    /// `(a + b) mod m`.
    #[inline]
    pub fn add(&self, a: &BigInt, b: &BigInt) -> BigInt {
        self.reduce(&(a + b))
    }

    /// `(a - b) mod m`.
    #[inline]
    pub fn sub(&self, a: &BigInt, b: &BigInt) -> BigInt {
        self.reduce(&(a - b))
    }

    /// `(-a) mod m`.
    #[inline]
    pub fn neg(&self, a: &BigInt) -> BigInt {
        self.reduce(&(-a))
    }

    /// `(a * b) mod m`.
    #[inline]
    pub fn mul(&self, a: &BigInt, b: &BigInt) -> BigInt {
        self.reduce(&(a * b))
    }

    /// `a^2 mod m`.
    #[inline]
    pub fn square(&self, a: &BigInt) -> BigInt {
        self.reduce(&(a * a))
    }

    /// Multiplicative inverse of `a` modulo `m`, or `None` when
    /// `gcd(a, m) ≠ 1` (in particular for `a ≡ 0`).
    ///
    /// Binary extended Euclidean: only shifts, additions and
    /// subtractions, no division. Valid because `m` is odd.
    pub fn inverse(&self, a: &BigInt) -> Option<BigInt> {
        let a = self.reduce(a);
        if a.is_zero() {
            return None;
        }

        let mut u = a;
        let mut v = self.modulus.clone();
        let mut x1 = BigInt::one();
        let mut x2 = BigInt::zero();

        while !u.is_one() && !v.is_one() {
            while u.is_even() {
                u >>= 1;
                if x1.is_even() {
                    x1 >>= 1;
                } else {
                    x1 = (&x1 + &self.modulus) >> 1;
                }
            }
            while v.is_even() {
                v >>= 1;
                if x2.is_even() {
                    x2 >>= 1;
                } else {
                    x2 = (&x2 + &self.modulus) >> 1;
                }
            }
            if u >= v {
                u -= &v;
                x1 -= &x2;
                if u.is_zero() {
                    // gcd(a, m) = v > 1
                    return None;
                }
            } else {
                v -= &u;
                x2 -= &x1;
            }
        }

        let x = if u.is_one() { x1 } else { x2 };
        Some(self.reduce(&x))
    }

    /// Uniform sample in `[0, m)`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> BigInt {
        rng.gen_bigint_range(&BigInt::zero(), &self.modulus)
    }
}

// ============================================================================
// Tests
// ============================================================================
