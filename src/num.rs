//! Exact integers. The evaluator treats these as opaque, immutable and
//! hashable; only the arithmetic builtins look inside.

use std::{cmp::Ordering, fmt};

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Signed, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

/// An exact integer, kept as a machine word until an operation overflows.
///
/// Invariant: `Big` never holds a value that fits in an `i64`, so the derived
/// equality and hash agree with numeric equality.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Num {
    Fix(i64),
    Big(BigInt),
}

impl Num {
    fn normalize(n: BigInt) -> Self {
        match n.to_i64() {
            Some(x) => Self::Fix(x),
            None => Self::Big(n),
        }
    }

    fn to_big(&self) -> BigInt {
        match self {
            Self::Fix(x) => BigInt::from(*x),
            Self::Big(b) => b.clone(),
        }
    }

    fn lift(
        &self,
        other: &Self,
        fix: fn(i64, i64) -> Option<i64>,
        big: fn(&BigInt, &BigInt) -> BigInt,
    ) -> Self {
        if let (Self::Fix(a), Self::Fix(b)) = (self, other) {
            if let Some(x) = fix(*a, *b) {
                return Self::Fix(x);
            }
        }
        Self::normalize(big(&self.to_big(), &other.to_big()))
    }

    pub fn add(&self, other: &Self) -> Self {
        self.lift(other, i64::checked_add, |a, b| a + b)
    }

    pub fn sub(&self, other: &Self) -> Self {
        self.lift(other, i64::checked_sub, |a, b| a - b)
    }

    pub fn mul(&self, other: &Self) -> Self {
        self.lift(other, i64::checked_mul, |a, b| a * b)
    }

    pub fn neg(&self) -> Self {
        Self::Fix(0).sub(self)
    }

    /// Truncating division; `None` on a zero divisor.
    pub fn quotient(&self, other: &Self) -> Option<Self> {
        if other.is_zero() {
            return None;
        }
        Some(self.lift(other, i64::checked_div, |a, b| a / b))
    }

    /// Remainder with the sign of the dividend.
    pub fn remainder(&self, other: &Self) -> Option<Self> {
        if other.is_zero() {
            return None;
        }
        Some(self.lift(other, i64::checked_rem, |a, b| a % b))
    }

    /// Remainder with the sign of the divisor.
    pub fn modulo(&self, other: &Self) -> Option<Self> {
        if other.is_zero() {
            return None;
        }
        Some(self.lift(
            other,
            |a, b| a.checked_rem_euclid(b).map(|r| if r != 0 && b < 0 { r + b } else { r }),
            |a, b| a.mod_floor(b),
        ))
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Self::Fix(x) => *x == 0,
            Self::Big(b) => b.is_zero(),
        }
    }

    pub fn is_negative(&self) -> bool {
        match self {
            Self::Fix(x) => *x < 0,
            Self::Big(b) => b.is_negative(),
        }
    }

    pub fn as_usize(&self) -> Option<usize> {
        match self {
            Self::Fix(x) => usize::try_from(*x).ok(),
            Self::Big(_) => None,
        }
    }
}

impl From<i64> for Num {
    fn from(x: i64) -> Self {
        Self::Fix(x)
    }
}

impl From<BigInt> for Num {
    fn from(x: BigInt) -> Self {
        Self::normalize(x)
    }
}

impl PartialOrd for Num {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Num {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Fix(a), Self::Fix(b)) => a.cmp(b),
            _ => self.to_big().cmp(&other.to_big()),
        }
    }
}

impl fmt::Display for Num {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fix(x) => write!(f, "{x}"),
            Self::Big(b) => write!(f, "{b}"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn overflow_promotes_and_shrinks_back() {
        let max = Num::from(i64::MAX);
        let big = max.add(&Num::from(1));
        assert!(matches!(big, Num::Big(_)));
        assert_eq!(big.sub(&Num::from(1)), max);
        assert_eq!(big.to_string(), "9223372036854775808");
    }

    #[test]
    fn division_family() {
        let (a, b) = (Num::from(-7), Num::from(2));
        assert_eq!(a.quotient(&b), Some(Num::from(-3)));
        assert_eq!(a.remainder(&b), Some(Num::from(-1)));
        assert_eq!(a.modulo(&b), Some(Num::from(1)));
        assert_eq!(Num::from(7).modulo(&Num::from(-2)), Some(Num::from(-1)));
        assert_eq!(a.quotient(&Num::from(0)), None);
    }

    #[test]
    fn ordering_across_representations() {
        let big = Num::from(i64::MAX).mul(&Num::from(4));
        assert!(Num::from(3) < big);
        assert!(big.neg() < Num::from(i64::MIN));
    }
}
