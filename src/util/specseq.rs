//! Partially-specified bit-vectors.
//!
//! A [`SpecSeq`] describes a set of bit-vectors by a value together with a
//! mask of unspecified positions. They are used for letters with don't-care
//! bits, for packed product-state labels, and for KISS output.

use std::fmt;
use std::hash::Hash;
use std::ops::{BitAnd, BitOr, BitXor, Not};

use biodivine_lib_bdd::{Bdd, BddVariableSet};

/// An unsigned integer type usable as the carrier of a [`SpecSeq`].
pub trait Bits:
    Copy
    + Eq
    + Ord
    + Hash
    + fmt::Debug
    + BitAnd<Output = Self>
    + BitOr<Output = Self>
    + BitXor<Output = Self>
    + Not<Output = Self>
{
    const ZERO: Self;
    const ONE: Self;
    const BITS: u32;

    fn count_ones(self) -> u32;
    fn shl(self, n: u32) -> Self;
    fn shr(self, n: u32) -> Self;
    fn wrapping_sub(self, rhs: Self) -> Self;

    /// A mask with the lowest `n` bits set.
    fn low_mask(n: u32) -> Self {
        if n >= Self::BITS {
            !Self::ZERO
        } else {
            Self::ONE.shl(n).wrapping_sub(Self::ONE)
        }
    }

    fn bit(self, n: u32) -> bool {
        self.shr(n) & Self::ONE == Self::ONE
    }
}

macro_rules! impl_bits {
    ($($t:ty),*) => {$(
        impl Bits for $t {
            const ZERO: Self = 0;
            const ONE: Self = 1;
            const BITS: u32 = <$t>::BITS;

            fn count_ones(self) -> u32 {
                <$t>::count_ones(self)
            }
            fn shl(self, n: u32) -> Self {
                self << n
            }
            fn shr(self, n: u32) -> Self {
                self >> n
            }
            fn wrapping_sub(self, rhs: Self) -> Self {
                <$t>::wrapping_sub(self, rhs)
            }
        }
    )*};
}
impl_bits!(u32, u64);

/// A sequence of bits where some positions may be left unspecified.
///
/// The `i`-th bit of `number` is 1 iff the `i`-th element is specified and 1;
/// the `i`-th bit of `unspecified` is 1 iff the `i`-th element is unspecified.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpecSeq<I: Bits> {
    pub number: I,
    pub unspecified: I,
}

impl<I: Bits> SpecSeq<I> {
    pub fn new(number: I) -> Self {
        Self {
            number,
            unspecified: I::ZERO,
        }
    }

    pub fn with_unspecified(number: I, unspecified: I) -> Self {
        Self {
            number,
            unspecified,
        }
    }

    /// The sequence leaving all of the lowest `num_bits` positions unspecified.
    pub fn any(num_bits: u32) -> Self {
        Self::with_unspecified(I::ZERO, I::low_mask(num_bits))
    }

    /// Bits specified in both sequences must agree.
    pub fn is_compatible(&self, other: &Self) -> bool {
        let mask = self.unspecified | other.unspecified;
        (self.number | mask) == (other.number | mask)
    }

    /// Bits are specified if they are specified in at least one sequence.
    /// Assumes the sequences are compatible.
    pub fn intersect(&self, other: &Self) -> Self {
        Self::with_unspecified(
            self.number | other.number,
            self.unspecified & other.unspecified,
        )
    }

    pub fn is_disjoint(&self, other: &Self) -> bool {
        !self.is_compatible(other)
    }

    /// All words in this sequence but not in `other`.
    /// Assumes that at least one such word exists.
    pub fn diff(&self, other: &Self, num_bits: u32) -> Vec<Self> {
        let mut result = Vec::new();
        let mut last = *self;
        for b in 0..num_bits {
            let bit = I::ONE.shl(b);
            if self.unspecified & bit != I::ZERO && other.unspecified & bit == I::ZERO {
                let mut split = last;
                split.unspecified = split.unspecified & !bit;
                last.unspecified = last.unspecified & !bit;
                split.number = split.number | (!other.number & bit);
                last.number = last.number | (other.number & bit);
                result.push(split);
            }
        }
        result
    }

    /// Every unspecified bit of `self` is also unspecified in `other`,
    /// and all specified bits agree.
    pub fn is_subset(&self, other: &Self) -> bool {
        (self.unspecified | other.unspecified) == other.unspecified && self.is_compatible(other)
    }

    pub fn is_fully_specified(&self) -> bool {
        self.unspecified == I::ZERO
    }

    /// The BDD over the first `num_bits` variables of `ctx` containing
    /// exactly the words of this sequence.
    pub fn to_bdd(&self, ctx: &BddVariableSet, num_bits: u32) -> Bdd {
        let vars = ctx.variables();
        let mut bdd = ctx.mk_true();
        for b in 0..num_bits {
            if !self.unspecified.bit(b) {
                bdd = bdd.and(&ctx.mk_literal(vars[b as usize], self.number.bit(b)));
            }
        }
        bdd
    }

    /// KISS-style rendering, least significant bit first, `-` for unspecified.
    pub fn display(&self, num_bits: u32) -> String {
        let mut s = String::with_capacity(num_bits as usize);
        for b in 0..num_bits {
            if self.unspecified.bit(b) {
                s.push('-');
            } else if self.number.bit(b) {
                s.push('1');
            } else {
                s.push('0');
            }
        }
        s
    }

    /// Rendering of a packed label as a tuple of per-slot values,
    /// with `-` for slots that are entirely unspecified.
    pub fn display_vector(&self, accumulated_bits: &[usize]) -> String {
        let mut s = String::from("(");
        let mut empty = true;
        for i in 0..accumulated_bits.len().saturating_sub(1) {
            let start = accumulated_bits[i] as u32;
            let end = accumulated_bits[i + 1] as u32;
            if end > start {
                if !empty {
                    s.push(',');
                }
                empty = false;
                let mask = I::low_mask(end - start);
                let num = self.number.shr(start) & mask;
                let unspec = self.unspecified.shr(start) & mask;
                if unspec != mask {
                    s.push_str(&format!("{:?}", num));
                } else {
                    s.push('-');
                }
            }
        }
        s.push(')');
        s
    }
}

/// Enumerates a disjoint-free cube cover of the given BDD over the first
/// `num_bits` variables of `ctx`, sorted for reproducible output.
pub fn bdd_to_cubes(bdd: &Bdd, ctx: &BddVariableSet, num_bits: u32) -> Vec<SpecSeq<u64>> {
    if bdd.is_false() {
        return Vec::new();
    }
    if bdd.is_true() {
        return vec![SpecSeq::any(num_bits)];
    }
    let vars = ctx.variables();
    let mut cubes: Vec<SpecSeq<u64>> = bdd
        .to_optimized_dnf()
        .iter()
        .map(|clause| {
            let mut cube = SpecSeq::any(num_bits);
            for b in 0..num_bits {
                if let Some(value) = clause.get_value(vars[b as usize]) {
                    cube.unspecified &= !(1 << b);
                    if value {
                        cube.number |= 1 << b;
                    }
                }
            }
            cube
        })
        .collect();
    cubes.sort();
    cubes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compatibility_and_intersection() {
        // 10- and 1-0 overlap in 100
        let a = SpecSeq::with_unspecified(0b001_u32, 0b100);
        let b = SpecSeq::with_unspecified(0b001_u32, 0b010);
        assert!(a.is_compatible(&b));
        let c = a.intersect(&b);
        assert_eq!(c, SpecSeq::with_unspecified(0b001, 0b000));

        let d = SpecSeq::new(0b011_u32);
        assert!(a.is_disjoint(&d));
    }

    #[test]
    fn subset_and_diff() {
        let any = SpecSeq::<u32>::any(2);
        let one = SpecSeq::with_unspecified(0b01_u32, 0b10);
        assert!(one.is_subset(&any));
        assert!(!any.is_subset(&one));

        // --- minus 1-- leaves 0--
        let rest = any.diff(&one, 2);
        assert_eq!(rest, vec![SpecSeq::with_unspecified(0b00, 0b10)]);
    }

    #[test]
    fn bdd_round_trip() {
        let ctx = BddVariableSet::new_anonymous(3);
        let cube = SpecSeq::with_unspecified(0b001_u64, 0b100);
        let bdd = cube.to_bdd(&ctx, 3);
        let cubes = bdd_to_cubes(&bdd, &ctx, 3);
        assert_eq!(cubes, vec![cube]);

        let everything = SpecSeq::<u64>::any(3).to_bdd(&ctx, 3);
        assert!(everything.is_true());
        assert_eq!(
            bdd_to_cubes(&everything, &ctx, 3),
            vec![SpecSeq::any(3)]
        );
    }

    #[test]
    fn display_lsb_first() {
        let cube = SpecSeq::with_unspecified(0b001_u32, 0b100);
        assert_eq!(cube.display(3), "10-");
    }
}
