//! Mathematical Utilities for the lvpool engine
//!
//! 18-decimal fixed-point arithmetic with a 256-bit intermediate product,
//! so `a * b / c` never overflows before the division. Every division
//! truncates unless the function name says `_up`.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::constants::precision::{BPS_DENOMINATOR, ONE, PERCENT_PRECISION};
use crate::errors::{PoolError, PoolResult};

// ============ 256-bit Intermediate ============

/// Unsigned 256-bit integer used only for intermediate products
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct U256 {
    /// High 128 bits
    pub hi: u128,
    /// Low 128 bits
    pub lo: u128,
}

impl U256 {
    pub const ZERO: Self = Self { hi: 0, lo: 0 };

    pub const fn from_u128(value: u128) -> Self {
        Self { hi: 0, lo: value }
    }

    /// Full 128x128 -> 256 bit product
    pub fn full_mul(a: u128, b: u128) -> Self {
        const MASK: u128 = u64::MAX as u128;
        let (a_hi, a_lo) = (a >> 64, a & MASK);
        let (b_hi, b_lo) = (b >> 64, b & MASK);

        let ll = a_lo * b_lo;
        let lh = a_lo * b_hi;
        let hl = a_hi * b_lo;
        let hh = a_hi * b_hi;

        // at most 3 * (2^64 - 1), fits in u128
        let mid = (ll >> 64) + (lh & MASK) + (hl & MASK);

        Self {
            hi: hh + (lh >> 64) + (hl >> 64) + (mid >> 64),
            lo: (ll & MASK) | (mid << 64),
        }
    }

    /// Multiply by a 128-bit value, `None` on 256-bit overflow
    pub fn checked_mul_u128(self, rhs: u128) -> Option<Self> {
        let low = Self::full_mul(self.lo, rhs);
        let high = self.hi.checked_mul(rhs)?;
        Some(Self {
            hi: low.hi.checked_add(high)?,
            lo: low.lo,
        })
    }

    /// Long division by a 128-bit divisor, returning (quotient, remainder)
    pub fn div_rem_u128(self, divisor: u128) -> Option<(Self, u128)> {
        if divisor == 0 {
            return None;
        }
        if self.hi == 0 {
            return Some((Self::from_u128(self.lo / divisor), self.lo % divisor));
        }

        let mut quotient = Self::ZERO;
        let mut rem: u128 = 0;
        for bit in (0..256u32).rev() {
            let carry = rem >> 127;
            rem = (rem << 1) | self.bit(bit);
            if carry == 1 || rem >= divisor {
                rem = rem.wrapping_sub(divisor);
                quotient.set_bit(bit);
            }
        }
        Some((quotient, rem))
    }

    /// Narrow to u128 if the high half is empty
    pub fn to_u128(self) -> Option<u128> {
        if self.hi == 0 {
            Some(self.lo)
        } else {
            None
        }
    }

    fn bit(&self, index: u32) -> u128 {
        if index >= 128 {
            (self.hi >> (index - 128)) & 1
        } else {
            (self.lo >> index) & 1
        }
    }

    fn set_bit(&mut self, index: u32) {
        if index >= 128 {
            self.hi |= 1 << (index - 128);
        } else {
            self.lo |= 1 << index;
        }
    }
}

// ============ Multiply-Then-Divide ============

/// `a * b / c`, truncating
pub fn mul_div(a: u128, b: u128, c: u128) -> PoolResult<u128> {
    let (quotient, _) = U256::full_mul(a, b)
        .div_rem_u128(c)
        .ok_or(PoolError::DivisionByZero)?;
    quotient.to_u128().ok_or(PoolError::Overflow)
}

/// `a * b / c`, rounding up
pub fn mul_div_up(a: u128, b: u128, c: u128) -> PoolResult<u128> {
    let (quotient, rem) = U256::full_mul(a, b)
        .div_rem_u128(c)
        .ok_or(PoolError::DivisionByZero)?;
    let quotient = quotient.to_u128().ok_or(PoolError::Overflow)?;
    if rem > 0 {
        quotient.checked_add(1).ok_or(PoolError::Overflow)
    } else {
        Ok(quotient)
    }
}

/// `amount * bps / 10_000`, truncating
pub fn apply_bps(amount: u128, bps: u64) -> PoolResult<u128> {
    mul_div(amount, bps as u128, BPS_DENOMINATOR as u128)
}

/// Safe addition with overflow check
pub fn safe_add(a: u128, b: u128) -> PoolResult<u128> {
    a.checked_add(b).ok_or(PoolError::Overflow)
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: u128, b: u128) -> PoolResult<u128> {
    a.checked_sub(b).ok_or(PoolError::Underflow)
}

// ============ Wad ============

/// 18-decimal fixed-point number (1.0 == 10^18)
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    BorshSerialize,
    BorshDeserialize,
)]
pub struct Wad(pub u128);

impl Wad {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(ONE);

    /// `numerator / denominator` as a fixed-point ratio
    pub fn from_ratio(numerator: u128, denominator: u128) -> PoolResult<Self> {
        mul_div(numerator, ONE, denominator).map(Self)
    }

    pub fn raw(self) -> u128 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Fixed-point product, truncating
    pub fn mul(self, other: Self) -> PoolResult<Self> {
        mul_div(self.0, other.0, ONE).map(Self)
    }

    /// Fixed-point quotient, truncating
    pub fn div(self, other: Self) -> PoolResult<Self> {
        mul_div(self.0, ONE, other.0).map(Self)
    }

    pub fn checked_add(self, other: Self) -> PoolResult<Self> {
        safe_add(self.0, other.0).map(Self)
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Scale an integer amount by this factor, truncating
    pub fn scale(self, amount: u128) -> PoolResult<u128> {
        mul_div(amount, self.0, ONE)
    }

    /// Whole percent (0..=100 for ratios up to 1.0), truncating
    pub fn to_percent(self) -> u64 {
        (self.0 / (ONE / PERCENT_PRECISION as u128)).min(u64::MAX as u128) as u64
    }
}

// ============ Roots and Means ============

/// Integer square root (Babylonian)
pub fn isqrt(y: u128) -> u128 {
    if y == 0 {
        return 0;
    }
    let mut z = y;
    let mut x = y / 2 + 1;
    while x < z {
        z = x;
        x = (y / x + x) / 2;
    }
    z
}

fn pow_u256(base: u128, exp: usize) -> Option<U256> {
    let mut acc = U256::from_u128(1);
    for _ in 0..exp {
        acc = acc.checked_mul_u128(base)?;
    }
    Some(acc)
}

/// Generalized geometric mean `(a_1 * ... * a_n)^(1/n)`, truncating.
///
/// Zero if any amount is zero. The product must fit in 256 bits.
pub fn geometric_mean(amounts: &[u128]) -> PoolResult<u128> {
    let n = amounts.len();
    if n == 0 || amounts.iter().any(|a| *a == 0) {
        return Ok(0);
    }
    if n == 1 {
        return Ok(amounts[0]);
    }

    let mut product = U256::from_u128(1);
    let mut lo = u128::MAX;
    let mut hi = 0u128;
    for amount in amounts {
        product = product.checked_mul_u128(*amount).ok_or(PoolError::Overflow)?;
        lo = lo.min(*amount);
        hi = hi.max(*amount);
    }

    // the mean lies between the smallest and largest amount
    while lo < hi {
        let mid = lo + (hi - lo).div_ceil(2);
        match pow_u256(mid, n) {
            Some(p) if p <= product => lo = mid,
            _ => hi = mid - 1,
        }
    }
    Ok(lo)
}

// ============ Collateralization ============

/// Margin check: `debt * ONE <= collateral * ltv_threshold`
pub fn has_margin(debt: u128, collateral: u128, ltv_threshold: Wad) -> bool {
    U256::full_mul(debt, ONE) <= U256::full_mul(collateral, ltv_threshold.0)
}

/// Collateral value net of the liquidation haircut
pub fn liquidation_payable(collateral: u128, liquidation_fee_bps: u64) -> PoolResult<u128> {
    let keep_bps = BPS_DENOMINATOR.saturating_sub(liquidation_fee_bps);
    apply_bps(collateral, keep_bps)
}
