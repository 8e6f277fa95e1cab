//! Borrow Rate Model
//!
//! Pure functions over utilization: the kinked linear borrow rate, the
//! utilization EMA, and the dynamic origination fee. Nothing here touches
//! pool state.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::constants::{fees, precision::{BPS_DENOMINATOR, ONE}, rates};
use crate::errors::{PoolError, PoolResult};
use crate::math::{mul_div, safe_add, Wad};

// ============ Parameters ============

/// Kinked linear rate model, all values annualized
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    BorshSerialize,
    BorshDeserialize,
)]
pub struct RateParams {
    pub base_rate: Wad,
    pub optimal_utilization: Wad,
    pub slope1: Wad,
    pub slope2: Wad,
}

impl Default for RateParams {
    fn default() -> Self {
        Self {
            base_rate: Wad(rates::BASE_RATE),
            optimal_utilization: Wad(rates::OPTIMAL_UTILIZATION),
            slope1: Wad(rates::SLOPE1),
            slope2: Wad(rates::SLOPE2),
        }
    }
}

impl RateParams {
    pub fn validate(&self) -> PoolResult<()> {
        if self.optimal_utilization.is_zero() || self.optimal_utilization.raw() >= ONE {
            return Err(PoolError::InvalidConfig { param: "optimal_utilization" });
        }
        Ok(())
    }
}

/// Origination fee curve.
///
/// Flat at `base_fee_bps` up to `low_util_pct`, quadratic above it and
/// exponential from `high_util_pct`. Setting both divisors to zero turns
/// the curve into a flat fee.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    BorshSerialize,
    BorshDeserialize,
)]
pub struct OriginationFeeParams {
    pub base_fee_bps: u64,
    pub low_util_pct: u64,
    pub high_util_pct: u64,
    pub ramp_divisor: u64,
    pub fee_divisor: u64,
}

impl Default for OriginationFeeParams {
    fn default() -> Self {
        Self {
            base_fee_bps: fees::ORIGINATION_FEE_BPS,
            low_util_pct: fees::LOW_UTIL_PCT,
            high_util_pct: fees::HIGH_UTIL_PCT,
            ramp_divisor: fees::RAMP_DIVISOR,
            fee_divisor: fees::FEE_DIVISOR,
        }
    }
}

impl OriginationFeeParams {
    /// Flat fee with no utilization ramp
    pub fn flat(base_fee_bps: u64) -> Self {
        Self {
            base_fee_bps,
            low_util_pct: 100,
            high_util_pct: 100,
            ramp_divisor: 0,
            fee_divisor: 0,
        }
    }

    pub fn validate(&self) -> PoolResult<()> {
        if self.base_fee_bps > BPS_DENOMINATOR {
            return Err(PoolError::InvalidConfig { param: "base_fee_bps" });
        }
        if self.low_util_pct > self.high_util_pct || self.high_util_pct > 100 {
            return Err(PoolError::InvalidConfig { param: "util_thresholds" });
        }
        Ok(())
    }

    /// Fee in basis points for a utilization given as a fixed-point ratio
    pub fn fee_bps(&self, utilization: Wad) -> u64 {
        let pct = utilization.to_percent().min(100);
        let mut fee = self.base_fee_bps;

        if self.ramp_divisor > 0 && pct > self.low_util_pct {
            let diff = pct - self.low_util_pct;
            fee = fee.max(diff * diff * BPS_DENOMINATOR / self.ramp_divisor);
        }
        if self.fee_divisor > 0 && pct >= self.high_util_pct {
            let diff = (pct - self.high_util_pct) as u32;
            // 2^diff fits: diff <= 100
            let growth = 1u128 << diff;
            let exp_fee = growth * BPS_DENOMINATOR as u128 / self.fee_divisor as u128;
            fee = fee.max(exp_fee.min(BPS_DENOMINATOR as u128) as u64);
        }

        fee.min(BPS_DENOMINATOR)
    }
}

// ============ Rate Functions ============

/// Fraction of pool invariant currently lent out
pub fn utilization_rate(lp_invariant: u128, borrowed_invariant: u128) -> PoolResult<Wad> {
    let total = safe_add(lp_invariant, borrowed_invariant)?;
    if total == 0 {
        return Ok(Wad::ZERO);
    }
    Wad::from_ratio(borrowed_invariant, total)
}

/// Annual borrow rate at `utilization`
pub fn calc_borrow_rate(utilization: Wad, params: &RateParams) -> PoolResult<Wad> {
    let optimal = params.optimal_utilization;
    if utilization <= optimal {
        let variable = mul_div(utilization.raw(), params.slope1.raw(), optimal.raw())?;
        return params.base_rate.checked_add(Wad(variable));
    }

    let excess = utilization.saturating_sub(optimal);
    let headroom = Wad(ONE).saturating_sub(optimal);
    let variable = mul_div(excess.raw(), params.slope2.raw(), headroom.raw())?;
    params
        .base_rate
        .checked_add(params.slope1)?
        .checked_add(Wad(variable))
}

/// Utilization EMA. Each elapsed period moves `ema_multiplier` per mille of
/// weight onto the latest sample; an empty history starts at the sample.
pub fn calc_ema_utilization(
    utilization: Wad,
    prev_ema: Wad,
    elapsed: u64,
    ema_multiplier: u64,
) -> PoolResult<Wad> {
    if prev_ema.is_zero() {
        return Ok(utilization);
    }
    let denom = rates::EMA_WEIGHT_DENOMINATOR;
    let weight = elapsed.saturating_mul(ema_multiplier).min(denom) as u128;
    let latest = utilization.raw().checked_mul(weight).ok_or(PoolError::Overflow)?;
    let history = prev_ema
        .raw()
        .checked_mul(denom as u128 - weight)
        .ok_or(PoolError::Overflow)?;
    Ok(Wad(safe_add(latest, history)? / denom as u128))
}
