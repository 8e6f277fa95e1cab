//! Interest accrual
//!
//! Isolates CFMM trading-fee growth from deposit and withdrawal dilution,
//! blends it with the borrow rate into a per-period fee index, and grows
//! all outstanding debt by that index at most once per period.

use lvpool_common::{
    calc_borrow_rate, calc_ema_utilization, mul_div, precision::{BPS_DENOMINATOR, ONE},
    time::PERIODS_PER_YEAR, utilization_rate, PoolError, PoolEvent, PoolResult, Wad,
};

use crate::external::{Cfmm, TokenBank};
use crate::pool::LendingPool;

/// Growth of invariant-per-LP-token between two CFMM snapshots.
///
/// `ONE` when any value is zero, and never below `ONE`.
pub fn external_fee_index(
    last_invariant: u128,
    last_supply: u128,
    prev_invariant: u128,
    prev_supply: u128,
) -> PoolResult<Wad> {
    if last_invariant == 0 || last_supply == 0 || prev_invariant == 0 || prev_supply == 0 {
        return Ok(Wad::ONE);
    }
    let last_per_share = Wad::from_ratio(last_invariant, last_supply)?;
    let prev_per_share = Wad::from_ratio(prev_invariant, prev_supply)?;
    if prev_per_share.is_zero() {
        return Ok(Wad::ONE);
    }
    Ok(last_per_share.div(prev_per_share)?.max(Wad::ONE))
}

/// Blend CFMM yield with the borrow rate over `elapsed` periods, capped at
/// `max_apy_multiplier` times 100% per year
pub fn period_fee_index(
    external_index: Wad,
    borrow_rate: Wad,
    elapsed: u64,
    max_apy_multiplier: u64,
) -> PoolResult<Wad> {
    let adj_borrow_rate = mul_div(elapsed as u128, borrow_rate.raw(), PERIODS_PER_YEAR as u128)?;
    let cap_growth = mul_div(
        (elapsed as u128).saturating_mul(max_apy_multiplier as u128),
        ONE,
        PERIODS_PER_YEAR as u128,
    )?;
    let capped = Wad::ONE.checked_add(Wad(cap_growth))?;
    Ok(capped.min(external_index.checked_add(Wad(adj_borrow_rate))?))
}

impl<C: Cfmm + Clone, B: TokenBank + Clone> LendingPool<C, B> {
    /// Accrue interest up to `period`.
    ///
    /// A second call in the same period only refreshes the CFMM snapshot
    /// and the derived totals; fees are not accrued twice.
    pub(crate) fn update_index(&mut self, period: u64) -> PoolResult<()> {
        if period < self.state.last_period {
            return Err(PoolError::InvalidInput {
                param: "period",
                reason: "clock moved backwards",
            });
        }
        let elapsed = period - self.state.last_period;

        self.refresh_external();
        let state = &mut self.state;

        let bootstrapping = state.prev_external_invariant == 0 || state.prev_external_supply == 0;
        if elapsed > 0 || bootstrapping {
            state.last_external_fee_index = external_fee_index(
                state.last_external_invariant,
                state.last_external_supply,
                state.prev_external_invariant,
                state.prev_external_supply,
            )?;
            state.prev_external_invariant = state.last_external_invariant;
            state.prev_external_supply = state.last_external_supply;
        }

        if elapsed > 0 {
            let utilization = utilization_rate(state.lp_invariant, state.borrowed_invariant)?;
            state.ema_utilization = calc_ema_utilization(
                utilization,
                state.ema_utilization,
                elapsed,
                self.config.ema_multiplier,
            )?;
            state.borrow_rate = calc_borrow_rate(utilization, &self.config.rate)?;

            let index = period_fee_index(
                state.last_external_fee_index,
                state.borrow_rate,
                elapsed,
                self.config.max_apy_multiplier,
            )?;
            state.last_fee_index = index;
            state.borrowed_invariant = index.scale(state.borrowed_invariant)?;
            state.acc_fee_index = state.acc_fee_index.mul(index)?;
            state.last_period = period;

            self.mint_dev_fee(index, utilization, period)?;
        }

        self.state.sync_totals()
    }

    /// Dilute shares toward the fee recipient by its cut of the borrow-rate
    /// spread, weighted by utilization
    fn mint_dev_fee(&mut self, index: Wad, utilization: Wad, period: u64) -> PoolResult<()> {
        let Some(recipient) = self.config.fee_recipient else {
            return Ok(());
        };
        let supply = self.shares.total_supply();
        if supply == 0 || self.config.protocol_fee_bps == 0 {
            return Ok(());
        }

        let spread = index.saturating_sub(self.state.last_external_fee_index);
        let dilution = mul_div(
            spread.mul(utilization)?.raw(),
            self.config.protocol_fee_bps as u128,
            BPS_DENOMINATOR as u128,
        )?;
        if dilution == 0 || dilution >= ONE {
            return Ok(());
        }

        let dev_shares = mul_div(supply, dilution, ONE - dilution)?;
        if dev_shares == 0 {
            return Ok(());
        }
        self.shares.mint(&recipient, dev_shares)?;
        self.emit(PoolEvent::DevFeeMinted { recipient, shares: dev_shares, period });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_fee_index_bootstrap() {
        assert_eq!(external_fee_index(0, 0, 0, 0).unwrap(), Wad::ONE);
        // no prior snapshot yet
        assert_eq!(external_fee_index(200, 100, 0, 0).unwrap(), Wad::ONE);
    }

    #[test]
    fn test_external_fee_index_ignores_dilution() {
        // supply and invariant doubled together: no fee growth
        assert_eq!(external_fee_index(400, 200, 200, 100).unwrap(), Wad::ONE);
        // 10% more invariant per share
        assert_eq!(external_fee_index(220, 100, 200, 100).unwrap(), Wad(ONE * 11 / 10));
        // a shrinking ratio is floored
        assert_eq!(external_fee_index(190, 100, 200, 100).unwrap(), Wad::ONE);
    }

    #[test]
    fn test_period_fee_index_blend_and_cap() {
        let rate = Wad(ONE / 10);
        let year = PERIODS_PER_YEAR;
        // a full year at 10% on top of flat CFMM yield
        assert_eq!(period_fee_index(Wad::ONE, rate, year, 10).unwrap(), Wad(ONE * 11 / 10));
        // capped at 1 + 10 * elapsed / year
        let capped = period_fee_index(Wad(20 * ONE), rate, year, 10).unwrap();
        assert_eq!(capped, Wad(11 * ONE));
        assert_eq!(period_fee_index(Wad::ONE, rate, 0, 10).unwrap(), Wad::ONE);
    }
}
