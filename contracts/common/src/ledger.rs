//! Pool and Loan Ledgers
//!
//! Bookkeeping on [`PoolState`] and [`Loan`]: the LP/invariant exchange
//! rate, total recomputation, write-downs, lazy interest on loans and
//! payment pro-rating. Every function here is in-memory only; token
//! movement belongs to the engine.

use crate::errors::{PoolError, PoolResult};
use crate::math::{geometric_mean, has_margin, mul_div, mul_div_up, safe_add, Wad};
use crate::types::{Loan, PoolState};

// ============ Pool Ledger ============

impl PoolState {
    /// LP tokens to invariant units at the last observed CFMM rate
    pub fn lp_to_invariant(&self, lp_tokens: u128) -> PoolResult<u128> {
        if self.last_external_supply == 0 {
            return Ok(0);
        }
        mul_div(lp_tokens, self.last_external_invariant, self.last_external_supply)
    }

    /// Invariant units to LP tokens, truncating
    pub fn invariant_to_lp(&self, invariant: u128) -> PoolResult<u128> {
        if self.last_external_invariant == 0 {
            return Ok(0);
        }
        mul_div(invariant, self.last_external_supply, self.last_external_invariant)
    }

    /// Invariant units to LP tokens, rounding up
    pub fn invariant_to_lp_up(&self, invariant: u128) -> PoolResult<u128> {
        if self.last_external_invariant == 0 {
            return Ok(0);
        }
        mul_div_up(invariant, self.last_external_supply, self.last_external_invariant)
    }

    /// Recompute the derived totals from `idle_lp_tokens` and
    /// `borrowed_invariant` at the current exchange rate
    pub fn sync_totals(&mut self) -> PoolResult<()> {
        self.borrowed_lp_tokens_plus_interest = self.invariant_to_lp(self.borrowed_invariant)?;
        // principal can never exceed what is owed
        if self.borrowed_lp_tokens > self.borrowed_lp_tokens_plus_interest {
            self.borrowed_lp_tokens = self.borrowed_lp_tokens_plus_interest;
        }
        self.lp_invariant = self.lp_to_invariant(self.idle_lp_tokens)?;
        self.total_invariant = safe_add(self.lp_invariant, self.borrowed_invariant)?;
        self.lp_token_total = safe_add(self.idle_lp_tokens, self.borrowed_lp_tokens_plus_interest)?;
        Ok(())
    }

    /// Absorb the part of `owed` that `payable` cannot cover.
    ///
    /// Returns `(write_down_amount, owed_after)`. The loss comes out of
    /// `borrowed_invariant` and, converted at the CFMM rate, out of
    /// `borrowed_lp_tokens_plus_interest`.
    pub fn write_down(&mut self, payable: u128, owed: u128) -> PoolResult<(u128, u128)> {
        if payable >= owed {
            return Ok((0, owed));
        }
        let amount = owed - payable;
        let lp_amount = self.invariant_to_lp(amount)?;
        self.borrowed_invariant = self.borrowed_invariant.saturating_sub(amount);
        self.borrowed_lp_tokens_plus_interest =
            self.borrowed_lp_tokens_plus_interest.saturating_sub(lp_amount);
        if self.borrowed_lp_tokens > self.borrowed_lp_tokens_plus_interest {
            self.borrowed_lp_tokens = self.borrowed_lp_tokens_plus_interest;
        }
        Ok((amount, payable))
    }

    /// Cross-check the aggregate counters
    pub fn check_invariants(&self) -> PoolResult<()> {
        if self.total_invariant != safe_add(self.lp_invariant, self.borrowed_invariant)? {
            return Err(PoolError::InvariantViolation { check: "total_invariant" });
        }
        let lp_expected = safe_add(self.idle_lp_tokens, self.borrowed_lp_tokens_plus_interest)?;
        if self.lp_token_total != lp_expected {
            return Err(PoolError::InvariantViolation { check: "lp_token_total" });
        }
        if self.borrowed_lp_tokens_plus_interest < self.borrowed_lp_tokens {
            return Err(PoolError::InvariantViolation { check: "borrowed_plus_interest" });
        }
        if self.acc_fee_index < Wad::ONE {
            return Err(PoolError::InvariantViolation { check: "acc_fee_index" });
        }
        Ok(())
    }
}

// ============ Loan Ledger ============

impl Loan {
    /// Debt as of `acc_fee_index`, without mutating the loan
    pub fn prospective_debt(&self, acc_fee_index: Wad) -> PoolResult<u128> {
        if self.rate_index.is_zero() || self.debt_invariant == 0 {
            return Ok(self.debt_invariant);
        }
        mul_div(self.debt_invariant, acc_fee_index.raw(), self.rate_index.raw())
    }

    /// Fold accrued interest into `debt_invariant` and re-base the loan
    pub fn touch(&mut self, acc_fee_index: Wad) -> PoolResult<u128> {
        self.debt_invariant = self.prospective_debt(acc_fee_index)?;
        self.rate_index = acc_fee_index;
        Ok(self.debt_invariant)
    }

    /// Recompute `held_invariant` from the held amounts
    pub fn refresh_held_invariant(&mut self) -> PoolResult<u128> {
        self.held_invariant = geometric_mean(&self.tokens_held)?;
        Ok(self.held_invariant)
    }

    pub fn check_margin(&self, ltv_threshold: Wad) -> PoolResult<()> {
        if has_margin(self.debt_invariant, self.held_invariant, ltv_threshold) {
            Ok(())
        } else {
            Err(PoolError::Margin { debt: self.debt_invariant, collateral: self.held_invariant })
        }
    }

    /// Guard for liquidation entry: fails while the loan is healthy
    pub fn check_no_margin(&self, ltv_threshold: Wad) -> PoolResult<()> {
        if has_margin(self.debt_invariant, self.held_invariant, ltv_threshold) {
            Err(PoolError::HasMargin { debt: self.debt_invariant, collateral: self.held_invariant })
        } else {
            Ok(())
        }
    }

    pub fn check_invariants(&self) -> PoolResult<()> {
        if (self.debt_lp_tokens == 0) != (self.debt_invariant == 0) {
            return Err(PoolError::InvariantViolation { check: "loan_debt_tokens" });
        }
        Ok(())
    }
}

// ============ Payments ============

/// Apply a payment of `liquidity` invariant units against `loan`.
///
/// `lp_tokens` is what actually came back into the pool and is added to
/// idle liquidity. Principal and initial debt are released pro rata to the
/// fraction of debt settled. Returns the LP principal released.
pub fn pay_loan(
    state: &mut PoolState,
    loan: &mut Loan,
    liquidity: u128,
    lp_tokens: u128,
) -> PoolResult<u128> {
    let liquidity = liquidity.min(loan.debt_invariant);
    let full = liquidity == loan.debt_invariant;

    let (principal_lp, init_paid) = if full {
        (loan.debt_lp_tokens, loan.init_debt_invariant)
    } else {
        (
            mul_div(loan.debt_lp_tokens, liquidity, loan.debt_invariant)?,
            mul_div(loan.init_debt_invariant, liquidity, loan.debt_invariant)?,
        )
    };

    state.borrowed_invariant = state.borrowed_invariant.saturating_sub(liquidity);
    state.borrowed_lp_tokens = state.borrowed_lp_tokens.saturating_sub(principal_lp);
    state.idle_lp_tokens = safe_add(state.idle_lp_tokens, lp_tokens)?;

    if full {
        loan.debt_invariant = 0;
        loan.debt_lp_tokens = 0;
        loan.init_debt_invariant = 0;
    } else {
        loan.debt_invariant -= liquidity;
        loan.debt_lp_tokens -= principal_lp;
        loan.init_debt_invariant -= init_paid;
    }
    Ok(principal_lp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::precision::ONE;

    /// Pool quoting 2 invariant units per LP token
    fn pool_at_rate_two() -> PoolState {
        let mut state = PoolState::new(2);
        state.last_external_invariant = 200 * ONE;
        state.last_external_supply = 100 * ONE;
        state
    }

    #[test]
    fn test_exchange_rate_conversions() {
        let state = pool_at_rate_two();
        assert_eq!(state.lp_to_invariant(10).unwrap(), 20);
        assert_eq!(state.invariant_to_lp(20).unwrap(), 10);
        assert_eq!(state.invariant_to_lp(21).unwrap(), 10);
        assert_eq!(state.invariant_to_lp_up(21).unwrap(), 11);

        let empty = PoolState::new(2);
        assert_eq!(empty.lp_to_invariant(10).unwrap(), 0);
        assert_eq!(empty.invariant_to_lp(10).unwrap(), 0);
    }

    #[test]
    fn test_sync_totals() {
        let mut state = pool_at_rate_two();
        state.idle_lp_tokens = 100;
        state.borrowed_invariant = 60;
        state.borrowed_lp_tokens = 25;
        state.sync_totals().unwrap();

        assert_eq!(state.borrowed_lp_tokens_plus_interest, 30);
        assert_eq!(state.lp_invariant, 200);
        assert_eq!(state.total_invariant, 260);
        assert_eq!(state.lp_token_total, 130);
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn test_write_down_not_needed() {
        let mut state = pool_at_rate_two();
        state.borrowed_invariant = 500;
        assert_eq!(state.write_down(600, 500).unwrap(), (0, 500));
        assert_eq!(state.borrowed_invariant, 500);
    }

    #[test]
    fn test_write_down_shortfall_at_rate_two() {
        let mut state = pool_at_rate_two();
        state.borrowed_invariant = 500 * ONE;
        state.borrowed_lp_tokens = 240 * ONE;
        state.sync_totals().unwrap();
        assert_eq!(state.borrowed_lp_tokens_plus_interest, 250 * ONE);

        // 487.5 collateral at a 2.5% haircut against 500 owed
        let payable = 4_753_125 * ONE / 10_000;
        let (amount, owed_after) = state.write_down(payable, 500 * ONE).unwrap();

        assert_eq!(amount, 246_875 * ONE / 10_000);
        assert_eq!(owed_after, payable);
        assert_eq!(state.borrowed_invariant, 500 * ONE - amount);
        // half the write-down comes off the plus-interest balance
        assert_eq!(state.borrowed_lp_tokens_plus_interest, 250 * ONE - amount / 2);
        assert_eq!(state.borrowed_lp_tokens, state.borrowed_lp_tokens_plus_interest);
    }

    #[test]
    fn test_check_invariants_detects_drift() {
        let mut state = pool_at_rate_two();
        state.idle_lp_tokens = 10;
        state.sync_totals().unwrap();
        state.lp_token_total += 1;
        assert_eq!(
            state.check_invariants(),
            Err(PoolError::InvariantViolation { check: "lp_token_total" })
        );
    }

    #[test]
    fn test_touch_accrues_once() {
        let mut loan = Loan::new([1u8; 32], [2u8; 32], [0u8; 32], 2, Wad::ONE, 0);
        loan.debt_invariant = 1_000;
        loan.debt_lp_tokens = 500;

        let acc = Wad(ONE * 11 / 10);
        assert_eq!(loan.prospective_debt(acc).unwrap(), 1_100);
        assert_eq!(loan.touch(acc).unwrap(), 1_100);
        assert_eq!(loan.rate_index, acc);
        // same index again is a no-op
        assert_eq!(loan.touch(acc).unwrap(), 1_100);
    }

    #[test]
    fn test_margin_checks() {
        let mut loan = Loan::new([1u8; 32], [2u8; 32], [0u8; 32], 2, Wad::ONE, 0);
        loan.tokens_held = vec![400, 1_600];
        loan.refresh_held_invariant().unwrap();
        assert_eq!(loan.held_invariant, 800);

        let ltv = Wad(8 * ONE / 10);
        loan.debt_invariant = 200;
        assert!(loan.check_margin(ltv).is_ok());
        assert_eq!(
            loan.check_no_margin(ltv),
            Err(PoolError::HasMargin { debt: 200, collateral: 800 })
        );

        loan.debt_invariant = 641;
        assert_eq!(loan.check_margin(ltv), Err(PoolError::Margin { debt: 641, collateral: 800 }));
        assert!(loan.check_no_margin(ltv).is_ok());
    }

    #[test]
    fn test_pay_loan_partial_then_full() {
        let mut state = pool_at_rate_two();
        state.borrowed_invariant = 1_200;
        state.borrowed_lp_tokens = 500;

        let mut loan = Loan::new([1u8; 32], [2u8; 32], [0u8; 32], 2, Wad::ONE, 0);
        loan.debt_invariant = 1_200;
        loan.init_debt_invariant = 1_000;
        loan.debt_lp_tokens = 500;

        let released = pay_loan(&mut state, &mut loan, 300, 150).unwrap();
        assert_eq!(released, 125);
        assert_eq!(loan.debt_invariant, 900);
        assert_eq!(loan.init_debt_invariant, 750);
        assert_eq!(loan.debt_lp_tokens, 375);
        assert_eq!(state.borrowed_invariant, 900);
        assert_eq!(state.idle_lp_tokens, 150);

        // overpayment is capped at the outstanding debt
        pay_loan(&mut state, &mut loan, 5_000, 450).unwrap();
        assert_eq!(loan.debt_invariant, 0);
        assert_eq!(loan.debt_lp_tokens, 0);
        assert_eq!(loan.init_debt_invariant, 0);
        assert_eq!(state.borrowed_lp_tokens, 0);
        assert!(loan.check_invariants().is_ok());
    }
}
