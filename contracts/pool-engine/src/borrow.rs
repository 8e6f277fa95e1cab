//! Borrowing, repayment and collateral management
//!
//! Every operation accrues first, re-bases the loan, applies its change
//! and finishes with a margin check on the loan.

use lvpool_common::{
    apply_bps, mul_div_up, pay_loan, safe_add, safe_sub, utilization_rate, Address, Loan,
    LoanId, PoolError, PoolResult, Token, TxType,
};

use crate::external::{Cfmm, TokenBank};
use crate::pool::LendingPool;
use crate::CallContext;

/// Outcome of [`LendingPool::borrow_liquidity`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorrowResult {
    /// Invariant borrowed, before the origination fee
    pub liquidity: u128,
    /// Origination fee added to the debt, in invariant units
    pub fee: u128,
    pub lp_tokens: u128,
    /// Underlying assets added to the loan's collateral
    pub amounts: Vec<u128>,
}

/// Outcome of a repayment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepayResult {
    /// Invariant debt settled
    pub liquidity_paid: u128,
    /// LP tokens that entered idle liquidity
    pub lp_tokens_paid: u128,
    /// LP tokens returned to the caller
    pub refund: u128,
    /// Collateral spent on the repayment
    pub amounts: Vec<u128>,
}

impl<C: Cfmm + Clone, B: TokenBank + Clone> LendingPool<C, B> {
    /// Pull collateral from the caller into the loan
    pub fn increase_collateral(
        &mut self,
        ctx: CallContext,
        loan_id: LoanId,
        amounts: &[u128],
    ) -> PoolResult<Vec<u128>> {
        self.transact(|pool| {
            pool.update_index(ctx.period)?;
            let mut loan = pool.owned_loan(&loan_id, &ctx.caller)?;
            loan.touch(pool.state.acc_fee_index)?;
            pool.check_amounts(amounts)?;

            for (i, amount) in amounts.iter().enumerate() {
                pool.pull(Token::Asset(i as u8), &ctx.caller, *amount)?;
                loan.tokens_held[i] = safe_add(loan.tokens_held[i], *amount)?;
                pool.state.token_balances[i] = safe_add(pool.state.token_balances[i], *amount)?;
            }
            loan.refresh_held_invariant()?;

            // adding collateral never needs a margin check
            Ok(pool.record_loan(loan, TxType::IncreaseCollateral, ctx.period))
        })
    }

    /// Send collateral from the loan to `to`, keeping the loan within margin
    pub fn decrease_collateral(
        &mut self,
        ctx: CallContext,
        loan_id: LoanId,
        amounts: &[u128],
        to: Address,
    ) -> PoolResult<Vec<u128>> {
        self.transact(|pool| {
            pool.update_index(ctx.period)?;
            let mut loan = pool.owned_loan(&loan_id, &ctx.caller)?;
            loan.touch(pool.state.acc_fee_index)?;
            pool.check_amounts(amounts)?;

            for (i, amount) in amounts.iter().enumerate() {
                if *amount > loan.tokens_held[i] {
                    return Err(PoolError::NotEnoughCollateral {
                        available: loan.tokens_held[i],
                        requested: *amount,
                    });
                }
                let tracked = pool.state.token_balances[i];
                let actual = pool.bank.balance_of(Token::Asset(i as u8), &pool.address);
                if *amount > tracked.min(actual) {
                    return Err(PoolError::NotEnoughBalance {
                        available: tracked.min(actual),
                        requested: *amount,
                    });
                }
                loan.tokens_held[i] -= amount;
                pool.state.token_balances[i] -= amount;
                pool.push(Token::Asset(i as u8), &to, *amount)?;
            }
            loan.refresh_held_invariant()?;

            pool.finish_loan(loan, TxType::DecreaseCollateral, ctx.period)
        })
    }

    /// Borrow `lp_tokens` of idle liquidity. The LP tokens are burned at the
    /// CFMM and the underlying assets become loan collateral.
    pub fn borrow_liquidity(
        &mut self,
        ctx: CallContext,
        loan_id: LoanId,
        lp_tokens: u128,
    ) -> PoolResult<BorrowResult> {
        self.transact(|pool| {
            pool.update_index(ctx.period)?;
            let mut loan = pool.owned_loan(&loan_id, &ctx.caller)?;
            loan.touch(pool.state.acc_fee_index)?;

            if lp_tokens == 0 {
                return Err(PoolError::ZeroAmount);
            }
            if lp_tokens > pool.state.idle_lp_tokens {
                return Err(PoolError::ExcessiveBorrowing {
                    requested: lp_tokens,
                    available: pool.state.idle_lp_tokens,
                });
            }

            let liquidity = pool.state.lp_to_invariant(lp_tokens)?;
            let fee = pool.origination_fee(liquidity)?;
            let debt = safe_add(liquidity, fee)?;
            let new_debt = safe_add(loan.debt_invariant, debt)?;
            if new_debt < pool.config.min_borrow {
                return Err(PoolError::MinBorrow {
                    amount: new_debt,
                    minimum: pool.config.min_borrow,
                });
            }

            let cfmm = pool.cfmm.address();
            let pool_address = pool.address;
            pool.push(Token::Lp, &cfmm, lp_tokens)?;
            let amounts = pool.cfmm.burn(&mut pool.bank, &pool_address)?;
            for (i, amount) in amounts.iter().enumerate() {
                loan.tokens_held[i] = safe_add(loan.tokens_held[i], *amount)?;
                pool.state.token_balances[i] = safe_add(pool.state.token_balances[i], *amount)?;
            }

            pool.state.idle_lp_tokens -= lp_tokens;
            pool.state.borrowed_lp_tokens = safe_add(pool.state.borrowed_lp_tokens, lp_tokens)?;
            pool.state.borrowed_invariant = safe_add(pool.state.borrowed_invariant, debt)?;

            loan.debt_invariant = new_debt;
            loan.init_debt_invariant = safe_add(loan.init_debt_invariant, liquidity)?;
            loan.debt_lp_tokens = safe_add(loan.debt_lp_tokens, lp_tokens)?;
            loan.refresh_held_invariant()?;

            pool.refresh_external();
            pool.state.sync_totals()?;
            pool.finish_loan(loan, TxType::BorrowLiquidity, ctx.period)?;
            pool.emit_pool(TxType::BorrowLiquidity);

            Ok(BorrowResult { liquidity, fee, lp_tokens, amounts })
        })
    }

    /// Repay up to `liquidity` invariant units out of the loan's own
    /// collateral, deposited into the CFMM for LP tokens
    pub fn repay_liquidity(
        &mut self,
        ctx: CallContext,
        loan_id: LoanId,
        liquidity: u128,
    ) -> PoolResult<RepayResult> {
        self.transact(|pool| {
            pool.update_index(ctx.period)?;
            let mut loan = pool.owned_loan(&loan_id, &ctx.caller)?;
            let debt = loan.touch(pool.state.acc_fee_index)?;

            let paying = pool.repayable(debt, liquidity)?;
            let lp_needed = pool.state.invariant_to_lp_up(paying)?;
            let reserves = pool.cfmm.reserves();
            let supply = pool.cfmm.total_supply();

            let cfmm = pool.cfmm.address();
            let mut amounts = Vec::with_capacity(reserves.len());
            for (i, reserve) in reserves.iter().enumerate() {
                let amount = mul_div_up(lp_needed, *reserve, supply)?;
                if amount > loan.tokens_held[i] {
                    return Err(PoolError::NotEnoughCollateral {
                        available: loan.tokens_held[i],
                        requested: amount,
                    });
                }
                loan.tokens_held[i] -= amount;
                pool.state.token_balances[i] = safe_sub(pool.state.token_balances[i], amount)?;
                pool.push(Token::Asset(i as u8), &cfmm, amount)?;
                amounts.push(amount);
            }
            let pool_address = pool.address;
            let minted = pool.cfmm.mint(&mut pool.bank, &pool_address)?;
            pool.refresh_external();

            pay_loan(&mut pool.state, &mut loan, paying, minted)?;
            loan.refresh_held_invariant()?;
            pool.state.sync_totals()?;
            pool.finish_loan(loan, TxType::RepayLiquidity, ctx.period)?;
            pool.emit_pool(TxType::RepayLiquidity);

            Ok(RepayResult { liquidity_paid: paying, lp_tokens_paid: minted, refund: 0, amounts })
        })
    }

    /// Repay with LP tokens from the caller. LP tokens beyond the
    /// outstanding debt are refunded.
    pub fn repay_liquidity_with_lp(
        &mut self,
        ctx: CallContext,
        loan_id: LoanId,
        lp_tokens: u128,
    ) -> PoolResult<RepayResult> {
        self.transact(|pool| {
            pool.update_index(ctx.period)?;
            let mut loan = pool.owned_loan(&loan_id, &ctx.caller)?;
            let debt = loan.touch(pool.state.acc_fee_index)?;

            let offered = pool.state.lp_to_invariant(lp_tokens)?;
            let paying = pool.repayable(debt, offered)?;
            let lp_used = if paying == debt {
                pool.state.invariant_to_lp_up(debt)?.min(lp_tokens)
            } else {
                lp_tokens
            };
            let refund = lp_tokens - lp_used;

            pool.pull(Token::Lp, &ctx.caller, lp_tokens)?;
            pool.push(Token::Lp, &ctx.caller, refund)?;

            pay_loan(&mut pool.state, &mut loan, paying, lp_used)?;
            pool.state.sync_totals()?;
            pool.finish_loan(loan, TxType::RepayLiquidityWithLp, ctx.period)?;
            pool.emit_pool(TxType::RepayLiquidityWithLp);

            Ok(RepayResult {
                liquidity_paid: paying,
                lp_tokens_paid: lp_used,
                refund,
                amounts: Vec::new(),
            })
        })
    }

    /// Swap `amount_in` of held `token_in` for `token_out` at the CFMM.
    /// Debt is unchanged; swap fees can still cost margin.
    pub fn rebalance_collateral(
        &mut self,
        ctx: CallContext,
        loan_id: LoanId,
        token_in: u8,
        token_out: u8,
        amount_in: u128,
    ) -> PoolResult<u128> {
        self.transact(|pool| {
            pool.update_index(ctx.period)?;
            let mut loan = pool.owned_loan(&loan_id, &ctx.caller)?;
            loan.touch(pool.state.acc_fee_index)?;

            let (i, o) = (token_in as usize, token_out as usize);
            if i >= loan.tokens_held.len() || o >= loan.tokens_held.len() {
                return Err(PoolError::InvalidInput {
                    param: "token",
                    reason: "unknown asset index",
                });
            }
            if amount_in == 0 {
                return Err(PoolError::ZeroAmount);
            }
            if amount_in > loan.tokens_held[i] {
                return Err(PoolError::NotEnoughCollateral {
                    available: loan.tokens_held[i],
                    requested: amount_in,
                });
            }

            let cfmm = pool.cfmm.address();
            let pool_address = pool.address;
            pool.push(Token::Asset(token_in), &cfmm, amount_in)?;
            let amount_out = pool.cfmm.swap(&mut pool.bank, token_in, token_out, &pool_address)?;

            loan.tokens_held[i] -= amount_in;
            loan.tokens_held[o] = safe_add(loan.tokens_held[o], amount_out)?;
            pool.state.token_balances[i] = safe_sub(pool.state.token_balances[i], amount_in)?;
            pool.state.token_balances[o] = safe_add(pool.state.token_balances[o], amount_out)?;
            loan.refresh_held_invariant()?;

            pool.refresh_external();
            pool.state.sync_totals()?;
            pool.finish_loan(loan, TxType::RebalanceCollateral, ctx.period)?;
            pool.emit_pool(TxType::RebalanceCollateral);
            Ok(amount_out)
        })
    }

    // ============ Internal Helpers ============

    /// Origination fee on a new borrow of `liquidity`, priced at the higher
    /// of post-borrow utilization and the utilization EMA
    fn origination_fee(&self, liquidity: u128) -> PoolResult<u128> {
        let lp_invariant = self.state.lp_invariant.saturating_sub(liquidity);
        let borrowed = safe_add(self.state.borrowed_invariant, liquidity)?;
        let utilization = utilization_rate(lp_invariant, borrowed)?.max(self.state.ema_utilization);
        let fee_bps = self.config.origination.fee_bps(utilization);
        apply_bps(liquidity, fee_bps)
    }

    /// Portion of `debt` a payment of `offered` settles. A partial payment
    /// may not leave a remainder below the minimum borrow size.
    fn repayable(&self, debt: u128, offered: u128) -> PoolResult<u128> {
        if debt == 0 {
            return Err(PoolError::NoLiquidityDebt);
        }
        if offered == 0 {
            return Err(PoolError::ZeroAmount);
        }
        let paying = offered.min(debt);
        let remaining = debt - paying;
        if remaining > 0 && remaining < self.config.min_borrow {
            return Err(PoolError::MinBorrow { amount: remaining, minimum: self.config.min_borrow });
        }
        Ok(paying)
    }

    fn check_amounts(&self, amounts: &[u128]) -> PoolResult<()> {
        if amounts.len() != self.state.asset_count() {
            return Err(PoolError::InvalidInput {
                param: "amounts",
                reason: "one amount per asset",
            });
        }
        Ok(())
    }

    /// Margin-check, store and snapshot a mutated loan
    fn finish_loan(&mut self, loan: Loan, op: TxType, period: u64) -> PoolResult<Vec<u128>> {
        loan.check_margin(self.config.ltv_threshold)?;
        Ok(self.record_loan(loan, op, period))
    }

    fn record_loan(&mut self, loan: Loan, op: TxType, period: u64) -> Vec<u128> {
        let held = loan.tokens_held.clone();
        self.emit_loan(&loan, op, period);
        self.store_loan(loan);
        held
    }
}
