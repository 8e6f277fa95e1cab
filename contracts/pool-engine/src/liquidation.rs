//! Liquidation
//!
//! Three entry points share one pipeline: accrue, re-base, require the loan
//! to be outside margin, write down whatever the haircut collateral cannot
//! cover, settle the remaining debt in LP tokens and release collateral to
//! the liquidator in proportion to the debt settled.
//!
//! `liquidate_external` is the only place untrusted code runs. It is
//! checked purely on balances before and after the callback.

use std::collections::BTreeSet;

use lvpool_common::{
    apply_bps, geometric_mean, limits::MAX_BATCH_SIZE, liquidation_payable, mul_div, pay_loan,
    safe_add, safe_sub, Address, Loan, LoanId, PoolError, PoolEvent, PoolResult, Token, TxType,
};

use crate::external::{Cfmm, ExternalLiquidator, LiquidationContext, TokenBank};
use crate::pool::LendingPool;
use crate::CallContext;

/// Id reported in place of a loan skipped by a batch
pub const SKIPPED_LOAN: LoanId = [0u8; 32];

/// Outcome of a self-funded or batch liquidation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationResult {
    /// Liquidated ids, with [`SKIPPED_LOAN`] for skipped entries
    pub loan_ids: Vec<LoanId>,
    /// Invariant debt settled after the write-down
    pub liquidity: u128,
    /// Collateral value of the liquidated loans, in invariant units
    pub collateral: u128,
    pub write_down: u128,
    /// LP tokens taken from the liquidator
    pub lp_tokens: u128,
    /// Collateral released to the liquidator
    pub tokens_out: Vec<u128>,
}

/// What the pool hands to an external liquidator up front
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalLiquidationRequest {
    /// Collateral sent out of the loan before the callback
    pub amounts: Vec<u128>,
    /// Idle LP tokens lent to the liquidator for the callback
    pub lp_tokens: u128,
    /// Opaque data forwarded to the callback
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalLiquidationResult {
    /// Invariant debt settled
    pub liquidity_paid: u128,
    /// LP tokens returned beyond those lent
    pub lp_received: u128,
    /// LP tokens kept by the pool as the liquidation fee
    pub fee_lp: u128,
    /// LP tokens sent back to the liquidator
    pub refund: u128,
    /// Loan collateral after the callback
    pub tokens_held: Vec<u128>,
}

impl<C: Cfmm + Clone, B: TokenBank + Clone> LendingPool<C, B> {
    /// Liquidate one loan with LP tokens from the caller
    pub fn liquidate_with_lp(
        &mut self,
        ctx: CallContext,
        loan_id: LoanId,
        lp_tokens: u128,
    ) -> PoolResult<LiquidationResult> {
        self.transact(|pool| {
            pool.update_index(ctx.period)?;
            let mut loan = pool.existing_loan(&loan_id)?;
            let debt = loan.touch(pool.state.acc_fee_index)?;
            if debt == 0 {
                return Err(PoolError::NoLiquidityDebt);
            }
            loan.check_no_margin(pool.config.ltv_threshold)?;

            let collateral = loan.held_invariant;
            let payable = liquidation_payable(collateral, pool.config.liquidation_fee_bps)?;
            let (write_down, owed) = pool.state.write_down(payable, debt)?;
            loan.debt_invariant = owed;

            let required = pool.collect_deposit(&ctx.caller, owed, lp_tokens)?;
            pay_loan(&mut pool.state, &mut loan, owed, required)?;
            let tokens_out = pool.seize_collateral(&mut loan, owed, payable, &ctx.caller)?;

            pool.state.sync_totals()?;
            pool.emit_loan(&loan, TxType::LiquidateWithLp, ctx.period);
            pool.store_loan(loan);
            pool.emit(PoolEvent::Liquidation {
                loan_ids: vec![loan_id],
                liquidity: owed,
                collateral,
                write_down,
                op: TxType::LiquidateWithLp,
                period: ctx.period,
            });
            pool.emit_pool(TxType::LiquidateWithLp);

            Ok(LiquidationResult {
                loan_ids: vec![loan_id],
                liquidity: owed,
                collateral,
                write_down,
                lp_tokens: required,
                tokens_out,
            })
        })
    }

    /// Liquidate every eligible loan in `loan_ids` with one aggregate
    /// write-down. Loans without debt or within margin are skipped untouched.
    pub fn batch_liquidations(
        &mut self,
        ctx: CallContext,
        loan_ids: &[LoanId],
        lp_tokens: u128,
    ) -> PoolResult<LiquidationResult> {
        self.transact(|pool| {
            if loan_ids.len() > MAX_BATCH_SIZE {
                return Err(PoolError::InvalidInput {
                    param: "loan_ids",
                    reason: "batch too large",
                });
            }
            let unique: BTreeSet<&LoanId> = loan_ids.iter().collect();
            if unique.len() != loan_ids.len() {
                return Err(PoolError::InvalidInput {
                    param: "loan_ids",
                    reason: "duplicate loan id",
                });
            }
            pool.update_index(ctx.period)?;

            let mut reported = Vec::with_capacity(loan_ids.len());
            let mut included: Vec<Loan> = Vec::new();
            let mut total_debt = 0u128;
            let mut total_collateral = 0u128;
            for loan_id in loan_ids {
                let mut loan = pool.existing_loan(loan_id)?;
                let debt = loan.touch(pool.state.acc_fee_index)?;
                if debt == 0 || loan.check_no_margin(pool.config.ltv_threshold).is_err() {
                    reported.push(SKIPPED_LOAN);
                    continue;
                }
                total_debt = safe_add(total_debt, debt)?;
                total_collateral = safe_add(total_collateral, loan.held_invariant)?;
                reported.push(*loan_id);
                included.push(loan);
            }
            if total_debt == 0 {
                return Err(PoolError::NoLiquidityDebt);
            }

            let payable = liquidation_payable(total_collateral, pool.config.liquidation_fee_bps)?;
            let (write_down, owed) = pool.state.write_down(payable, total_debt)?;
            let required = pool.collect_deposit(&ctx.caller, owed, lp_tokens)?;

            let mut tokens_out = vec![0u128; pool.state.asset_count()];
            let mut owed_left = owed;
            let mut lp_left = required;
            let last = included.len() - 1;
            for (k, mut loan) in included.into_iter().enumerate() {
                // the last loan takes the rounding remainder
                let (loan_owed, loan_lp) = if k == last {
                    (owed_left, lp_left)
                } else {
                    (
                        mul_div(owed, loan.debt_invariant, total_debt)?,
                        mul_div(required, loan.debt_invariant, total_debt)?,
                    )
                };
                owed_left = safe_sub(owed_left, loan_owed)?;
                lp_left = safe_sub(lp_left, loan_lp)?;

                loan.debt_invariant = loan_owed;
                pay_loan(&mut pool.state, &mut loan, loan_owed, loan_lp)?;
                let out = pool.seize_collateral(&mut loan, owed, payable, &ctx.caller)?;
                for (total, amount) in tokens_out.iter_mut().zip(&out) {
                    *total = safe_add(*total, *amount)?;
                }
                pool.emit_loan(&loan, TxType::BatchLiquidation, ctx.period);
                pool.store_loan(loan);
            }

            pool.state.sync_totals()?;
            pool.emit(PoolEvent::Liquidation {
                loan_ids: reported.clone(),
                liquidity: owed,
                collateral: total_collateral,
                write_down,
                op: TxType::BatchLiquidation,
                period: ctx.period,
            });
            pool.emit_pool(TxType::BatchLiquidation);

            Ok(LiquidationResult {
                loan_ids: reported,
                liquidity: owed,
                collateral: total_collateral,
                write_down,
                lp_tokens: required,
                tokens_out,
            })
        })
    }

    /// Liquidate through an untrusted callback.
    ///
    /// The requested collateral and LP tokens are sent to the liquidator,
    /// which must leave the pool with its LP balance intact and no
    /// collateral missing beyond the request. The whole debt is settled in
    /// LP tokens; the liquidation fee may be paid in LP tokens or in
    /// collateral returned beyond the request.
    pub fn liquidate_external(
        &mut self,
        ctx: CallContext,
        loan_id: LoanId,
        request: ExternalLiquidationRequest,
        liquidator: &mut dyn ExternalLiquidator,
    ) -> PoolResult<ExternalLiquidationResult> {
        self.transact(|pool| {
            pool.update_index(ctx.period)?;
            let mut loan = pool.existing_loan(&loan_id)?;
            let debt = loan.touch(pool.state.acc_fee_index)?;
            if debt == 0 {
                return Err(PoolError::NoLiquidityDebt);
            }
            loan.check_no_margin(pool.config.ltv_threshold)?;
            let collateral = loan.held_invariant;

            let asset_count = pool.state.asset_count();
            if request.amounts.len() != asset_count {
                return Err(PoolError::InvalidInput {
                    param: "amounts",
                    reason: "one amount per asset",
                });
            }
            for (held, amount) in loan.tokens_held.iter().zip(&request.amounts) {
                if amount > held {
                    return Err(PoolError::NotEnoughCollateral {
                        available: *held,
                        requested: *amount,
                    });
                }
            }
            if request.lp_tokens > pool.state.idle_lp_tokens {
                return Err(PoolError::ExcessiveBorrowing {
                    requested: request.lp_tokens,
                    available: pool.state.idle_lp_tokens,
                });
            }

            // ===== Call out =====
            let target = liquidator.address();
            let lp_before = pool.bank.balance_of(Token::Lp, &pool.address);
            let assets_before = pool.asset_balances();
            for (i, amount) in request.amounts.iter().enumerate() {
                pool.push(Token::Asset(i as u8), &target, *amount)?;
            }
            pool.push(Token::Lp, &target, request.lp_tokens)?;

            let context = LiquidationContext {
                pool: pool.address,
                loan_id,
                tokens_held: loan.tokens_held.clone(),
                held_invariant: loan.held_invariant,
                debt_invariant: debt,
                liquidation_fee_bps: pool.config.liquidation_fee_bps,
            };
            liquidator.on_liquidation(
                &mut pool.bank,
                &context,
                &request.amounts,
                request.lp_tokens,
                &request.payload,
            )?;

            // ===== Validate balances =====
            let lp_after = pool.bank.balance_of(Token::Lp, &pool.address);
            if lp_after < lp_before {
                return Err(PoolError::WrongLPTokenBalance { before: lp_before, after: lp_after });
            }
            let assets_after = pool.asset_balances();
            let mut new_held = Vec::with_capacity(asset_count);
            let mut returned = Vec::with_capacity(asset_count);
            for i in 0..asset_count {
                let expected = safe_sub(assets_before[i], request.amounts[i])?;
                if assets_after[i] < expected {
                    return Err(PoolError::CollateralShortfall {
                        token: i as u8,
                        expected,
                        actual: assets_after[i],
                    });
                }
                let back = assets_after[i] - expected;
                returned.push(back);
                new_held.push(safe_add(loan.tokens_held[i] - request.amounts[i], back)?);
            }

            // only value paid in counts: LP tokens plus collateral sent
            // back beyond what was taken out
            let lp_received = lp_after - lp_before;
            let lp_value = pool.state.lp_to_invariant(lp_received)?;
            if lp_value < debt {
                return Err(PoolError::LPBalanceShortfall { provided: lp_value, required: debt });
            }
            let fee = apply_bps(debt, pool.config.liquidation_fee_bps)?;
            let required = safe_add(debt, fee)?;
            let provided = safe_add(lp_value, geometric_mean(&returned)?)?;
            if provided < required {
                return Err(PoolError::LPBalanceShortfall { provided, required });
            }

            // ===== Settle =====
            let lp_used = pool.state.invariant_to_lp_up(debt)?.min(lp_received);
            let fee_lp = (lp_received - lp_used).min(pool.state.invariant_to_lp(fee)?);
            let refund = lp_received - lp_used - fee_lp;
            pool.push(Token::Lp, &target, refund)?;

            pay_loan(&mut pool.state, &mut loan, debt, lp_used)?;
            pool.state.idle_lp_tokens = safe_add(pool.state.idle_lp_tokens, fee_lp)?;
            for i in 0..asset_count {
                let balance = safe_sub(pool.state.token_balances[i], request.amounts[i])?;
                pool.state.token_balances[i] = safe_add(balance, returned[i])?;
            }
            loan.tokens_held = new_held;
            loan.refresh_held_invariant()?;
            pool.state.sync_totals()?;

            let tokens_held = loan.tokens_held.clone();
            pool.emit_loan(&loan, TxType::ExternalLiquidation, ctx.period);
            pool.store_loan(loan);
            pool.emit(PoolEvent::Liquidation {
                loan_ids: vec![loan_id],
                liquidity: debt,
                collateral,
                write_down: 0,
                op: TxType::ExternalLiquidation,
                period: ctx.period,
            });
            pool.emit_pool(TxType::ExternalLiquidation);

            Ok(ExternalLiquidationResult {
                liquidity_paid: debt,
                lp_received,
                fee_lp,
                refund,
                tokens_held,
            })
        })
    }

    // ============ Internal Helpers ============

    /// Take the LP tokens covering `owed` from the liquidator, failing if
    /// `deposited` is short. Returns the LP tokens taken.
    fn collect_deposit(&mut self, from: &Address, owed: u128, deposited: u128) -> PoolResult<u128> {
        let required = self.state.invariant_to_lp_up(owed)?;
        if deposited < required {
            return Err(PoolError::InsufficientDeposit { deposited, required });
        }
        self.pull(Token::Lp, from, required)?;
        Ok(required)
    }

    /// Release collateral in the ratio `owed : payable`, all of it once the
    /// debt was written down to the collateral value
    fn seize_collateral(
        &mut self,
        loan: &mut Loan,
        owed: u128,
        payable: u128,
        to: &Address,
    ) -> PoolResult<Vec<u128>> {
        let mut out = Vec::with_capacity(loan.tokens_held.len());
        for i in 0..loan.tokens_held.len() {
            let held = loan.tokens_held[i];
            let amount = if owed >= payable { held } else { mul_div(held, owed, payable)? };
            loan.tokens_held[i] -= amount;
            self.state.token_balances[i] = safe_sub(self.state.token_balances[i], amount)?;
            self.push(Token::Asset(i as u8), to, amount)?;
            out.push(amount);
        }
        loan.refresh_held_invariant()?;
        Ok(out)
    }

    fn asset_balances(&self) -> Vec<u128> {
        (0..self.state.asset_count())
            .map(|i| self.bank.balance_of(Token::Asset(i as u8), &self.address))
            .collect()
    }
}
