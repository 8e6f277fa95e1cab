//! Vault accounting
//!
//! Share-based deposits and withdrawals over the pool's LP tokens.
//! `total_assets` reads the stored balance sheet only, so fee growth inside
//! the current period is never visible to a depositor in that period.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use lvpool_common::{
    mul_div, mul_div_up, safe_add, safe_sub, vault::DEAD_HOLDER, Address, PoolError, PoolEvent,
    PoolResult, Token, TxType,
};
use serde::{Deserialize, Serialize};

use crate::external::{Cfmm, TokenBank};
use crate::pool::LendingPool;
use crate::CallContext;

// ============ Share Ledger ============

/// Vault share balances. Transfers and allowances live outside the engine.
#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    BorshSerialize,
    BorshDeserialize,
)]
pub struct ShareLedger {
    total_supply: u128,
    balances: BTreeMap<Address, u128>,
}

impl ShareLedger {
    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }

    pub fn balance_of(&self, holder: &Address) -> u128 {
        self.balances.get(holder).copied().unwrap_or(0)
    }

    pub fn mint(&mut self, to: &Address, shares: u128) -> PoolResult<()> {
        self.total_supply = safe_add(self.total_supply, shares)?;
        let balance = safe_add(self.balance_of(to), shares)?;
        self.balances.insert(*to, balance);
        Ok(())
    }

    pub fn burn(&mut self, from: &Address, shares: u128) -> PoolResult<()> {
        let balance = self.balance_of(from);
        if shares > balance {
            return Err(PoolError::ExcessiveSpend { requested: shares, available: balance });
        }
        self.balances.insert(*from, balance - shares);
        self.total_supply = safe_sub(self.total_supply, shares)?;
        Ok(())
    }
}

// ============ Vault Operations ============

impl<C: Cfmm + Clone, B: TokenBank + Clone> LendingPool<C, B> {
    /// Idle LP tokens plus borrowed invariant at the stored exchange rate
    pub fn total_assets(&self) -> PoolResult<u128> {
        let borrowed = self.state.invariant_to_lp(self.state.borrowed_invariant)?;
        safe_add(self.state.idle_lp_tokens, borrowed)
    }

    pub fn total_supply(&self) -> u128 {
        self.shares.total_supply()
    }

    pub fn balance_of(&self, holder: &Address) -> u128 {
        self.shares.balance_of(holder)
    }

    pub fn convert_to_shares(&self, assets: u128) -> PoolResult<u128> {
        let supply = self.shares.total_supply();
        let total = self.total_assets()?;
        if supply == 0 || total == 0 {
            return Ok(assets);
        }
        mul_div(assets, supply, total)
    }

    pub fn convert_to_assets(&self, shares: u128) -> PoolResult<u128> {
        let supply = self.shares.total_supply();
        if supply == 0 {
            return Ok(shares);
        }
        mul_div(shares, self.total_assets()?, supply)
    }

    pub fn preview_deposit(&self, assets: u128) -> PoolResult<u128> {
        self.convert_to_shares(assets)
    }

    /// Assets needed to mint `shares`, rounded up. The first mint also
    /// pays for the retired shares.
    pub fn preview_mint(&self, shares: u128) -> PoolResult<u128> {
        let supply = self.shares.total_supply();
        if supply == 0 {
            return safe_add(shares, self.config.dead_shares);
        }
        mul_div_up(shares, self.total_assets()?, supply)
    }

    /// Shares burned to withdraw `assets`, rounded up
    pub fn preview_withdraw(&self, assets: u128) -> PoolResult<u128> {
        let supply = self.shares.total_supply();
        let total = self.total_assets()?;
        if supply == 0 || total == 0 {
            return Ok(assets);
        }
        mul_div_up(assets, supply, total)
    }

    pub fn preview_redeem(&self, shares: u128) -> PoolResult<u128> {
        self.convert_to_assets(shares)
    }

    /// Assets `owner` can withdraw now, bounded by idle liquidity
    pub fn max_withdraw(&self, owner: &Address) -> PoolResult<u128> {
        let assets = self.convert_to_assets(self.shares.balance_of(owner))?;
        Ok(assets.min(self.state.idle_lp_tokens))
    }

    /// Shares `owner` can redeem now, bounded by idle liquidity
    pub fn max_redeem(&self, owner: &Address) -> PoolResult<u128> {
        let idle_shares = self.convert_to_shares(self.state.idle_lp_tokens)?;
        Ok(self.shares.balance_of(owner).min(idle_shares))
    }

    /// Deposit LP tokens for shares
    pub fn deposit(
        &mut self,
        ctx: CallContext,
        assets: u128,
        receiver: Address,
    ) -> PoolResult<u128> {
        self.transact(|pool| {
            pool.update_index(ctx.period)?;
            if assets == 0 {
                return Err(PoolError::ZeroAssets);
            }
            let shares = pool.convert_to_shares(assets)?;
            pool.pull(Token::Lp, &ctx.caller, assets)?;
            pool.finish_deposit(&ctx, &receiver, assets, shares, TxType::Deposit)
        })
    }

    /// Mint exactly `shares`, pulling the LP tokens they cost.
    /// Returns the assets paid.
    pub fn mint(&mut self, ctx: CallContext, shares: u128, receiver: Address) -> PoolResult<u128> {
        self.transact(|pool| {
            pool.update_index(ctx.period)?;
            if shares == 0 {
                return Err(PoolError::ZeroShares);
            }
            let assets = pool.preview_mint(shares)?;
            let gross = if pool.shares.total_supply() == 0 {
                safe_add(shares, pool.config.dead_shares)?
            } else {
                shares
            };
            pool.pull(Token::Lp, &ctx.caller, assets)?;
            pool.finish_deposit(&ctx, &receiver, assets, gross, TxType::Deposit)?;
            Ok(assets)
        })
    }

    /// Burn the caller's shares for exactly `assets` LP tokens.
    /// Returns the shares burned.
    pub fn withdraw(
        &mut self,
        ctx: CallContext,
        assets: u128,
        receiver: Address,
    ) -> PoolResult<u128> {
        self.transact(|pool| {
            pool.update_index(ctx.period)?;
            if assets == 0 {
                return Err(PoolError::ZeroAssets);
            }
            let shares = pool.preview_withdraw(assets)?;
            pool.release_assets(&ctx, &receiver, assets, shares)?;
            pool.push(Token::Lp, &receiver, assets)?;
            pool.emit_pool(TxType::Withdraw);
            Ok(shares)
        })
    }

    /// Burn exactly `shares` of the caller for LP tokens. Returns the assets paid.
    pub fn redeem(
        &mut self,
        ctx: CallContext,
        shares: u128,
        receiver: Address,
    ) -> PoolResult<u128> {
        self.transact(|pool| {
            pool.update_index(ctx.period)?;
            if shares == 0 {
                return Err(PoolError::ZeroShares);
            }
            let assets = pool.convert_to_assets(shares)?;
            if assets == 0 {
                return Err(PoolError::ZeroAssets);
            }
            pool.release_assets(&ctx, &receiver, assets, shares)?;
            pool.push(Token::Lp, &receiver, assets)?;
            pool.emit_pool(TxType::Withdraw);
            Ok(assets)
        })
    }

    /// Deposit underlying assets: they are minted into LP tokens at the
    /// CFMM and the LP tokens deposited for shares
    pub fn deposit_reserves(
        &mut self,
        ctx: CallContext,
        amounts: &[u128],
        receiver: Address,
    ) -> PoolResult<u128> {
        self.transact(|pool| {
            pool.update_index(ctx.period)?;
            if amounts.len() != pool.state.asset_count() {
                return Err(PoolError::InvalidInput {
                    param: "amounts",
                    reason: "one amount per asset",
                });
            }
            let cfmm = pool.cfmm.address();
            for (i, amount) in amounts.iter().enumerate() {
                pool.bank.transfer(Token::Asset(i as u8), &ctx.caller, &cfmm, *amount)?;
            }
            let pool_address = pool.address;
            let assets = pool.cfmm.mint(&mut pool.bank, &pool_address)?;

            // shares priced before the CFMM snapshot moves
            let shares = pool.convert_to_shares(assets)?;
            pool.refresh_external();
            pool.finish_deposit(&ctx, &receiver, assets, shares, TxType::DepositReserves)
        })
    }

    /// Withdraw `assets` LP tokens unwound through the CFMM, paying the
    /// underlying assets to `receiver`. Returns the amounts and shares burned.
    pub fn withdraw_reserves(
        &mut self,
        ctx: CallContext,
        assets: u128,
        receiver: Address,
    ) -> PoolResult<(Vec<u128>, u128)> {
        self.transact(|pool| {
            pool.update_index(ctx.period)?;
            if assets == 0 {
                return Err(PoolError::ZeroAssets);
            }
            let shares = pool.preview_withdraw(assets)?;
            pool.release_assets(&ctx, &receiver, assets, shares)?;

            let cfmm = pool.cfmm.address();
            pool.push(Token::Lp, &cfmm, assets)?;
            let amounts = pool.cfmm.burn(&mut pool.bank, &receiver)?;
            pool.refresh_external();
            pool.state.sync_totals()?;
            pool.emit_pool(TxType::WithdrawReserves);
            Ok((amounts, shares))
        })
    }

    // ============ Internal Helpers ============

    /// Mint shares for LP tokens already in the pool. The first deposit
    /// retires `dead_shares` out of the depositor's allotment.
    fn finish_deposit(
        &mut self,
        ctx: &CallContext,
        receiver: &Address,
        assets: u128,
        shares: u128,
        op: TxType,
    ) -> PoolResult<u128> {
        let shares = if self.shares.total_supply() == 0 {
            let dead = self.config.dead_shares;
            if shares <= dead {
                return Err(PoolError::ZeroShares);
            }
            self.shares.mint(&DEAD_HOLDER, dead)?;
            shares - dead
        } else if shares == 0 {
            return Err(PoolError::ZeroShares);
        } else {
            shares
        };

        self.shares.mint(receiver, shares)?;
        self.state.idle_lp_tokens = safe_add(self.state.idle_lp_tokens, assets)?;
        self.state.sync_totals()?;

        self.emit(PoolEvent::Deposit {
            caller: ctx.caller,
            owner: *receiver,
            assets,
            shares,
            period: ctx.period,
        });
        self.emit_pool(op);
        Ok(shares)
    }

    /// Burn the caller's shares and release `assets` from idle liquidity
    fn release_assets(
        &mut self,
        ctx: &CallContext,
        receiver: &Address,
        assets: u128,
        shares: u128,
    ) -> PoolResult<()> {
        if shares == 0 {
            return Err(PoolError::ZeroShares);
        }
        if assets > self.state.idle_lp_tokens {
            return Err(PoolError::ExcessiveWithdrawal {
                requested: assets,
                available: self.state.idle_lp_tokens,
            });
        }
        self.shares.burn(&ctx.caller, shares)?;
        self.state.idle_lp_tokens -= assets;
        self.state.sync_totals()?;

        self.emit(PoolEvent::Withdraw {
            caller: ctx.caller,
            receiver: *receiver,
            owner: ctx.caller,
            assets,
            shares,
            period: ctx.period,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBank, MockCfmm};
    use lvpool_common::PoolConfig;

    const POOL: Address = [7u8; 32];
    const CFMM: Address = [9u8; 32];
    const ALICE: Address = [1u8; 32];
    const BOB: Address = [2u8; 32];

    fn funded_pool() -> LendingPool<MockCfmm, MockBank> {
        let mut pool = LendingPool::new(
            [5u8; 32],
            POOL,
            PoolConfig::default(),
            MockCfmm::new(CFMM),
            MockBank::new(),
        )
        .unwrap();
        let (cfmm, bank) = pool.collaborators_mut();
        cfmm.seed(bank, &ALICE, [1_000_000, 4_000_000]).unwrap();
        bank.transfer(Token::Lp, &ALICE, &BOB, 500_000).unwrap();
        pool
    }

    #[test]
    fn test_share_ledger_burn_more_than_balance() {
        let mut ledger = ShareLedger::default();
        ledger.mint(&ALICE, 10).unwrap();
        assert_eq!(
            ledger.burn(&ALICE, 11),
            Err(PoolError::ExcessiveSpend { requested: 11, available: 10 })
        );
        ledger.burn(&ALICE, 4).unwrap();
        assert_eq!(ledger.total_supply(), 6);

        let bytes = borsh::to_vec(&ledger).unwrap();
        assert_eq!(ShareLedger::try_from_slice(&bytes).unwrap(), ledger);
    }

    #[test]
    fn test_first_deposit_retires_dead_shares() {
        let mut pool = funded_pool();
        let shares = pool.deposit(CallContext::new(ALICE, 1), 100_000, ALICE).unwrap();

        assert_eq!(shares, 100_000 - 1_000);
        assert_eq!(pool.balance_of(&DEAD_HOLDER), 1_000);
        assert_eq!(pool.total_supply(), 100_000);
        assert_eq!(pool.total_assets().unwrap(), 100_000);
        assert!(pool.check_invariants().is_ok());
    }

    #[test]
    fn test_first_deposit_too_small() {
        let mut pool = funded_pool();
        assert_eq!(
            pool.deposit(CallContext::new(ALICE, 1), 1_000, ALICE),
            Err(PoolError::ZeroShares)
        );
        assert_eq!(pool.total_supply(), 0);
        assert_eq!(pool.bank().balance_of(Token::Lp, &POOL), 0);
    }

    #[test]
    fn test_mint_then_redeem() {
        let mut pool = funded_pool();
        let paid = pool.mint(CallContext::new(ALICE, 1), 50_000, ALICE).unwrap();
        assert_eq!(paid, 51_000);
        assert_eq!(pool.balance_of(&ALICE), 50_000);

        let shares = pool.deposit(CallContext::new(BOB, 1), 10_000, BOB).unwrap();
        assert_eq!(shares, 10_000);

        let assets = pool.redeem(CallContext::new(BOB, 2), 10_000, BOB).unwrap();
        assert_eq!(assets, 10_000);
        assert_eq!(pool.bank().balance_of(Token::Lp, &BOB), 500_000);
    }

    #[test]
    fn test_withdraw_checks() {
        let mut pool = funded_pool();
        pool.deposit(CallContext::new(ALICE, 1), 100_000, ALICE).unwrap();
        pool.deposit(CallContext::new(BOB, 1), 10_000, BOB).unwrap();

        assert!(matches!(
            pool.withdraw(CallContext::new(BOB, 1), 20_000, BOB),
            Err(PoolError::ExcessiveSpend { .. })
        ));
        assert!(matches!(
            pool.withdraw(CallContext::new(BOB, 1), 200_000, BOB),
            Err(PoolError::ExcessiveWithdrawal { .. })
        ));
        assert_eq!(pool.max_withdraw(&BOB).unwrap(), 10_000);
        assert_eq!(pool.withdraw(CallContext::new(BOB, 1), 10_000, BOB).unwrap(), 10_000);
        assert_eq!(pool.balance_of(&BOB), 0);
    }

    #[test]
    fn test_convert_roundtrip_within_one_unit() {
        let mut pool = funded_pool();
        pool.deposit(CallContext::new(ALICE, 1), 300_000, ALICE).unwrap();
        for x in [1u128, 7, 999, 123_456] {
            let back = pool.convert_to_assets(pool.convert_to_shares(x).unwrap()).unwrap();
            assert!(x - back <= 1);
            let back = pool.convert_to_shares(pool.convert_to_assets(x).unwrap()).unwrap();
            assert!(x - back <= 1);
        }
    }

    #[test]
    fn test_deposit_and_withdraw_reserves() {
        let mut pool = funded_pool();
        let (_, bank) = pool.collaborators_mut();
        bank.mint(Token::Asset(0), &BOB, 10_000).unwrap();
        bank.mint(Token::Asset(1), &BOB, 40_000).unwrap();

        let shares = pool
            .deposit_reserves(CallContext::new(BOB, 1), &[10_000, 40_000], BOB)
            .unwrap();
        // 20_000 LP minted, dead shares come out of the first deposit
        assert_eq!(shares, 19_000);
        assert_eq!(pool.state().idle_lp_tokens, 20_000);

        let (amounts, burned) = pool
            .withdraw_reserves(CallContext::new(BOB, 2), 10_000, BOB)
            .unwrap();
        assert_eq!(burned, 10_000);
        assert_eq!(amounts, vec![5_000, 20_000]);
        assert_eq!(pool.bank().balance_of(Token::Asset(0), &BOB), 5_000);
        assert!(pool.check_invariants().is_ok());
    }
}
