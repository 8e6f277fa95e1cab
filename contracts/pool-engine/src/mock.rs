//! In-memory collaborators for tests and simulations
//!
//! [`MockBank`] keeps balances in a map. [`MockCfmm`] is a two-asset
//! constant-product market with a 0.3% swap fee whose invariant is the
//! geometric mean of its reserves.

use std::collections::BTreeMap;

use lvpool_common::{
    geometric_mean, mul_div, precision::BPS_DENOMINATOR, safe_add, safe_sub, Address, PoolError,
    PoolResult, Token,
};

use crate::external::{Cfmm, TokenBank};

// ============ Token Bank ============

#[derive(Debug, Clone, Default)]
pub struct MockBank {
    balances: BTreeMap<(Token, Address), u128>,
}

impl MockBank {
    pub fn new() -> Self {
        Self::default()
    }

    fn debit(&mut self, token: Token, holder: &Address, amount: u128) -> PoolResult<()> {
        let balance = self.balance_of(token, holder);
        if balance < amount {
            return Err(PoolError::TransferFailed { amount });
        }
        self.balances.insert((token, *holder), balance - amount);
        Ok(())
    }

    fn credit(&mut self, token: Token, holder: &Address, amount: u128) -> PoolResult<()> {
        let balance = safe_add(self.balance_of(token, holder), amount)?;
        self.balances.insert((token, *holder), balance);
        Ok(())
    }
}

impl TokenBank for MockBank {
    fn balance_of(&self, token: Token, holder: &Address) -> u128 {
        self.balances.get(&(token, *holder)).copied().unwrap_or(0)
    }

    fn transfer(
        &mut self,
        token: Token,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> PoolResult<()> {
        if amount == 0 {
            return Ok(());
        }
        self.debit(token, from, amount)?;
        self.credit(token, to, amount)
    }

    fn mint(&mut self, token: Token, to: &Address, amount: u128) -> PoolResult<()> {
        self.credit(token, to, amount)
    }

    fn burn(&mut self, token: Token, from: &Address, amount: u128) -> PoolResult<()> {
        self.debit(token, from, amount)
    }
}

// ============ Constant-Product CFMM ============

/// Swap fee of the mock market (0.3%)
pub const MOCK_SWAP_FEE_BPS: u64 = 30;

#[derive(Debug, Clone)]
pub struct MockCfmm {
    address: Address,
    reserves: Vec<u128>,
    total_supply: u128,
}

impl MockCfmm {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            reserves: vec![0, 0],
            total_supply: 0,
        }
    }

    /// Seed the market: `provider` sends `amounts` and receives the LP tokens
    pub fn seed(
        &mut self,
        bank: &mut MockBank,
        provider: &Address,
        amounts: [u128; 2],
    ) -> PoolResult<u128> {
        for (i, amount) in amounts.iter().enumerate() {
            bank.mint(Token::Asset(i as u8), &self.address, *amount)?;
        }
        self.mint(bank, provider)
    }

    /// Simulate trading-fee income: reserves grow with no new LP tokens
    pub fn accrue_fees(&mut self, bank: &mut MockBank, amounts: [u128; 2]) -> PoolResult<()> {
        for (i, amount) in amounts.iter().enumerate() {
            bank.mint(Token::Asset(i as u8), &self.address, *amount)?;
        }
        self.sync(bank);
        Ok(())
    }

    fn balances(&self, bank: &dyn TokenBank) -> Vec<u128> {
        (0..self.reserves.len())
            .map(|i| bank.balance_of(Token::Asset(i as u8), &self.address))
            .collect()
    }
}

impl Cfmm for MockCfmm {
    fn address(&self) -> Address {
        self.address
    }

    fn asset_count(&self) -> usize {
        self.reserves.len()
    }

    fn reserves(&self) -> Vec<u128> {
        self.reserves.clone()
    }

    fn invariant(&self) -> u128 {
        geometric_mean(&self.reserves).unwrap_or(0)
    }

    fn total_supply(&self) -> u128 {
        self.total_supply
    }

    fn mint(&mut self, bank: &mut dyn TokenBank, to: &Address) -> PoolResult<u128> {
        let balances = self.balances(bank);
        let mut amounts = Vec::with_capacity(balances.len());
        for (balance, reserve) in balances.iter().zip(&self.reserves) {
            amounts.push(safe_sub(*balance, *reserve)?);
        }

        let liquidity = if self.total_supply == 0 {
            geometric_mean(&amounts)?
        } else {
            let mut minted = u128::MAX;
            for (amount, reserve) in amounts.iter().zip(&self.reserves) {
                minted = minted.min(mul_div(*amount, self.total_supply, *reserve)?);
            }
            minted
        };
        if liquidity == 0 {
            return Err(PoolError::ZeroAmount);
        }

        bank.mint(Token::Lp, to, liquidity)?;
        self.total_supply = safe_add(self.total_supply, liquidity)?;
        self.reserves = balances;
        Ok(liquidity)
    }

    fn burn(&mut self, bank: &mut dyn TokenBank, to: &Address) -> PoolResult<Vec<u128>> {
        let liquidity = bank.balance_of(Token::Lp, &self.address);
        if liquidity == 0 || self.total_supply == 0 {
            return Err(PoolError::ZeroAmount);
        }

        let mut amounts = Vec::with_capacity(self.reserves.len());
        for reserve in &self.reserves {
            amounts.push(mul_div(liquidity, *reserve, self.total_supply)?);
        }

        bank.burn(Token::Lp, &self.address, liquidity)?;
        self.total_supply = safe_sub(self.total_supply, liquidity)?;
        for (i, amount) in amounts.iter().enumerate() {
            bank.transfer(Token::Asset(i as u8), &self.address, to, *amount)?;
        }
        self.reserves = self.balances(bank);
        Ok(amounts)
    }

    fn swap(
        &mut self,
        bank: &mut dyn TokenBank,
        token_in: u8,
        token_out: u8,
        to: &Address,
    ) -> PoolResult<u128> {
        let (i, o) = (token_in as usize, token_out as usize);
        if i == o || i >= self.reserves.len() || o >= self.reserves.len() {
            return Err(PoolError::InvalidInput { param: "token", reason: "unknown swap pair" });
        }

        let balance_in = bank.balance_of(Token::Asset(token_in), &self.address);
        let amount_in = safe_sub(balance_in, self.reserves[i])?;
        if amount_in == 0 {
            return Err(PoolError::ZeroAmount);
        }

        let in_after_fee = mul_div(
            amount_in,
            (BPS_DENOMINATOR - MOCK_SWAP_FEE_BPS) as u128,
            BPS_DENOMINATOR as u128,
        )?;
        let reserve_in = safe_add(self.reserves[i], in_after_fee)?;
        let amount_out = mul_div(self.reserves[o], in_after_fee, reserve_in)?;

        bank.transfer(Token::Asset(token_out), &self.address, to, amount_out)?;
        self.reserves = self.balances(bank);
        Ok(amount_out)
    }

    fn sync(&mut self, bank: &dyn TokenBank) {
        self.reserves = self.balances(bank);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: Address = [1u8; 32];
    const CFMM: Address = [9u8; 32];

    #[test]
    fn test_bank_transfer() {
        let mut bank = MockBank::new();
        bank.mint(Token::Lp, &ALICE, 100).unwrap();
        bank.transfer(Token::Lp, &ALICE, &CFMM, 40).unwrap();
        assert_eq!(bank.balance_of(Token::Lp, &ALICE), 60);
        assert_eq!(bank.balance_of(Token::Lp, &CFMM), 40);
        assert_eq!(
            bank.transfer(Token::Lp, &ALICE, &CFMM, 61),
            Err(PoolError::TransferFailed { amount: 61 })
        );
    }

    #[test]
    fn test_cfmm_seed_and_burn() {
        let mut bank = MockBank::new();
        let mut cfmm = MockCfmm::new(CFMM);
        let lp = cfmm.seed(&mut bank, &ALICE, [1_000, 4_000]).unwrap();
        assert_eq!(lp, 2_000);
        assert_eq!(cfmm.invariant(), 2_000);
        assert_eq!(cfmm.total_supply(), 2_000);

        bank.transfer(Token::Lp, &ALICE, &CFMM, 500).unwrap();
        let out = cfmm.burn(&mut bank, &ALICE).unwrap();
        assert_eq!(out, vec![250, 1_000]);
        assert_eq!(cfmm.reserves(), vec![750, 3_000]);
        assert_eq!(cfmm.total_supply(), 1_500);
    }

    #[test]
    fn test_cfmm_swap_grows_invariant() {
        let mut bank = MockBank::new();
        let mut cfmm = MockCfmm::new(CFMM);
        cfmm.seed(&mut bank, &ALICE, [1_000_000, 1_000_000]).unwrap();
        let before = cfmm.invariant();

        bank.mint(Token::Asset(0), &CFMM, 10_000).unwrap();
        let out = cfmm.swap(&mut bank, 0, 1, &ALICE).unwrap();
        assert!(out > 9_800 && out < 10_000);
        assert_eq!(bank.balance_of(Token::Asset(1), &ALICE), out);
        assert!(cfmm.invariant() > before);
    }

    #[test]
    fn test_accrue_fees_keeps_supply() {
        let mut bank = MockBank::new();
        let mut cfmm = MockCfmm::new(CFMM);
        cfmm.seed(&mut bank, &ALICE, [1_000, 1_000]).unwrap();
        cfmm.accrue_fees(&mut bank, [100, 100]).unwrap();
        assert_eq!(cfmm.invariant(), 1_100);
        assert_eq!(cfmm.total_supply(), 1_000);
    }
}
