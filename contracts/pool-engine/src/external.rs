//! Collaborator interfaces
//!
//! The engine never prices anything itself. It reads invariant, supply and
//! reserves from a [`Cfmm`], moves balances through a [`TokenBank`], and
//! hands control to an [`ExternalLiquidator`] for delegated liquidations.

use lvpool_common::{Address, LoanId, PoolResult, Token};

/// Fungible balances for every underlying asset and the CFMM's LP token
pub trait TokenBank {
    fn balance_of(&self, token: Token, holder: &Address) -> u128;

    fn transfer(
        &mut self,
        token: Token,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> PoolResult<()>;

    fn mint(&mut self, token: Token, to: &Address, amount: u128) -> PoolResult<()>;

    fn burn(&mut self, token: Token, from: &Address, amount: u128) -> PoolResult<()>;
}

/// Constant-function market maker the pool lends out.
///
/// Settlement follows the pay-first convention: callers transfer tokens to
/// [`Cfmm::address`] and then call `mint`, `burn` or `swap`, which settle
/// against the balance in excess of the recorded reserves.
pub trait Cfmm {
    fn address(&self) -> Address;

    fn asset_count(&self) -> usize;

    fn reserves(&self) -> Vec<u128>;

    fn invariant(&self) -> u128;

    /// Outstanding LP token supply
    fn total_supply(&self) -> u128;

    /// Mint LP tokens to `to` for the assets sent in. Returns LP minted.
    fn mint(&mut self, bank: &mut dyn TokenBank, to: &Address) -> PoolResult<u128>;

    /// Burn the LP tokens sent in, paying the assets to `to`
    fn burn(&mut self, bank: &mut dyn TokenBank, to: &Address) -> PoolResult<Vec<u128>>;

    /// Swap the `token_in` sent in for `token_out`, paid to `to`. Returns amount out.
    fn swap(
        &mut self,
        bank: &mut dyn TokenBank,
        token_in: u8,
        token_out: u8,
        to: &Address,
    ) -> PoolResult<u128>;

    /// Match reserves to actual balances
    fn sync(&mut self, bank: &dyn TokenBank);
}

/// Loan view handed to an external liquidator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationContext {
    pub pool: Address,
    pub loan_id: LoanId,
    pub tokens_held: Vec<u128>,
    pub held_invariant: u128,
    pub debt_invariant: u128,
    pub liquidation_fee_bps: u64,
}

/// Untrusted party invoked mid-liquidation.
///
/// It receives the authorized collateral and LP tokens before the call and
/// must leave the pool holding at least debt plus fee in value afterwards.
pub trait ExternalLiquidator {
    fn address(&self) -> Address;

    fn on_liquidation(
        &mut self,
        bank: &mut dyn TokenBank,
        context: &LiquidationContext,
        requested_amounts: &[u128],
        requested_lp_tokens: u128,
        payload: &[u8],
    ) -> PoolResult<()>;
}
