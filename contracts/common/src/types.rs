//! Core Types for the lvpool engine
//!
//! The aggregate pool balance sheet, the per-position loan record, and the
//! small identifiers shared by both crates.

use crate::Vec;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::math::Wad;

/// Type alias for addresses (32-byte hash)
pub type Address = [u8; 32];

/// Type alias for loan identifiers
pub type LoanId = [u8; 32];

/// Type alias for pool identifiers
pub type PoolId = [u8; 32];

// ============ Tokens ============

/// Token handled by the pool: one of the CFMM's underlying assets, or the
/// CFMM's own liquidity token
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    BorshSerialize,
    BorshDeserialize,
)]
pub enum Token {
    Asset(u8),
    Lp,
}

/// Operation tag attached to every snapshot event
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
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum TxType {
    CreateLoan = 0,
    UpdatePool = 1,
    IncreaseCollateral = 2,
    DecreaseCollateral = 3,
    RebalanceCollateral = 4,
    BorrowLiquidity = 5,
    RepayLiquidity = 6,
    RepayLiquidityWithLp = 7,
    LiquidateWithLp = 8,
    BatchLiquidation = 9,
    ExternalLiquidation = 10,
    Deposit = 11,
    Withdraw = 12,
    DepositReserves = 13,
    WithdrawReserves = 14,
    Sync = 15,
    Skim = 16,
}

// ============ Pool State ============

/// Aggregate balance sheet of one pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PoolState {
    // ===== External CFMM snapshot =====
    /// CFMM invariant observed at the latest accrual
    pub last_external_invariant: u128,
    /// CFMM LP supply observed at the latest accrual
    pub last_external_supply: u128,
    /// Snapshot from the accrual before, used only to isolate fee growth
    pub prev_external_invariant: u128,
    pub prev_external_supply: u128,
    /// CFMM-only yield since the previous accrual
    pub last_external_fee_index: Wad,
    /// External fee index blended with the borrow rate for the last period
    pub last_fee_index: Wad,
    /// Cumulative fee index since inception, never decreases
    pub acc_fee_index: Wad,
    /// Logical clock of the last fee accrual
    pub last_period: u64,

    // ===== Liquidity token ledger =====
    pub idle_lp_tokens: u128,
    /// Principal lent out, in LP tokens
    pub borrowed_lp_tokens: u128,
    /// Principal plus accrued interest, in LP tokens
    pub borrowed_lp_tokens_plus_interest: u128,
    /// `idle_lp_tokens + borrowed_lp_tokens_plus_interest`
    pub lp_token_total: u128,

    // ===== Invariant ledger =====
    pub lp_invariant: u128,
    pub borrowed_invariant: u128,
    /// `lp_invariant + borrowed_invariant`
    pub total_invariant: u128,

    // ===== Rates =====
    pub ema_utilization: Wad,
    /// Annual borrow rate applied at the last accrual
    pub borrow_rate: Wad,

    /// CFMM reserves observed at the latest refresh
    pub external_reserves: Vec<u128>,
    /// Underlying asset amounts the pool tracks as collateral
    pub token_balances: Vec<u128>,
}

impl PoolState {
    /// Fresh pool for a CFMM with `asset_count` underlying assets
    pub fn new(asset_count: usize) -> Self {
        let mut external_reserves = Vec::with_capacity(asset_count);
        external_reserves.resize(asset_count, 0);
        let token_balances = external_reserves.clone();
        Self {
            last_external_invariant: 0,
            last_external_supply: 0,
            prev_external_invariant: 0,
            prev_external_supply: 0,
            last_external_fee_index: Wad::ONE,
            last_fee_index: Wad::ONE,
            acc_fee_index: Wad::ONE,
            last_period: 0,
            idle_lp_tokens: 0,
            borrowed_lp_tokens: 0,
            borrowed_lp_tokens_plus_interest: 0,
            lp_token_total: 0,
            lp_invariant: 0,
            borrowed_invariant: 0,
            total_invariant: 0,
            ema_utilization: Wad::ZERO,
            borrow_rate: Wad::ZERO,
            external_reserves,
            token_balances,
        }
    }

    pub fn asset_count(&self) -> usize {
        self.token_balances.len()
    }
}

// ============ Loan ============

/// Per-position debt and collateral record. Never deleted, only zeroed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Loan {
    pub id: LoanId,
    pub owner: Address,
    /// Pool that issued this loan
    pub pool_id: PoolId,
    /// Collateral per underlying asset
    pub tokens_held: Vec<u128>,
    /// Geometric mean of `tokens_held`
    pub held_invariant: u128,
    /// Debt including accrued interest, valid as of `rate_index`
    pub debt_invariant: u128,
    /// Debt before interest, used to pro-rate partial payments
    pub init_debt_invariant: u128,
    /// Principal in LP tokens
    pub debt_lp_tokens: u128,
    /// Pool `acc_fee_index` at the last touch
    pub rate_index: Wad,
    pub created_period: u64,
}

impl Loan {
    /// Empty loan priced at the current cumulative fee index
    pub fn new(
        id: LoanId,
        owner: Address,
        pool_id: PoolId,
        asset_count: usize,
        acc_fee_index: Wad,
        period: u64,
    ) -> Self {
        let mut tokens_held = Vec::with_capacity(asset_count);
        tokens_held.resize(asset_count, 0);
        Self {
            id,
            owner,
            pool_id,
            tokens_held,
            held_invariant: 0,
            debt_invariant: 0,
            init_debt_invariant: 0,
            debt_lp_tokens: 0,
            rate_index: acc_fee_index,
            created_period: period,
        }
    }

    pub fn has_debt(&self) -> bool {
        self.debt_invariant > 0
    }

    pub fn has_collateral(&self) -> bool {
        self.tokens_held.iter().any(|a| *a > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_pool_state() {
        let state = PoolState::new(2);
        assert_eq!(state.asset_count(), 2);
        assert_eq!(state.acc_fee_index, Wad::ONE);
        assert_eq!(state.external_reserves, vec![0, 0]);
    }

    #[test]
    fn test_new_loan_is_empty() {
        let index = Wad(2 * crate::constants::precision::ONE);
        let loan = Loan::new([1u8; 32], [2u8; 32], [3u8; 32], 2, index, 7);
        assert!(!loan.has_debt());
        assert!(!loan.has_collateral());
        assert_eq!(loan.rate_index.raw(), 2 * crate::constants::precision::ONE);
        assert_eq!(loan.created_period, 7);
    }

    #[test]
    fn test_loan_borsh_roundtrip() {
        let mut loan = Loan::new([1u8; 32], [2u8; 32], [3u8; 32], 2, Wad::ONE, 0);
        loan.tokens_held = vec![400, 1_600];
        loan.held_invariant = 800;
        let bytes = borsh::to_vec(&loan).unwrap();
        let decoded: Loan = borsh::from_slice(&bytes).unwrap();
        assert_eq!(decoded, loan);
    }
}
