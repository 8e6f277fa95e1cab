//! lvpool Engine - Accounting core of a CFMM-backed lending pool
//!
//! One [`LendingPool`] owns the balance sheet of a pool that lends out the
//! liquidity tokens of an external CFMM. Depositors hold vault shares over
//! those tokens; borrowers take them out as underlying assets against
//! collateral held in the same assets.
//!
//! ## Core Operations
//!
//! - **Accrual**: `update_pool` folds CFMM fee growth and the borrow rate
//!   into the cumulative fee index, at most once per period
//! - **Loans**: `create_loan`, `increase_collateral`, `decrease_collateral`,
//!   `borrow_liquidity`, `repay_liquidity`, `repay_liquidity_with_lp`,
//!   `rebalance_collateral`
//! - **Liquidation**: `liquidate_with_lp`, `batch_liquidations`,
//!   `liquidate_external`
//! - **Vault**: `deposit`, `mint`, `withdraw`, `redeem`,
//!   `deposit_reserves`, `withdraw_reserves`, previews and limits
//!
//! Every entry point runs atomically: a failed call leaves no trace in
//! pool state, loans, shares, collaborators or the event log.

pub mod accrual;
pub mod borrow;
pub mod external;
pub mod guard;
pub mod liquidation;
pub mod pool;
pub mod vault;

#[cfg(any(test, feature = "mock"))]
pub mod mock;


use lvpool_common::Address;

pub use borrow::{BorrowResult, RepayResult};
pub use external::{Cfmm, ExternalLiquidator, LiquidationContext, TokenBank};
pub use guard::{LockGuard, ReentrancyLock};
pub use liquidation::{ExternalLiquidationRequest, ExternalLiquidationResult, LiquidationResult};
pub use pool::{generate_loan_id, LendingPool};
pub use vault::ShareLedger;

/// Caller identity and logical clock of one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub caller: Address,
    /// Opaque, non-decreasing period counter
    pub period: u64,
}

impl CallContext {
    pub fn new(caller: Address, period: u64) -> Self {
        Self { caller, period }
    }
}
