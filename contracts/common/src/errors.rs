//! Error Types for the lvpool engine
//!
//! Every failure aborts the whole operation. Variants are grouped by the
//! taxonomy callers inspect before re-submitting: margin, sizing, balance
//! integrity, existence, liquidation, and arithmetic.

/// Result type alias for lvpool operations
pub type PoolResult<T> = Result<T, PoolError>;

/// Main error enum for all lvpool errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    // ============ Margin Errors ============
    /// Loan debt exceeds the LTV threshold of its collateral
    Margin { debt: u128, collateral: u128 },

    /// Loan is still healthy, so it cannot be liquidated
    HasMargin { debt: u128, collateral: u128 },

    // ============ Sizing Errors ============
    /// Loan debt (or the remainder after a partial payment) is below the floor
    MinBorrow { amount: u128, minimum: u128 },

    /// Zero amount not allowed
    ZeroAmount,

    /// Operation would mint or burn zero shares
    ZeroShares,

    /// Operation would move zero assets
    ZeroAssets,

    /// Borrow request exceeds idle liquidity
    ExcessiveBorrowing { requested: u128, available: u128 },

    /// Withdrawal exceeds idle liquidity
    ExcessiveWithdrawal { requested: u128, available: u128 },

    /// Spending more shares than the holder owns
    ExcessiveSpend { requested: u128, available: u128 },

    // ============ Balance Integrity Errors ============
    /// Pool-tracked balance cannot cover the request
    NotEnoughBalance { available: u128, requested: u128 },

    /// Loan collateral cannot cover the request
    NotEnoughCollateral { available: u128, requested: u128 },

    /// LP token balance of the pool decreased across an external call
    WrongLPTokenBalance { before: u128, after: u128 },

    /// Value returned by an external liquidator is below debt plus fee
    LPBalanceShortfall { provided: u128, required: u128 },

    /// Collateral was taken beyond what was authorized
    CollateralShortfall { token: u8, expected: u128, actual: u128 },

    /// Aggregate ledger cross-check failed
    InvariantViolation { check: &'static str },

    // ============ Existence Errors ============
    /// Loan id is unknown or not owned by the caller
    LoanDoesNotExist { loan_id: [u8; 32] },

    // ============ Liquidation Errors ============
    /// Nothing eligible to liquidate
    NoLiquidityDebt,

    /// Deposit does not cover the write-down adjusted debt
    InsufficientDeposit { deposited: u128, required: u128 },

    // ============ Execution Errors ============
    /// Re-entrant call while an operation is in progress
    Locked,

    /// Token transfer failed in the token bank
    TransferFailed { amount: u128 },

    // ============ Math Errors ============
    /// Arithmetic overflow occurred
    Overflow,

    /// Arithmetic underflow occurred
    Underflow,

    /// Division by zero
    DivisionByZero,

    // ============ Input Validation Errors ============
    /// Invalid input parameter
    InvalidInput { param: &'static str, reason: &'static str },

    /// Invalid configuration value
    InvalidConfig { param: &'static str },

    /// Invalid address (e.g., zero address)
    InvalidAddress {
        /// Description of why the address is invalid
        reason: &'static str,
    },
}

impl PoolError {
    /// Returns a human-readable error code for logging/debugging
    pub fn code(&self) -> &'static str {
        match self {
            Self::Margin { .. } => "E001_MARGIN",
            Self::HasMargin { .. } => "E002_HAS_MARGIN",
            Self::MinBorrow { .. } => "E010_MIN_BORROW",
            Self::ZeroAmount => "E011_ZERO_AMOUNT",
            Self::ZeroShares => "E012_ZERO_SHARES",
            Self::ZeroAssets => "E013_ZERO_ASSETS",
            Self::ExcessiveBorrowing { .. } => "E014_EXCESSIVE_BORROWING",
            Self::ExcessiveWithdrawal { .. } => "E015_EXCESSIVE_WITHDRAWAL",
            Self::ExcessiveSpend { .. } => "E016_EXCESSIVE_SPEND",
            Self::NotEnoughBalance { .. } => "E020_NOT_ENOUGH_BALANCE",
            Self::NotEnoughCollateral { .. } => "E021_NOT_ENOUGH_COLLATERAL",
            Self::WrongLPTokenBalance { .. } => "E022_WRONG_LP_BALANCE",
            Self::LPBalanceShortfall { .. } => "E023_LP_SHORTFALL",
            Self::CollateralShortfall { .. } => "E024_COLLATERAL_SHORTFALL",
            Self::InvariantViolation { .. } => "E025_INVARIANT",
            Self::LoanDoesNotExist { .. } => "E030_LOAN_NOT_FOUND",
            Self::NoLiquidityDebt => "E040_NO_LIQUIDITY_DEBT",
            Self::InsufficientDeposit { .. } => "E041_INSUFFICIENT_DEPOSIT",
            Self::Locked => "E050_LOCKED",
            Self::TransferFailed { .. } => "E051_TRANSFER_FAILED",
            Self::Overflow => "E080_OVERFLOW",
            Self::Underflow => "E081_UNDERFLOW",
            Self::DivisionByZero => "E082_DIV_ZERO",
            Self::InvalidInput { .. } => "E090_INVALID_INPUT",
            Self::InvalidConfig { .. } => "E091_INVALID_CONFIG",
            Self::InvalidAddress { .. } => "E092_INVALID_ADDRESS",
        }
    }

    /// Returns true if the caller can fix this by re-submitting different parameters
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Margin { .. } => true,              // Add collateral or borrow less
            Self::MinBorrow { .. } => true,           // Increase amount
            Self::ExcessiveBorrowing { .. } => true,  // Borrow less
            Self::ExcessiveWithdrawal { .. } => true, // Withdraw less
            Self::InsufficientDeposit { .. } => true, // Deposit more LP tokens
            Self::Locked => true,                     // Retry outside the callback
            _ => false,
        }
    }

    /// True for errors in the margin group
    pub fn is_margin_error(&self) -> bool {
        matches!(self, Self::Margin { .. } | Self::HasMargin { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_error_codes_unique() {
        let errors = [
            PoolError::Margin { debt: 1, collateral: 1 },
            PoolError::HasMargin { debt: 1, collateral: 1 },
            PoolError::MinBorrow { amount: 1, minimum: 2 },
            PoolError::ZeroAmount,
            PoolError::ZeroShares,
            PoolError::ZeroAssets,
            PoolError::NotEnoughCollateral { available: 0, requested: 1 },
            PoolError::LPBalanceShortfall { provided: 0, required: 1 },
            PoolError::CollateralShortfall { token: 0, expected: 1, actual: 0 },
            PoolError::LoanDoesNotExist { loan_id: [0u8; 32] },
            PoolError::NoLiquidityDebt,
            PoolError::InsufficientDeposit { deposited: 0, required: 1 },
            PoolError::Locked,
            PoolError::Overflow,
        ];

        let codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        let unique: BTreeSet<_> = codes.iter().collect();
        assert_eq!(codes.len(), unique.len(), "Error codes must be unique");
    }

    #[test]
    fn test_margin_group() {
        assert!(PoolError::Margin { debt: 2, collateral: 1 }.is_margin_error());
        assert!(PoolError::HasMargin { debt: 1, collateral: 2 }.is_margin_error());
        assert!(!PoolError::NoLiquidityDebt.is_margin_error());
    }

    #[test]
    fn test_recoverable() {
        assert!(PoolError::MinBorrow { amount: 1, minimum: 2 }.is_recoverable());
        assert!(!PoolError::WrongLPTokenBalance { before: 2, after: 1 }.is_recoverable());
    }
}
