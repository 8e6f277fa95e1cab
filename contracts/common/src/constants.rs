//! Protocol Constants
//!
//! All magic numbers and default configuration values for the lvpool engine.
//! Runtime values live in [`crate::config::PoolConfig`]; the constants here
//! only seed its `Default` implementation and fix the numeric scales.
//!
//! # Network Configuration
//!
//! Use feature flags to compile for different networks:
//! - `mainnet` - Production values (higher minimum borrow size)
//! - Default (no feature) - Testnet values (lower minimums for testing)
//!
//! ```toml
//! # For mainnet deployment:
//! lvpool-common = { path = "...", features = ["mainnet"] }
//! ```

/// Fixed-point scales
pub mod precision {
    /// 18-decimal fixed-point unit (1.0)
    pub const ONE: u128 = 1_000_000_000_000_000_000;

    /// Basis points denominator (100% = 10_000)
    pub const BPS_DENOMINATOR: u64 = 10_000;

    /// Percentage precision (100 = 100%)
    pub const PERCENT_PRECISION: u64 = 100;
}

/// Logical clock configuration
pub mod time {
    /// Periods per year (~12 second periods)
    pub const PERIODS_PER_YEAR: u64 = 2_252_571;
}

/// Borrow rate model defaults (annualized, 18-decimal fixed point)
pub mod rates {
    use super::precision::ONE;

    /// Rate charged at zero utilization (0%)
    pub const BASE_RATE: u128 = 0;

    /// Kink of the linear rate model (80% utilization)
    pub const OPTIMAL_UTILIZATION: u128 = 8 * ONE / 10;

    /// Slope below the kink (4% APY at the kink)
    pub const SLOPE1: u128 = 4 * ONE / 100;

    /// Slope above the kink (+75% APY at full utilization)
    pub const SLOPE2: u128 = 75 * ONE / 100;

    /// Hard ceiling on total yield, as a multiple of 100% per year (1000%)
    pub const MAX_APY_MULTIPLIER: u64 = 10;

    /// EMA weight given to the latest utilization sample per elapsed period
    pub const EMA_MULTIPLIER: u64 = 10;

    /// Denominator of the EMA weight (per mille)
    pub const EMA_WEIGHT_DENOMINATOR: u64 = 1_000;
}

/// Fee Configuration (in basis points, 100 = 1%)
pub mod fees {
    /// Flat origination fee floor (0.02%)
    pub const ORIGINATION_FEE_BPS: u64 = 2;

    /// Utilization (whole percent) above which the quadratic fee ramp starts
    pub const LOW_UTIL_PCT: u64 = 70;

    /// Utilization (whole percent) above which the exponential fee ramp starts
    pub const HIGH_UTIL_PCT: u64 = 85;

    /// Divisor of the quadratic ramp: fee = diff^2 * BPS / RAMP_DIVISOR
    pub const RAMP_DIVISOR: u64 = 45_000;

    /// Divisor of the exponential ramp: fee = 2^diff * BPS / FEE_DIVISOR
    pub const FEE_DIVISOR: u64 = 32_768;

    /// Liquidation fee as a haircut on collateral value (2.5%)
    pub const LIQUIDATION_FEE_BPS: u64 = 250;

    /// Share of the borrow-rate spread minted to the fee recipient (10%)
    pub const PROTOCOL_FEE_BPS: u64 = 1_000;
}

/// Debt and collateral limits
///
/// Values differ between mainnet and testnet to allow easier testing.
pub mod limits {
    use super::precision::ONE;

    /// Minimum debt a loan may carry, in invariant units
    /// - Mainnet: 1e15 (keeps liquidations economical)
    /// - Testnet: 1e3 (allows tiny test positions)
    #[cfg(feature = "mainnet")]
    pub const MIN_BORROW: u128 = 1_000_000_000_000_000;
    #[cfg(not(feature = "mainnet"))]
    pub const MIN_BORROW: u128 = 1_000;

    /// Maximum debt-to-collateral ratio before liquidation (80%)
    pub const LTV_THRESHOLD: u128 = 8 * ONE / 10;

    /// Upper bound on the number of loans in one batch liquidation
    pub const MAX_BATCH_SIZE: usize = 50;
}

/// Share vault configuration
pub mod vault {
    /// Shares retired on the very first deposit
    pub const DEAD_SHARES: u128 = 1_000;

    /// Holder of the retired shares. The zero address can never sign.
    pub const DEAD_HOLDER: [u8; 32] = [0u8; 32];
}
