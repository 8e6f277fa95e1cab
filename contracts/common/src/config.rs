//! Pool Configuration
//!
//! Runtime parameters of one pool. Defaults come from [`crate::constants`];
//! a deployer overrides them and calls [`PoolConfig::validate`] before the
//! pool is constructed.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::constants::{fees, limits, precision::{BPS_DENOMINATOR, ONE}, rates, vault};
use crate::errors::{PoolError, PoolResult};
use crate::math::Wad;
use crate::rate_model::{OriginationFeeParams, RateParams};
use crate::types::Address;

/// Configuration of a single pool
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
pub struct PoolConfig {
    /// Maximum debt / collateral ratio before liquidation
    pub ltv_threshold: Wad,
    /// Haircut on collateral value kept by the pool on liquidation
    pub liquidation_fee_bps: u64,
    /// Smallest non-zero debt a loan may carry, in invariant units
    pub min_borrow: u128,
    /// Shares retired on the first deposit
    pub dead_shares: u128,
    /// Yield ceiling as a multiple of 100% per year
    pub max_apy_multiplier: u64,
    /// EMA weight per elapsed period, per mille
    pub ema_multiplier: u64,
    pub rate: RateParams,
    pub origination: OriginationFeeParams,
    /// Fraction of the borrow-rate spread minted to `fee_recipient`
    pub protocol_fee_bps: u64,
    /// Dev-fee minting is off when unset
    pub fee_recipient: Option<Address>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            ltv_threshold: Wad(limits::LTV_THRESHOLD),
            liquidation_fee_bps: fees::LIQUIDATION_FEE_BPS,
            min_borrow: limits::MIN_BORROW,
            dead_shares: vault::DEAD_SHARES,
            max_apy_multiplier: rates::MAX_APY_MULTIPLIER,
            ema_multiplier: rates::EMA_MULTIPLIER,
            rate: RateParams::default(),
            origination: OriginationFeeParams::default(),
            protocol_fee_bps: fees::PROTOCOL_FEE_BPS,
            fee_recipient: None,
        }
    }
}

impl PoolConfig {
    /// Reject values the engine cannot operate with
    pub fn validate(&self) -> PoolResult<()> {
        if self.ltv_threshold.is_zero() || self.ltv_threshold.raw() > ONE {
            return Err(PoolError::InvalidConfig { param: "ltv_threshold" });
        }
        if self.liquidation_fee_bps >= BPS_DENOMINATOR {
            return Err(PoolError::InvalidConfig { param: "liquidation_fee_bps" });
        }
        if self.protocol_fee_bps >= BPS_DENOMINATOR {
            return Err(PoolError::InvalidConfig { param: "protocol_fee_bps" });
        }
        if self.max_apy_multiplier == 0 {
            return Err(PoolError::InvalidConfig { param: "max_apy_multiplier" });
        }
        if self.ema_multiplier == 0 || self.ema_multiplier > rates::EMA_WEIGHT_DENOMINATOR {
            return Err(PoolError::InvalidConfig { param: "ema_multiplier" });
        }
        if self.min_borrow == 0 {
            return Err(PoolError::InvalidConfig { param: "min_borrow" });
        }
        if let Some(recipient) = self.fee_recipient {
            if recipient == vault::DEAD_HOLDER {
                return Err(PoolError::InvalidAddress {
                    reason: "fee recipient is the dead-share holder",
                });
            }
        }
        self.rate.validate()?;
        self.origination.validate()
    }

    pub fn with_fee_recipient(mut self, recipient: Address) -> Self {
        self.fee_recipient = Some(recipient);
        self
    }

    pub fn with_min_borrow(mut self, min_borrow: u128) -> Self {
        self.min_borrow = min_borrow;
        self
    }
}
