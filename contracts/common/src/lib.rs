//! lvpool Common Library
//!
//! Shared types, constants, and utilities for the lvpool leveraged
//! liquidity engine.
//!
//! A pool lends the liquidity tokens of an external constant-function
//! market maker (CFMM) to borrowers who post the CFMM's underlying assets
//! as collateral. Debt and collateral are both measured in CFMM invariant
//! units, so positions are priced without an oracle.
//!
//! ## Modules
//!
//! - **math**: 18-decimal fixed point with a 256-bit `mul_div`, geometric mean
//! - **rate_model**: Kinked borrow rate, utilization EMA, origination fee curve
//! - **types**: `PoolState`, `Loan`, token and operation tags
//! - **ledger**: Exchange-rate conversions, totals, write-downs, lazy interest
//! - **config**: Per-pool runtime parameters
//! - **events**: Snapshot events and the append-only event log
//!
//! This crate is `no_std` compatible for WASM compilation when built
//! without the default `std` feature.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

// Re-export Vec for submodules based on feature
#[cfg(not(feature = "std"))]
pub use alloc::vec::Vec;
#[cfg(feature = "std")]
pub use std::vec::Vec;

pub mod constants;
pub mod errors;
pub mod math;
pub mod rate_model;
pub mod types;
pub mod ledger;
pub mod config;
pub mod events;

// Re-exports for convenience
pub use constants::*;
pub use errors::*;
pub use math::*;
pub use rate_model::*;
pub use types::*;
pub use ledger::*;
pub use config::*;
pub use events::*;
