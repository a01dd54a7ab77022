//! Caisson Common Library
//!
//! Shared types, constants, and the core engine for the Caisson
//! tranche-based liquidation-insurance pool.
//!
//! ## Architecture
//!
//! Caisson pools depositor capital into two tranches with distinct
//! loss priority: Junior absorbs losses first and earns a larger share
//! of profits; Senior is protected by the Junior buffer and by
//! withdrawal haircuts while that buffer is impaired. Pooled capital
//! earns external yield and is deployed opportunistically to purchase
//! discounted liquidation collateral through flash-funded execution.
//!
//! Modules in this crate are pure engine logic: functions operate on
//! explicit state snapshots and return typed results; the pool
//! orchestrator (`caisson-pool`) owns the ledger and applies them.
//!
//! - **Waterfall**: loss/profit distribution and withdrawal
//!   entitlement across tranches
//! - **Premium Pricing**: EMA-smoothed, hysteresis-gated premium rate
//!   from a weighted risk score
//! - **Capital Adequacy**: VaR-backed capital requirements and the
//!   circuit breaker
//! - **Purchase Book**: commit-reveal liquidation purchases with
//!   replay protection
//! - **Reinsurance**: external coverage providers and claim lifecycle
//! - **Risk Metrics / GBM**: price history, volatility, correlation,
//!   and Monte-Carlo tail risk (std-only)
//!
//! This crate is `no_std` compatible for embedded verification when
//! built without the `std` feature; the float-based risk models are
//! gated on `std`.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

// Re-export collections for submodules based on feature
#[cfg(not(feature = "std"))]
pub use alloc::{
    collections::{BTreeMap, BTreeSet},
    vec::Vec,
};
#[cfg(feature = "std")]
pub use std::{
    collections::{BTreeMap, BTreeSet},
    vec::Vec,
};

pub mod access;
pub mod adequacy;
pub mod constants;
pub mod errors;
pub mod events;
pub mod math;
pub mod premium;
pub mod purchase;
pub mod reinsurance;
pub mod types;
pub mod validation;
pub mod waterfall;

#[cfg(feature = "std")]
pub mod gbm;
#[cfg(feature = "std")]
pub mod risk_metrics;

#[cfg(test)]
mod integration_tests;

// Re-exports for convenience
pub use access::*;
pub use adequacy::*;
pub use constants::*;
pub use errors::*;
pub use events::*;
pub use math::*;
pub use premium::*;
pub use purchase::*;
pub use reinsurance::*;
pub use types::*;
pub use validation::*;
pub use waterfall::*;

#[cfg(feature = "std")]
pub use gbm::*;
#[cfg(feature = "std")]
pub use risk_metrics::*;
