//! Hardware access port for the switch ASIC policer/counter engine.
//!
//! This crate is the boundary between the software resource manager and the
//! hardware register layer. It defines the register-image types the manager
//! computes and the [`PolicerHal`] trait through which they reach the ASIC.
//!
//! # Architecture
//!
//! ```text
//! [polmgr resource manager]
//!        │  register images (PolicerRegState, BankHwConfig, FfuRuleRewrite)
//!        ▼
//!   PolicerHal trait  ──>  register access layer  ──>  ASIC
//! ```
//!
//! All calls are synchronous: they may block on bus latency but never on
//! another manager operation. The manager runs under a caller-held
//! per-switch exclusivity guarantee, so implementations do not need their
//! own locking beyond what the bus layer requires.

pub mod api;
pub mod error;
pub mod types;

pub use api::PolicerHal;
pub use error::{HalError, HalResult};
pub use types::{
    BankHwConfig, BankId, BankOwner, CapacityField, FfuAction, FfuRuleRewrite, FfuSliceInfo,
    FfuSliceKey, HwColorSource, HwRateAction, PolicerHandle, PolicerRegState, RateField,
    SlotIndex, BANK_COUNT,
};
