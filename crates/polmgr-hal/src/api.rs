//! The hardware access port trait.

use crate::error::HalResult;
use crate::types::{
    BankHwConfig, BankId, BankOwner, FfuRuleRewrite, PolicerRegState, SlotIndex,
};

/// Register access surface of the policer/counter engine.
///
/// Implemented by the register access layer; the resource manager is the
/// only caller. Every method is synchronous and may block on bus latency.
///
/// `commit` flags follow the register layer's write-buffer convention:
/// `true` flushes the write to hardware immediately, `false` stages it for
/// a later flush.
pub trait PolicerHal: Send + Sync {
    /// Writes the committed/excess register pair of a policer slot.
    fn set_policer(
        &self,
        bank: BankId,
        index: SlotIndex,
        committed: &PolicerRegState,
        excess: &PolicerRegState,
    ) -> HalResult<()>;

    /// Writes a counter slot's frame/byte accumulators.
    fn set_policer_counter(
        &self,
        bank: BankId,
        index: SlotIndex,
        frames: u64,
        bytes: u64,
    ) -> HalResult<()>;

    /// Reads a counter slot's frame/byte accumulators.
    fn get_policer_counter(&self, bank: BankId, index: SlotIndex) -> HalResult<(u64, u64)>;

    /// Writes a bank's configuration register.
    fn set_policer_config(&self, bank: BankId, cfg: &BankHwConfig, commit: bool)
        -> HalResult<()>;

    /// Rewrites an installed FFU rule.
    ///
    /// `live` selects the traffic-safe rewrite sequence used when the rule
    /// is currently matching traffic (slot relocations).
    fn set_ffu_rule(&self, rewrite: &FfuRuleRewrite, live: bool, commit: bool) -> HalResult<()>;

    /// Transfers bank ownership through the arbiter.
    fn set_bank_owner(&self, bank: BankId, owner: BankOwner) -> HalResult<()>;

    /// Queries the arbiter for a bank's current owner.
    fn bank_owner(&self, bank: BankId) -> HalResult<BankOwner>;
}
