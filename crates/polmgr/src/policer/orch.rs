//! PolicerBankOrch - owning state of the policer/counter bank manager.

use std::sync::Arc;

use log::error;
use serde::{Deserialize, Serialize};

use polmgr_hal::error::HalError;
use polmgr_hal::types::{BankId, PolicerHandle, SlotIndex, BANK_COUNT};
use polmgr_hal::PolicerHal;

use super::bank::Bank;
use super::types::PolicerRegistry;

/// Error type for policer bank operations.
#[derive(Debug, thiserror::Error)]
pub enum PolicerBankError {
    /// Handle, ACL or bank lookup failed.
    #[error("not found: {0}")]
    NotFound(String),

    /// No bank or slot available. A normal outcome during compilation;
    /// the compiler retries a different layout or fails the compile.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// The candidate cannot share the bank's current configuration.
    #[error("configuration conflict: {0}")]
    ConfigConflict(String),

    /// The bank is owned by another hardware feature.
    #[error("bank {0} owned by another feature")]
    OwnershipConflict(BankId),

    /// Out-of-range bank id or unsupported attribute.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An always-true invariant was violated. Fatal; never recovered.
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),

    /// Register access failure.
    #[error("hardware access: {0}")]
    Hal(#[from] HalError),
}

/// Result type for policer bank operations.
pub type Result<T> = std::result::Result<T, PolicerBankError>;

/// Builds an `InternalInconsistency`, logging it at error level so the
/// violation is never silent even when a caller maps the error.
pub(crate) fn internal_error(msg: String) -> PolicerBankError {
    error!("policer bank state inconsistent: {}", msg);
    PolicerBankError::InternalInconsistency(msg)
}

/// Configuration for the bank manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicerBankConfig {
    /// Highest addressable slot index per bank (index 0 is reserved, so
    /// this is also the usable capacity).
    pub bank_capacity: [SlotIndex; BANK_COUNT],
}

impl Default for PolicerBankConfig {
    fn default() -> Self {
        // Two large banks, two small banks.
        Self {
            bank_capacity: [4095, 4095, 511, 511],
        }
    }
}

/// Statistics for bank manager operations.
#[derive(Debug, Clone, Default)]
pub struct PolicerBankStats {
    /// Policer entries allocated.
    pub policers_allocated: u64,
    /// Counter entries allocated.
    pub counters_allocated: u64,
    /// Rules attached to an already-allocated shared policer.
    pub references_attached: u64,
    /// Entries deleted after their last reference was removed.
    pub entries_removed: u64,
    /// Entries physically relocated during compaction.
    pub relocations: u64,
    /// Banks claimed from the arbiter.
    pub banks_claimed: u64,
    /// Banks released back to the arbiter.
    pub banks_released: u64,
    /// Orphan sweep invocations.
    pub sweeps: u64,
}

/// The policer/counter bank resource manager.
pub struct PolicerBankOrch {
    /// Configuration.
    config: PolicerBankConfig,
    /// Per-bank state, indexed by bank id.
    banks: Vec<Bank>,
    /// Register access layer.
    hal: Arc<dyn PolicerHal>,
    /// Policer attribute registry.
    registry: Arc<dyn PolicerRegistry>,
    /// Statistics.
    stats: PolicerBankStats,
}

impl std::fmt::Debug for PolicerBankOrch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicerBankOrch")
            .field("config", &self.config)
            .field("occupied", &self.banks.iter().map(|b| b.entries.len()).collect::<Vec<_>>())
            .field("stats", &self.stats)
            .finish()
    }
}

impl PolicerBankOrch {
    /// Creates a bank manager over the given hardware port and registry.
    pub fn new(
        config: PolicerBankConfig,
        hal: Arc<dyn PolicerHal>,
        registry: Arc<dyn PolicerRegistry>,
    ) -> Self {
        let banks = config
            .bank_capacity
            .iter()
            .map(|&capacity| Bank::new(capacity))
            .collect();
        Self {
            config,
            banks,
            hal,
            registry,
            stats: PolicerBankStats::default(),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &PolicerBankConfig {
        &self.config
    }

    /// Returns the statistics.
    pub fn stats(&self) -> &PolicerBankStats {
        &self.stats
    }

    /// Returns a bank's state.
    pub fn bank(&self, bank: BankId) -> Option<&Bank> {
        self.banks.get(bank as usize)
    }

    /// Returns all banks in id order.
    pub fn banks(&self) -> &[Bank] {
        &self.banks
    }

    /// Finds the bank and slot holding an allocated policer handle.
    pub fn find_policer(&self, handle: PolicerHandle) -> Option<(BankId, SlotIndex)> {
        self.banks.iter().enumerate().find_map(|(id, bank)| {
            bank.policer_index
                .get(&handle)
                .map(|&idx| (id as BankId, idx))
        })
    }

    pub(crate) fn hal(&self) -> Arc<dyn PolicerHal> {
        Arc::clone(&self.hal)
    }

    pub(crate) fn registry(&self) -> Arc<dyn PolicerRegistry> {
        Arc::clone(&self.registry)
    }

    pub(crate) fn bank_mut(&mut self, bank: BankId) -> &mut Bank {
        &mut self.banks[bank as usize]
    }

    pub(crate) fn banks_mut(&mut self) -> &mut [Bank] {
        &mut self.banks
    }

    pub(crate) fn stats_mut(&mut self) -> &mut PolicerBankStats {
        &mut self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policer::testutil::{test_orch, TestSetup};

    #[test]
    fn test_new_orch_is_empty() {
        let TestSetup { orch, .. } = test_orch(PolicerBankConfig::default());
        assert_eq!(orch.banks().len(), BANK_COUNT);
        for bank in orch.banks() {
            assert!(bank.is_empty());
            assert_eq!(bank.last_policer_index, 0);
        }
        assert_eq!(orch.bank(0).unwrap().max_entries, 4095);
        assert_eq!(orch.bank(3).unwrap().max_entries, 511);
        assert!(orch.bank(BANK_COUNT as BankId).is_none());
    }

    #[test]
    fn test_find_policer_none() {
        let TestSetup { orch, .. } = test_orch(PolicerBankConfig::default());
        assert_eq!(orch.find_policer(1), None);
    }
}
