//! Hardware synchronization and in-place policer updates.

use log::{debug, info};

use polmgr_hal::types::{BankId, BankOwner, PolicerHandle};

use super::bank::EntryKind;
use super::encode::encode_policer;
use super::orch::{internal_error, PolicerBankError, PolicerBankOrch, Result};
use super::types::PolicerAttributes;

impl PolicerBankOrch {
    /// Pushes the full in-memory bank/entry image to hardware.
    ///
    /// For every bank held by this feature: the bank configuration
    /// register first, then each occupied slot in ascending index order:
    /// counters as zeroed accumulators, policers as their committed/excess
    /// register pair.
    pub fn apply(&self) -> Result<()> {
        let hal = self.hal();
        for (id, bank) in self.banks().iter().enumerate() {
            if bank.owner != BankOwner::Acl {
                continue;
            }
            let bank_id = id as BankId;
            hal.set_policer_config(bank_id, &bank.hw_config(), true)?;
            for (&index, entry) in bank.entries.iter() {
                match &entry.kind {
                    EntryKind::Counter => {
                        hal.set_policer_counter(bank_id, index, 0, 0)?;
                    }
                    EntryKind::Policer {
                        committed, excess, ..
                    } => {
                        hal.set_policer(bank_id, index, committed, excess)?;
                    }
                }
            }
            debug!(
                "synced bank {}: {} entries, last policer {}",
                bank_id,
                bank.entries.len(),
                bank.last_policer_index
            );
        }
        Ok(())
    }

    /// Updates an installed policer's rate configuration in place.
    ///
    /// The entry keeps its bank and slot. The bank's shared mark-down
    /// configuration is promoted when it had none and the new attributes
    /// request it; the slot's hardware counter is reset because the rate
    /// semantics changed.
    pub fn update_rate(
        &mut self,
        handle: PolicerHandle,
        attrs: &PolicerAttributes,
    ) -> Result<()> {
        let hal = self.hal();
        let (bank_id, index) = self
            .find_policer(handle)
            .ok_or_else(|| PolicerBankError::NotFound(format!("policer {}", handle)))?;

        if !self.banks()[bank_id as usize].accepts(attrs) {
            return Err(PolicerBankError::ConfigConflict(format!(
                "policer {} attributes cannot share bank {}",
                handle, bank_id
            )));
        }

        let promote = {
            let bank = &self.banks()[bank_id as usize];
            attrs.requests_mark_down() && !bank.mark_dscp && !bank.mark_switch_pri
        };
        if promote {
            let cfg = {
                let bank = self.bank_mut(bank_id);
                bank.mark_dscp = attrs.mark_dscp;
                bank.mark_switch_pri = attrs.mark_switch_pri;
                bank.hw_config()
            };
            hal.set_policer_config(bank_id, &cfg, true)?;
        }

        let (committed, excess) = encode_policer(attrs);
        hal.set_policer(bank_id, index, &committed, &excess)?;

        {
            let bank = self.bank_mut(bank_id);
            let entry = bank.entries.get_mut(&index).ok_or_else(|| {
                internal_error(format!("bank {} slot {} missing", bank_id, index))
            })?;
            match &mut entry.kind {
                EntryKind::Policer {
                    committed: c,
                    excess: e,
                    ..
                } => {
                    *c = committed;
                    *e = excess;
                }
                EntryKind::Counter => {
                    return Err(internal_error(format!(
                        "bank {} slot {} is not a policer",
                        bank_id, index
                    )));
                }
            }
        }

        // Accumulated statistics are meaningless under the new rates.
        hal.set_policer_counter(bank_id, index, 0, 0)?;
        info!(
            "updated policer {} in bank {} slot {}",
            handle, bank_id, index
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::types::RuleRef;
    use crate::policer::orch::PolicerBankConfig;
    use crate::policer::testutil::{test_orch, HalCall, TestSetup};
    use crate::policer::types::{ColorSource, RateAction, RateSpec};
    use pretty_assertions::assert_eq;

    fn attrs(color: ColorSource) -> PolicerAttributes {
        PolicerAttributes {
            color_source: color,
            ..PolicerAttributes::default()
        }
    }

    #[test]
    fn test_apply_writes_config_then_entries_in_order() {
        let TestSetup { mut orch, hal, .. } = test_orch(PolicerBankConfig::default());
        orch.seed_policer(0, 10, RuleRef::new(5, 1), &attrs(ColorSource::Blind));
        orch.seed_counter(0, RuleRef::new(5, 2));

        orch.apply().unwrap();

        let calls = hal.calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(
            calls[0],
            HalCall::SetPolicerConfig { bank: 0, cfg, commit: true }
                if cfg.last_policer_index == 1
        ));
        assert!(matches!(
            calls[1],
            HalCall::SetPolicer { bank: 0, index: 1, .. }
        ));
        assert_eq!(
            calls[2],
            HalCall::SetPolicerCounter {
                bank: 0,
                index: 4095,
                frames: 0,
                bytes: 0,
            }
        );
    }

    #[test]
    fn test_apply_skips_unowned_banks() {
        let TestSetup { orch, hal, .. } = test_orch(PolicerBankConfig::default());
        orch.apply().unwrap();
        assert_eq!(hal.call_count(), 0);
    }

    #[test]
    fn test_update_rate_rewrites_state_and_resets_counter() {
        let TestSetup { mut orch, hal, .. } = test_orch(PolicerBankConfig::default());
        orch.seed_policer(0, 10, RuleRef::new(5, 1), &attrs(ColorSource::Blind));

        let new_attrs = PolicerAttributes {
            color_source: ColorSource::Blind,
            committed: RateSpec {
                rate_kbps: 5000,
                capacity_bytes: 2048,
                action: RateAction::Drop,
            },
            ..PolicerAttributes::default()
        };
        orch.update_rate(10, &new_attrs).unwrap();

        let calls = hal.calls();
        assert!(calls.iter().any(|c| matches!(c,
            HalCall::SetPolicer { bank: 0, index: 1, committed, .. }
                if committed.rate.mantissa == 5000)));
        assert!(calls.contains(&HalCall::SetPolicerCounter {
            bank: 0,
            index: 1,
            frames: 0,
            bytes: 0,
        }));

        // The in-memory image matches what was written.
        let bank = orch.bank(0).unwrap();
        match &bank.entries.get(&1).unwrap().kind {
            EntryKind::Policer { committed, .. } => {
                assert_eq!(committed.rate.mantissa, 5000);
            }
            EntryKind::Counter => panic!("expected a policer entry"),
        }
    }

    #[test]
    fn test_update_rate_unknown_handle() {
        let TestSetup { mut orch, .. } = test_orch(PolicerBankConfig::default());
        let err = orch
            .update_rate(99, &attrs(ColorSource::Blind))
            .unwrap_err();
        assert!(matches!(err, PolicerBankError::NotFound(_)));
    }

    #[test]
    fn test_update_rate_color_conflict() {
        let TestSetup { mut orch, .. } = test_orch(PolicerBankConfig::default());
        orch.seed_policer(0, 10, RuleRef::new(5, 1), &attrs(ColorSource::Blind));

        let err = orch.update_rate(10, &attrs(ColorSource::Dscp)).unwrap_err();
        assert!(matches!(err, PolicerBankError::ConfigConflict(_)));
    }

    #[test]
    fn test_update_rate_promotes_mark_down() {
        let TestSetup { mut orch, hal, .. } = test_orch(PolicerBankConfig::default());
        orch.seed_policer(0, 10, RuleRef::new(5, 1), &attrs(ColorSource::Blind));

        let new_attrs = PolicerAttributes {
            color_source: ColorSource::Blind,
            mark_dscp: true,
            ..PolicerAttributes::default()
        };
        orch.update_rate(10, &new_attrs).unwrap();

        let bank = orch.bank(0).unwrap();
        assert!(bank.mark_dscp);
        assert!(!bank.mark_switch_pri);

        // The promoted bank config lands before the policer rewrite.
        let calls = hal.calls();
        let config = calls
            .iter()
            .position(|c| matches!(c, HalCall::SetPolicerConfig { bank: 0, cfg, .. }
                if cfg.mark_dscp))
            .unwrap();
        let policer = calls
            .iter()
            .position(|c| matches!(c, HalCall::SetPolicer { bank: 0, index: 1, .. }))
            .unwrap();
        assert!(config < policer);
    }
}
