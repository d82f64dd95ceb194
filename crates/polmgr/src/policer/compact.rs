//! Live compaction: rule removal, swap-to-fill relocation, orphan sweep.
//!
//! Deleting an entry can open a hole inside an occupied region. The entry
//! at the region boundary (the highest policer slot, or the lowest counter
//! slot) is moved into the hole so both regions stay dense, every rule
//! referencing the moved entry is rewritten live, and a relocated
//! counter's abandoned hardware value is folded into its owning rule's
//! cumulative adjustment so counter reads stay continuous.

use log::{debug, info, warn};

use polmgr_hal::types::{BankId, BankOwner, SlotIndex, BANK_COUNT};

use crate::acl::rule::CompiledAcls;
use crate::acl::types::RuleRef;

use super::bank::EntryKind;
use super::orch::{internal_error, PolicerBankOrch, Result};

/// Bank mask selecting every bank.
pub const ALL_BANKS_MASK: u32 = (1 << BANK_COUNT) - 1;

impl PolicerBankOrch {
    /// Removes a rule's references from the banks selected by `bank_mask`,
    /// deleting and compacting any entry that loses its last reference.
    ///
    /// With `apply` false, hardware is left untouched while the in-memory
    /// maps change exactly as they would under `apply` true (software-only
    /// image diffing).
    pub fn remove_rule_from_banks(
        &mut self,
        acls: &mut CompiledAcls,
        rule_ref: RuleRef,
        bank_mask: u32,
        apply: bool,
    ) -> Result<()> {
        for id in 0..BANK_COUNT {
            if bank_mask & (1 << id) == 0 {
                continue;
            }
            let bank_id = id as BankId;
            let Some(index) = self.banks()[id].slot_of_rule(&rule_ref) else {
                continue;
            };
            let last_before = self.banks()[id].last_policer_index;

            let now_empty = {
                let bank = self.bank_mut(bank_id);
                let entry = bank.entries.get_mut(&index).ok_or_else(|| {
                    internal_error(format!("bank {} slot {} missing", bank_id, index))
                })?;
                if !entry.remove_rule(&rule_ref) {
                    return Err(internal_error(format!(
                        "{} not referenced at bank {} slot {}",
                        rule_ref, bank_id, index
                    )));
                }
                entry.rules.is_empty()
            };
            if !self.bank_mut(bank_id).unregister_acl(rule_ref.acl) {
                return Err(internal_error(format!(
                    "acl {} not registered in bank {}",
                    rule_ref.acl, bank_id
                )));
            }
            if let Some(rule) = acls.rule_mut(rule_ref.acl, rule_ref.rule) {
                rule.slot_index[id] = 0;
            }

            if now_empty {
                self.reclaim_slot(bank_id, index, acls, apply)?;
            }
            self.finish_bank(bank_id, last_before, apply)?;
            debug!("removed {} from bank {} slot {}", rule_ref, bank_id, index);
        }
        Ok(())
    }

    /// Garbage-collects references whose rules no longer exist in the
    /// compiled set, compacting as entries empty.
    ///
    /// Each bank is scanned over a snapshot of its keys; a pass that
    /// deletes anything triggers another pass, so entries relocated into
    /// already-visited slots are re-validated before the sweep finishes.
    /// A sweep over a clean image performs no relocations.
    pub fn sweep_orphans(&mut self, acls: &mut CompiledAcls, apply: bool) -> Result<()> {
        self.stats_mut().sweeps += 1;
        for id in 0..BANK_COUNT {
            let bank_id = id as BankId;
            loop {
                let mut mutated = false;
                let keys: Vec<SlotIndex> =
                    self.banks()[id].entries.keys().copied().collect();
                for index in keys {
                    let last_before = self.banks()[id].last_policer_index;

                    let dead: Vec<RuleRef> = {
                        let Some(entry) = self.banks()[id].entries.get(&index) else {
                            // Deleted or relocated earlier in this pass.
                            continue;
                        };
                        entry
                            .rules
                            .iter()
                            .filter(|r| !acls.contains_rule(r.acl, r.rule))
                            .copied()
                            .collect()
                    };
                    if dead.is_empty() {
                        continue;
                    }

                    let now_empty = {
                        let bank = self.bank_mut(bank_id);
                        let entry = bank.entries.get_mut(&index).ok_or_else(|| {
                            internal_error(format!("bank {} slot {} missing", bank_id, index))
                        })?;
                        for r in &dead {
                            entry.remove_rule(r);
                        }
                        entry.rules.is_empty()
                    };
                    {
                        let bank = self.bank_mut(bank_id);
                        for r in &dead {
                            if !bank.unregister_acl(r.acl) {
                                return Err(internal_error(format!(
                                    "acl {} not registered in bank {}",
                                    r.acl, bank_id
                                )));
                            }
                        }
                    }
                    debug!(
                        "swept {} orphan reference(s) from bank {} slot {}",
                        dead.len(),
                        bank_id,
                        index
                    );

                    if now_empty {
                        self.reclaim_slot(bank_id, index, acls, apply)?;
                        self.finish_bank(bank_id, last_before, apply)?;
                        mutated = true;
                    }
                }
                if !mutated {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Deletes the emptied entry at `freed` and closes the hole it leaves.
    ///
    /// The region boundary is taken while the freed entry is still in the
    /// map: the highest policer slot for policers, the lowest occupied
    /// counter slot for counters.
    fn reclaim_slot(
        &mut self,
        bank_id: BankId,
        freed: SlotIndex,
        acls: &mut CompiledAcls,
        apply: bool,
    ) -> Result<()> {
        let hal = self.hal();

        let (is_policer, boundary) = {
            let bank = &self.banks()[bank_id as usize];
            let entry = bank.entries.get(&freed).ok_or_else(|| {
                internal_error(format!("bank {} slot {} missing", bank_id, freed))
            })?;
            if !entry.rules.is_empty() {
                return Err(internal_error(format!(
                    "bank {} slot {} still referenced",
                    bank_id, freed
                )));
            }
            match entry.kind {
                EntryKind::Policer { .. } => (true, bank.last_policer_index),
                EntryKind::Counter => {
                    let boundary = bank.lowest_counter_index().ok_or_else(|| {
                        internal_error(format!("bank {} counter region empty", bank_id))
                    })?;
                    (false, boundary)
                }
            }
        };

        let removed = self
            .bank_mut(bank_id)
            .entries
            .remove(&freed)
            .ok_or_else(|| internal_error(format!("bank {} slot {} missing", bank_id, freed)))?;
        if let EntryKind::Policer { handle, .. } = &removed.kind {
            self.bank_mut(bank_id).policer_index.remove(handle);
        }
        self.stats_mut().entries_removed += 1;

        if is_policer {
            if freed != boundary {
                self.relocate_policer(bank_id, boundary, freed, acls, apply)?;
            }
            self.bank_mut(bank_id).last_policer_index = boundary - 1;
        } else {
            if apply {
                hal.set_policer_counter(bank_id, freed, 0, 0)?;
            }
            if freed != boundary {
                self.relocate_counter(bank_id, boundary, freed, acls, apply)?;
            }
        }
        Ok(())
    }

    /// Moves the policer entry at `from` into the freed slot `to`.
    fn relocate_policer(
        &mut self,
        bank_id: BankId,
        from: SlotIndex,
        to: SlotIndex,
        acls: &mut CompiledAcls,
        apply: bool,
    ) -> Result<()> {
        let hal = self.hal();
        {
            let bank = &self.banks()[bank_id as usize];
            let entry = bank.entries.get(&from).ok_or_else(|| {
                internal_error(format!("bank {} slot {} missing", bank_id, from))
            })?;
            if !entry.is_policer() {
                return Err(internal_error(format!(
                    "bank {} slot {} expected a policer",
                    bank_id, from
                )));
            }
        }
        let occupant = self
            .bank_mut(bank_id)
            .entries
            .remove(&from)
            .ok_or_else(|| internal_error(format!("bank {} slot {} missing", bank_id, from)))?;
        let (handle, committed, excess) = match &occupant.kind {
            EntryKind::Policer {
                handle,
                committed,
                excess,
            } => (*handle, *committed, *excess),
            EntryKind::Counter => {
                return Err(internal_error(format!(
                    "bank {} slot {} expected a policer",
                    bank_id, from
                )));
            }
        };

        for r in &occupant.rules {
            match acls.rule_mut(r.acl, r.rule) {
                Some(rule) => {
                    rule.slot_index[bank_id as usize] = to;
                    rule.set_police_action(bank_id, to);
                }
                None => warn!(
                    "{} not in compiled set while relocating policer {}",
                    r, handle
                ),
            }
        }
        if apply {
            hal.set_policer(bank_id, to, &committed, &excess)?;
            for r in &occupant.rules {
                if let Some(rule) = acls.rule(r.acl, r.rule) {
                    hal.set_ffu_rule(&rule.ffu_rewrite(), true, true)?;
                }
            }
        }

        let bank = self.bank_mut(bank_id);
        bank.policer_index.insert(handle, to);
        bank.entries.insert(to, occupant);
        self.stats_mut().relocations += 1;
        debug!(
            "relocated policer {} from slot {} to {} in bank {}",
            handle, from, to, bank_id
        );
        Ok(())
    }

    /// Moves the counter entry at `from` into the freed slot `to`,
    /// preserving the counter's cumulative value.
    fn relocate_counter(
        &mut self,
        bank_id: BankId,
        from: SlotIndex,
        to: SlotIndex,
        acls: &mut CompiledAcls,
        apply: bool,
    ) -> Result<()> {
        let hal = self.hal();
        {
            let bank = &self.banks()[bank_id as usize];
            let entry = bank.entries.get(&from).ok_or_else(|| {
                internal_error(format!("bank {} slot {} missing", bank_id, from))
            })?;
            if entry.is_policer() {
                return Err(internal_error(format!(
                    "bank {} slot {} expected a counter",
                    bank_id, from
                )));
            }
        }
        let occupant = self
            .bank_mut(bank_id)
            .entries
            .remove(&from)
            .ok_or_else(|| internal_error(format!("bank {} slot {} missing", bank_id, from)))?;

        for r in &occupant.rules {
            match acls.rule_mut(r.acl, r.rule) {
                Some(rule) => {
                    rule.slot_index[bank_id as usize] = to;
                    rule.set_count_action(bank_id, to);
                }
                None => warn!(
                    "{} not in compiled set while relocating counter slot {}",
                    r, from
                ),
            }
        }
        if apply {
            for r in &occupant.rules {
                if let Some(rule) = acls.rule(r.acl, r.rule) {
                    hal.set_ffu_rule(&rule.ffu_rewrite(), true, true)?;
                }
            }
            // The abandoned slot's accumulated value moves into the owning
            // rule's software adjustment; the new slot was zeroed when it
            // was freed, so reads stay continuous across the move.
            let (frames, bytes) = hal.get_policer_counter(bank_id, from)?;
            let live = occupant
                .rules
                .iter()
                .find(|r| acls.contains_rule(r.acl, r.rule))
                .copied();
            if let Some(r) = live {
                let rule = acls
                    .rule_mut(r.acl, r.rule)
                    .ok_or_else(|| internal_error(format!("{} vanished", r)))?;
                rule.counter_frames_adj = rule.counter_frames_adj.saturating_add(frames);
                rule.counter_bytes_adj = rule.counter_bytes_adj.saturating_add(bytes);
            }
        }

        self.bank_mut(bank_id).entries.insert(to, occupant);
        self.stats_mut().relocations += 1;
        debug!(
            "relocated counter from slot {} to {} in bank {}",
            from, to, bank_id
        );
        Ok(())
    }

    /// Post-removal bank maintenance: reset and release an emptied bank,
    /// or push the updated configuration when the policer region shrank.
    fn finish_bank(&mut self, bank_id: BankId, last_before: SlotIndex, apply: bool) -> Result<()> {
        let hal = self.hal();
        if self.banks()[bank_id as usize].is_empty() {
            {
                let bank = self.bank_mut(bank_id);
                if bank.last_policer_index != 0 || !bank.acl_refs.is_empty() {
                    return Err(internal_error(format!(
                        "bank {} empty but still configured (last {}, {} acls)",
                        bank_id,
                        bank.last_policer_index,
                        bank.acl_refs.len()
                    )));
                }
                bank.reset_shared_config();
            }
            if apply {
                let cfg = self.banks()[bank_id as usize].hw_config();
                hal.set_policer_config(bank_id, &cfg, true)?;
                if hal.bank_owner(bank_id)? == BankOwner::Acl {
                    hal.set_bank_owner(bank_id, BankOwner::None)?;
                }
            }
            if self.banks()[bank_id as usize].owner == BankOwner::Acl {
                self.bank_mut(bank_id).owner = BankOwner::None;
                self.stats_mut().banks_released += 1;
                info!("released policer bank {}", bank_id);
            }
        } else if self.banks()[bank_id as usize].last_policer_index != last_before && apply {
            let cfg = self.banks()[bank_id as usize].hw_config();
            hal.set_policer_config(bank_id, &cfg, true)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::rule::CompiledAcls;
    use crate::policer::orch::{PolicerBankConfig, PolicerBankError};
    use crate::policer::testutil::{
        assert_bank_invariants, police_count_rule, test_orch, HalCall, TestSetup,
    };
    use crate::policer::types::{ColorSource, PlacementPolicy, PolicerAttributes};
    use crate::report::ErrorReport;
    use polmgr_hal::types::{FfuAction, HwColorSource, PolicerRegState};
    use pretty_assertions::assert_eq;

    fn attrs() -> PolicerAttributes {
        PolicerAttributes {
            color_source: ColorSource::Blind,
            ..PolicerAttributes::default()
        }
    }

    /// Seeds `n` single-reference policers into bank 0, slots 1..=n, with
    /// handles and rule ids matching the slot number.
    fn seeded_policers(
        orch: &mut crate::policer::PolicerBankOrch,
        acls: &mut CompiledAcls,
        n: u16,
    ) {
        for i in 1..=n {
            let rref = police_count_rule(acls, 5, i as u32, 0b0001, Some(i as u32), false);
            orch.seed_policer(0, i as u32, rref, &attrs());
            let rule = acls.rule_mut(5, i as u32).unwrap();
            rule.slot_index[0] = i;
            rule.set_police_action(0, i);
        }
    }

    /// Seeds `n` single-reference counters into bank 2 for ACL 7.
    fn seeded_counters(
        orch: &mut crate::policer::PolicerBankOrch,
        acls: &mut CompiledAcls,
        n: u16,
    ) -> Vec<u16> {
        let mut slots = Vec::new();
        for i in 1..=n {
            let rref = police_count_rule(acls, 7, i as u32, 0b0001, None, true);
            let index = orch.seed_counter(2, rref);
            let rule = acls.rule_mut(7, i as u32).unwrap();
            rule.slot_index[2] = index;
            rule.set_count_action(2, index);
            slots.push(index);
        }
        slots
    }

    #[test]
    fn test_add_remove_round_trip_restores_bank() {
        let TestSetup {
            mut orch,
            hal,
            registry,
        } = test_orch(PolicerBankConfig::default());
        let mut report = ErrorReport::new();
        let mut acls = CompiledAcls::new();
        police_count_rule(&mut acls, 5, 1, 0b0001, Some(10), false);
        registry.define_fixed(10, 0, attrs());

        orch.preallocate(&mut acls, 5, 1, PlacementPolicy::Balanced, &mut report)
            .unwrap();
        let calls_before = hal.call_count();

        orch.remove_rule_from_banks(&mut acls, RuleRef::new(5, 1), ALL_BANKS_MASK, false)
            .unwrap();

        let bank = orch.bank(0).unwrap();
        assert!(bank.is_empty());
        assert_eq!(bank.last_policer_index, 0);
        assert!(bank.policer_index.is_empty());
        assert!(bank.acl_refs.is_empty());
        assert_eq!(bank.color_source, HwColorSource::AssumeGreen);
        assert!(!bank.mark_dscp && !bank.mark_switch_pri);
        assert_eq!(acls.rule(5, 1).unwrap().slot_index[0], 0);

        // Dry run: nothing reached the hardware, and the arbiter still
        // shows the claim taken during selection.
        assert_eq!(hal.call_count(), calls_before);
        assert_eq!(hal.owner_of(0), polmgr_hal::types::BankOwner::Acl);
    }

    #[test]
    fn test_removing_middle_policer_relocates_boundary_entry() {
        let TestSetup { mut orch, hal, .. } = test_orch(PolicerBankConfig::default());
        let mut acls = CompiledAcls::new();
        seeded_policers(&mut orch, &mut acls, 4);

        orch.remove_rule_from_banks(&mut acls, RuleRef::new(5, 2), ALL_BANKS_MASK, true)
            .unwrap();

        let bank = orch.bank(0).unwrap();
        assert_eq!(bank.last_policer_index, 3);
        assert_eq!(bank.policer_index.get(&4), Some(&2));
        assert!(bank.policer_index.get(&2).is_none());
        assert_eq!(acls.rule(5, 4).unwrap().slot_index[0], 2);
        assert!(acls
            .rule(5, 4)
            .unwrap()
            .actions
            .contains(&FfuAction::Police { bank: 0, index: 2 }));
        assert_eq!(orch.stats().relocations, 1);
        assert_eq!(orch.stats().entries_removed, 1);
        assert_bank_invariants(&orch, 0);

        let calls = hal.calls();
        assert!(calls.contains(&HalCall::SetPolicer {
            bank: 0,
            index: 2,
            committed: PolicerRegState::default(),
            excess: PolicerRegState::default(),
        }));
        assert!(calls
            .iter()
            .any(|c| matches!(c, HalCall::SetFfuRule { live: true, .. })));
        // The policer region shrank, so the bank config was pushed.
        assert!(calls
            .iter()
            .any(|c| matches!(c, HalCall::SetPolicerConfig { bank: 0, cfg, .. }
                if cfg.last_policer_index == 3)));
    }

    #[test]
    fn test_removing_top_policer_relocates_nothing() {
        let TestSetup { mut orch, .. } = test_orch(PolicerBankConfig::default());
        let mut acls = CompiledAcls::new();
        seeded_policers(&mut orch, &mut acls, 4);

        orch.remove_rule_from_banks(&mut acls, RuleRef::new(5, 4), ALL_BANKS_MASK, true)
            .unwrap();

        let bank = orch.bank(0).unwrap();
        assert_eq!(bank.last_policer_index, 3);
        assert_eq!(orch.stats().relocations, 0);
        assert_eq!(bank.entries.len(), 3);
        assert_bank_invariants(&orch, 0);
    }

    #[test]
    fn test_counter_relocation_preserves_continuity() {
        let TestSetup { mut orch, hal, .. } = test_orch(PolicerBankConfig::default());
        let mut acls = CompiledAcls::new();
        let slots = seeded_counters(&mut orch, &mut acls, 3);
        assert_eq!(slots, vec![511, 510, 509]);

        // The freed slot's own value must never leak into the moved rule.
        hal.set_counter_value(2, 511, 999, 9999);
        hal.set_counter_value(2, 509, 100, 2000);
        {
            let rule = acls.rule_mut(7, 3).unwrap();
            rule.counter_frames_adj = 5;
            rule.counter_bytes_adj = 50;
        }

        orch.remove_rule_from_banks(&mut acls, RuleRef::new(7, 1), 1 << 2, true)
            .unwrap();

        let rule = acls.rule(7, 3).unwrap();
        assert_eq!(rule.slot_index[2], 511);
        assert!(rule
            .actions
            .contains(&FfuAction::Count { bank: 2, index: 511 }));
        assert_eq!(rule.counter_frames_adj, 105);
        assert_eq!(rule.counter_bytes_adj, 2050);

        let bank = orch.bank(2).unwrap();
        assert_eq!(bank.counter_count(), 2);
        assert_eq!(bank.lowest_counter_index(), Some(510));
        assert_bank_invariants(&orch, 2);

        // Freed slot zeroed, then the live rewrite, then the boundary read.
        let calls = hal.calls();
        let zero = calls
            .iter()
            .position(|c| {
                *c == HalCall::SetPolicerCounter {
                    bank: 2,
                    index: 511,
                    frames: 0,
                    bytes: 0,
                }
            })
            .unwrap();
        let rewrite = calls
            .iter()
            .position(|c| matches!(c, HalCall::SetFfuRule { live: true, .. }))
            .unwrap();
        let read = calls
            .iter()
            .position(|c| *c == HalCall::GetPolicerCounter { bank: 2, index: 509 })
            .unwrap();
        assert!(zero < rewrite);
        assert!(rewrite < read);
    }

    #[test]
    fn test_removing_boundary_counter_relocates_nothing() {
        let TestSetup { mut orch, hal, .. } = test_orch(PolicerBankConfig::default());
        let mut acls = CompiledAcls::new();
        seeded_counters(&mut orch, &mut acls, 3);

        orch.remove_rule_from_banks(&mut acls, RuleRef::new(7, 3), 1 << 2, true)
            .unwrap();

        let bank = orch.bank(2).unwrap();
        assert_eq!(bank.counter_count(), 2);
        assert_eq!(bank.lowest_counter_index(), Some(510));
        assert_eq!(orch.stats().relocations, 0);
        assert!(hal.calls().contains(&HalCall::SetPolicerCounter {
            bank: 2,
            index: 509,
            frames: 0,
            bytes: 0,
        }));
        assert_bank_invariants(&orch, 2);
    }

    #[test]
    fn test_removing_shared_policer_reference_keeps_entry() {
        let TestSetup {
            mut orch, registry, ..
        } = test_orch(PolicerBankConfig::default());
        let mut report = ErrorReport::new();
        let mut acls = CompiledAcls::new();
        police_count_rule(&mut acls, 5, 1, 0b0001, Some(10), false);
        police_count_rule(&mut acls, 6, 1, 0b0010, Some(10), false);
        registry.define_fixed(10, 0, attrs());

        orch.preallocate(&mut acls, 5, 1, PlacementPolicy::Balanced, &mut report)
            .unwrap();
        orch.preallocate(&mut acls, 6, 1, PlacementPolicy::Balanced, &mut report)
            .unwrap();

        orch.remove_rule_from_banks(&mut acls, RuleRef::new(5, 1), ALL_BANKS_MASK, false)
            .unwrap();

        let bank = orch.bank(0).unwrap();
        assert_eq!(bank.entries.get(&1).unwrap().rules, vec![RuleRef::new(6, 1)]);
        assert_eq!(bank.last_policer_index, 1);
        assert!(bank.acl_refs.get(&5).is_none());
        assert_eq!(bank.acl_refs.get(&6), Some(&1));
        assert_eq!(orch.stats().entries_removed, 0);
    }

    #[test]
    fn test_emptied_bank_is_reset_and_released() {
        let TestSetup {
            mut orch,
            hal,
            registry,
        } = test_orch(PolicerBankConfig::default());
        let mut report = ErrorReport::new();
        let mut acls = CompiledAcls::new();
        police_count_rule(&mut acls, 5, 1, 0b0001, Some(10), false);
        registry.define_fixed(10, 0, attrs());
        orch.preallocate(&mut acls, 5, 1, PlacementPolicy::Balanced, &mut report)
            .unwrap();

        orch.remove_rule_from_banks(&mut acls, RuleRef::new(5, 1), ALL_BANKS_MASK, true)
            .unwrap();

        assert_eq!(hal.owner_of(0), polmgr_hal::types::BankOwner::None);
        assert_eq!(
            orch.bank(0).unwrap().owner,
            polmgr_hal::types::BankOwner::None
        );
        assert_eq!(orch.stats().banks_released, 1);
        let calls = hal.calls();
        assert!(calls
            .iter()
            .any(|c| matches!(c, HalCall::SetPolicerConfig { bank: 0, cfg, .. }
                if cfg.last_policer_index == 0 && !cfg.mark_dscp)));
        assert!(calls.contains(&HalCall::SetBankOwner {
            bank: 0,
            owner: polmgr_hal::types::BankOwner::None,
        }));
    }

    #[test]
    fn test_sweep_removes_orphans_and_compacts() {
        let TestSetup { mut orch, hal, .. } = test_orch(PolicerBankConfig::default());
        let mut acls = CompiledAcls::new();
        seeded_policers(&mut orch, &mut acls, 3);

        acls.remove_rule(5, 1);
        orch.sweep_orphans(&mut acls, true).unwrap();

        let bank = orch.bank(0).unwrap();
        assert_eq!(bank.last_policer_index, 2);
        assert_eq!(bank.entries.len(), 2);
        assert_eq!(bank.policer_index.get(&3), Some(&1));
        assert_eq!(bank.policer_index.get(&2), Some(&2));
        assert_eq!(bank.acl_refs.get(&5), Some(&2));
        assert_eq!(acls.rule(5, 3).unwrap().slot_index[0], 1);
        assert_eq!(orch.stats().relocations, 1);
        assert_bank_invariants(&orch, 0);

        // A second sweep over the unchanged image is a no-op.
        let calls_before = hal.call_count();
        orch.sweep_orphans(&mut acls, true).unwrap();
        assert_eq!(orch.stats().relocations, 1);
        assert_eq!(orch.bank(0).unwrap().entries.len(), 2);
        assert_eq!(hal.call_count(), calls_before);
    }

    #[test]
    fn test_sweep_revalidates_relocated_entries() {
        // The entry relocated into an already-visited slot is itself an
        // orphan; the follow-up pass must reap it too.
        let TestSetup { mut orch, .. } = test_orch(PolicerBankConfig::default());
        let mut acls = CompiledAcls::new();
        seeded_policers(&mut orch, &mut acls, 3);

        acls.remove_rule(5, 1);
        acls.remove_rule(5, 3);
        orch.sweep_orphans(&mut acls, false).unwrap();

        let bank = orch.bank(0).unwrap();
        assert_eq!(bank.entries.len(), 1);
        assert_eq!(bank.last_policer_index, 1);
        assert_eq!(bank.policer_index.get(&2), Some(&1));
        assert_eq!(bank.acl_refs.get(&5), Some(&1));
        assert_eq!(acls.rule(5, 2).unwrap().slot_index[0], 1);
        assert_eq!(orch.stats().entries_removed, 2);
        assert_eq!(orch.stats().relocations, 2);
        assert_bank_invariants(&orch, 0);
    }

    #[test]
    fn test_remove_skips_banks_without_the_rule() {
        let TestSetup { mut orch, .. } = test_orch(PolicerBankConfig::default());
        let mut acls = CompiledAcls::new();
        seeded_policers(&mut orch, &mut acls, 1);

        // Rule (9, 9) holds nothing anywhere; the removal is a no-op.
        orch.remove_rule_from_banks(&mut acls, RuleRef::new(9, 9), ALL_BANKS_MASK, true)
            .unwrap();
        assert_eq!(orch.bank(0).unwrap().entries.len(), 1);
        assert_eq!(orch.stats().entries_removed, 0);
    }

    #[test]
    fn test_internal_inconsistency_is_fatal() {
        let TestSetup { mut orch, .. } = test_orch(PolicerBankConfig::default());
        let mut acls = CompiledAcls::new();
        seeded_policers(&mut orch, &mut acls, 1);

        // Corrupt the ACL ref counts behind the manager's back.
        orch.bank_mut(0).acl_refs.clear();

        let err = orch
            .remove_rule_from_banks(&mut acls, RuleRef::new(5, 1), ALL_BANKS_MASK, false)
            .unwrap_err();
        assert!(matches!(err, PolicerBankError::InternalInconsistency(_)));
    }
}
