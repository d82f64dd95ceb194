//! Slot allocation and the per-rule orchestration entry points.

use log::debug;

use polmgr_hal::types::{BankId, PolicerHandle, SlotIndex};

use crate::acl::rule::{CompiledAcls, CompiledRule};
use crate::acl::types::{AclId, RuleId, RuleRef};
use crate::report::ErrorReport;

use super::bank::SlotEntry;
use super::encode::encode_policer;
use super::orch::{internal_error, PolicerBankError, PolicerBankOrch, Result};
use super::select::SelectMode;
use super::types::{BankRequest, PlacementPolicy, PolicerAttributes};

impl PolicerBankOrch {
    /// Commits one entry into a chosen bank.
    ///
    /// `policer` carries the handle and attributes for policer entries;
    /// `None` allocates a pure counter. The caller must have selected the
    /// bank ([`select_bank`](Self::select_bank)), which links the rule's
    /// ACL and verifies capacity.
    pub(crate) fn add_entry(
        &mut self,
        bank_id: BankId,
        policer: Option<(PolicerHandle, &PolicerAttributes)>,
        rule_ref: RuleRef,
        rule: &mut CompiledRule,
    ) -> Result<SlotIndex> {
        let index = {
            let bank = self.bank_mut(bank_id);

            if rule.slot_index[bank_id as usize] != 0 {
                return Err(internal_error(format!(
                    "{} already holds slot {} in bank {}",
                    rule_ref, rule.slot_index[bank_id as usize], bank_id
                )));
            }
            if !bank.acl_refs.contains_key(&rule_ref.acl) {
                return Err(internal_error(format!(
                    "acl {} not linked into bank {}",
                    rule_ref.acl, bank_id
                )));
            }
            if !bank.has_capacity() {
                return Err(PolicerBankError::CapacityExceeded(format!(
                    "bank {} has no free slot",
                    bank_id
                )));
            }

            match policer {
                Some((handle, attrs)) => {
                    if bank.policer_index.contains_key(&handle) {
                        return Err(internal_error(format!(
                            "policer {} already allocated in bank {}",
                            handle, bank_id
                        )));
                    }
                    let (committed, excess) = encode_policer(attrs);
                    bank.last_policer_index += 1;
                    let index = bank.last_policer_index;
                    let entry = SlotEntry::policer(handle, committed, excess, rule_ref);
                    if let Some(prev) = bank.entries.insert(index, entry) {
                        // Roll back everything this call touched before
                        // propagating.
                        bank.entries.insert(index, prev);
                        bank.last_policer_index -= 1;
                        return Err(internal_error(format!(
                            "bank {} slot {} already occupied",
                            bank_id, index
                        )));
                    }
                    bank.policer_index.insert(handle, index);
                    bank.merge_shared_config(attrs);
                    index
                }
                None => {
                    let index = bank.max_entries - bank.counter_count() as SlotIndex;
                    let entry = SlotEntry::counter(rule_ref);
                    if let Some(prev) = bank.entries.insert(index, entry) {
                        bank.entries.insert(index, prev);
                        return Err(internal_error(format!(
                            "bank {} slot {} already occupied",
                            bank_id, index
                        )));
                    }
                    index
                }
            }
        };

        rule.slot_index[bank_id as usize] = index;
        match policer {
            Some(_) => {
                rule.set_police_action(bank_id, index);
                self.stats_mut().policers_allocated += 1;
            }
            None => {
                rule.set_count_action(bank_id, index);
                self.stats_mut().counters_allocated += 1;
            }
        }
        debug!("{} -> bank {} slot {}", rule_ref, bank_id, index);
        Ok(index)
    }

    /// Attaches a rule to an already-allocated shared policer entry.
    fn attach_policer_reference(
        &mut self,
        bank_id: BankId,
        index: SlotIndex,
        rule_ref: RuleRef,
        rule: &mut CompiledRule,
    ) -> Result<()> {
        if rule.slot_index[bank_id as usize] != 0 {
            return Err(internal_error(format!(
                "{} already holds a slot in bank {}",
                rule_ref, bank_id
            )));
        }
        {
            let bank = self.bank_mut(bank_id);
            let entry = bank.entries.get_mut(&index).ok_or_else(|| {
                internal_error(format!("bank {} slot {} missing", bank_id, index))
            })?;
            if !entry.is_policer() {
                return Err(internal_error(format!(
                    "bank {} slot {} is not a policer",
                    bank_id, index
                )));
            }
            entry.rules.push(rule_ref);
        }
        self.bank_mut(bank_id).register_acl(rule_ref.acl);

        rule.slot_index[bank_id as usize] = index;
        rule.set_police_action(bank_id, index);
        self.stats_mut().references_attached += 1;
        debug!("{} shares policer at bank {} slot {}", rule_ref, bank_id, index);
        Ok(())
    }

    /// Runs `add_entry`, unwinding the selector's ACL registration on
    /// failure so the call leaves no partial state.
    fn add_entry_or_unwind(
        &mut self,
        bank_id: BankId,
        policer: Option<(PolicerHandle, &PolicerAttributes)>,
        rule_ref: RuleRef,
        rule: &mut CompiledRule,
    ) -> Result<SlotIndex> {
        match self.add_entry(bank_id, policer, rule_ref, rule) {
            Ok(index) => Ok(index),
            Err(err) => {
                self.bank_mut(bank_id).unregister_acl(rule_ref.acl);
                Err(err)
            }
        }
    }

    /// Bank and slot of the rule's policer entry, if placed.
    fn policer_slot_of_rule(&self, rule: &CompiledRule) -> Option<(BankId, SlotIndex)> {
        self.slot_of_kind(rule, true)
    }

    /// Bank and slot of the rule's counter entry, if placed.
    fn counter_slot_of_rule(&self, rule: &CompiledRule) -> Option<(BankId, SlotIndex)> {
        self.slot_of_kind(rule, false)
    }

    fn slot_of_kind(&self, rule: &CompiledRule, policer: bool) -> Option<(BankId, SlotIndex)> {
        for (id, bank) in self.banks().iter().enumerate() {
            let index = rule.slot_index[id];
            if index == 0 {
                continue;
            }
            if let Some(entry) = bank.entries.get(&index) {
                if entry.is_policer() == policer {
                    return Some((id as BankId, index));
                }
            }
        }
        None
    }

    /// First allocation pass for a rule: inflexible placements.
    ///
    /// Resolves the rule's policer handle, reuses an already-allocated
    /// shared policer where possible, and places fixed-bank policers. For
    /// police+count pairs outside strict mode it also lands the counter in
    /// a different bank through the balanced selector while head-room is
    /// greatest.
    pub fn preallocate(
        &mut self,
        acls: &mut CompiledAcls,
        acl_id: AclId,
        rule_id: RuleId,
        policy: PlacementPolicy,
        report: &mut ErrorReport,
    ) -> Result<()> {
        let rule_ref = RuleRef::new(acl_id, rule_id);
        let snapshot = acls
            .rule(acl_id, rule_id)
            .cloned()
            .ok_or_else(|| PolicerBankError::NotFound(format!("{}", rule_ref)))?;

        let Some(handle) = snapshot.police else {
            return Ok(());
        };

        let def = self.registry().lookup(handle).ok_or_else(|| {
            report.annotate(
                acl_id,
                rule_id,
                format!("policer {} is not registered", handle),
            );
            PolicerBankError::NotFound(format!("policer {}", handle))
        })?;

        if self.policer_slot_of_rule(&snapshot).is_none() {
            if let Some((bank_id, index)) = self.find_policer(handle) {
                let rule = acls
                    .rule_mut(acl_id, rule_id)
                    .ok_or_else(|| internal_error(format!("{} vanished", rule_ref)))?;
                self.attach_policer_reference(bank_id, index, rule_ref, rule)?;
            } else if let BankRequest::Fixed(requested) = def.bank {
                let bank_id = self.select_bank(
                    acls,
                    rule_ref,
                    &snapshot,
                    Some(&def.attributes),
                    SelectMode::Fixed(requested),
                    report,
                )?;
                let rule = acls
                    .rule_mut(acl_id, rule_id)
                    .ok_or_else(|| internal_error(format!("{} vanished", rule_ref)))?;
                self.add_entry_or_unwind(
                    bank_id,
                    Some((handle, &def.attributes)),
                    rule_ref,
                    rule,
                )?;
            }
            // Automatic placements wait for the configure pass.
        }

        if snapshot.count && policy == PlacementPolicy::Balanced {
            let snapshot = acls
                .rule(acl_id, rule_id)
                .cloned()
                .ok_or_else(|| internal_error(format!("{} vanished", rule_ref)))?;
            if self.counter_slot_of_rule(&snapshot).is_none() {
                let bank_id = self.select_bank(
                    acls,
                    rule_ref,
                    &snapshot,
                    None,
                    SelectMode::Balanced,
                    report,
                )?;
                let rule = acls
                    .rule_mut(acl_id, rule_id)
                    .ok_or_else(|| internal_error(format!("{} vanished", rule_ref)))?;
                self.add_entry_or_unwind(bank_id, None, rule_ref, rule)?;
            }
        }

        Ok(())
    }

    /// Second allocation pass for a rule: remaining flexible placements.
    ///
    /// Places whatever `preallocate` left unresolved, through the strict
    /// or balanced selector per the compilation policy.
    pub fn configure(
        &mut self,
        acls: &mut CompiledAcls,
        acl_id: AclId,
        rule_id: RuleId,
        policy: PlacementPolicy,
        report: &mut ErrorReport,
    ) -> Result<()> {
        let rule_ref = RuleRef::new(acl_id, rule_id);
        let mode = match policy {
            PlacementPolicy::Balanced => SelectMode::Balanced,
            PlacementPolicy::StrictCount => SelectMode::Strict,
        };

        let snapshot = acls
            .rule(acl_id, rule_id)
            .cloned()
            .ok_or_else(|| PolicerBankError::NotFound(format!("{}", rule_ref)))?;

        if let Some(handle) = snapshot.police {
            if self.policer_slot_of_rule(&snapshot).is_none() {
                let def = self.registry().lookup(handle).ok_or_else(|| {
                    report.annotate(
                        acl_id,
                        rule_id,
                        format!("policer {} is not registered", handle),
                    );
                    PolicerBankError::NotFound(format!("policer {}", handle))
                })?;

                if let Some((bank_id, index)) = self.find_policer(handle) {
                    let rule = acls
                        .rule_mut(acl_id, rule_id)
                        .ok_or_else(|| internal_error(format!("{} vanished", rule_ref)))?;
                    self.attach_policer_reference(bank_id, index, rule_ref, rule)?;
                } else {
                    let bank_id = self.select_bank(
                        acls,
                        rule_ref,
                        &snapshot,
                        Some(&def.attributes),
                        mode,
                        report,
                    )?;
                    let rule = acls
                        .rule_mut(acl_id, rule_id)
                        .ok_or_else(|| internal_error(format!("{} vanished", rule_ref)))?;
                    self.add_entry_or_unwind(
                        bank_id,
                        Some((handle, &def.attributes)),
                        rule_ref,
                        rule,
                    )?;
                }
            }
        }

        if snapshot.count {
            let snapshot = acls
                .rule(acl_id, rule_id)
                .cloned()
                .ok_or_else(|| internal_error(format!("{} vanished", rule_ref)))?;
            if self.counter_slot_of_rule(&snapshot).is_none() {
                let bank_id =
                    self.select_bank(acls, rule_ref, &snapshot, None, mode, report)?;
                let rule = acls
                    .rule_mut(acl_id, rule_id)
                    .ok_or_else(|| internal_error(format!("{} vanished", rule_ref)))?;
                self.add_entry_or_unwind(bank_id, None, rule_ref, rule)?;
            }
        }

        Ok(())
    }
}
