//! Bank selection for new allocations.

use log::{debug, info};

use polmgr_hal::types::{BankId, BankOwner, BANK_COUNT};

use crate::acl::rule::{CompiledAcls, CompiledRule};
use crate::acl::types::RuleRef;
use crate::report::ErrorReport;

use super::orch::{PolicerBankError, PolicerBankOrch, Result};
use super::types::PolicerAttributes;

/// Placement mode for one bank selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectMode {
    /// The policer definition pins an explicit bank.
    Fixed(BankId),
    /// Compact per-ACL reuse, including scenario-exclusive sharing.
    Strict,
    /// Pick the owned bank with the most head-room.
    Balanced,
}

impl PolicerBankOrch {
    /// Chooses a bank for a new allocation and links the rule's ACL into
    /// it.
    ///
    /// `candidate` carries the policer attributes when a policer entry is
    /// being placed; counter placements pass `None` and are exempt from
    /// the configuration-sharing check.
    pub(crate) fn select_bank(
        &mut self,
        acls: &CompiledAcls,
        rule_ref: RuleRef,
        rule: &CompiledRule,
        candidate: Option<&PolicerAttributes>,
        mode: SelectMode,
        report: &mut ErrorReport,
    ) -> Result<BankId> {
        let chosen = match mode {
            SelectMode::Fixed(bank) => self.select_fixed(bank, rule_ref, candidate, report)?,
            SelectMode::Strict => {
                self.select_strict(acls, rule_ref, rule, candidate, report)?
            }
            SelectMode::Balanced => self.select_balanced(rule_ref, rule, candidate, report)?,
        };

        // Capacity is verified before the ACL registration so a failure
        // here leaves no partial state behind.
        let bank = self.bank_mut(chosen);
        if !bank.has_capacity() {
            report.annotate(rule_ref.acl, rule_ref.rule, "policer bank full");
            return Err(PolicerBankError::CapacityExceeded(format!(
                "bank {} has no free slot",
                chosen
            )));
        }
        bank.register_acl(rule_ref.acl);
        debug!(
            "selected bank {} for {} ({} slots free)",
            chosen,
            rule_ref,
            self.bank(chosen).map(|b| b.free_slots()).unwrap_or(0)
        );
        Ok(chosen)
    }

    fn select_fixed(
        &mut self,
        bank_id: BankId,
        rule_ref: RuleRef,
        candidate: Option<&PolicerAttributes>,
        report: &mut ErrorReport,
    ) -> Result<BankId> {
        if bank_id as usize >= BANK_COUNT {
            report.annotate(
                rule_ref.acl,
                rule_ref.rule,
                format!("invalid policer bank {}", bank_id),
            );
            return Err(PolicerBankError::InvalidArgument(format!(
                "bank {} out of range",
                bank_id
            )));
        }

        self.claim_bank(bank_id)?;

        if let Some(attrs) = candidate {
            if !self.bank_mut(bank_id).accepts(attrs) {
                return Err(PolicerBankError::ConfigConflict(format!(
                    "bank {} configuration cannot be shared",
                    bank_id
                )));
            }
        }
        Ok(bank_id)
    }

    fn select_strict(
        &mut self,
        acls: &CompiledAcls,
        rule_ref: RuleRef,
        rule: &CompiledRule,
        candidate: Option<&PolicerAttributes>,
        report: &mut ErrorReport,
    ) -> Result<BankId> {
        // 1. A bank already holding this rule's ACL.
        for (id, bank) in self.banks().iter().enumerate() {
            if rule.slot_index[id] != 0 {
                continue;
            }
            if bank.acl_refs.contains_key(&rule_ref.acl)
                && bank.has_capacity()
                && candidate.map_or(true, |attrs| bank.accepts(attrs))
            {
                return Ok(id as BankId);
            }
        }

        // 2. A bank whose occupant ACLs can never be evaluated together
        // with this rule's ACL: the OR of their scenario masks has no bit
        // in common with ours.
        let own_mask = acls.scenario_mask(rule_ref.acl).ok_or_else(|| {
            PolicerBankError::NotFound(format!("acl {} not in compiled set", rule_ref.acl))
        })?;
        for (id, bank) in self.banks().iter().enumerate() {
            if rule.slot_index[id] != 0 || bank.acl_refs.is_empty() || !bank.has_capacity() {
                continue;
            }
            let occupant_mask = bank
                .acl_refs
                .keys()
                .try_fold(0u32, |mask, &acl| acls.scenario_mask(acl).map(|m| mask | m));
            let exclusive = matches!(occupant_mask, Some(mask) if mask & own_mask == 0);
            if exclusive && candidate.map_or(true, |attrs| bank.accepts(attrs)) {
                debug!(
                    "bank {} shared with scenario-exclusive acls for {}",
                    id, rule_ref
                );
                return Ok(id as BankId);
            }
        }

        // 3. An unowned bank, or one we own with no ACLs attached.
        if let Some(id) = self.claimable_bank(rule)? {
            return Ok(id);
        }

        report.annotate(rule_ref.acl, rule_ref.rule, "policer bank full");
        Err(PolicerBankError::CapacityExceeded(
            "no policer bank available".to_string(),
        ))
    }

    fn select_balanced(
        &mut self,
        rule_ref: RuleRef,
        rule: &CompiledRule,
        candidate: Option<&PolicerAttributes>,
        report: &mut ErrorReport,
    ) -> Result<BankId> {
        let best = self
            .banks()
            .iter()
            .enumerate()
            .filter(|(id, bank)| {
                rule.slot_index[*id] == 0
                    && bank.owner == BankOwner::Acl
                    && bank.has_capacity()
                    && candidate.map_or(true, |attrs| bank.accepts(attrs))
            })
            .max_by_key(|(_, bank)| bank.free_slots())
            .map(|(id, _)| id as BankId);

        if let Some(id) = best {
            return Ok(id);
        }

        if let Some(id) = self.claimable_bank(rule)? {
            return Ok(id);
        }

        report.annotate(rule_ref.acl, rule_ref.rule, "policer bank full");
        Err(PolicerBankError::CapacityExceeded(
            "no policer bank available".to_string(),
        ))
    }

    /// Finds and claims the first bank that is unowned, or already ours
    /// with no ACLs attached.
    fn claimable_bank(&mut self, rule: &CompiledRule) -> Result<Option<BankId>> {
        let hal = self.hal();
        for id in 0..BANK_COUNT {
            if rule.slot_index[id] != 0 {
                continue;
            }
            let bank_id = id as BankId;
            let bank = &self.banks()[id];
            if bank.owner == BankOwner::Acl && bank.acl_refs.is_empty() {
                return Ok(Some(bank_id));
            }
            if bank.owner == BankOwner::None && hal.bank_owner(bank_id)? == BankOwner::None {
                self.claim_bank(bank_id)?;
                return Ok(Some(bank_id));
            }
        }
        Ok(None)
    }

    /// Claims a bank for this feature through the arbiter.
    fn claim_bank(&mut self, bank_id: BankId) -> Result<()> {
        let hal = self.hal();
        match hal.bank_owner(bank_id)? {
            BankOwner::None => {
                hal.set_bank_owner(bank_id, BankOwner::Acl)?;
                self.bank_mut(bank_id).owner = BankOwner::Acl;
                self.stats_mut().banks_claimed += 1;
                info!("claimed policer bank {}", bank_id);
                Ok(())
            }
            BankOwner::Acl => {
                self.bank_mut(bank_id).owner = BankOwner::Acl;
                Ok(())
            }
            BankOwner::Other => Err(PolicerBankError::OwnershipConflict(bank_id)),
        }
    }
}
