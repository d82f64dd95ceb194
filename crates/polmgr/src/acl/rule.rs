//! Compiled rule and ACL structures.

use std::collections::BTreeMap;

use polmgr_hal::types::{
    BankId, FfuAction, FfuRuleRewrite, FfuSliceInfo, FfuSliceKey, PolicerHandle, SlotIndex,
    BANK_COUNT,
};

use super::types::{AclId, RuleId};

/// One compiled ACL rule.
///
/// The compiler fills in the match image (`slice`, `position`, `key`) and
/// the resource requests (`police`, `count`); the resource manager owns the
/// per-bank `slot_index` array and keeps the policer/counter references in
/// `actions` consistent with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledRule {
    /// Policer handle this rule applies, if it polices.
    pub police: Option<PolicerHandle>,
    /// Whether this rule needs a frame/byte counter.
    pub count: bool,
    /// Slot held in each bank; 0 means no slot in that bank.
    pub slot_index: [SlotIndex; BANK_COUNT],
    /// Hardware action words, including policer/counter references.
    pub actions: Vec<FfuAction>,
    /// Cumulative frame count carried across counter relocations.
    pub counter_frames_adj: u64,
    /// Cumulative byte count carried across counter relocations.
    pub counter_bytes_adj: u64,
    /// FFU slice placement.
    pub slice: FfuSliceInfo,
    /// Row position within the slice.
    pub position: u16,
    /// Whether the rule is installed.
    pub valid: bool,
    /// Key slices of the match image.
    pub key: Vec<FfuSliceKey>,
}

impl CompiledRule {
    /// Creates a rule with no resource requests.
    pub fn new() -> Self {
        Self {
            police: None,
            count: false,
            slot_index: [0; BANK_COUNT],
            actions: Vec::new(),
            counter_frames_adj: 0,
            counter_bytes_adj: 0,
            slice: FfuSliceInfo::default(),
            position: 0,
            valid: false,
            key: Vec::new(),
        }
    }

    /// Points this rule's policer action at `(bank, index)`.
    ///
    /// Adds the action word if the rule does not carry one yet (first
    /// placement); rewrites it in place otherwise (relocation).
    pub fn set_police_action(&mut self, bank: BankId, index: SlotIndex) {
        for action in self.actions.iter_mut() {
            if let FfuAction::Police { bank: b, index: i } = action {
                *b = bank;
                *i = index;
                return;
            }
        }
        self.actions.push(FfuAction::Police { bank, index });
    }

    /// Points this rule's counter action at `(bank, index)`; same contract
    /// as [`set_police_action`](Self::set_police_action).
    pub fn set_count_action(&mut self, bank: BankId, index: SlotIndex) {
        for action in self.actions.iter_mut() {
            if let FfuAction::Count { bank: b, index: i } = action {
                *b = bank;
                *i = index;
                return;
            }
        }
        self.actions.push(FfuAction::Count { bank, index });
    }

    /// Builds the live-rewrite image for this rule.
    pub fn ffu_rewrite(&self) -> FfuRuleRewrite {
        FfuRuleRewrite {
            slice: self.slice,
            position: self.position,
            valid: self.valid,
            key: self.key.clone(),
            actions: self.actions.clone(),
        }
    }
}

impl Default for CompiledRule {
    fn default() -> Self {
        Self::new()
    }
}

/// One compiled ACL: scenario validity mask plus its rules.
#[derive(Debug, Clone, Default)]
pub struct CompiledAcl {
    /// Bitmask of hardware evaluation scenarios in which this ACL's rules
    /// can match. Two ACLs with disjoint masks can never be evaluated in
    /// the same pass.
    pub scenario_mask: u32,
    /// Rules keyed by rule number.
    pub rules: BTreeMap<RuleId, CompiledRule>,
}

impl CompiledAcl {
    /// Creates an ACL with the given scenario mask and no rules.
    pub fn new(scenario_mask: u32) -> Self {
        Self {
            scenario_mask,
            rules: BTreeMap::new(),
        }
    }
}

/// The compiled image: every ACL in the current rule set.
#[derive(Debug, Clone, Default)]
pub struct CompiledAcls {
    /// ACLs keyed by ACL number.
    pub acls: BTreeMap<AclId, CompiledAcl>,
}

impl CompiledAcls {
    /// Creates an empty image.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up an ACL.
    pub fn acl(&self, acl: AclId) -> Option<&CompiledAcl> {
        self.acls.get(&acl)
    }

    /// Looks up a rule.
    pub fn rule(&self, acl: AclId, rule: RuleId) -> Option<&CompiledRule> {
        self.acls.get(&acl).and_then(|a| a.rules.get(&rule))
    }

    /// Looks up a rule mutably.
    pub fn rule_mut(&mut self, acl: AclId, rule: RuleId) -> Option<&mut CompiledRule> {
        self.acls.get_mut(&acl).and_then(|a| a.rules.get_mut(&rule))
    }

    /// Returns true if the rule exists in the current rule set.
    ///
    /// This is the liveness query the orphan sweep runs against every slot
    /// reference.
    pub fn contains_rule(&self, acl: AclId, rule: RuleId) -> bool {
        self.rule(acl, rule).is_some()
    }

    /// Returns an ACL's scenario mask, if the ACL exists.
    pub fn scenario_mask(&self, acl: AclId) -> Option<u32> {
        self.acl(acl).map(|a| a.scenario_mask)
    }

    /// Inserts a rule, creating the ACL with `scenario_mask` if absent.
    pub fn insert_rule(
        &mut self,
        acl: AclId,
        scenario_mask: u32,
        rule: RuleId,
        compiled: CompiledRule,
    ) {
        self.acls
            .entry(acl)
            .or_insert_with(|| CompiledAcl::new(scenario_mask))
            .rules
            .insert(rule, compiled);
    }

    /// Removes a rule, dropping the ACL when its last rule goes.
    pub fn remove_rule(&mut self, acl: AclId, rule: RuleId) -> Option<CompiledRule> {
        let compiled_acl = self.acls.get_mut(&acl)?;
        let removed = compiled_acl.rules.remove(&rule);
        if compiled_acl.rules.is_empty() {
            self.acls.remove(&acl);
        }
        removed
    }
}
