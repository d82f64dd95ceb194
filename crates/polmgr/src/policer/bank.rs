//! Bank and slot-entry state.

use std::collections::{BTreeMap, HashMap};

use polmgr_hal::types::{
    BankHwConfig, BankOwner, HwColorSource, PolicerHandle, PolicerRegState, SlotIndex,
};

use crate::acl::types::{AclId, RuleRef};

use super::types::PolicerAttributes;

/// What a slot holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// Rate-policer state and the external handle it was created for.
    Policer {
        /// External policer handle.
        handle: PolicerHandle,
        /// Committed-tier register image.
        committed: PolicerRegState,
        /// Excess-tier register image.
        excess: PolicerRegState,
    },
    /// Pass-through frame/byte counter; addressed only through the rule
    /// that owns it.
    Counter,
}

/// One occupied slot.
///
/// An entry always carries at least one referencing rule; emptying the
/// list is immediately followed by deletion of the entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotEntry {
    /// What the slot holds.
    pub kind: EntryKind,
    /// Rules referencing this slot. Counter entries have exactly one;
    /// policer entries have one per rule sharing the handle.
    pub rules: Vec<RuleRef>,
}

impl SlotEntry {
    /// Creates a policer entry referenced by `rule`.
    pub fn policer(
        handle: PolicerHandle,
        committed: PolicerRegState,
        excess: PolicerRegState,
        rule: RuleRef,
    ) -> Self {
        Self {
            kind: EntryKind::Policer {
                handle,
                committed,
                excess,
            },
            rules: vec![rule],
        }
    }

    /// Creates a counter entry owned by `rule`.
    pub fn counter(rule: RuleRef) -> Self {
        Self {
            kind: EntryKind::Counter,
            rules: vec![rule],
        }
    }

    /// Returns true for policer-kind entries.
    pub fn is_policer(&self) -> bool {
        matches!(self.kind, EntryKind::Policer { .. })
    }

    /// Removes `rule` from the reference list by value.
    ///
    /// Returns true if the reference was present.
    pub fn remove_rule(&mut self, rule: &RuleRef) -> bool {
        match self.rules.iter().position(|r| r == rule) {
            Some(pos) => {
                self.rules.swap_remove(pos);
                true
            }
            None => false,
        }
    }
}

/// One policer/counter bank.
///
/// Policer entries occupy the dense range `1..=last_policer_index`
/// (index 0 is reserved by the hardware); counter entries occupy the dense
/// range `max_entries` downward. The two regions grow toward each other
/// inside the same slot array.
#[derive(Debug, Clone)]
pub struct Bank {
    /// In-memory mirror of the arbiter's ownership state.
    pub owner: BankOwner,
    /// Color source shared by every policer entry; meaningful only while
    /// `last_policer_index > 0`.
    pub color_source: HwColorSource,
    /// DSCP mark-down, OR-accumulated while the bank is non-empty.
    pub mark_dscp: bool,
    /// Switch-priority mark-down, OR-accumulated while the bank is
    /// non-empty.
    pub mark_switch_pri: bool,
    /// Highest occupied policer index; 0 when no policer entries exist.
    pub last_policer_index: SlotIndex,
    /// Occupied slots by index.
    pub entries: BTreeMap<SlotIndex, SlotEntry>,
    /// External policer handle to slot index.
    pub policer_index: HashMap<PolicerHandle, SlotIndex>,
    /// Per-ACL count of rules currently referencing any slot here.
    pub acl_refs: BTreeMap<AclId, u32>,
    /// Highest addressable slot index; usable capacity, since index 0 is
    /// reserved.
    pub max_entries: SlotIndex,
}

impl Bank {
    /// Creates an empty, unowned bank with the given capacity.
    pub fn new(max_entries: SlotIndex) -> Self {
        Self {
            owner: BankOwner::None,
            color_source: HwColorSource::AssumeGreen,
            mark_dscp: false,
            mark_switch_pri: false,
            last_policer_index: 0,
            entries: BTreeMap::new(),
            policer_index: HashMap::new(),
            acl_refs: BTreeMap::new(),
            max_entries,
        }
    }

    /// Number of counter entries.
    pub fn counter_count(&self) -> usize {
        self.entries.len() - self.last_policer_index as usize
    }

    /// Number of unoccupied slots.
    pub fn free_slots(&self) -> usize {
        self.max_entries as usize - self.entries.len()
    }

    /// Returns true if at least one slot is free.
    pub fn has_capacity(&self) -> bool {
        self.entries.len() < self.max_entries as usize
    }

    /// Returns true if the bank holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The lowest-numbered currently-occupied counter slot.
    ///
    /// This is the boundary of the counter region; compaction always moves
    /// the entry found here into a freed counter slot. Every compaction
    /// call site uses this one definition.
    pub fn lowest_counter_index(&self) -> Option<SlotIndex> {
        self.entries
            .range(self.last_policer_index + 1..)
            .next()
            .map(|(idx, _)| *idx)
    }

    /// Finds the slot a rule references in this bank, if any.
    pub fn slot_of_rule(&self, rule: &RuleRef) -> Option<SlotIndex> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.rules.contains(rule))
            .map(|(idx, _)| *idx)
    }

    /// Decides whether a candidate policer may share this bank's
    /// configuration.
    ///
    /// Compatible when the bank has no policer entries yet, or the
    /// candidate's resolved color source matches and the mark-down flags
    /// are absent on either side or exactly equal. This is a
    /// configuration-sharing decision, not a capacity one.
    pub fn accepts(&self, attrs: &PolicerAttributes) -> bool {
        if self.last_policer_index == 0 {
            return true;
        }
        if attrs.color_source.hw() != self.color_source {
            return false;
        }
        if !attrs.requests_mark_down() {
            return true;
        }
        if !self.mark_dscp && !self.mark_switch_pri {
            return true;
        }
        self.mark_dscp == attrs.mark_dscp && self.mark_switch_pri == attrs.mark_switch_pri
    }

    /// Folds a newly-added policer's shared configuration into the bank.
    ///
    /// Caller must have checked [`accepts`](Self::accepts) first.
    pub fn merge_shared_config(&mut self, attrs: &PolicerAttributes) {
        self.color_source = attrs.color_source.hw();
        self.mark_dscp |= attrs.mark_dscp;
        self.mark_switch_pri |= attrs.mark_switch_pri;
    }

    /// Clears the shared configuration; called when the bank empties.
    pub fn reset_shared_config(&mut self) {
        self.color_source = HwColorSource::AssumeGreen;
        self.mark_dscp = false;
        self.mark_switch_pri = false;
    }

    /// Registers one more rule of `acl` referencing this bank.
    pub fn register_acl(&mut self, acl: AclId) {
        *self.acl_refs.entry(acl).or_insert(0) += 1;
    }

    /// Drops one rule of `acl`; removes the ACL at zero.
    ///
    /// Returns false if the ACL was not registered.
    pub fn unregister_acl(&mut self, acl: AclId) -> bool {
        match self.acl_refs.get_mut(&acl) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                self.acl_refs.remove(&acl);
                true
            }
            None => false,
        }
    }

    /// The bank configuration register image for the current state.
    pub fn hw_config(&self) -> BankHwConfig {
        BankHwConfig {
            last_policer_index: self.last_policer_index,
            color_source: self.color_source,
            mark_dscp: self.mark_dscp,
            mark_switch_pri: self.mark_switch_pri,
        }
    }
}
