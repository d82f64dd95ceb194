//! Shared test doubles for the policer module.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use polmgr_hal::error::HalResult;
use polmgr_hal::types::{
    BankHwConfig, BankId, BankOwner, FfuRuleRewrite, PolicerHandle, PolicerRegState, SlotIndex,
};
use polmgr_hal::PolicerHal;

use crate::acl::rule::{CompiledAcls, CompiledRule};
use crate::acl::types::{AclId, RuleId, RuleRef};

use super::bank::SlotEntry;
use super::orch::{PolicerBankConfig, PolicerBankOrch};
use super::types::{
    BankRequest, PolicerAttributes, PolicerDefinition, PolicerRegistry,
};

/// One recorded hardware call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HalCall {
    SetPolicer {
        bank: BankId,
        index: SlotIndex,
        committed: PolicerRegState,
        excess: PolicerRegState,
    },
    SetPolicerCounter {
        bank: BankId,
        index: SlotIndex,
        frames: u64,
        bytes: u64,
    },
    GetPolicerCounter {
        bank: BankId,
        index: SlotIndex,
    },
    SetPolicerConfig {
        bank: BankId,
        cfg: BankHwConfig,
        commit: bool,
    },
    SetFfuRule {
        position: u16,
        live: bool,
    },
    SetBankOwner {
        bank: BankId,
        owner: BankOwner,
    },
}

/// Recording hardware port double.
pub(crate) struct MockHal {
    calls: Mutex<Vec<HalCall>>,
    owners: Mutex<HashMap<BankId, BankOwner>>,
    counters: Mutex<HashMap<(BankId, SlotIndex), (u64, u64)>>,
}

impl MockHal {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            owners: Mutex::new(HashMap::new()),
            counters: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn with_owners(owners: &[(BankId, BankOwner)]) -> Self {
        let hal = Self::new();
        {
            let mut map = hal.owners.lock().unwrap();
            for &(bank, owner) in owners {
                map.insert(bank, owner);
            }
        }
        hal
    }

    /// Presets the value a counter slot will report when read.
    pub(crate) fn set_counter_value(
        &self,
        bank: BankId,
        index: SlotIndex,
        frames: u64,
        bytes: u64,
    ) {
        self.counters
            .lock()
            .unwrap()
            .insert((bank, index), (frames, bytes));
    }

    pub(crate) fn owner_of(&self, bank: BankId) -> BankOwner {
        self.owners
            .lock()
            .unwrap()
            .get(&bank)
            .copied()
            .unwrap_or_default()
    }

    pub(crate) fn calls(&self) -> Vec<HalCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl PolicerHal for MockHal {
    fn set_policer(
        &self,
        bank: BankId,
        index: SlotIndex,
        committed: &PolicerRegState,
        excess: &PolicerRegState,
    ) -> HalResult<()> {
        self.calls.lock().unwrap().push(HalCall::SetPolicer {
            bank,
            index,
            committed: *committed,
            excess: *excess,
        });
        Ok(())
    }

    fn set_policer_counter(
        &self,
        bank: BankId,
        index: SlotIndex,
        frames: u64,
        bytes: u64,
    ) -> HalResult<()> {
        self.calls.lock().unwrap().push(HalCall::SetPolicerCounter {
            bank,
            index,
            frames,
            bytes,
        });
        self.counters
            .lock()
            .unwrap()
            .insert((bank, index), (frames, bytes));
        Ok(())
    }

    fn get_policer_counter(&self, bank: BankId, index: SlotIndex) -> HalResult<(u64, u64)> {
        self.calls
            .lock()
            .unwrap()
            .push(HalCall::GetPolicerCounter { bank, index });
        Ok(self
            .counters
            .lock()
            .unwrap()
            .get(&(bank, index))
            .copied()
            .unwrap_or((0, 0)))
    }

    fn set_policer_config(
        &self,
        bank: BankId,
        cfg: &BankHwConfig,
        commit: bool,
    ) -> HalResult<()> {
        self.calls.lock().unwrap().push(HalCall::SetPolicerConfig {
            bank,
            cfg: *cfg,
            commit,
        });
        Ok(())
    }

    fn set_ffu_rule(&self, rewrite: &FfuRuleRewrite, live: bool, _commit: bool) -> HalResult<()> {
        self.calls.lock().unwrap().push(HalCall::SetFfuRule {
            position: rewrite.position,
            live,
        });
        Ok(())
    }

    fn set_bank_owner(&self, bank: BankId, owner: BankOwner) -> HalResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(HalCall::SetBankOwner { bank, owner });
        self.owners.lock().unwrap().insert(bank, owner);
        Ok(())
    }

    fn bank_owner(&self, bank: BankId) -> HalResult<BankOwner> {
        Ok(self.owner_of(bank))
    }
}

/// In-memory policer attribute registry double.
pub(crate) struct MockRegistry {
    defs: Mutex<HashMap<PolicerHandle, PolicerDefinition>>,
}

impl MockRegistry {
    pub(crate) fn new() -> Self {
        Self {
            defs: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn define_fixed(
        &self,
        handle: PolicerHandle,
        bank: BankId,
        attributes: PolicerAttributes,
    ) {
        self.defs.lock().unwrap().insert(
            handle,
            PolicerDefinition {
                bank: BankRequest::Fixed(bank),
                attributes,
            },
        );
    }

    pub(crate) fn define_auto(&self, handle: PolicerHandle, attributes: PolicerAttributes) {
        self.defs.lock().unwrap().insert(
            handle,
            PolicerDefinition {
                bank: BankRequest::Automatic,
                attributes,
            },
        );
    }
}

impl PolicerRegistry for MockRegistry {
    fn lookup(&self, handle: PolicerHandle) -> Option<PolicerDefinition> {
        self.defs.lock().unwrap().get(&handle).copied()
    }
}

/// A bank manager wired to recording doubles.
pub(crate) struct TestSetup {
    pub(crate) orch: PolicerBankOrch,
    pub(crate) hal: Arc<MockHal>,
    pub(crate) registry: Arc<MockRegistry>,
}

pub(crate) fn test_orch(config: PolicerBankConfig) -> TestSetup {
    test_orch_with_owners(config, &[])
}

pub(crate) fn test_orch_with_owners(
    config: PolicerBankConfig,
    owners: &[(BankId, BankOwner)],
) -> TestSetup {
    let hal = Arc::new(MockHal::with_owners(owners));
    let registry = Arc::new(MockRegistry::new());
    let orch = PolicerBankOrch::new(config, hal.clone(), registry.clone());
    TestSetup {
        orch,
        hal,
        registry,
    }
}

/// Builds a compiled set holding one policing rule, plus a detached copy of
/// the rule for selector-level tests.
pub(crate) fn police_rule(
    acl: AclId,
    rule: RuleId,
    handle: PolicerHandle,
) -> (CompiledAcls, CompiledRule) {
    let mut acls = CompiledAcls::new();
    let mut compiled = CompiledRule::new();
    compiled.police = Some(handle);
    compiled.valid = true;
    acls.insert_rule(acl, 0b0001, rule, compiled.clone());
    (acls, compiled)
}

/// Inserts a rule with the given resource requests into a compiled set.
pub(crate) fn police_count_rule(
    acls: &mut CompiledAcls,
    acl: AclId,
    rule: RuleId,
    scenario_mask: u32,
    police: Option<PolicerHandle>,
    count: bool,
) -> RuleRef {
    let mut compiled = CompiledRule::new();
    compiled.police = police;
    compiled.count = count;
    compiled.valid = true;
    compiled.position = (acl * 100 + rule) as u16;
    acls.insert_rule(acl, scenario_mask, rule, compiled);
    RuleRef::new(acl, rule)
}

impl PolicerBankOrch {
    /// Seeds a policer entry directly into a bank, bypassing selection.
    /// Test-only shortcut for arranging occupancy.
    pub(crate) fn seed_policer(
        &mut self,
        bank_id: BankId,
        handle: PolicerHandle,
        rule_ref: RuleRef,
        attrs: &PolicerAttributes,
    ) -> SlotIndex {
        let bank = self.bank_mut(bank_id);
        bank.owner = BankOwner::Acl;
        bank.register_acl(rule_ref.acl);
        bank.last_policer_index += 1;
        let index = bank.last_policer_index;
        bank.merge_shared_config(attrs);
        bank.entries.insert(
            index,
            SlotEntry::policer(
                handle,
                PolicerRegState::default(),
                PolicerRegState::default(),
                rule_ref,
            ),
        );
        bank.policer_index.insert(handle, index);
        index
    }

    /// Seeds a counter entry directly into a bank, bypassing selection.
    pub(crate) fn seed_counter(&mut self, bank_id: BankId, rule_ref: RuleRef) -> SlotIndex {
        let bank = self.bank_mut(bank_id);
        bank.owner = BankOwner::Acl;
        bank.register_acl(rule_ref.acl);
        let index = bank.max_entries - bank.counter_count() as SlotIndex;
        bank.entries.insert(index, SlotEntry::counter(rule_ref));
        index
    }
}

/// Asserts the structural invariants of a bank: slot 0 never occupied, the
/// policer region dense from 1, the counter region dense from the top, and
/// the occupancy bound respected.
pub(crate) fn assert_bank_invariants(orch: &PolicerBankOrch, bank_id: BankId) {
    let bank = orch.bank(bank_id).expect("bank id in range");

    assert!(
        !bank.entries.contains_key(&0),
        "bank {}: slot 0 occupied",
        bank_id
    );
    assert!(
        bank.counter_count() + bank.last_policer_index as usize <= bank.max_entries as usize,
        "bank {}: occupancy exceeds capacity",
        bank_id
    );
    for idx in 1..=bank.last_policer_index {
        assert!(
            bank.entries.get(&idx).is_some_and(|e| e.is_policer()),
            "bank {}: policer region not dense at {}",
            bank_id,
            idx
        );
    }
    let counters = bank.counter_count() as u16;
    for off in 0..counters {
        let idx = bank.max_entries - off;
        assert!(
            bank.entries.get(&idx).is_some_and(|e| !e.is_policer()),
            "bank {}: counter region not dense at {}",
            bank_id,
            idx
        );
    }
    for entry in bank.entries.values() {
        assert!(!entry.rules.is_empty(), "bank {}: unreferenced entry", bank_id);
    }
}
