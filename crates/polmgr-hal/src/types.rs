//! Register-image types for the policer/counter bank engine.

use std::fmt;

/// Number of policer/counter banks exposed by the engine.
pub const BANK_COUNT: usize = 4;

/// Bank identifier (0-based, `< BANK_COUNT`).
pub type BankId = u8;

/// Slot index within a bank. Index 0 is reserved by the hardware.
pub type SlotIndex = u16;

/// External policer handle, assigned by the policer attribute registry.
pub type PolicerHandle = u32;

/// Current owner of a policer bank, as seen by the ownership arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BankOwner {
    /// Unowned; any feature may claim the bank.
    #[default]
    None,
    /// Owned by the ACL compiler's policer/counter usage (this feature).
    Acl,
    /// Owned by another hardware feature.
    Other,
}

impl fmt::Display for BankOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "NONE"),
            Self::Acl => write!(f, "ACL"),
            Self::Other => write!(f, "OTHER"),
        }
    }
}

/// Hardware ingress-color-source selector, shared by every policer entry in
/// a bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HwColorSource {
    /// Every frame enters the meter green.
    #[default]
    AssumeGreen,
    /// Color taken from the frame's DSCP field.
    Dscp,
    /// Color taken from the frame's switch priority.
    SwitchPriority,
}

impl HwColorSource {
    /// Returns the register-level string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AssumeGreen => "ASSUME_GREEN",
            Self::Dscp => "DSCP",
            Self::SwitchPriority => "SWITCH_PRI",
        }
    }
}

/// Action code applied when a rate tier is exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HwRateAction {
    /// Drop the frame.
    #[default]
    Drop,
    /// Mark the frame down (DSCP and/or switch-priority remap).
    MarkDown,
}

/// Mantissa/exponent encoded rate. The effective rate is
/// `mantissa * 2^exponent` in the hardware rate unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateField {
    /// Rate mantissa.
    pub mantissa: u16,
    /// Rate exponent.
    pub exponent: u8,
}

/// Mantissa/exponent encoded burst capacity, same encoding as [`RateField`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapacityField {
    /// Capacity mantissa.
    pub mantissa: u16,
    /// Capacity exponent.
    pub exponent: u8,
}

/// One half (committed or excess) of a policer slot's register image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PolicerRegState {
    /// Encoded information rate.
    pub rate: RateField,
    /// Encoded burst capacity.
    pub capacity: CapacityField,
    /// Action when the tier is exceeded.
    pub action: HwRateAction,
}

/// Bank-level configuration register image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BankHwConfig {
    /// Highest occupied policer index; 0 when the bank holds no policers.
    pub last_policer_index: SlotIndex,
    /// Ingress color source shared by every policer entry in the bank.
    pub color_source: HwColorSource,
    /// DSCP mark-down enable, OR-accumulated across policer entries.
    pub mark_dscp: bool,
    /// Switch-priority mark-down enable, OR-accumulated across policer
    /// entries.
    pub mark_switch_pri: bool,
}

/// One action word of a compiled FFU rule.
///
/// The resource manager only interprets (and rewrites) the policer and
/// counter references; everything else is carried opaquely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfuAction {
    /// Apply the policer at `(bank, index)`.
    Police { bank: BankId, index: SlotIndex },
    /// Count the frame at `(bank, index)`.
    Count { bank: BankId, index: SlotIndex },
    /// An action word this core does not interpret.
    Other(u32),
}

/// FFU slice placement of a compiled rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FfuSliceInfo {
    /// First key slice.
    pub key_start: u8,
    /// Last key slice.
    pub key_end: u8,
    /// Last action slice.
    pub action_end: u8,
    /// Scenarios in which the rule can match.
    pub valid_scenarios: u32,
}

/// One key slice of a compiled rule: match value and care mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FfuSliceKey {
    /// Match value.
    pub key: u64,
    /// Care mask; zero bits are wildcards.
    pub mask: u64,
}

/// Everything a live FFU rule rewrite needs.
///
/// Built by the resource manager from a compiled rule after its action
/// words have been repointed at a relocated policer or counter slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfuRuleRewrite {
    /// Slice placement of the rule.
    pub slice: FfuSliceInfo,
    /// Row position within the slice.
    pub position: u16,
    /// Whether the rule is valid (installed).
    pub valid: bool,
    /// Key slices.
    pub key: Vec<FfuSliceKey>,
    /// Action words, including the repointed policer/counter references.
    pub actions: Vec<FfuAction>,
}
