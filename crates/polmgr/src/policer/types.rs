//! Policer attribute model.

use serde::{Deserialize, Serialize};

use polmgr_hal::types::{BankId, HwColorSource, PolicerHandle};

/// Ingress color source requested by a policer's attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColorSource {
    /// Color-blind: every frame enters the meter green.
    #[default]
    Blind,
    /// Color taken from the frame's DSCP field.
    Dscp,
    /// Color taken from the frame's switch priority.
    SwitchPriority,
}

impl ColorSource {
    /// Parses a color source string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "BLIND" => Some(Self::Blind),
            "DSCP" => Some(Self::Dscp),
            "SWITCH_PRIORITY" | "SWITCH_PRI" => Some(Self::SwitchPriority),
            _ => None,
        }
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blind => "BLIND",
            Self::Dscp => "DSCP",
            Self::SwitchPriority => "SWITCH_PRIORITY",
        }
    }

    /// Resolves to the hardware color-source enumeration.
    pub fn hw(&self) -> HwColorSource {
        match self {
            Self::Blind => HwColorSource::AssumeGreen,
            Self::Dscp => HwColorSource::Dscp,
            Self::SwitchPriority => HwColorSource::SwitchPriority,
        }
    }
}

/// Action taken when a rate tier is exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RateAction {
    /// Drop the frame.
    #[default]
    Drop,
    /// Mark the frame down per the bank's mark-down configuration.
    MarkDown,
}

impl RateAction {
    /// Parses a rate action string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "DROP" => Some(Self::Drop),
            "MARK_DOWN" | "MKDN" => Some(Self::MarkDown),
            _ => None,
        }
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Drop => "DROP",
            Self::MarkDown => "MARK_DOWN",
        }
    }
}

/// One rate tier: information rate, burst capacity and exceed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RateSpec {
    /// Information rate in kb/s. Zero disables the tier.
    pub rate_kbps: u64,
    /// Burst capacity in bytes.
    pub capacity_bytes: u64,
    /// Action when the tier is exceeded.
    pub action: RateAction,
}

/// The attribute set describing one policer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PolicerAttributes {
    /// Ingress color source.
    pub color_source: ColorSource,
    /// DSCP mark-down enable, used when a tier's action is `MarkDown`.
    pub mark_dscp: bool,
    /// Switch-priority mark-down enable.
    pub mark_switch_pri: bool,
    /// Committed (CIR) tier.
    pub committed: RateSpec,
    /// Excess (EIR) tier.
    pub excess: RateSpec,
}

impl PolicerAttributes {
    /// Returns true if these attributes request any mark-down behavior.
    pub fn requests_mark_down(&self) -> bool {
        self.mark_dscp || self.mark_switch_pri
    }
}

/// Bank placement requested by a policer definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BankRequest {
    /// The allocator chooses a bank.
    Automatic,
    /// Pin the policer to an explicit bank.
    Fixed(BankId),
}

impl Default for BankRequest {
    fn default() -> Self {
        Self::Automatic
    }
}

/// A registered policer: placement request plus attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PolicerDefinition {
    /// Requested bank placement.
    pub bank: BankRequest,
    /// Policer attributes.
    pub attributes: PolicerAttributes,
}

/// The external policer attribute registry.
pub trait PolicerRegistry: Send + Sync {
    /// Looks up a policer definition by handle.
    fn lookup(&self, handle: PolicerHandle) -> Option<PolicerDefinition>;
}

/// Placement policy for allocations that are not pinned to a bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlacementPolicy {
    /// Maximize head-room across banks (default).
    #[default]
    Balanced,
    /// Keep per-ACL allocation compact; police+count pairs resolve both
    /// entries through the strict selector.
    StrictCount,
}
