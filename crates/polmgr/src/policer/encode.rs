//! Rate encoder: attribute rates to hardware mantissa/exponent fields.
//!
//! The hardware expresses a rate as `mantissa * 2^exponent` in its native
//! rate unit, and a burst capacity the same way in bytes. Encoding picks
//! the smallest exponent whose mantissa fits the field, which keeps the
//! most precision; values beyond the encodable range saturate.

use polmgr_hal::types::{CapacityField, HwRateAction, PolicerRegState, RateField};

use super::types::{PolicerAttributes, RateAction, RateSpec};

/// Widest mantissa the rate/capacity fields hold.
const MANTISSA_MAX: u64 = 0xffff;

/// Widest exponent the rate/capacity fields hold.
const EXPONENT_MAX: u8 = 31;

fn encode_value(value: u64) -> (u16, u8) {
    let mut mantissa = value;
    let mut exponent = 0u8;

    while mantissa > MANTISSA_MAX {
        if exponent == EXPONENT_MAX {
            // Beyond the encodable range; clamp to the maximum.
            return (MANTISSA_MAX as u16, EXPONENT_MAX);
        }
        mantissa >>= 1;
        exponent += 1;
    }

    (mantissa as u16, exponent)
}

fn encode_action(action: RateAction) -> HwRateAction {
    match action {
        RateAction::Drop => HwRateAction::Drop,
        RateAction::MarkDown => HwRateAction::MarkDown,
    }
}

fn encode_spec(spec: &RateSpec) -> PolicerRegState {
    let (rate_mantissa, rate_exponent) = encode_value(spec.rate_kbps);
    let (cap_mantissa, cap_exponent) = encode_value(spec.capacity_bytes);

    PolicerRegState {
        rate: RateField {
            mantissa: rate_mantissa,
            exponent: rate_exponent,
        },
        capacity: CapacityField {
            mantissa: cap_mantissa,
            exponent: cap_exponent,
        },
        action: encode_action(spec.action),
    }
}

/// Encodes a policer's attributes into its committed/excess register pair.
pub fn encode_policer(attrs: &PolicerAttributes) -> (PolicerRegState, PolicerRegState) {
    (encode_spec(&attrs.committed), encode_spec(&attrs.excess))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_encode_small_value_exact() {
        let (mantissa, exponent) = encode_value(1000);
        assert_eq!((mantissa, exponent), (1000, 0));
    }

    #[test]
    fn test_encode_zero() {
        assert_eq!(encode_value(0), (0, 0));
    }

    #[test]
    fn test_encode_large_value_shifts() {
        let (mantissa, exponent) = encode_value(1_000_000);
        assert!(mantissa as u64 <= MANTISSA_MAX);
        assert!(exponent > 0);
        // The decoded value is within one quantum of the input.
        let decoded = (mantissa as u64) << exponent;
        assert!(decoded <= 1_000_000);
        assert!(1_000_000 - decoded < (1u64 << exponent));
    }

    #[test]
    fn test_encode_saturates() {
        let (mantissa, exponent) = encode_value(u64::MAX);
        assert_eq!((mantissa as u64, exponent), (MANTISSA_MAX, EXPONENT_MAX));
    }

    #[test]
    fn test_encode_policer_actions() {
        let attrs = PolicerAttributes {
            committed: RateSpec {
                rate_kbps: 10_000,
                capacity_bytes: 4096,
                action: RateAction::MarkDown,
            },
            excess: RateSpec {
                rate_kbps: 20_000,
                capacity_bytes: 8192,
                action: RateAction::Drop,
            },
            ..PolicerAttributes::default()
        };

        let (committed, excess) = encode_policer(&attrs);
        assert_eq!(committed.action, HwRateAction::MarkDown);
        assert_eq!(excess.action, HwRateAction::Drop);
        assert_eq!(committed.rate.mantissa, 10_000);
        assert_eq!(committed.capacity.mantissa, 4096);
    }
}
