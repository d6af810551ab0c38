//! Ray fixed-point helpers
//!
//! Pool rates come off the vault scaled by 1e27 ("Ray"). Dividing by 1e25
//! yields a percentage. These conversions are for display only; every
//! threshold comparison runs on the raw integers.

use alloy_primitives::{uint, U256};

/// 1e25, one percent expressed in Ray
pub const PERCENT_SCALE: U256 = uint!(10_000_000_000_000_000_000_000_000_U256);

/// 1e23, one hundredth of a percent in Ray (the display resolution)
const CENTI_PERCENT: U256 = uint!(100_000_000_000_000_000_000_000_U256);

/// Largest value whose percentage still fits the display path.
/// Anything above this is treated as a corrupt read and shown as zero.
const MAX_DISPLAY_CENTI: u128 = u64::MAX as u128;

/// Convert a Ray-scaled rate into a percentage string with 2 decimals.
///
/// Rounds half-up at the second decimal. Falls back to `"0.00"` when the
/// value is too large to display.
pub fn to_percent(raw: U256) -> String {
    let half = CENTI_PERCENT / U256::from(2u8);
    let Some(rounded) = raw.checked_add(half) else {
        return "0.00".to_string();
    };
    let centi = rounded / CENTI_PERCENT;

    let centi: u128 = match u128::try_from(centi) {
        Ok(v) if v <= MAX_DISPLAY_CENTI => v,
        _ => return "0.00".to_string(),
    };

    format!("{}.{:02}", centi / 100, centi % 100)
}

/// Convert a percentage into Ray units (e.g. `2.0` -> 2e25).
///
/// Resolution is 1e-9 percent, which is plenty for configuration values.
/// Negative and non-finite inputs map to zero.
pub fn percent_to_ray(percent: f64) -> U256 {
    if !percent.is_finite() || percent <= 0.0 {
        return U256::ZERO;
    }
    let nano_percent = (percent * 1e9).round();
    if nano_percent >= u128::MAX as f64 {
        return U256::ZERO;
    }
    U256::from(nano_percent as u128) * (PERCENT_SCALE / U256::from(1_000_000_000u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(PERCENT_SCALE, U256::from(10u8).pow(U256::from(25u8)));
        assert_eq!(CENTI_PERCENT, U256::from(10u8).pow(U256::from(23u8)));
    }

    #[test]
    fn test_to_percent_basic() {
        // 5.2% = 0.052 * 1e27 = 5.2e25
        let raw = U256::from(52u8) * U256::from(10u8).pow(U256::from(24u8));
        assert_eq!(to_percent(raw), "5.20");
        assert_eq!(to_percent(U256::ZERO), "0.00");
        // 1e27, the whole vault
        assert_eq!(to_percent(U256::from(10u8).pow(U256::from(27u8))), "100.00");
    }

    #[test]
    fn test_to_percent_rounds_half_up() {
        // 3.905% rounds to 3.91
        let raw = U256::from(3905u32) * U256::from(10u8).pow(U256::from(22u8));
        assert_eq!(to_percent(raw), "3.91");
        // 3.9049% rounds to 3.90
        let raw = U256::from(39049u32) * U256::from(10u8).pow(U256::from(21u8));
        assert_eq!(to_percent(raw), "3.90");
    }

    #[test]
    fn test_to_percent_overflow_falls_back_to_zero() {
        assert_eq!(to_percent(U256::MAX), "0.00");
        let huge = U256::from(u128::MAX) * CENTI_PERCENT;
        assert_eq!(to_percent(huge), "0.00");
    }

    #[test]
    fn test_to_percent_is_pure() {
        let raw = percent_to_ray(4.8);
        assert_eq!(to_percent(raw), to_percent(raw));
        assert_eq!(to_percent(raw), "4.80");
    }

    #[test]
    fn test_percent_to_ray() {
        assert_eq!(percent_to_ray(1.0), PERCENT_SCALE);
        assert_eq!(percent_to_ray(2.0), PERCENT_SCALE * U256::from(2u8));
        assert_eq!(percent_to_ray(-1.0), U256::ZERO);
        assert_eq!(percent_to_ray(f64::NAN), U256::ZERO);
        assert_eq!(to_percent(percent_to_ray(5.2)), "5.20");
    }
}
