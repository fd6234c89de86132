//! Linear calibration of raw readings into percentages.

use crate::constants::{ADC_FULL_SCALE, ADC_REFERENCE_VOLTS, BATT_SPAN_EPSILON, VBAT_DIVIDER_RATIO};

/// Battery voltage at the cell for a raw sample taken behind the divider.
pub fn battery_volts_from_raw(raw: u16) -> f32 {
    f32::from(raw) / f32::from(ADC_FULL_SCALE) * ADC_REFERENCE_VOLTS * VBAT_DIVIDER_RATIO
}

/// Charge estimate in whole percent, linear between `v_min` (0 %) and `v_max` (100 %).
pub fn battery_percent(volts: f32, v_min: f32, v_max: f32) -> u8 {
    let span = v_max - v_min;
    let fraction = if span > BATT_SPAN_EPSILON {
        (volts - v_min) / span
    } else {
        0.0
    };
    let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
    // round half up
    (fraction * 100.0 + 0.5).floor().clamp(0.0, 100.0) as u8
}

/// Moisture in percent with one decimal: the wet bound maps to 100 %, the dry bound to 0 %.
///
/// Works for either ordering of the bounds. Equal bounds mean the probe was never
/// calibrated and the raw scale is inverted instead (`0` wet, `4095` dry).
pub fn moisture_percent(avg: u16, wet_raw: u16, dry_raw: u16) -> f32 {
    let (num, den) = if wet_raw != dry_raw {
        (i32::from(avg) - i32::from(dry_raw), i32::from(wet_raw) - i32::from(dry_raw))
    } else {
        (i32::from(ADC_FULL_SCALE) - i32::from(avg), i32::from(ADC_FULL_SCALE))
    };
    // keep the denominator positive
    let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };

    // round half up in tenths of a percent, exact in integers
    let tenths = if num <= 0 {
        0
    } else if num >= den {
        1000
    } else {
        (2000 * num + den) / (2 * den)
    };
    tenths as f32 / 10.0
}

/// Integer mean with half-up rounding.
pub fn average_round_half_up(sum: u32, count: u32) -> u16 {
    if count == 0 {
        return 0;
    }
    ((sum + count / 2) / count) as u16
}
