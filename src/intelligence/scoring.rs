use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Clamp to [0, 1]. NaN maps to 0.
pub fn clamp_unit(x: f64) -> f64 {
    if x.is_nan() {
        return 0.0;
    }
    x.clamp(0.0, 1.0)
}

/// `value / full_at`, saturating at 1.0. Reaches 1.0 once `value >= full_at`.
pub fn saturating_ratio(value: f64, full_at: f64) -> f64 {
    if full_at <= 0.0 {
        return 1.0;
    }
    clamp_unit(value / full_at)
}

/// `max(floor, 1 - age / window)`: 1.0 at age 0, `floor` from the end of the window on.
/// Non-increasing in `age`.
pub fn linear_decay(age: f64, window: f64, floor: f64) -> f64 {
    if window <= 0.0 {
        return clamp_unit(floor);
    }
    clamp_unit((1.0 - age.max(0.0) / window).max(floor))
}

/// Lossy conversion used once a decision has been made on exact decimals.
pub fn decimal_to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

/// Round to `places` decimal places for evidence and reports.
pub fn round_to(x: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (x * factor).round() / factor
}
