//! Metric to US-customary conversions for the archive schema.
//!
//! Every conversion is a pure function of one reading; values the provider
//! reports in dimensionless or shared units (UV index, wind direction,
//! humidity) pass through untouched.

pub fn celsius_to_fahrenheit(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

pub fn mps_to_mph(mps: f64) -> f64 {
    mps * 2.23694
}

pub fn mm_to_inch(mm: f64) -> f64 {
    mm * 0.039_370_1
}

pub fn hpa_to_inhg(hpa: f64) -> f64 {
    hpa * 0.02953
}

pub fn km_to_mile(km: f64) -> f64 {
    km * 0.621_371
}

/// Applies a conversion only when the reading is present. A missing field
/// stays missing; no default is substituted.
pub fn convert_opt(value: Option<f64>, convert: fn(f64) -> f64) -> Option<f64> {
    value.map(convert)
}

// -- Tests -------------------------------------------------------------------
