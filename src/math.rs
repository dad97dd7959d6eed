// Intensity Math - pure, side-effect free formulas
//
// Everything here is stateless: inputs in, value or InvalidInput out.
// No rounding is applied - full floating precision is retained internally;
// presentation-layer rounding is the caller's concern.

use crate::error::ComplianceError;

/// Energy to which the intensity target applies.
///
/// `energy_in_scope = fuel_consumption * energy_factor`
///
/// Zero consumption yields zero energy (not an error). Negative or
/// non-finite consumption is rejected.
pub fn energy_in_scope(fuel_consumption: f64, energy_factor: f64) -> Result<f64, ComplianceError> {
    if !fuel_consumption.is_finite() {
        return Err(ComplianceError::InvalidInput(
            "fuel consumption must be a finite number".to_string(),
        ));
    }
    if fuel_consumption < 0.0 {
        return Err(ComplianceError::InvalidInput(
            "fuel consumption must be non-negative".to_string(),
        ));
    }
    Ok(fuel_consumption * energy_factor)
}

/// Signed compliance balance for one route/period.
///
/// `CB = (target - actual) * energy_in_scope`
///
/// Positive = surplus, negative = deficit, zero = exactly compliant.
/// Callers resolve an omitted target to their configured default before
/// calling; see `EngineConfig`.
pub fn compliance_balance(
    target: f64,
    actual: f64,
    fuel_consumption: f64,
    energy_factor: f64,
) -> Result<f64, ComplianceError> {
    if !target.is_finite() || !actual.is_finite() {
        return Err(ComplianceError::InvalidInput(
            "target and actual intensity must be finite numbers".to_string(),
        ));
    }
    let energy = energy_in_scope(fuel_consumption, energy_factor)?;
    Ok((target - actual) * energy)
}

/// Percent deviation of `comparison` from `baseline`:
/// `(comparison / baseline - 1) * 100`.
pub fn percent_difference(comparison: f64, baseline: f64) -> Result<f64, ComplianceError> {
    if !comparison.is_finite() || !baseline.is_finite() {
        return Err(ComplianceError::InvalidInput(
            "comparison and baseline must be finite numbers".to_string(),
        ));
    }
    if baseline == 0.0 {
        return Err(ComplianceError::DivisionByZero);
    }
    Ok((comparison / baseline - 1.0) * 100.0)
}
