//! A small dimensional analyser covering the seven quantities the core
//! deals in: current, charge, voltage, time, mass, length, and the derived
//! area/volume (length^2 / length^3). Units are declared as strings (e.g.
//! `"mAh/g"`, `"A"`, `"cm**2"`) and reduced to a magnitude plus a dimension
//! vector; two units convert into one another only if their dimension
//! vectors match exactly.

use crate::error::CellpyError;

/// Base dimensions, in a fixed order used as the exponent vector index.
const N_DIMS: usize = 6;
const I_CURRENT: usize = 0;
const I_CHARGE: usize = 1;
const I_VOLTAGE: usize = 2;
const I_TIME: usize = 3;
const I_MASS: usize = 4;
const I_LENGTH: usize = 5;

/// A reduced unit: an SI-prefix-adjusted magnitude and a dimension vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantity {
    magnitude: f64,
    dims: [i32; N_DIMS],
}

impl Quantity {
    fn dimensionless(magnitude: f64) -> Self {
        Self {
            magnitude,
            dims: [0; N_DIMS],
        }
    }

    fn base(magnitude: f64, dim: usize, exp: i32) -> Self {
        let mut dims = [0; N_DIMS];
        dims[dim] = exp;
        Self { magnitude, dims }
    }

    fn mul(self, other: Self) -> Self {
        let mut dims = self.dims;
        for i in 0..N_DIMS {
            dims[i] += other.dims[i];
        }
        Self {
            magnitude: self.magnitude * other.magnitude,
            dims,
        }
    }

    fn div(self, other: Self) -> Self {
        let mut dims = self.dims;
        for i in 0..N_DIMS {
            dims[i] -= other.dims[i];
        }
        Self {
            magnitude: self.magnitude / other.magnitude,
            dims,
        }
    }

    fn pow(self, exp: i32) -> Self {
        let mut dims = self.dims;
        for d in &mut dims {
            *d *= exp;
        }
        Self {
            magnitude: self.magnitude.powi(exp),
            dims,
        }
    }

    fn is_dimensionless(&self) -> bool {
        self.dims.iter().all(|&d| d == 0)
    }
}

/// SI prefix multiplier for a single leading-character prefix, if present.
fn prefix_multiplier(token: &str, base: &str) -> Option<f64> {
    if token == base {
        return Some(1.0);
    }
    let stripped = token.strip_suffix(base)?;
    let mult = match stripped {
        "k" => 1e3,
        "h" => 1e2,
        "da" => 1e1,
        "d" => 1e-1,
        "c" => 1e-2,
        "m" => 1e-3,
        "u" | "µ" => 1e-6,
        "n" => 1e-9,
        "G" => 1e9,
        "M" => 1e6,
        _ => return None,
    };
    Some(mult)
}

/// Parses a single unit atom (no `*`/`/`), e.g. `"mAh"`, `"cm"`, `"sec"`.
fn parse_atom(atom: &str) -> Option<Quantity> {
    // Charge bases: Ah (current * time), C (ampere-second).
    if let Some(mult) = prefix_multiplier(atom, "Ah") {
        return Some(Quantity::base(mult * 3600.0, I_CHARGE, 1));
    }
    if let Some(mult) = prefix_multiplier(atom, "C") {
        return Some(Quantity::base(mult, I_CHARGE, 1));
    }
    if let Some(mult) = prefix_multiplier(atom, "A") {
        return Some(Quantity::base(mult, I_CURRENT, 1));
    }
    if let Some(mult) = prefix_multiplier(atom, "V") {
        return Some(Quantity::base(mult, I_VOLTAGE, 1));
    }
    // Time bases: sec/s, h/hr, min.
    for base in ["sec", "s"] {
        if let Some(mult) = prefix_multiplier(atom, base) {
            return Some(Quantity::base(mult, I_TIME, 1));
        }
    }
    if atom == "h" || atom == "hr" {
        return Some(Quantity::base(3600.0, I_TIME, 1));
    }
    if atom == "min" {
        return Some(Quantity::base(60.0, I_TIME, 1));
    }
    // Mass bases: g, t (tonne).
    if let Some(mult) = prefix_multiplier(atom, "g") {
        return Some(Quantity::base(mult / 1000.0, I_MASS, 1));
    }
    if atom == "t" {
        return Some(Quantity::base(1000.0, I_MASS, 1));
    }
    // Length bases: m.
    if let Some(mult) = prefix_multiplier(atom, "m") {
        return Some(Quantity::base(mult, I_LENGTH, 1));
    }
    None
}

/// Parses a unit token like `"cm**2"` (atom with an optional power suffix).
fn parse_powered_atom(token: &str) -> Option<Quantity> {
    if let Some((base, exp)) = token.split_once("**") {
        let exp: i32 = exp.parse().ok()?;
        return Some(parse_atom(base)?.pow(exp));
    }
    parse_atom(token)
}

/// Parses a full unit expression: atoms joined by `*` and `/`, e.g.
/// `"mAh/g"`, `"A"`, `"cm**2"`. The empty string and `"1"`/`"-"` denote a
/// dimensionless unit (used for e.g. coulombic efficiency, fractional SOC).
pub fn parse_unit(expr: &str) -> crate::error::Result<Quantity> {
    let expr = expr.trim();
    if expr.is_empty() || expr == "1" || expr == "-" {
        return Ok(Quantity::dimensionless(1.0));
    }

    let mut result: Option<Quantity> = None;
    let mut dividing = false;
    let mut token = String::new();

    let mut flush = |token: &mut String,
                      dividing: bool,
                      result: &mut Option<Quantity>|
     -> crate::error::Result<()> {
        if token.is_empty() {
            return Ok(());
        }
        let q = parse_powered_atom(token).ok_or_else(|| CellpyError::UnitMismatch {
            from: token.clone(),
            to: "<unknown unit atom>".to_string(),
        })?;
        *result = Some(match result.take() {
            None => q,
            Some(acc) => {
                if dividing {
                    acc.div(q)
                } else {
                    acc.mul(q)
                }
            }
        });
        token.clear();
        Ok(())
    };

    for c in expr.chars() {
        match c {
            '*' | '/' => {
                flush(&mut token, dividing, &mut result)?;
                dividing = c == '/';
            }
            c if c.is_whitespace() => {}
            c => token.push(c),
        }
    }
    flush(&mut token, dividing, &mut result)?;

    result.ok_or_else(|| CellpyError::UnitMismatch {
        from: expr.to_string(),
        to: "<empty>".to_string(),
    })
}

/// Computes the multiplicative factor to go from `raw_unit` to `cellpy_unit`
/// for a plain (non-specific) quantity, e.g. `"Ah"` -> `"mAh"`.
pub fn conversion_factor(raw_unit: &str, cellpy_unit: &str) -> crate::error::Result<f64> {
    let raw = parse_unit(raw_unit)?;
    let target = parse_unit(cellpy_unit)?;
    let ratio = raw.div(target);
    if !ratio.is_dimensionless() {
        return Err(CellpyError::UnitMismatch {
            from: raw_unit.to_string(),
            to: cellpy_unit.to_string(),
        });
    }
    Ok(ratio.magnitude)
}

/// Specific-capacity normalization mode (spec.md §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecificMode {
    Gravimetric,
    Areal,
    Volumetric,
    Absolute,
}

/// Computes the factor for a specific-capacity column per spec.md §4.5:
///
///   factor = (raw_charge_unit / cellpy_charge_unit) / mass_in_cellpy_mass_units
///
/// i.e. the plain charge conversion factor divided by the normalizing
/// property's value once it has been converted into the unit the specific
/// column is expressed per (`specific_unit`: grams for gravimetric, area
/// for areal, volume for volumetric). `Absolute` always returns 1.0.
pub fn specific_conversion_factor(
    raw_charge_unit: &str,
    cellpy_charge_unit: &str,
    specific_unit: &str,
    normalizer_value: f64,
    normalizer_unit: &str,
    mode: SpecificMode,
) -> crate::error::Result<f64> {
    if mode == SpecificMode::Absolute {
        return Ok(1.0);
    }
    let charge_factor = conversion_factor(raw_charge_unit, cellpy_charge_unit)?;
    let normalizer_to_specific = conversion_factor(normalizer_unit, specific_unit)?;
    let mass_in_specific_unit = normalizer_value * normalizer_to_specific;
    if mass_in_specific_unit == 0.0 {
        return Err(CellpyError::UnitMismatch {
            from: normalizer_unit.to_string(),
            to: specific_unit.to_string(),
        });
    }
    Ok(charge_factor / mass_in_specific_unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_unit_conversion_ah_to_mah() {
        let f = conversion_factor("Ah", "mAh").unwrap();
        assert!((f - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn incompatible_units_raise_unit_mismatch() {
        let err = conversion_factor("A", "V");
        assert!(err.is_err());
    }

    #[test]
    fn round_trip_within_tolerance() {
        for (a, b) in [("Ah", "mAh"), ("V", "mV"), ("sec", "h"), ("g", "mg")] {
            let fwd = conversion_factor(a, b).unwrap();
            let back = conversion_factor(b, a).unwrap();
            assert!((fwd * back - 1.0).abs() < 1e-12, "{a} <-> {b}");
        }
    }

    #[test]
    fn gravimetric_specific_factor_matches_scenario_s4() {
        // raw_units.charge = Ah, cellpy_units.charge = mAh, mass = 0.5 mg,
        // cellpy_units.specific_gravimetric = g.
        let f = specific_conversion_factor("Ah", "mAh", "g", 0.5, "mg", SpecificMode::Gravimetric)
            .unwrap();
        assert!((f - 2_000_000.0).abs() / 2_000_000.0 < 1e-9);
    }

    #[test]
    fn absolute_mode_is_always_one() {
        let f =
            specific_conversion_factor("Ah", "mAh", "g", 0.5, "mg", SpecificMode::Absolute).unwrap();
        assert_eq!(f, 1.0);
    }

    #[test]
    fn area_unit_with_power_parses() {
        let q = parse_unit("cm**2").unwrap();
        assert!((q.magnitude - 1e-4).abs() < 1e-12);
    }
}
