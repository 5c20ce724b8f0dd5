//! # Unit Normalization
//!
//! Converts vendor-reported units into the canonical ones downstream
//! consumers expect. The conversion set is configuration, not a fixed list:
//! deployments register the conversions their sensor fleet needs.

use std::collections::HashMap;

type ConvertFn = Box<dyn Fn(f64) -> (f64, String) + Send + Sync>;

/// A configurable table of unit conversions.
pub struct UnitConversions {
    table: HashMap<String, ConvertFn>,
}

impl UnitConversions {
    /// An empty table: every value passes through unchanged.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// The stock table: temperature to celsius, conductivity to mS/cm.
    #[must_use]
    pub fn seeded() -> Self {
        let mut conversions = Self::empty();
        conversions.insert("fahrenheit", |f| ((f - 32.0) * 5.0 / 9.0, "celsius".into()));
        conversions.insert("kelvin", |k| (k - 273.15, "celsius".into()));
        conversions.insert("us_cm", |us| (us / 1000.0, "ms_cm".into()));
        conversions
    }

    /// Register a conversion for `unit`.
    pub fn insert(
        &mut self,
        unit: impl Into<String>,
        convert: impl Fn(f64) -> (f64, String) + Send + Sync + 'static,
    ) {
        self.table.insert(unit.into(), Box::new(convert));
    }

    /// Normalize a reading. Unknown units pass through untouched.
    #[must_use]
    pub fn normalize(&self, value: f64, unit: &str) -> (f64, String) {
        match self.table.get(unit) {
            Some(convert) => convert(value),
            None => (value, unit.to_owned()),
        }
    }
}

impl Default for UnitConversions {
    fn default() -> Self {
        Self::seeded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fahrenheit_to_celsius() {
        let conversions = UnitConversions::seeded();
        let (value, unit) = conversions.normalize(212.0, "fahrenheit");
        assert!((value - 100.0).abs() < 1e-9);
        assert_eq!(unit, "celsius");
    }

    #[test]
    fn test_kelvin_to_celsius() {
        let conversions = UnitConversions::seeded();
        let (value, unit) = conversions.normalize(273.15, "kelvin");
        assert!(value.abs() < 1e-9);
        assert_eq!(unit, "celsius");
    }

    #[test]
    fn test_unknown_unit_passes_through() {
        let conversions = UnitConversions::seeded();
        let (value, unit) = conversions.normalize(6.2, "ph");
        assert!((value - 6.2).abs() < f64::EPSILON);
        assert_eq!(unit, "ph");
    }

    #[test]
    fn test_custom_conversion() {
        let mut conversions = UnitConversions::empty();
        conversions.insert("ppm", |v| (v / 500.0, "ms_cm".into()));
        let (value, unit) = conversions.normalize(1000.0, "ppm");
        assert!((value - 2.0).abs() < 1e-9);
        assert_eq!(unit, "ms_cm");
    }
}
