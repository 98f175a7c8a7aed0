use serde::{Deserialize, Serialize};

use crate::validation::ValidationError;

/// Amount of product attached to an event quantity list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantityItem {
    /// Measured amount.
    pub value: f64,
    /// Unit as submitted by the producer (`kg`, `KGM`, `lb`, ...).
    #[serde(alias = "uom")]
    pub unit_of_measure: String,
    /// Product class (GTIN or free-form) the amount refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_identifier: Option<String>,
}

impl QuantityItem {
    /// Builds a quantity without a product identifier.
    pub fn new(value: f64, unit_of_measure: impl Into<String>) -> Self {
        Self {
            value,
            unit_of_measure: unit_of_measure.into(),
            product_identifier: None,
        }
    }

    /// Checks the producer contract: finite, non-negative value and a unit.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.value.is_finite() || self.value < 0.0 {
            return Err(ValidationError::OutOfBounds {
                field: "quantity.value",
                value: self.value.to_string(),
            });
        }
        if self.unit_of_measure.trim().is_empty() {
            return Err(ValidationError::Empty {
                field: "quantity.unit_of_measure",
            });
        }
        Ok(())
    }

    /// Converts the amount into its canonical unit family.
    pub fn normalized(&self) -> NormalizedQuantity {
        match lookup_unit(&self.unit_of_measure) {
            Some((family, factor)) => NormalizedQuantity {
                value: self.value * factor,
                family: Some(family),
                unit: family.canonical_unit().to_string(),
            },
            None => NormalizedQuantity {
                value: self.value,
                family: None,
                unit: self.unit_of_measure.clone(),
            },
        }
    }
}

/// Physical dimension a unit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitFamily {
    /// Normalized to kilograms.
    Mass,
    /// Normalized to litres.
    Volume,
}

impl UnitFamily {
    /// Unit every quantity of this family is converted into.
    pub fn canonical_unit(self) -> &'static str {
        match self {
            UnitFamily::Mass => "kg",
            UnitFamily::Volume => "L",
        }
    }
}

/// Quantity after unit normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedQuantity {
    /// Amount in the canonical unit, or the raw amount for unknown units.
    pub value: f64,
    /// `None` when the unit was not recognized and passed through unchanged.
    pub family: Option<UnitFamily>,
    /// Canonical unit, or the original unit string.
    pub unit: String,
}

// Lowercased unit -> (family, multiplier into kg or L). UN/CEFACT codes included.
const UNITS: &[(&str, UnitFamily, f64)] = &[
    ("kg", UnitFamily::Mass, 1.0),
    ("kgm", UnitFamily::Mass, 1.0),
    ("kilogram", UnitFamily::Mass, 1.0),
    ("kilograms", UnitFamily::Mass, 1.0),
    ("g", UnitFamily::Mass, 0.001),
    ("grm", UnitFamily::Mass, 0.001),
    ("gram", UnitFamily::Mass, 0.001),
    ("grams", UnitFamily::Mass, 0.001),
    ("mg", UnitFamily::Mass, 0.000_001),
    ("mgm", UnitFamily::Mass, 0.000_001),
    ("t", UnitFamily::Mass, 1000.0),
    ("tne", UnitFamily::Mass, 1000.0),
    ("tonne", UnitFamily::Mass, 1000.0),
    ("tonnes", UnitFamily::Mass, 1000.0),
    ("lb", UnitFamily::Mass, 0.453_592_37),
    ("lbs", UnitFamily::Mass, 0.453_592_37),
    ("lbr", UnitFamily::Mass, 0.453_592_37),
    ("oz", UnitFamily::Mass, 0.028_349_523_125),
    ("onz", UnitFamily::Mass, 0.028_349_523_125),
    ("l", UnitFamily::Volume, 1.0),
    ("ltr", UnitFamily::Volume, 1.0),
    ("litre", UnitFamily::Volume, 1.0),
    ("liter", UnitFamily::Volume, 1.0),
    ("ml", UnitFamily::Volume, 0.001),
    ("mlt", UnitFamily::Volume, 0.001),
    ("cl", UnitFamily::Volume, 0.01),
    ("dl", UnitFamily::Volume, 0.1),
    ("m3", UnitFamily::Volume, 1000.0),
    ("mtq", UnitFamily::Volume, 1000.0),
    ("gal", UnitFamily::Volume, 3.785_411_784),
    ("gll", UnitFamily::Volume, 3.785_411_784),
    ("fl_oz", UnitFamily::Volume, 0.029_573_529_562_5),
];

/// Resolves a unit string (case-insensitive) to its family and multiplier.
pub fn lookup_unit(unit: &str) -> Option<(UnitFamily, f64)> {
    let key = unit.trim().to_ascii_lowercase();
    UNITS
        .iter()
        .find(|(name, _, _)| *name == key)
        .map(|(_, family, factor)| (*family, *factor))
}
