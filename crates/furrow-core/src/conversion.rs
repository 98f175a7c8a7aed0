//! Reference conversion factors for transformation yields.

use furrow_canonical::{ProductKey, UnitFamily};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Expected output/input ratio for one kind of transformation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionFactor {
    /// Table key, e.g. `raw_coffee_to_roasted`.
    pub product_key: ProductKey,
    /// Unit family the inputs are measured in.
    pub input_unit: UnitFamily,
    /// Unit family the outputs are measured in.
    pub output_unit: UnitFamily,
    /// Expected `outputs / inputs * 100`.
    pub expected_factor_percent: f64,
    /// Half-width of the acceptable band, in percentage points.
    pub tolerance_percent: f64,
}

/// Errors loading a caller-supplied table.
#[derive(Debug, thiserror::Error)]
pub enum ConversionTableError {
    /// The file is not a JSON array of factors.
    #[error("invalid conversion table: {0}")]
    Parse(#[from] serde_json::Error),
    /// The same key appears twice.
    #[error("duplicate conversion factor for {0}")]
    Duplicate(ProductKey),
    /// Expected factor is not positive or tolerance is negative.
    #[error("conversion factor {0} is out of range")]
    OutOfRange(ProductKey),
}

/// Immutable lookup table injected into the validator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionTable {
    factors: BTreeMap<ProductKey, ConversionFactor>,
}

// Typical industry yields, percent of input mass or volume.
const STANDARD_FACTORS: &[(&str, UnitFamily, UnitFamily, f64, f64)] = &[
    ("raw_coffee_to_roasted", UnitFamily::Mass, UnitFamily::Mass, 85.0, 3.0),
    ("coffee_cherry_to_green", UnitFamily::Mass, UnitFamily::Mass, 20.0, 3.0),
    ("cocoa_beans_to_nibs", UnitFamily::Mass, UnitFamily::Mass, 80.0, 4.0),
    ("wheat_to_flour", UnitFamily::Mass, UnitFamily::Mass, 75.0, 5.0),
    ("paddy_to_milled_rice", UnitFamily::Mass, UnitFamily::Mass, 67.0, 4.0),
    ("olives_to_oil", UnitFamily::Mass, UnitFamily::Mass, 20.0, 5.0),
    ("sugarcane_to_sugar", UnitFamily::Mass, UnitFamily::Mass, 11.0, 2.0),
    ("tomato_to_paste", UnitFamily::Mass, UnitFamily::Mass, 16.0, 3.0),
    ("whole_fish_to_fillet", UnitFamily::Mass, UnitFamily::Mass, 45.0, 10.0),
    ("live_cattle_to_carcass", UnitFamily::Mass, UnitFamily::Mass, 60.0, 5.0),
    ("milk_to_cheese", UnitFamily::Volume, UnitFamily::Mass, 10.0, 2.0),
    ("grapes_to_wine", UnitFamily::Mass, UnitFamily::Volume, 70.0, 5.0),
    ("oranges_to_juice", UnitFamily::Mass, UnitFamily::Volume, 50.0, 8.0),
];

impl ConversionTable {
    /// Built-in table of common agricultural transformations.
    pub fn standard() -> Self {
        let factors = STANDARD_FACTORS
            .iter()
            .map(|(key, input_unit, output_unit, expected, tolerance)| {
                let product_key = ProductKey::new(*key);
                (
                    product_key.clone(),
                    ConversionFactor {
                        product_key,
                        input_unit: *input_unit,
                        output_unit: *output_unit,
                        expected_factor_percent: *expected,
                        tolerance_percent: *tolerance,
                    },
                )
            })
            .collect();
        Self { factors }
    }

    /// Builds a table from explicit factors, rejecting duplicates and bad ranges.
    pub fn from_factors(
        factors: impl IntoIterator<Item = ConversionFactor>,
    ) -> Result<Self, ConversionTableError> {
        let mut table = BTreeMap::new();
        for factor in factors {
            let expected = factor.expected_factor_percent;
            let tolerance = factor.tolerance_percent;
            if expected.is_nan() || expected <= 0.0 || tolerance.is_nan() || tolerance < 0.0 {
                return Err(ConversionTableError::OutOfRange(factor.product_key));
            }
            let key = factor.product_key.clone();
            if table.insert(key.clone(), factor).is_some() {
                return Err(ConversionTableError::Duplicate(key));
            }
        }
        Ok(Self { factors: table })
    }

    /// Parses a JSON array of [`ConversionFactor`] objects.
    pub fn from_json(text: &str) -> Result<Self, ConversionTableError> {
        let factors: Vec<ConversionFactor> = serde_json::from_str(text)?;
        Self::from_factors(factors)
    }

    /// Looks up a factor by product key.
    pub fn get(&self, key: &ProductKey) -> Option<&ConversionFactor> {
        self.factors.get(key)
    }

    /// Number of factors in the table.
    pub fn len(&self) -> usize {
        self.factors.len()
    }

    /// True when the table has no factors.
    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_has_coffee() {
        let table = ConversionTable::standard();
        let coffee = table.get(&ProductKey::new("raw_coffee_to_roasted")).unwrap();
        assert_eq!(coffee.expected_factor_percent, 85.0);
        assert_eq!(coffee.tolerance_percent, 3.0);
    }

    #[test]
    fn json_table_round_trips() {
        let table = ConversionTable::from_json(
            r#"[{"product_key":"beans_to_paste","input_unit":"mass","output_unit":"mass",
                "expected_factor_percent":90,"tolerance_percent":2}]"#,
        )
        .unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.get(&ProductKey::new("raw_coffee_to_roasted")).is_none());
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let text = r#"[
            {"product_key":"a","input_unit":"mass","output_unit":"mass","expected_factor_percent":90,"tolerance_percent":2},
            {"product_key":"a","input_unit":"mass","output_unit":"mass","expected_factor_percent":80,"tolerance_percent":2}
        ]"#;
        assert!(matches!(
            ConversionTable::from_json(text),
            Err(ConversionTableError::Duplicate(_))
        ));
    }

    #[test]
    fn negative_tolerance_is_rejected() {
        let text = r#"[{"product_key":"a","input_unit":"mass","output_unit":"mass","expected_factor_percent":90,"tolerance_percent":-1}]"#;
        assert!(matches!(
            ConversionTable::from_json(text),
            Err(ConversionTableError::OutOfRange(_))
        ));
    }
}
