//! Mass-balance validation of transformation events.
//!
//! Input and output quantities are normalized to kilograms or litres, the
//! conversion factor `Σout / Σin × 100` is computed, and the factor is checked
//! against an expected band `[expected − tolerance, expected + tolerance]`.
//!
//! - Below the band: warning; critical anomaly once the shortfall from the
//!   expected factor exceeds twice the tolerance.
//! - Above the band: always a critical anomaly (more came out than went in).
//!
//! Anomalies make the verdict invalid, warnings do not. The validator is a
//! pure function of its inputs and the injected [`ConversionTable`].

use std::collections::BTreeSet;

use furrow_canonical::{ProductKey, QuantityItem, UnitFamily, ValidationError};
use serde::{Deserialize, Serialize};

use crate::conversion::ConversionTable;
use crate::events::{Event, EventType};

/// Tolerance applied when neither the caller nor the table provides one.
pub const DEFAULT_TOLERANCE_PERCENT: f64 = 5.0;

const BAND_SLACK: f64 = 1e-9;

/// Standalone mass-balance check request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MassBalanceRequest {
    /// Raw material quantities.
    pub input_quantities: Vec<QuantityItem>,
    /// Product quantities.
    pub output_quantities: Vec<QuantityItem>,
    /// Conversion table key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_type: Option<ProductKey>,
    /// Expected factor in percent; overrides the table.
    #[serde(
        default,
        alias = "custom_conversion_factor",
        skip_serializing_if = "Option::is_none"
    )]
    pub custom_factor: Option<f64>,
    /// Band half-width in percentage points; overrides the table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
}

/// Rejected before any computation.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MassBalanceError {
    /// No input quantities.
    #[error("input quantity list is empty")]
    EmptyInputs,
    /// No output quantities.
    #[error("output quantity list is empty")]
    EmptyOutputs,
    /// Mass balance only applies to transformation events.
    #[error("event is a {0:?} event, not a transformation")]
    NotTransformation(EventType),
    /// Malformed quantity.
    #[error("invalid quantity: {0}")]
    Quantity(#[from] ValidationError),
    /// Tolerance is negative or not finite.
    #[error("tolerance {0} is out of range")]
    Tolerance(f64),
    /// Custom factor is not positive or not finite.
    #[error("custom conversion factor {0} is out of range")]
    CustomFactor(f64),
    /// Normalized totals or their ratio exceed the f64 range.
    #[error("quantity totals overflow: inputs {input_total}, outputs {output_total}")]
    Overflow {
        /// Summed normalized inputs.
        input_total: f64,
        /// Summed normalized outputs.
        output_total: f64,
    },
}

/// How serious a finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Reported, does not affect validity.
    Warning,
    /// Blocks validity.
    Critical,
}

/// Finding category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// Inputs sum to zero; the factor is undefined.
    ZeroInput,
    /// Factor above the band.
    OverYield,
    /// Factor below the band.
    UnderYield,
    /// A unit could not be normalized and was used as-is.
    UnrecognizedUnit,
    /// Mass and volume mixed within inputs or within outputs.
    MixedUnitFamilies,
    /// Quantities are not in the unit family the reference factor expects.
    UnitFamilyMismatch,
    /// `product_type` is not in the conversion table.
    UnknownProductType,
    /// No expected factor available; deviation checks skipped.
    NoReferenceFactor,
}

/// One anomaly or warning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Category.
    pub kind: FindingKind,
    /// Warning or critical.
    pub severity: Severity,
    /// Human-readable explanation.
    pub message: String,
}

impl Finding {
    fn warning(kind: FindingKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    fn critical(kind: FindingKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Critical,
            message: message.into(),
        }
    }
}

/// Where the expected factor came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorSource {
    /// Supplied by the caller.
    Custom,
    /// Conversion table lookup.
    Table,
}

/// Expected factor the verdict was scored against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedFactor {
    /// Custom or table.
    pub source: FactorSource,
    /// Table key requested by the caller, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_type: Option<ProductKey>,
    /// Expected percent.
    pub expected_percent: f64,
    /// Band half-width.
    pub tolerance_percent: f64,
}

/// Outcome of a mass-balance check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MassBalanceVerdict {
    /// False when any anomaly was raised.
    pub valid: bool,
    /// `Σout / Σin × 100`; `None` when inputs sum to zero.
    pub conversion_factor: Option<f64>,
    /// Normalized input sum.
    pub input_total: f64,
    /// Normalized output sum.
    pub output_total: f64,
    /// Reference the factor was compared with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<ExpectedFactor>,
    /// Critical findings.
    pub anomalies: Vec<Finding>,
    /// Non-blocking findings.
    pub warnings: Vec<Finding>,
}

/// Validator bound to an injected conversion table.
#[derive(Debug, Clone)]
pub struct MassBalanceValidator {
    table: ConversionTable,
}

impl Default for MassBalanceValidator {
    fn default() -> Self {
        Self::new(ConversionTable::standard())
    }
}

struct Side {
    total: f64,
    families: BTreeSet<FamilyKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum FamilyKey {
    Mass,
    Volume,
}

impl From<UnitFamily> for FamilyKey {
    fn from(family: UnitFamily) -> Self {
        match family {
            UnitFamily::Mass => FamilyKey::Mass,
            UnitFamily::Volume => FamilyKey::Volume,
        }
    }
}

impl MassBalanceValidator {
    /// Creates a validator over `table`.
    pub fn new(table: ConversionTable) -> Self {
        Self { table }
    }

    /// The injected reference table.
    pub fn table(&self) -> &ConversionTable {
        &self.table
    }

    /// Validates a standalone request.
    pub fn validate(&self, request: &MassBalanceRequest) -> Result<MassBalanceVerdict, MassBalanceError> {
        self.validate_transformation(
            &request.input_quantities,
            &request.output_quantities,
            request.product_type.as_ref(),
            request.custom_factor,
            request.tolerance,
        )
    }

    /// Validates the input/output quantity lists of a transformation event.
    pub fn validate_event(
        &self,
        event: &Event,
        product_type: Option<&ProductKey>,
        custom_factor: Option<f64>,
        tolerance: Option<f64>,
    ) -> Result<MassBalanceVerdict, MassBalanceError> {
        if event.event_type != EventType::Transformation {
            return Err(MassBalanceError::NotTransformation(event.event_type));
        }
        self.validate_transformation(
            &event.input_quantity_list,
            &event.output_quantity_list,
            product_type,
            custom_factor,
            tolerance,
        )
    }

    /// Core check over quantity lists.
    pub fn validate_transformation(
        &self,
        inputs: &[QuantityItem],
        outputs: &[QuantityItem],
        product_type: Option<&ProductKey>,
        custom_factor: Option<f64>,
        tolerance: Option<f64>,
    ) -> Result<MassBalanceVerdict, MassBalanceError> {
        if inputs.is_empty() {
            return Err(MassBalanceError::EmptyInputs);
        }
        if outputs.is_empty() {
            return Err(MassBalanceError::EmptyOutputs);
        }
        for quantity in inputs.iter().chain(outputs) {
            quantity.validate()?;
        }
        if let Some(t) = tolerance {
            if !t.is_finite() || t < 0.0 {
                return Err(MassBalanceError::Tolerance(t));
            }
        }
        if let Some(f) = custom_factor {
            if !f.is_finite() || f <= 0.0 {
                return Err(MassBalanceError::CustomFactor(f));
            }
        }

        let mut warnings = Vec::new();
        let mut anomalies = Vec::new();

        let input = summarize(inputs, "inputs", &mut warnings);
        let output = summarize(outputs, "outputs", &mut warnings);
        let overflow = MassBalanceError::Overflow {
            input_total: input.total,
            output_total: output.total,
        };
        if !input.total.is_finite() || !output.total.is_finite() {
            return Err(overflow);
        }

        let expected = self.resolve_expected(
            product_type,
            custom_factor,
            tolerance,
            &input,
            &output,
            &mut warnings,
        );

        if input.total == 0.0 {
            anomalies.push(Finding::critical(
                FindingKind::ZeroInput,
                "inputs sum to zero; conversion factor is undefined",
            ));
            tracing::warn!(output_total = output.total, "mass balance: zero input");
            return Ok(MassBalanceVerdict {
                valid: false,
                conversion_factor: None,
                input_total: input.total,
                output_total: output.total,
                expected,
                anomalies,
                warnings,
            });
        }

        let factor = output.total / input.total * 100.0;
        if !factor.is_finite() {
            return Err(overflow);
        }

        match &expected {
            None => warnings.push(Finding::warning(
                FindingKind::NoReferenceFactor,
                "no expected conversion factor; deviation checks skipped",
            )),
            Some(reference) => {
                score(factor, reference, &mut anomalies, &mut warnings);
            }
        }

        let valid = anomalies.is_empty();
        if valid {
            tracing::debug!(factor, warnings = warnings.len(), "mass balance ok");
        } else {
            tracing::warn!(
                factor,
                expected = expected.as_ref().map(|e| e.expected_percent),
                anomalies = anomalies.len(),
                "mass balance anomaly"
            );
        }

        Ok(MassBalanceVerdict {
            valid,
            conversion_factor: Some(factor),
            input_total: input.total,
            output_total: output.total,
            expected,
            anomalies,
            warnings,
        })
    }

    fn resolve_expected(
        &self,
        product_type: Option<&ProductKey>,
        custom_factor: Option<f64>,
        tolerance: Option<f64>,
        input: &Side,
        output: &Side,
        warnings: &mut Vec<Finding>,
    ) -> Option<ExpectedFactor> {
        if let Some(expected_percent) = custom_factor {
            return Some(ExpectedFactor {
                source: FactorSource::Custom,
                product_type: product_type.cloned(),
                expected_percent,
                tolerance_percent: tolerance.unwrap_or(DEFAULT_TOLERANCE_PERCENT),
            });
        }

        let key = product_type?;
        let Some(reference) = self.table.get(key) else {
            warnings.push(Finding::warning(
                FindingKind::UnknownProductType,
                format!("product type {} is not in the conversion table", key),
            ));
            return None;
        };

        check_family(input, reference.input_unit, "inputs", warnings);
        check_family(output, reference.output_unit, "outputs", warnings);

        Some(ExpectedFactor {
            source: FactorSource::Table,
            product_type: Some(key.clone()),
            expected_percent: reference.expected_factor_percent,
            tolerance_percent: tolerance.unwrap_or(reference.tolerance_percent),
        })
    }
}

fn summarize(quantities: &[QuantityItem], side: &str, warnings: &mut Vec<Finding>) -> Side {
    let mut total = 0.0;
    let mut families = BTreeSet::new();
    let mut unknown_units = BTreeSet::new();

    for quantity in quantities {
        let normalized = quantity.normalized();
        total += normalized.value;
        match normalized.family {
            Some(family) => {
                families.insert(FamilyKey::from(family));
            }
            None => {
                unknown_units.insert(normalized.unit);
            }
        }
    }

    for unit in unknown_units {
        warnings.push(Finding::warning(
            FindingKind::UnrecognizedUnit,
            format!("unit '{}' in {} was not normalized", unit, side),
        ));
    }
    if families.len() > 1 {
        warnings.push(Finding::warning(
            FindingKind::MixedUnitFamilies,
            format!("{} mix mass and volume units", side),
        ));
    }

    Side { total, families }
}

fn check_family(side: &Side, expected: UnitFamily, label: &str, warnings: &mut Vec<Finding>) {
    let expected_key = FamilyKey::from(expected);
    if side.families.iter().any(|f| *f != expected_key) {
        warnings.push(Finding::warning(
            FindingKind::UnitFamilyMismatch,
            format!(
                "{} are expected in {} for this conversion",
                label,
                expected.canonical_unit()
            ),
        ));
    }
}

fn score(factor: f64, reference: &ExpectedFactor, anomalies: &mut Vec<Finding>, warnings: &mut Vec<Finding>) {
    let expected = reference.expected_percent;
    let tolerance = reference.tolerance_percent;
    let low = expected - tolerance;
    let high = expected + tolerance;

    if factor > high + BAND_SLACK {
        anomalies.push(Finding::critical(
            FindingKind::OverYield,
            format!(
                "conversion factor {:.2}% exceeds expected {:.2}% ± {:.2}: possible undeclared input / fraud indicator",
                factor, expected, tolerance
            ),
        ));
    } else if factor < low - BAND_SLACK {
        let shortfall = expected - factor;
        let message = format!(
            "conversion factor {:.2}% is below expected {:.2}% ± {:.2}: possible waste/quality issue",
            factor, expected, tolerance
        );
        if shortfall > 2.0 * tolerance + BAND_SLACK {
            anomalies.push(Finding::critical(FindingKind::UnderYield, message));
        } else {
            warnings.push(Finding::warning(FindingKind::UnderYield, message));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kg(value: f64) -> QuantityItem {
        QuantityItem::new(value, "kg")
    }

    fn validator() -> MassBalanceValidator {
        MassBalanceValidator::default()
    }

    #[test]
    fn coffee_over_yield_is_critical() {
        let verdict = validator()
            .validate_transformation(
                &[kg(100.0)],
                &[kg(90.0)],
                Some(&ProductKey::new("raw_coffee_to_roasted")),
                None,
                None,
            )
            .unwrap();
        assert_eq!(verdict.conversion_factor, Some(90.0));
        assert!(!verdict.valid);
        assert_eq!(verdict.anomalies[0].kind, FindingKind::OverYield);
        assert_eq!(verdict.anomalies[0].severity, Severity::Critical);
    }

    #[test]
    fn slight_under_yield_is_a_warning() {
        // 80 against 85 ± 3: below band, shortfall 5 <= 6.
        let verdict = validator()
            .validate_transformation(
                &[kg(100.0)],
                &[kg(80.0)],
                Some(&ProductKey::new("raw_coffee_to_roasted")),
                None,
                None,
            )
            .unwrap();
        assert!(verdict.valid);
        assert!(verdict.anomalies.is_empty());
        assert_eq!(verdict.warnings[0].kind, FindingKind::UnderYield);
    }

    #[test]
    fn severe_under_yield_is_critical() {
        // 78 against 85 ± 3: shortfall 7 > 6.
        let verdict = validator()
            .validate_transformation(
                &[kg(100.0)],
                &[kg(78.0)],
                Some(&ProductKey::new("raw_coffee_to_roasted")),
                None,
                None,
            )
            .unwrap();
        assert!(!verdict.valid);
        assert_eq!(verdict.anomalies[0].kind, FindingKind::UnderYield);
    }

    #[test]
    fn zero_input_has_no_factor() {
        let verdict = validator()
            .validate_transformation(&[kg(0.0)], &[kg(5.0)], None, Some(100.0), Some(0.0))
            .unwrap();
        assert!(!verdict.valid);
        assert_eq!(verdict.conversion_factor, None);
        assert_eq!(verdict.anomalies[0].kind, FindingKind::ZeroInput);
    }

    #[test]
    fn no_reference_skips_deviation() {
        let verdict = validator()
            .validate_transformation(&[kg(100.0)], &[kg(300.0)], None, None, None)
            .unwrap();
        assert!(verdict.valid);
        assert_eq!(verdict.conversion_factor, Some(300.0));
        assert!(verdict
            .warnings
            .iter()
            .any(|w| w.kind == FindingKind::NoReferenceFactor));
    }

    #[test]
    fn custom_factor_beats_table() {
        let verdict = validator()
            .validate_transformation(
                &[kg(100.0)],
                &[kg(90.0)],
                Some(&ProductKey::new("raw_coffee_to_roasted")),
                Some(90.0),
                Some(1.0),
            )
            .unwrap();
        assert!(verdict.valid);
        assert_eq!(verdict.expected.unwrap().source, FactorSource::Custom);
    }

    #[test]
    fn grams_and_kilograms_are_summed() {
        let verdict = validator()
            .validate_transformation(
                &[kg(1.0), QuantityItem::new(1000.0, "g")],
                &[QuantityItem::new(1.7, "KGM")],
                Some(&ProductKey::new("raw_coffee_to_roasted")),
                None,
                None,
            )
            .unwrap();
        assert!((verdict.input_total - 2.0).abs() < 1e-12);
        assert!((verdict.conversion_factor.unwrap() - 85.0).abs() < 1e-9);
        assert!(verdict.valid);
        assert!(verdict.warnings.is_empty());
    }

    #[test]
    fn unknown_units_are_warned_not_rejected() {
        let verdict = validator()
            .validate_transformation(
                &[QuantityItem::new(10.0, "crates")],
                &[QuantityItem::new(10.0, "crates")],
                None,
                Some(100.0),
                Some(0.0),
            )
            .unwrap();
        assert!(verdict.valid);
        assert_eq!(verdict.conversion_factor, Some(100.0));
        let unrecognized = verdict
            .warnings
            .iter()
            .filter(|w| w.kind == FindingKind::UnrecognizedUnit)
            .count();
        assert_eq!(unrecognized, 2);
    }

    #[test]
    fn unknown_product_type_is_warned() {
        let verdict = validator()
            .validate_transformation(
                &[kg(10.0)],
                &[kg(5.0)],
                Some(&ProductKey::new("moon_cheese")),
                None,
                None,
            )
            .unwrap();
        assert!(verdict.valid);
        assert!(verdict.expected.is_none());
        assert!(verdict
            .warnings
            .iter()
            .any(|w| w.kind == FindingKind::UnknownProductType));
    }

    #[test]
    fn empty_lists_are_rejected() {
        assert_eq!(
            validator().validate_transformation(&[], &[kg(1.0)], None, None, None),
            Err(MassBalanceError::EmptyInputs)
        );
        assert_eq!(
            validator().validate_transformation(&[kg(1.0)], &[], None, None, None),
            Err(MassBalanceError::EmptyOutputs)
        );
    }

    #[test]
    fn negative_tolerance_is_rejected() {
        assert_eq!(
            validator().validate_transformation(&[kg(1.0)], &[kg(1.0)], None, Some(100.0), Some(-1.0)),
            Err(MassBalanceError::Tolerance(-1.0))
        );
    }

    #[test]
    fn milk_to_cheese_crosses_families_without_warning() {
        let verdict = validator()
            .validate_transformation(
                &[QuantityItem::new(1000.0, "L")],
                &[kg(100.0)],
                Some(&ProductKey::new("milk_to_cheese")),
                None,
                None,
            )
            .unwrap();
        assert!(verdict.valid);
        assert!(verdict.warnings.is_empty());
    }

    #[test]
    fn request_accepts_custom_conversion_factor_alias() {
        let request: MassBalanceRequest = serde_json::from_str(
            r#"{"input_quantities":[{"value":100,"uom":"kg"}],
                "output_quantities":[{"value":100,"uom":"kg"}],
                "custom_conversion_factor":100,"tolerance":0}"#,
        )
        .unwrap();
        let verdict = validator().validate(&request).unwrap();
        assert!(verdict.valid);
        assert_eq!(verdict.conversion_factor, Some(100.0));
    }

    #[test]
    fn infinite_tolerance_and_factor_are_rejected() {
        assert_eq!(
            validator().validate_transformation(&[kg(1.0)], &[kg(5.0)], None, Some(100.0), Some(f64::INFINITY)),
            Err(MassBalanceError::Tolerance(f64::INFINITY))
        );
        assert_eq!(
            validator().validate_transformation(&[kg(1.0)], &[kg(5.0)], None, Some(f64::INFINITY), Some(5.0)),
            Err(MassBalanceError::CustomFactor(f64::INFINITY))
        );
    }

    #[test]
    fn overflowing_totals_are_rejected() {
        let result = validator().validate_transformation(
            &[kg(1e308), kg(1e308)],
            &[kg(1e308), kg(1e308), kg(1e308)],
            None,
            Some(100.0),
            Some(0.0),
        );
        assert!(matches!(result, Err(MassBalanceError::Overflow { .. })));
    }

    #[test]
    fn overflowing_factor_is_rejected() {
        let result = validator().validate_transformation(&[kg(1e-300)], &[kg(1e300)], None, None, None);
        assert!(matches!(result, Err(MassBalanceError::Overflow { .. })));
    }
}
