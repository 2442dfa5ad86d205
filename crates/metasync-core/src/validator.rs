//! Structural and range checks over canonical models.
//!
//! Validation is advisory: it reports every violation it finds, with a
//! bracketed camelCase path such as `data[2].units[0].cost`, and never
//! alters the model.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;

use crate::{Augment, Champion, DataModel, Dataset, Item, ModelMetadata, TeamComp};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<FieldViolation>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<FieldViolation>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    /// Folds another report's violations into this one.
    pub fn merge(mut self, other: ValidationReport) -> Self {
        self.errors.extend(other.errors);
        self.is_valid = self.errors.is_empty();
        self
    }
}

/// Entities the validator knows how to walk.
pub trait Validate {
    fn check(&self, path: &str, errors: &mut Vec<FieldViolation>);
}

pub struct Validator;

impl Validator {
    pub fn validate<T: Validate>(model: &DataModel<T>) -> ValidationReport {
        let mut errors = Vec::new();
        check_metadata(&model.metadata, &mut errors);
        for (index, entity) in model.data.iter().enumerate() {
            entity.check(&format!("data[{index}]"), &mut errors);
        }
        ValidationReport::from_errors(errors)
    }

    pub fn validate_dataset(dataset: &Dataset) -> ValidationReport {
        match dataset {
            Dataset::TeamComps(model) => Self::validate(model),
            Dataset::Items(model) => Self::validate(model),
            Dataset::Augments(model) => Self::validate(model),
        }
    }

    /// Reports unit items missing from the item catalog of the same sync.
    pub fn validate_item_references(comps: &[TeamComp], catalog: &[Item]) -> ValidationReport {
        let known: HashSet<&str> = catalog.iter().map(|item| item.id.as_str()).collect();
        let mut errors = Vec::new();

        for (comp_index, comp) in comps.iter().enumerate() {
            for (unit_index, unit) in comp.units.iter().enumerate() {
                for (item_index, item) in unit.items.iter().enumerate() {
                    if !known.contains(item.id.as_str()) {
                        errors.push(FieldViolation {
                            field: format!(
                                "data[{comp_index}].units[{unit_index}].items[{item_index}].id"
                            ),
                            message: String::from("item is not in the item catalog"),
                            value: Some(Value::from(item.id.clone())),
                        });
                    }
                }
            }
        }

        ValidationReport::from_errors(errors)
    }
}

fn check_metadata(metadata: &ModelMetadata, errors: &mut Vec<FieldViolation>) {
    if metadata.timestamp.is_in_future() {
        errors.push(FieldViolation {
            field: String::from("metadata.timestamp"),
            message: String::from("timestamp is in the future"),
            value: Some(Value::from(metadata.timestamp.to_string())),
        });
    }
    if metadata.schema_version.trim().is_empty() {
        errors.push(FieldViolation {
            field: String::from("metadata.schemaVersion"),
            message: String::from("schema version is required"),
            value: None,
        });
    }
}

fn require_text(path: &str, field: &str, value: &str, errors: &mut Vec<FieldViolation>) {
    if value.trim().is_empty() {
        errors.push(FieldViolation {
            field: format!("{path}.{field}"),
            message: format!("{field} is required"),
            value: None,
        });
    }
}

fn require_range(
    path: &str,
    field: &str,
    value: f64,
    (min, max): (f64, f64),
    errors: &mut Vec<FieldViolation>,
) {
    // NaN fails both comparisons and is reported.
    if !(value >= min && value <= max) {
        errors.push(FieldViolation {
            field: format!("{path}.{field}"),
            message: format!("must be between {min} and {max}"),
            value: Some(Value::from(value)),
        });
    }
}

fn check_frequency(path: &str, frequency: Option<f64>, errors: &mut Vec<FieldViolation>) {
    if let Some(frequency) = frequency {
        if !frequency.is_finite() || frequency < 0.0 {
            errors.push(FieldViolation {
                field: format!("{path}.frequency"),
                message: String::from("must be a non-negative number"),
                value: Some(Value::from(frequency)),
            });
        }
    }
}

// Equipped items only carry an identity; recipe rules apply to the catalog.
fn check_item_reference(path: &str, item: &Item, errors: &mut Vec<FieldViolation>) {
    require_text(path, "id", &item.id, errors);
    require_text(path, "name", &item.name, errors);
}

impl Validate for Champion {
    fn check(&self, path: &str, errors: &mut Vec<FieldViolation>) {
        require_text(path, "id", &self.id, errors);
        require_text(path, "name", &self.name, errors);
        if !(1..=5).contains(&self.cost) {
            errors.push(FieldViolation {
                field: format!("{path}.cost"),
                message: String::from("must be between 1 and 5"),
                value: Some(Value::from(self.cost)),
            });
        }
        for (index, item) in self.items.iter().enumerate() {
            check_item_reference(&format!("{path}.items[{index}]"), item, errors);
        }
    }
}

impl Validate for TeamComp {
    fn check(&self, path: &str, errors: &mut Vec<FieldViolation>) {
        require_text(path, "id", &self.id, errors);
        require_text(path, "name", &self.name, errors);
        require_range(path, "avgPlacement", self.avg_placement, (1.0, 8.0), errors);
        require_range(path, "playRate", self.play_rate, (0.0, 100.0), errors);
        require_range(path, "winRate", self.win_rate, (0.0, 100.0), errors);

        for (index, unit) in self.units.iter().enumerate() {
            unit.check(&format!("{path}.units[{index}]"), errors);
        }
        for (index, item) in self.items.iter().enumerate() {
            check_item_reference(&format!("{path}.items[{index}]"), item, errors);
        }
    }
}

impl Validate for Item {
    fn check(&self, path: &str, errors: &mut Vec<FieldViolation>) {
        require_text(path, "id", &self.id, errors);
        require_text(path, "name", &self.name, errors);
        check_frequency(path, self.frequency, errors);

        if self.is_component && !self.components.is_empty() {
            errors.push(FieldViolation {
                field: format!("{path}.components"),
                message: String::from("components must be empty for a component item"),
                value: Some(Value::from(self.components.clone())),
            });
        }
        if !self.is_component && self.components.is_empty() {
            errors.push(FieldViolation {
                field: format!("{path}.components"),
                message: String::from("completed item must list its components"),
                value: None,
            });
        }
    }
}

impl Validate for Augment {
    fn check(&self, path: &str, errors: &mut Vec<FieldViolation>) {
        require_text(path, "id", &self.id, errors);
        require_text(path, "name", &self.name, errors);
        check_frequency(path, self.frequency, errors);
    }
}
