//! Semantic typing of driver values
//!
//! Every value in the tree carries a [`SemanticType`] chosen from the raw
//! type tag the driver reports. Bounds, list items and precision are asked
//! of the driver when the value is classified; they are never taken from
//! the notification record.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::driver::DriverError;
use crate::ids::ValueId;
use crate::notification::RawValueType;

/// Loosely-typed value payload as it travels between driver and subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Bool(bool),
    Int(i64),
    Decimal(f64),
    Text(String),
}

impl Default for StateValue {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl StateValue {
    fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Decimal(_) => "decimal",
            Self::Text(_) => "text",
        }
    }
}

impl std::fmt::Display for StateValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Decimal(v) => write!(f, "{}", v),
            Self::Text(v) => f.write_str(v),
        }
    }
}

/// Per-value metadata queries answered by the driver
pub trait MetadataSource {
    fn value_min(&self, id: ValueId) -> Result<i64, DriverError>;
    fn value_max(&self, id: ValueId) -> Result<i64, DriverError>;
    fn value_list_items(&self, id: ValueId) -> Result<Vec<String>, DriverError>;
    fn value_float_precision(&self, id: ValueId) -> Result<u8, DriverError>;
    fn is_value_read_only(&self, id: ValueId) -> Result<bool, DriverError>;
    fn is_value_write_only(&self, id: ValueId) -> Result<bool, DriverError>;
}

impl<T: MetadataSource + ?Sized> MetadataSource for std::sync::Arc<T> {
    fn value_min(&self, id: ValueId) -> Result<i64, DriverError> {
        (**self).value_min(id)
    }
    fn value_max(&self, id: ValueId) -> Result<i64, DriverError> {
        (**self).value_max(id)
    }
    fn value_list_items(&self, id: ValueId) -> Result<Vec<String>, DriverError> {
        (**self).value_list_items(id)
    }
    fn value_float_precision(&self, id: ValueId) -> Result<u8, DriverError> {
        (**self).value_float_precision(id)
    }
    fn is_value_read_only(&self, id: ValueId) -> Result<bool, DriverError> {
        (**self).is_value_read_only(id)
    }
    fn is_value_write_only(&self, id: ValueId) -> Result<bool, DriverError> {
        (**self).is_value_write_only(id)
    }
}

/// Semantic type of a value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SemanticType {
    Boolean,
    BoundedInteger { min: i64, max: i64 },
    Enumerated { allowed_values: Vec<String> },
    DecimalNumber { precision: u8 },
    FreeText,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Expected {expected}, got {got}")]
    TypeMismatch { expected: &'static str, got: &'static str },
    #[error("Value {value} outside range {min}..={max}")]
    OutOfRange { value: i64, min: i64, max: i64 },
    #[error("'{value}' is not one of {allowed:?}")]
    NotAllowed { value: String, allowed: Vec<String> },
    #[error("Decimal value is not finite")]
    NotFinite,
}

/// Choose the semantic type of a value
///
/// Total over every raw type: anything not recognized becomes
/// [`SemanticType::FreeText`]. Failed metadata queries degrade the same way,
/// except for integers, which fall back to the range of their raw width.
pub fn classify<M>(raw: RawValueType, id: ValueId, metadata: &M) -> SemanticType
where
    M: MetadataSource + ?Sized,
{
    match raw {
        RawValueType::Bool => SemanticType::Boolean,
        RawValueType::Byte | RawValueType::Short | RawValueType::Int => {
            let (width_min, width_max) = raw.integer_range().unwrap_or((i64::MIN, i64::MAX));
            let min = metadata.value_min(id).unwrap_or_else(|e| {
                warn!(value_id = %id, error = %e, "Minimum query failed, using type width");
                width_min
            });
            let max = metadata.value_max(id).unwrap_or_else(|e| {
                warn!(value_id = %id, error = %e, "Maximum query failed, using type width");
                width_max
            });
            if min > max {
                warn!(value_id = %id, min, max, "Driver reported inverted bounds, using type width");
                SemanticType::BoundedInteger {
                    min: width_min,
                    max: width_max,
                }
            } else {
                SemanticType::BoundedInteger { min, max }
            }
        }
        RawValueType::List => match metadata.value_list_items(id) {
            Ok(items) if !items.is_empty() => SemanticType::Enumerated {
                allowed_values: items,
            },
            Ok(_) => {
                warn!(value_id = %id, "Driver reported an empty list, treating value as text");
                SemanticType::FreeText
            }
            Err(e) => {
                warn!(value_id = %id, error = %e, "List items query failed, treating value as text");
                SemanticType::FreeText
            }
        },
        RawValueType::Decimal => match metadata.value_float_precision(id) {
            Ok(precision) => SemanticType::DecimalNumber { precision },
            Err(e) => {
                warn!(value_id = %id, error = %e, "Precision query failed, treating value as text");
                SemanticType::FreeText
            }
        },
        _ => SemanticType::FreeText,
    }
}

impl SemanticType {
    /// Short name used in registrations
    pub fn name(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::BoundedInteger { .. } => "integer",
            Self::Enumerated { .. } => "list",
            Self::DecimalNumber { .. } => "decimal",
            Self::FreeText => "text",
        }
    }

    /// Check a value against this type, returning it in canonical form
    pub fn validate(&self, value: &StateValue) -> Result<StateValue, ValidationError> {
        match (self, value) {
            (Self::Boolean, StateValue::Bool(v)) => Ok(StateValue::Bool(*v)),
            (Self::BoundedInteger { min, max }, StateValue::Int(v)) => {
                if v < min || v > max {
                    Err(ValidationError::OutOfRange {
                        value: *v,
                        min: *min,
                        max: *max,
                    })
                } else {
                    Ok(StateValue::Int(*v))
                }
            }
            (Self::Enumerated { allowed_values }, StateValue::Text(v)) => {
                if allowed_values.iter().any(|a| a == v) {
                    Ok(StateValue::Text(v.clone()))
                } else {
                    Err(ValidationError::NotAllowed {
                        value: v.clone(),
                        allowed: allowed_values.clone(),
                    })
                }
            }
            (Self::DecimalNumber { precision }, StateValue::Int(v)) => {
                Ok(StateValue::Decimal(round_to(*v as f64, *precision)))
            }
            (Self::DecimalNumber { precision }, StateValue::Decimal(v)) => {
                if !v.is_finite() {
                    return Err(ValidationError::NotFinite);
                }
                Ok(StateValue::Decimal(round_to(*v, *precision)))
            }
            (Self::FreeText, other) => Ok(StateValue::Text(other.to_string())),
            (expected, got) => Err(ValidationError::TypeMismatch {
                expected: expected.name(),
                got: got.kind(),
            }),
        }
    }
}

fn round_to(value: f64, precision: u8) -> f64 {
    let scale = 10f64.powi(precision as i32);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Metadata stub that counts nothing and answers fixed values
    struct Fixed {
        min: i64,
        max: i64,
        items: Vec<String>,
        precision: Option<u8>,
    }

    impl MetadataSource for Fixed {
        fn value_min(&self, _id: ValueId) -> Result<i64, DriverError> {
            Ok(self.min)
        }
        fn value_max(&self, _id: ValueId) -> Result<i64, DriverError> {
            Ok(self.max)
        }
        fn value_list_items(&self, _id: ValueId) -> Result<Vec<String>, DriverError> {
            Ok(self.items.clone())
        }
        fn value_float_precision(&self, id: ValueId) -> Result<u8, DriverError> {
            self.precision.ok_or(DriverError::UnknownValue(id))
        }
        fn is_value_read_only(&self, _id: ValueId) -> Result<bool, DriverError> {
            Ok(false)
        }
        fn is_value_write_only(&self, _id: ValueId) -> Result<bool, DriverError> {
            Ok(false)
        }
    }

    fn fixed() -> Fixed {
        Fixed {
            min: 0,
            max: 99,
            items: vec!["Off".to_string(), "Heat".to_string(), "Cool".to_string()],
            precision: Some(2),
        }
    }

    #[test]
    fn test_classify_every_raw_type() {
        let meta = fixed();
        let id = ValueId(1);
        assert_eq!(classify(RawValueType::Bool, id, &meta), SemanticType::Boolean);
        for raw in [RawValueType::Byte, RawValueType::Short, RawValueType::Int] {
            assert_eq!(
                classify(raw, id, &meta),
                SemanticType::BoundedInteger { min: 0, max: 99 }
            );
        }
        assert_eq!(
            classify(RawValueType::List, id, &meta),
            SemanticType::Enumerated {
                allowed_values: vec!["Off".into(), "Heat".into(), "Cool".into()]
            }
        );
        assert_eq!(
            classify(RawValueType::Decimal, id, &meta),
            SemanticType::DecimalNumber { precision: 2 }
        );
        for raw in [
            RawValueType::String,
            RawValueType::Schedule,
            RawValueType::Button,
            RawValueType::Raw,
            RawValueType::Unknown,
        ] {
            assert_eq!(classify(raw, id, &meta), SemanticType::FreeText);
        }
    }

    #[test]
    fn test_classify_degrades_on_bad_metadata() {
        let mut meta = fixed();
        meta.items.clear();
        meta.precision = None;
        assert_eq!(
            classify(RawValueType::List, ValueId(1), &meta),
            SemanticType::FreeText
        );
        assert_eq!(
            classify(RawValueType::Decimal, ValueId(1), &meta),
            SemanticType::FreeText
        );

        meta.min = 10;
        meta.max = 1;
        assert_eq!(
            classify(RawValueType::Byte, ValueId(1), &meta),
            SemanticType::BoundedInteger { min: 0, max: 255 }
        );
    }

    #[test]
    fn test_validate_bounded_integer() {
        let ty = SemanticType::BoundedInteger { min: 0, max: 255 };
        assert_eq!(ty.validate(&StateValue::Int(255)), Ok(StateValue::Int(255)));
        assert_eq!(
            ty.validate(&StateValue::Int(256)),
            Err(ValidationError::OutOfRange {
                value: 256,
                min: 0,
                max: 255
            })
        );
        assert!(matches!(
            ty.validate(&StateValue::Bool(true)),
            Err(ValidationError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_validate_enumerated_and_decimal() {
        let list = SemanticType::Enumerated {
            allowed_values: vec!["Off".into(), "Heat".into()],
        };
        assert!(list.validate(&StateValue::Text("Heat".into())).is_ok());
        assert!(list.validate(&StateValue::Text("Cool".into())).is_err());

        let decimal = SemanticType::DecimalNumber { precision: 1 };
        assert_eq!(
            decimal.validate(&StateValue::Decimal(21.46)),
            Ok(StateValue::Decimal(21.5))
        );
        assert_eq!(
            decimal.validate(&StateValue::Int(20)),
            Ok(StateValue::Decimal(20.0))
        );
        assert_eq!(
            decimal.validate(&StateValue::Decimal(f64::NAN)),
            Err(ValidationError::NotFinite)
        );
    }

    #[test]
    fn test_free_text_accepts_anything() {
        assert_eq!(
            SemanticType::FreeText.validate(&StateValue::Int(7)),
            Ok(StateValue::Text("7".into()))
        );
    }

    #[test]
    fn test_state_value_from_json() {
        let v: StateValue = serde_json::from_str("true").unwrap();
        assert_eq!(v, StateValue::Bool(true));
        let v: StateValue = serde_json::from_str("42").unwrap();
        assert_eq!(v, StateValue::Int(42));
        let v: StateValue = serde_json::from_str("21.5").unwrap();
        assert_eq!(v, StateValue::Decimal(21.5));
        let v: StateValue = serde_json::from_str(r#""Heat""#).unwrap();
        assert_eq!(v, StateValue::Text("Heat".into()));
    }
}
