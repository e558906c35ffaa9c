//! Typed field values and their line protocol rendering.

use core::error::Error;
use std::fmt;

use derive_more::Display;

/// Field value for measurements
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// No reading available, the field is omitted.
    Null,
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    List(Vec<FieldValue>),
}

/// Errors raised while rendering a single field value.
#[derive(Debug, Clone, PartialEq, Display)]
pub enum FieldError {
    #[display("field '{key}' must be a string or primitive: {value}")]
    UnsupportedValue { key: String, value: String },
}

impl Error for FieldError {}

impl FieldValue {
    /// Renders the value as line protocol text for the field `key`.
    ///
    /// Returns `Ok(None)` when the value has to be left out of the line: null
    /// readings and floats that are NaN or infinite. Integers carry the `i`
    /// suffix so the backend stores them as integers. Strings are written
    /// verbatim; callers own any escaping.
    ///
    /// # Errors
    ///
    /// - [`FieldError::UnsupportedValue`] for collections, which have no line
    ///   protocol representation
    pub fn encode(&self, key: &str) -> Result<Option<String>, FieldError> {
        match self {
            FieldValue::Null => Ok(None),
            FieldValue::Float(f) if !f.is_finite() => Ok(None),
            FieldValue::Float(f) => Ok(Some(f.to_string())),
            FieldValue::Integer(i) => Ok(Some(format!("{i}i"))),
            FieldValue::String(s) => Ok(Some(s.clone())),
            FieldValue::Boolean(b) => Ok(Some(b.to_string())),
            FieldValue::List(_) => Err(FieldError::UnsupportedValue {
                key: key.to_string(),
                value: self.to_string(),
            }),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "null"),
            FieldValue::Integer(i) => write!(f, "{i}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::String(s) => write!(f, "{s}"),
            FieldValue::Boolean(b) => write!(f, "{b}"),
            FieldValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

macro_rules! integer_field_value {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    FieldValue::Integer(i64::from(value))
                }
            }
        )*
    };
}

integer_field_value!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! saturating_field_value {
    ($($ty:ty),*) => {
        $(
            /// Saturates at `i64::MAX`.
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    FieldValue::Integer(i64::try_from(value).unwrap_or(i64::MAX))
                }
            }
        )*
    };
}

saturating_field_value!(u64, usize, isize);

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<f32> for FieldValue {
    fn from(value: f32) -> Self {
        FieldValue::Float(f64::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<char> for FieldValue {
    fn from(value: char) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, Into::into)
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(value: Vec<T>) -> Self {
        FieldValue::List(value.into_iter().map(Into::into).collect())
    }
}
