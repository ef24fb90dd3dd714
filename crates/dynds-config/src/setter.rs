//! Typed property setters driven by configuration values

use thiserror::Error;

use crate::ConfigValue;

/// Declared parameter type of a property setter
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum ValueKind {
    String,
    Bool,
    I32,
    I64,
    U32,
    U64,
    Usize,
    F64,
}

/// Why a single property could not be bound
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindError {
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: ValueKind,
        found: &'static str,
    },

    #[error("cannot parse '{value}' as {expected}")]
    Parse { value: String, expected: ValueKind },

    #[error("{value} is out of range for {expected}")]
    OutOfRange { value: String, expected: ValueKind },

    /// The setter itself refused the value
    #[error("{0}")]
    Rejected(String),
}

/// Conversion from a configuration value into a setter parameter
///
/// Only strings and primitives implement this, so setters taking anything
/// richer cannot be declared in a setter table.
pub trait FromConfigValue: Sized + 'static {
    const KIND: ValueKind;

    fn from_config_value(value: &ConfigValue) -> Result<Self, BindError>;
}

impl FromConfigValue for String {
    const KIND: ValueKind = ValueKind::String;

    fn from_config_value(value: &ConfigValue) -> Result<Self, BindError> {
        match value {
            ConfigValue::Map(_) => Err(BindError::TypeMismatch {
                expected: Self::KIND,
                found: value.type_name(),
            }),
            scalar => Ok(scalar.to_string()),
        }
    }
}

impl FromConfigValue for bool {
    const KIND: ValueKind = ValueKind::Bool;

    fn from_config_value(value: &ConfigValue) -> Result<Self, BindError> {
        match value {
            ConfigValue::Bool(b) => Ok(*b),
            ConfigValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(BindError::Parse {
                    value: s.clone(),
                    expected: Self::KIND,
                }),
            },
            other => Err(BindError::TypeMismatch {
                expected: Self::KIND,
                found: other.type_name(),
            }),
        }
    }
}

impl FromConfigValue for f64 {
    const KIND: ValueKind = ValueKind::F64;

    fn from_config_value(value: &ConfigValue) -> Result<Self, BindError> {
        match value {
            ConfigValue::Float(f) => Ok(*f),
            ConfigValue::Integer(n) => Ok(*n as f64),
            ConfigValue::String(s) => s.trim().parse().map_err(|_| BindError::Parse {
                value: s.clone(),
                expected: Self::KIND,
            }),
            other => Err(BindError::TypeMismatch {
                expected: Self::KIND,
                found: other.type_name(),
            }),
        }
    }
}

fn integer_from_config_value(value: &ConfigValue, expected: ValueKind) -> Result<i64, BindError> {
    match value {
        ConfigValue::Integer(n) => Ok(*n),
        ConfigValue::Float(f) if f.fract() == 0.0 => {
            // i64::MAX is not representable; its f64 neighbour is 2^63
            if (i64::MIN as f64..i64::MAX as f64).contains(f) {
                Ok(*f as i64)
            } else {
                Err(BindError::OutOfRange {
                    value: f.to_string(),
                    expected,
                })
            }
        }
        ConfigValue::String(s) => s.trim().parse().map_err(|_| BindError::Parse {
            value: s.clone(),
            expected,
        }),
        other => Err(BindError::TypeMismatch {
            expected,
            found: other.type_name(),
        }),
    }
}

macro_rules! impl_from_config_value_for_integers {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl FromConfigValue for $ty {
                const KIND: ValueKind = ValueKind::$kind;

                fn from_config_value(value: &ConfigValue) -> Result<Self, BindError> {
                    let wide = integer_from_config_value(value, Self::KIND)?;
                    <$ty>::try_from(wide).map_err(|_| BindError::OutOfRange {
                        value: wide.to_string(),
                        expected: Self::KIND,
                    })
                }
            }
        )*
    };
}

impl_from_config_value_for_integers! {
    i32 => I32,
    i64 => I64,
    u32 => U32,
    u64 => U64,
    usize => Usize,
}

type ApplyFn<T> = Box<dyn Fn(&mut T, &ConfigValue) -> Result<(), BindError> + Send + Sync>;

/// One entry of a setter table: a property name and how to set it on `T`
pub struct PropertySetter<T> {
    name: &'static str,
    kind: ValueKind,
    apply: ApplyFn<T>,
}

impl<T: 'static> PropertySetter<T> {
    /// Declare an infallible setter
    ///
    /// `name` is the camel-case property name (`maxWait`); lookups are
    /// case-insensitive.
    pub fn new<V, F>(name: &'static str, set: F) -> Self
    where
        V: FromConfigValue,
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        Self {
            name,
            kind: V::KIND,
            apply: Box::new(move |target, value| {
                set(target, V::from_config_value(value)?);
                Ok(())
            }),
        }
    }

    /// Declare a setter that may refuse the value
    pub fn try_new<V, F>(name: &'static str, set: F) -> Self
    where
        V: FromConfigValue,
        F: Fn(&mut T, V) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            name,
            kind: V::KIND,
            apply: Box::new(move |target, value| {
                set(target, V::from_config_value(value)?).map_err(BindError::Rejected)
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Coerce `value` to the declared type and invoke the setter
    pub fn invoke(&self, target: &mut T, value: &ConfigValue) -> Result<(), BindError> {
        (self.apply)(target, value)
    }
}

impl<T> std::fmt::Debug for PropertySetter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertySetter")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}
