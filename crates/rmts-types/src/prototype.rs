//! Argument and result prototypes.
//!
//! A [`Prototype`] is the schema of a command argument or result, never a
//! value. It is used for three things:
//!
//! - type-checking an argument before a command executes
//! - producing a default placeholder into which a remote payload is decoded
//! - reporting an argument type name during discovery
//!
//! Values themselves travel as [`serde_json::Value`].

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Schema of a command argument or result.
///
/// # Example
///
/// ```
/// use rmts_types::Prototype;
/// use serde_json::json;
///
/// let proto = Prototype::of::<f64>();
/// assert_eq!(proto.type_name(), "f64");
/// assert!(proto.conforms(&json!(3.5)));
/// assert!(!proto.conforms(&json!("fast")));
/// assert_eq!(proto.placeholder(), json!(0.0));
/// ```
#[derive(Clone)]
pub struct Prototype {
    type_name: &'static str,
    placeholder: Value,
    check: fn(&Value) -> bool,
}

impl Prototype {
    /// Builds the prototype of a serde type with a default value.
    #[must_use]
    pub fn of<T>() -> Self
    where
        T: Serialize + DeserializeOwned + Default,
    {
        Self {
            type_name: short_type_name(std::any::type_name::<T>()),
            placeholder: serde_json::to_value(T::default()).unwrap_or(Value::Null),
            check: decodes_as::<T>,
        }
    }

    /// Prototype for "no value" (Void arguments and results).
    #[must_use]
    pub fn unit() -> Self {
        Self {
            type_name: "()",
            placeholder: Value::Null,
            check: Value::is_null,
        }
    }

    /// Prototype that accepts any JSON value.
    #[must_use]
    pub fn any() -> Self {
        Self {
            type_name: "json",
            placeholder: Value::Null,
            check: |_| true,
        }
    }

    /// Short type name reported during discovery.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Fresh default value of this type.
    #[must_use]
    pub fn placeholder(&self) -> Value {
        self.placeholder.clone()
    }

    /// Returns `true` if `value` decodes as this type.
    #[must_use]
    pub fn conforms(&self, value: &Value) -> bool {
        (self.check)(value)
    }

    /// Decodes a serialized payload into a value of this type.
    ///
    /// Starts from the placeholder and only accepts text that parses as
    /// JSON and conforms to the prototype. Returns `None` otherwise.
    #[must_use]
    pub fn decode(&self, payload: &str) -> Option<Value> {
        if payload.trim().is_empty() {
            return self.conforms(&self.placeholder).then(|| self.placeholder());
        }
        let value: Value = serde_json::from_str(payload).ok()?;
        self.conforms(&value).then_some(value)
    }
}

impl fmt::Debug for Prototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prototype")
            .field("type_name", &self.type_name)
            .field("placeholder", &self.placeholder)
            .finish()
    }
}

impl PartialEq for Prototype {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name && self.placeholder == other.placeholder
    }
}

fn decodes_as<T: DeserializeOwned>(value: &Value) -> bool {
    serde_json::from_value::<T>(value.clone()).is_ok()
}

/// Strips module paths, keeping generic arguments readable.
///
/// `alloc::vec::Vec<f64>` becomes `Vec<f64>`.
fn short_type_name(full: &'static str) -> &'static str {
    match full.find('<') {
        Some(open) => {
            let head = &full[..open];
            match head.rfind("::") {
                Some(pos) if !full[open..].contains("::") => &full[pos + 2..],
                Some(_) | None => full,
            }
        }
        None => full.rsplit("::").next().unwrap_or(full),
    }
}
