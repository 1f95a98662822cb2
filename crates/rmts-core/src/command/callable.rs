//! Type-erased bound operations.
//!
//! Domain code registers ordinary typed closures; they are wrapped once,
//! at registration, into a [`Callable`] whose arguments and results are
//! [`serde_json::Value`]. Decoding happens inside the wrapper, so a value
//! that does not match the closure's argument type surfaces as
//! [`ExecError::ArgumentMismatch`] and the closure never runs.

use super::ExecError;
use rmts_types::CommandKind;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

type NoArgFn = dyn Fn() + Send + Sync;
type ProduceFn = dyn Fn() -> Result<Value, ExecError> + Send + Sync;
type ConsumeFn = dyn Fn(&Value) -> Result<(), ExecError> + Send + Sync;
type TransformFn = dyn Fn(&Value) -> Result<Value, ExecError> + Send + Sync;

/// A bound operation in one of the six invocation shapes.
#[derive(Clone)]
pub enum Callable {
    Void(Arc<NoArgFn>),
    VoidReturn(Arc<ProduceFn>),
    Write(Arc<ConsumeFn>),
    WriteReturn(Arc<TransformFn>),
    Read(Arc<ProduceFn>),
    QualifiedRead(Arc<TransformFn>),
}

impl Callable {
    /// Wraps a closure with no argument and no result.
    pub fn void(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self::Void(Arc::new(f))
    }

    /// Wraps a closure producing a result.
    pub fn void_return<R>(name: &str, f: impl Fn() -> R + Send + Sync + 'static) -> Self
    where
        R: Serialize,
    {
        let name = name.to_string();
        Self::VoidReturn(Arc::new(move || encode(&name, &f())))
    }

    /// Wraps a closure consuming one argument.
    pub fn write<A>(name: &str, f: impl Fn(A) + Send + Sync + 'static) -> Self
    where
        A: DeserializeOwned,
    {
        let name = name.to_string();
        Self::Write(Arc::new(move |v: &Value| {
            f(decode(&name, v)?);
            Ok(())
        }))
    }

    /// Wraps a closure consuming one argument and producing a result.
    pub fn write_return<A, R>(name: &str, f: impl Fn(A) -> R + Send + Sync + 'static) -> Self
    where
        A: DeserializeOwned,
        R: Serialize,
    {
        let name = name.to_string();
        Self::WriteReturn(Arc::new(move |v: &Value| encode(&name, &f(decode(&name, v)?))))
    }

    /// Wraps a state query.
    pub fn read<R>(name: &str, f: impl Fn() -> R + Send + Sync + 'static) -> Self
    where
        R: Serialize,
    {
        let name = name.to_string();
        Self::Read(Arc::new(move || encode(&name, &f())))
    }

    /// Wraps a query parameterised by one argument.
    pub fn qualified_read<A, R>(name: &str, f: impl Fn(A) -> R + Send + Sync + 'static) -> Self
    where
        A: DeserializeOwned,
        R: Serialize,
    {
        let name = name.to_string();
        Self::QualifiedRead(Arc::new(move |v: &Value| encode(&name, &f(decode(&name, v)?))))
    }

    /// Wraps a filter: `None` rejects the raw argument.
    pub fn filter<Raw, Validated>(
        name: &str,
        f: impl Fn(Raw) -> Option<Validated> + Send + Sync + 'static,
    ) -> Self
    where
        Raw: DeserializeOwned,
        Validated: Serialize,
    {
        let name = name.to_string();
        Self::QualifiedRead(Arc::new(move |v: &Value| match f(decode(&name, v)?) {
            Some(validated) => encode(&name, &validated),
            None => Err(ExecError::FilterRejected {
                command: name.clone(),
            }),
        }))
    }

    /// Composes a filter (QualifiedRead) with a write target.
    ///
    /// The composite is itself a Write: it runs the filter on the raw
    /// argument and forwards the validated value to `target` only on
    /// success.
    ///
    /// Returns `None` if the shapes are wrong.
    #[must_use]
    pub fn filtered_write(filter: &Self, target: &Self) -> Option<Self> {
        let (Self::QualifiedRead(filter), Self::Write(target)) = (filter, target) else {
            return None;
        };
        let filter = Arc::clone(filter);
        let target = Arc::clone(target);
        Some(Self::Write(Arc::new(move |raw: &Value| {
            let validated = filter(raw)?;
            target(&validated)
        })))
    }

    /// Command kind this callable implements.
    #[must_use]
    pub const fn kind(&self) -> CommandKind {
        match self {
            Self::Void(_) => CommandKind::Void,
            Self::VoidReturn(_) => CommandKind::VoidReturn,
            Self::Write(_) => CommandKind::Write,
            Self::WriteReturn(_) => CommandKind::WriteReturn,
            Self::Read(_) => CommandKind::Read,
            Self::QualifiedRead(_) => CommandKind::QualifiedRead,
        }
    }

    /// Runs the operation, ignoring `arg` for argument-less kinds.
    ///
    /// Argument-less kinds yield `Value::Null` when they produce nothing.
    pub(crate) fn invoke(&self, arg: &Value) -> Result<Value, ExecError> {
        match self {
            Self::Void(f) => {
                f();
                Ok(Value::Null)
            }
            Self::Write(f) => f(arg).map(|()| Value::Null),
            Self::VoidReturn(f) | Self::Read(f) => f(),
            Self::WriteReturn(f) | Self::QualifiedRead(f) => f(arg),
        }
    }
}

impl std::fmt::Debug for Callable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Callable::{}", self.kind())
    }
}

fn decode<A: DeserializeOwned>(name: &str, value: &Value) -> Result<A, ExecError> {
    serde_json::from_value(value.clone()).map_err(|_| ExecError::ArgumentMismatch {
        command: name.to_string(),
        expected: std::any::type_name::<A>().to_string(),
    })
}

fn encode<R: Serialize>(name: &str, result: &R) -> Result<Value, ExecError> {
    serde_json::to_value(result).map_err(|e| ExecError::ResultEncoding {
        command: name.to_string(),
        message: e.to_string(),
    })
}
