use std::ops::RangeInclusive;

use crate::error::ScriptError;
use crate::value::{HostRef, PeerRef, Value};

/// Conversion from a script value into a typed native parameter.
pub trait FromValue: Sized {
    /// Type name used in binder diagnostics.
    const EXPECTED: &'static str;

    fn from_value(value: &Value) -> Option<Self>;
}

/// Arguments of one native call. For methods, slot 0 is the receiver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args(Vec<Value>);

impl Args {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    pub(crate) fn with_receiver(receiver: Value, rest: Vec<Value>) -> Self {
        let mut values = Vec::with_capacity(rest.len() + 1);
        values.push(receiver);
        values.extend(rest);
        Self(values)
    }

    /// Fails unless the call carries one of the `legal` argument counts.
    pub fn expect_arity(
        &self,
        op: &'static str,
        legal: RangeInclusive<usize>,
    ) -> Result<(), ScriptError> {
        if legal.contains(&self.len()) {
            return Ok(());
        }
        Err(self.arity_mismatch(op, legal))
    }

    fn arity_mismatch(&self, op: &'static str, legal: RangeInclusive<usize>) -> ScriptError {
        let expected = if legal.start() == legal.end() {
            legal.start().to_string()
        } else {
            format!("{} to {}", legal.start(), legal.end())
        };
        ScriptError::ArityMismatch {
            op,
            got: self.len(),
            expected,
        }
    }

    /// Binds slot `index` as `T`. A missing slot binds like `null`.
    pub fn bind<T: FromValue>(&self, index: usize, name: &str) -> Result<T, ScriptError> {
        let value = self.0.get(index).unwrap_or(&Value::Null);
        T::from_value(value).ok_or_else(|| {
            ScriptError::TypeMismatch(format!(
                "bad argument #{} ({}): {} expected, got {}",
                index + 1,
                name,
                T::EXPECTED,
                value.type_name()
            ))
        })
    }

    /// Binds slot `index` when present, otherwise yields `default`.
    pub fn bind_or<T: FromValue>(
        &self,
        index: usize,
        name: &str,
        default: T,
    ) -> Result<T, ScriptError> {
        if index < self.len() {
            self.bind(index, name)
        } else {
            Ok(default)
        }
    }
}

impl From<Vec<Value>> for Args {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

impl FromIterator<Value> for Args {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Integers and finite floats (truncated toward zero), in range for the target.
fn integral(value: &Value) -> Option<i128> {
    match value {
        Value::Integer(value) => Some(*value as i128),
        Value::Float(value) if value.is_finite() => {
            let truncated = value.trunc();
            (truncated >= i64::MIN as f64 && truncated <= i64::MAX as f64)
                .then_some(truncated as i64 as i128)
        }
        _ => None,
    }
}

macro_rules! impl_from_value_int {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl FromValue for $ty {
                const EXPECTED: &'static str = $name;

                fn from_value(value: &Value) -> Option<Self> {
                    integral(value).and_then(|n| <$ty>::try_from(n).ok())
                }
            }
        )*
    };
}

impl_from_value_int! {
    u8 => "integer in 0..=255",
    u16 => "integer in 0..=65535",
    u32 => "non-negative 32-bit integer",
    usize => "non-negative integer",
    i64 => "integer",
}

impl FromValue for Vec<u8> {
    const EXPECTED: &'static str = "string";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_bytes().map(<[u8]>::to_vec)
    }
}

impl FromValue for String {
    const EXPECTED: &'static str = "UTF-8 string";

    fn from_value(value: &Value) -> Option<Self> {
        value
            .as_bytes()
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .map(str::to_owned)
    }
}

impl FromValue for HostRef {
    const EXPECTED: &'static str = "Host";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_host()
    }
}

impl FromValue for PeerRef {
    const EXPECTED: &'static str = "Peer";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_peer()
    }
}

/// `null` binds as `None`; anything else must bind as `T`.
impl<T: FromValue> FromValue for Option<T> {
    const EXPECTED: &'static str = T::EXPECTED;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}
