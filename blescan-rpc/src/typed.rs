use serde_json::{Map, Value};

use crate::types::JsonRpcResponse;

/// A small, explicit set of conversions from a JSON-RPC result value to a
/// concrete Rust type, replacing runtime reflection with one `impl` per
/// target type (§9). Implementors define the coercion and default for a
/// mismatch; callers never see a parse failure, only a logged warning and
/// the type's default.
pub trait RpcScalar: Sized {
    fn from_value(value: Option<&Value>) -> Self;
}

impl RpcScalar for bool {
    fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s == "ok",
            other => {
                warn_on_mismatch("bool", other);
                false
            }
        }
    }
}

impl RpcScalar for String {
    fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            other => {
                warn_on_mismatch("String", other);
                String::new()
            }
        }
    }
}

impl RpcScalar for i64 {
    fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Number(n)) if n.as_i64().is_some() => n.as_i64().unwrap(),
            Some(Value::String(s)) => s.parse().unwrap_or_else(|_| {
                warn_on_mismatch("i64", value);
                0
            }),
            other => {
                warn_on_mismatch("i64", other);
                0
            }
        }
    }
}

impl RpcScalar for u32 {
    fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Number(n)) if n.as_u64().is_some() => {
                u32::try_from(n.as_u64().unwrap()).unwrap_or_default()
            }
            Some(Value::String(s)) => s.parse().unwrap_or_else(|_| {
                warn_on_mismatch("u32", value);
                0
            }),
            other => {
                warn_on_mismatch("u32", other);
                0
            }
        }
    }
}

impl RpcScalar for f64 {
    fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Number(n)) => n.as_f64().unwrap_or_default(),
            Some(Value::String(s)) => s.parse().unwrap_or_else(|_| {
                warn_on_mismatch("f64", value);
                0.0
            }),
            other => {
                warn_on_mismatch("f64", other);
                0.0
            }
        }
    }
}

fn warn_on_mismatch(target: &'static str, value: Option<&Value>) {
    tracing::warn!(target, ?value, "JSON-RPC result did not coerce to requested type, using default");
}

impl JsonRpcResponse {
    /// Extracts the result as a typed scalar (`bool`, `String`, `i64`,
    /// `u32`, `f64`), applying the coercion rules of §4.7.
    #[must_use]
    pub fn get_result_typed<T: RpcScalar>(&self) -> T {
        T::from_value(self.result.as_ref())
    }

    /// Extracts a named property from the result, whether it was returned
    /// nested in `result` (canonical) or flattened at the response root.
    #[must_use]
    pub fn get_property_typed<T: RpcScalar>(&self, name: &str) -> T {
        let mapping = self.get_result_mapping();
        let value = mapping.as_ref().and_then(|m| m.get(name));
        T::from_value(value)
    }

    /// Extracts the result as a property mapping per the §4.7 rules:
    /// a flattened response's root properties always win; otherwise an
    /// object result is used as-is, the literal string `"ok"` becomes an
    /// empty mapping, and an empty string becomes `None` (a null/absent
    /// value, distinct from an empty mapping).
    #[must_use]
    pub fn get_result_mapping(&self) -> Option<Map<String, Value>> {
        if self.is_flattened() {
            return Some(self.root_properties.clone());
        }
        match &self.result {
            Some(Value::Object(map)) => Some(map.clone()),
            Some(Value::String(s)) if s == "ok" => Some(Map::new()),
            Some(Value::String(s)) if s.is_empty() => None,
            _ => None,
        }
    }
}
