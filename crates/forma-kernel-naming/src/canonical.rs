//! Canonical JSON encoding.
//!
//! Two independent agents given the same logical record must produce
//! byte-identical output. The rules: object keys sort lexicographically,
//! arrays preserve order, numbers use the shortest round-trippable decimal,
//! no whitespace. `serde_json`'s default `Map` is a `BTreeMap` (sorted keys)
//! and its float writer emits shortest-round-trip decimals, so funneling
//! every value through `serde_json::Value` satisfies the contract; this
//! module adds the non-finite rejection the contract also requires.

use serde::Serialize;
use serde_json::Value;

use crate::stref::StrefError;

/// Serialize a value to its canonical JSON string.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String, StrefError> {
    let v = serde_json::to_value(value).map_err(|e| StrefError::Encode(e.to_string()))?;
    reject_lossy_numbers(&v)?;
    serde_json::to_string(&v).map_err(|e| StrefError::Encode(e.to_string()))
}

/// Walk a value tree and reject anything a non-finite float collapsed into.
///
/// `serde_json` maps NaN/Infinity to `null` on the way into `Value`, so a
/// `null` anywhere in a numeric position is indistinguishable from a lost
/// non-finite. Callers validate their floats before encoding (see
/// `PersistentRef::validate`); this check is the backstop for untyped input.
fn reject_lossy_numbers(v: &Value) -> Result<(), StrefError> {
    match v {
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if !f.is_finite() {
                    return Err(StrefError::NonFiniteNumber);
                }
            }
            Ok(())
        }
        Value::Array(items) => items.iter().try_for_each(reject_lossy_numbers),
        Value::Object(map) => map.values().try_for_each(reject_lossy_numbers),
        _ => Ok(()),
    }
}
