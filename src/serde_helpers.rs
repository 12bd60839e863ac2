//! Serde helpers shared by REST responses and gateway event payloads.
//!
//! With the `tracing` feature, unknown fields are reported as warnings so that server-side
//! additions to a payload are noticed without breaking deserialization.

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Deserialize a JSON value, warning about any field the target type does not capture.
///
/// Unknown fields never fail deserialization. On failure, the offending path and value are
/// logged before the error is returned.
#[cfg(feature = "tracing")]
pub fn deserialize_with_warnings<T: DeserializeOwned>(value: Value) -> crate::Result<T> {
    use std::any::type_name;

    tracing::trace!(type_name = %type_name::<T>(), json = %value, "deserializing JSON");

    let original = value.clone();
    let mut unknown_paths: Vec<String> = Vec::new();

    let result: T = serde_ignored::deserialize(value, |path| {
        unknown_paths.push(path.to_string());
    })
    .inspect_err(|_| {
        let json = original.to_string();
        let de = &mut serde_json::Deserializer::from_str(&json);
        if let Err(path_err) = serde_path_to_error::deserialize::<_, T>(de) {
            let path = path_err.path().to_string();
            tracing::error!(
                type_name = %type_name::<T>(),
                path = %path,
                value = %describe(original.pointer(&json_pointer(&path))),
                error = %path_err.inner(),
                "deserialization failed"
            );
        }
    })?;

    for path in unknown_paths {
        tracing::warn!(
            type_name = %type_name::<T>(),
            field = %path,
            value = %describe(original.pointer(&json_pointer(&path))),
            "unknown field in payload"
        );
    }

    Ok(result)
}

/// Pass-through deserialization when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub fn deserialize_with_warnings<T: DeserializeOwned>(value: Value) -> crate::Result<T> {
    Ok(serde_json::from_value(value)?)
}

/// Convert a `serde_ignored` / `serde_path_to_error` path (`a.b[0].?.c`) into a JSON pointer
/// (`/a/b/0/c`). `?` segments stand for `Option` layers and have no JSON counterpart.
#[cfg(feature = "tracing")]
fn json_pointer(path: &str) -> String {
    path.replace('[', ".")
        .replace(']', "")
        .split('.')
        .filter(|segment| !segment.is_empty() && *segment != "?")
        .fold(String::new(), |mut pointer, segment| {
            pointer.push('/');
            pointer.push_str(&segment.replace('~', "~0").replace('/', "~1"));
            pointer
        })
}

#[cfg(feature = "tracing")]
fn describe(value: Option<&Value>) -> String {
    value.map_or_else(|| "<unable to retrieve>".to_owned(), Value::to_string)
}
