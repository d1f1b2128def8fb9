use serde::de::DeserializeOwned;

pub mod like;
pub mod visit;

/// Decodes a stored record, substituting the default for an absent or malformed one.
///
/// Stored records carry no schema version, so anything that doesn't parse is treated as if it had
/// never been written.
pub fn decode_or_default<T>(key: &str, raw: Option<&str>) -> T
where
    T: DeserializeOwned + Default,
{
    let Some(raw) = raw else {
        return T::default();
    };

    match serde_json::from_str::<T>(raw) {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!(key, error = %e, "malformed stored record, using default");
            T::default()
        }
    }
}
