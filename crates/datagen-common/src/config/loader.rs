use serde::Deserialize;

/// Deserializes a number and treats zero as "not set".
pub fn deserialize_non_zero<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: num_traits::Zero + serde::Deserialize<'de>,
{
    let value = T::deserialize(deserializer)?;
    if value.is_zero() {
        Ok(None)
    } else {
        Ok(Some(value))
    }
}
