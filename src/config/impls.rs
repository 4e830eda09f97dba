use serde::{Deserialize, Deserializer};
use std::str::FromStr;

pub fn deserialize_level_filter<'de, D>(
    deserializer: D,
) -> Result<Option<log::LevelFilter>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(s) => log::LevelFilter::from_str(&s)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
