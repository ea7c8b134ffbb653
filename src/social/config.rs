use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// How a hub hands an event to a subscriber whose delivery channel is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryMode {
    /// Wait for the subscriber to make room or for its scope to be cancelled.
    /// A stalled subscriber delays the remaining subscribers of the same
    /// event.
    #[default]
    Blocking,
    /// Skip the subscriber if it has no room right now.
    DropIfFull,
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocking => write!(f, "blocking"),
            Self::DropIfFull => write!(f, "drop-if-full"),
        }
    }
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "blocking" => Ok(Self::Blocking),
            "drop-if-full" | "drop" => Ok(Self::DropIfFull),
            other => Err(format!(
                "invalid delivery mode '{other}', expected 'blocking' or 'drop-if-full'"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder, Serialize, Deserialize)]
pub struct Config {
    #[builder(default)]
    pub delivery: DeliveryMode,
    /// Capacity of each live subscriber's delivery channel.
    #[builder(default = 1)]
    pub stream_buffer: usize,
    #[builder(default = 2048)]
    pub post_max_len: usize,
    #[builder(default = 64)]
    pub spoiler_max_len: usize,
    #[builder(default = 2048)]
    pub comment_max_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Config {
    /// Reads overrides from `MURMUR_*` environment variables on top of the
    /// defaults. Unparseable values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse().ok());
        if let Some(delivery) =
            lookup("MURMUR_DELIVERY").and_then(|v| v.parse().ok())
        {
            config.delivery = delivery;
        }
        if let Some(buffer) = parsed("MURMUR_STREAM_BUFFER") {
            config.stream_buffer = buffer;
        }
        if let Some(len) = parsed("MURMUR_POST_MAX_LEN") {
            config.post_max_len = len;
        }
        if let Some(len) = parsed("MURMUR_SPOILER_MAX_LEN") {
            config.spoiler_max_len = len;
        }
        if let Some(len) = parsed("MURMUR_COMMENT_MAX_LEN") {
            config.comment_max_len = len;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use hashbrown::HashMap;

    use super::*;

    #[test]
    fn delivery_mode_from_str() {
        assert_eq!("blocking".parse::<DeliveryMode>(), Ok(DeliveryMode::Blocking));
        assert_eq!(
            "DROP-IF-FULL".parse::<DeliveryMode>(),
            Ok(DeliveryMode::DropIfFull)
        );
        assert!("eventually".parse::<DeliveryMode>().is_err());
        assert_eq!(DeliveryMode::DropIfFull.to_string(), "drop-if-full");
    }

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.delivery, DeliveryMode::Blocking);
        assert_eq!(config.stream_buffer, 1);
        assert_eq!(config.post_max_len, 2048);
        assert_eq!(config.spoiler_max_len, 64);
    }

    #[test]
    fn overrides() {
        let env: HashMap<&str, &str> = [
            ("MURMUR_DELIVERY", "drop-if-full"),
            ("MURMUR_STREAM_BUFFER", "8"),
            ("MURMUR_COMMENT_MAX_LEN", "not a number"),
        ]
        .into_iter()
        .collect();
        let config = Config::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.delivery, DeliveryMode::DropIfFull);
        assert_eq!(config.stream_buffer, 8);
        assert_eq!(config.comment_max_len, 2048);
    }
}
