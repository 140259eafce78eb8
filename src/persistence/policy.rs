//! Save policy: which mutations trigger a save, and how long to debounce.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::graph::ChangeKind;

/// Default debounce interval in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 1000;

/// Which change kinds trigger a save, and the debounce interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavePolicy {
    /// Save on node/edge add or remove, or root change.
    pub on_structural: bool,
    /// Save on field edits.
    pub on_content: bool,
    /// Save on node drags.
    pub on_position: bool,
    /// Debounce interval. `0` saves immediately.
    pub debounce_ms: u64,
}

impl Default for SavePolicy {
    fn default() -> Self {
        Self {
            on_structural: true,
            on_content: true,
            on_position: false,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

impl SavePolicy {
    /// Policy that saves every change kind immediately.
    pub fn immediate() -> Self {
        Self {
            on_structural: true,
            on_content: true,
            on_position: true,
            debounce_ms: 0,
        }
    }

    /// Whether a change of this kind schedules a save.
    pub fn triggers(&self, kind: ChangeKind) -> bool {
        match kind {
            ChangeKind::Structural => self.on_structural,
            ChangeKind::Content => self.on_content,
            ChangeKind::Position => self.on_position,
        }
    }

    /// Debounce interval as a duration.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Read overrides from the environment.
    ///
    /// - `DIALOG_SAVE_DEBOUNCE_MS`
    /// - `DIALOG_SAVE_ON_STRUCTURAL`
    /// - `DIALOG_SAVE_ON_CONTENT`
    /// - `DIALOG_SAVE_ON_POSITION`
    ///
    /// Unset variables keep their defaults; unparsable ones are logged and
    /// ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            on_structural: parse_or("DIALOG_SAVE_ON_STRUCTURAL", &lookup, defaults.on_structural),
            on_content: parse_or("DIALOG_SAVE_ON_CONTENT", &lookup, defaults.on_content),
            on_position: parse_or("DIALOG_SAVE_ON_POSITION", &lookup, defaults.on_position),
            debounce_ms: parse_or("DIALOG_SAVE_DEBOUNCE_MS", &lookup, defaults.debounce_ms),
        }
    }
}

fn parse_or<T: FromStr + std::fmt::Display>(key: &str, lookup: &impl Fn(&str) -> Option<String>, default: T) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, default = %default, "Invalid save policy override, using default");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_policy() {
        let policy = SavePolicy::default();
        assert!(policy.triggers(ChangeKind::Structural));
        assert!(policy.triggers(ChangeKind::Content));
        assert!(!policy.triggers(ChangeKind::Position));
        assert_eq!(policy.debounce(), Duration::from_millis(1000));
    }

    #[test]
    fn test_overrides_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("DIALOG_SAVE_DEBOUNCE_MS", "250"),
            ("DIALOG_SAVE_ON_POSITION", "true"),
            ("DIALOG_SAVE_ON_CONTENT", "not-a-bool"),
        ]
        .into_iter()
        .collect();

        let policy = SavePolicy::from_lookup(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(policy.debounce_ms, 250);
        assert!(policy.on_position);
        assert!(policy.on_content);
        assert!(policy.on_structural);
    }

    #[test]
    fn test_policy_serde_shape() {
        let json = serde_json::to_value(SavePolicy::default()).unwrap();
        assert_eq!(json["debounce_ms"], 1000);
        assert_eq!(json["on_position"], false);
    }
}
