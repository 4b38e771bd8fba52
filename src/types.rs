//! Value-type registry.
//!
//! Pure mapping from the store's reported value types to their display
//! labels and access paths. Composite types (list, set, sorted set,
//! hash) take the multi-row view/edit path; scalars take the
//! single-value path. `Unknown` is a terminal display state and is never
//! retried.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The value shapes a cache key can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    String,
    List,
    Set,
    ZSet,
    Hash,
    Unknown,
}

impl KeyType {
    /// Wire name as the store reports it (`TYPE` command).
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::String => "string",
            KeyType::List => "list",
            KeyType::Set => "set",
            KeyType::ZSet => "zset",
            KeyType::Hash => "hash",
            KeyType::Unknown => "unknown",
        }
    }

    /// Human label for forms and view headers.
    pub fn label(&self) -> &'static str {
        match self {
            KeyType::String => "String",
            KeyType::List => "List",
            KeyType::Set => "Set",
            KeyType::ZSet => "Sorted Set",
            KeyType::Hash => "Hash",
            KeyType::Unknown => "Unknown",
        }
    }

    /// Composite types hold multiple addressable sub-elements.
    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            KeyType::List | KeyType::Set | KeyType::ZSet | KeyType::Hash
        )
    }

    /// Every supported type, in form-selector order. Excludes `Unknown`,
    /// which cannot be created.
    pub fn all() -> [KeyType; 5] {
        [
            KeyType::String,
            KeyType::List,
            KeyType::Set,
            KeyType::ZSet,
            KeyType::Hash,
        ]
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = ();

    /// Any unrecognized wire name (streams, modules) maps to `Unknown`
    /// rather than failing; this never errors in practice.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "string" => KeyType::String,
            "list" => KeyType::List,
            "set" => KeyType::Set,
            "zset" => KeyType::ZSet,
            "hash" => KeyType::Hash,
            _ => KeyType::Unknown,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_roundtrip() {
        for kt in KeyType::all() {
            assert_eq!(kt.as_str().parse::<KeyType>().unwrap(), kt);
        }
    }

    #[test]
    fn test_unrecognized_maps_to_unknown() {
        assert_eq!("stream".parse::<KeyType>().unwrap(), KeyType::Unknown);
        assert_eq!("none".parse::<KeyType>().unwrap(), KeyType::Unknown);
    }

    #[test]
    fn test_composite_flag() {
        assert!(!KeyType::String.is_composite());
        assert!(!KeyType::Unknown.is_composite());
        assert!(KeyType::List.is_composite());
        assert!(KeyType::Set.is_composite());
        assert!(KeyType::ZSet.is_composite());
        assert!(KeyType::Hash.is_composite());
    }

    #[test]
    fn test_labels() {
        assert_eq!(KeyType::ZSet.label(), "Sorted Set");
        assert_eq!(KeyType::String.label(), "String");
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&KeyType::ZSet).unwrap();
        assert_eq!(json, "\"zset\"");
    }
}
